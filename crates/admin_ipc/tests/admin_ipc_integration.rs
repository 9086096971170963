#![cfg(unix)]

use std::sync::{Arc, Mutex};

use admin_ipc::{send_request, AdminRequest, AdminResponse, AdminStatus};
use anyhow::{anyhow, bail};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{sleep, Duration};

#[derive(Default)]
struct FakeBroadcaster {
    running: bool,
    triggers: u32,
}

fn status(state: &FakeBroadcaster) -> AdminResponse {
    AdminResponse::Status(AdminStatus {
        run_id: "run-123".to_string(),
        running: state.running,
        in_cycle: false,
        last_cycle_start_ms: None,
        snapshot_size: state.triggers as usize,
    })
}

#[tokio::test]
async fn status_start_stop_trigger_flow() {
    let dir = tempfile::tempdir().expect("temp dir");
    let socket_path = dir.path().join("admin.sock");
    let socket_str = socket_path
        .to_str()
        .expect("socket path should be utf-8")
        .to_string();

    let state = Arc::new(Mutex::new(FakeBroadcaster::default()));
    let handler_state = Arc::clone(&state);

    let server_path = socket_str.clone();
    let handler = move |req: AdminRequest| -> anyhow::Result<AdminResponse> {
        let mut state = handler_state
            .lock()
            .map_err(|_| anyhow!("state poisoned"))?;
        match req {
            AdminRequest::Status => Ok(status(&state)),
            AdminRequest::Start => {
                state.running = true;
                Ok(AdminResponse::Ack)
            }
            AdminRequest::Stop => {
                state.running = false;
                Ok(AdminResponse::Ack)
            }
            AdminRequest::Trigger => {
                if !state.running {
                    bail!("broadcaster is stopped");
                }
                state.triggers += 1;
                Ok(AdminResponse::Ack)
            }
        }
    };
    let server_task =
        tokio::spawn(async move { admin_ipc::run_server(&server_path, handler).await });

    // Allow the server task to start listening.
    sleep(Duration::from_millis(50)).await;

    let initial = send_request(&socket_str, &AdminRequest::Status)
        .await
        .expect("initial status");
    match initial {
        AdminResponse::Status(AdminStatus { running, run_id, .. }) => {
            assert!(!running);
            assert_eq!(run_id, "run-123");
        }
        other => panic!("expected status response, got {other:?}"),
    }

    let refused = send_request(&socket_str, &AdminRequest::Trigger)
        .await
        .expect("trigger resp");
    assert_eq!(
        refused,
        AdminResponse::Error("broadcaster is stopped".to_string())
    );

    let start = send_request(&socket_str, &AdminRequest::Start)
        .await
        .expect("start resp");
    assert_eq!(start, AdminResponse::Ack);
    let trigger = send_request(&socket_str, &AdminRequest::Trigger)
        .await
        .expect("trigger resp");
    assert_eq!(trigger, AdminResponse::Ack);

    match send_request(&socket_str, &AdminRequest::Status).await.expect("status") {
        AdminResponse::Status(AdminStatus {
            running,
            snapshot_size,
            ..
        }) => {
            assert!(running);
            assert_eq!(snapshot_size, 1);
        }
        other => panic!("expected status response after start, got {other:?}"),
    }

    let stop = send_request(&socket_str, &AdminRequest::Stop)
        .await
        .expect("stop resp");
    assert_eq!(stop, AdminResponse::Ack);
    assert!(!state.lock().unwrap().running);

    server_task.abort();
    let _ = std::fs::remove_file(socket_path);
}

#[tokio::test]
async fn malformed_request_gets_error_response() {
    let dir = tempfile::tempdir().expect("temp dir");
    let socket_path = dir.path().join("admin.sock");
    let socket_str = socket_path.to_str().expect("utf-8").to_string();

    let server_path = socket_str.clone();
    let server_task = tokio::spawn(async move {
        admin_ipc::run_server(&server_path, |_req| Ok(AdminResponse::Ack)).await
    });
    sleep(Duration::from_millis(50)).await;

    let mut stream = UnixStream::connect(&socket_str).await.expect("connect");
    stream
        .write_all(b"{\"type\":\"Reboot\"}\n")
        .await
        .expect("write");
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await.expect("read");

    let resp: AdminResponse = serde_json::from_str(line.trim()).expect("json");
    assert!(matches!(resp, AdminResponse::Error(msg) if msg.starts_with("malformed request")));

    server_task.abort();
}
