use std::{net::SocketAddr, sync::Arc};

use admin_ipc::{run_server, AdminRequest, AdminResponse, AdminStatus, DEFAULT_SOCKET_PATH};
use broadcaster::{BroadcasterConfig, LeaderboardBroadcaster};
use clap::Parser;
use fanout::{ChannelTransport, Envelope};
use metrics::MetricsHandle;
use storage::{init_sqlite, prepare_sqlite_url};
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio::task;
use tracing::{debug, info, warn, Level};
use uuid::Uuid;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, env = "SQLITE_PATH", default_value = "sqlite://leaderboard.db")]
    sqlite_path: String,

    #[arg(long, env = "ADMIN_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    admin_socket: String,

    #[arg(long, env = "METRICS_ADDR", default_value = "127.0.0.1:9110")]
    metrics_addr: SocketAddr,

    #[arg(long, env = "BROADCAST_INTERVAL_MS", default_value_t = 300_000)]
    interval_ms: u64,

    #[arg(long, env = "BROADCAST_MIN_GAP_MS", default_value_t = 240_000)]
    min_gap_ms: u64,

    #[arg(long, env = "LEADERBOARD_TOP_N", default_value_t = 10)]
    top_n: usize,

    /// Buffered envelopes per relay subscriber before it starts lagging
    #[arg(long, env = "RELAY_CAPACITY", default_value_t = 4096)]
    relay_capacity: usize,
}

impl Args {
    fn broadcaster_config(&self) -> anyhow::Result<BroadcasterConfig> {
        Ok(BroadcasterConfig::from_millis(
            self.interval_ms,
            self.min_gap_ms,
            self.top_n,
        )?)
    }
}

fn log_startup(args: &Args, run_id: &str) {
    info!(path = %args.sqlite_path, "sqlite path configured");
    info!(socket = %args.admin_socket, "admin socket bind planned");
    info!(addr = %args.metrics_addr, "metrics bind planned");
    info!(
        interval_ms = args.interval_ms,
        min_gap_ms = args.min_gap_ms,
        top_n = args.top_n,
        "broadcast schedule configured"
    );
    info!(%run_id, "run initialized");
}

fn handle_admin(
    broadcaster: &Arc<LeaderboardBroadcaster>,
    run_id: &str,
    req: AdminRequest,
) -> anyhow::Result<AdminResponse> {
    match req {
        AdminRequest::Status => {
            let status = broadcaster.status();
            Ok(AdminResponse::Status(AdminStatus {
                run_id: run_id.to_string(),
                running: status.running,
                in_cycle: status.in_cycle,
                last_cycle_start_ms: status.last_cycle_start.map(|t| t.timestamp_millis()),
                snapshot_size: status.snapshot_size,
            }))
        }
        AdminRequest::Start => {
            broadcaster.start();
            Ok(AdminResponse::Ack)
        }
        AdminRequest::Stop => {
            broadcaster.stop();
            Ok(AdminResponse::Ack)
        }
        AdminRequest::Trigger => {
            let b = Arc::clone(broadcaster);
            task::spawn(async move {
                let outcome = b.tick().await;
                info!(completed = outcome.is_completed(), "admin-triggered cycle finished");
            });
            Ok(AdminResponse::Ack)
        }
    }
}

/// Drains the in-process transport. Socket gateways subscribe the same way.
async fn relay(mut rx: Receiver<Envelope>) {
    loop {
        match rx.recv().await {
            Ok(envelope) => debug!(
                channel = %envelope.channel,
                event = %envelope.event,
                payload = %envelope.payload,
                "event published"
            ),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "relay lagged behind transport"),
            Err(RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = args.broadcaster_config()?;
    prepare_sqlite_url(&args.sqlite_path)?;
    info!(
        sqlite = %args.sqlite_path,
        socket = %args.admin_socket,
        "booting leaderboardd"
    );

    let run_id = Uuid::new_v4().to_string();
    let store = init_sqlite(&args.sqlite_path).await?;
    store.insert_run(&run_id, None).await?;
    log_startup(&args, &run_id);

    let metrics = MetricsHandle::new();
    let broadcast_metrics = metrics.broadcast_metrics()?;
    let broadcaster = Arc::new(LeaderboardBroadcaster::new(
        Arc::new(store.clone()),
        config,
        broadcast_metrics,
    )?);

    let transport = ChannelTransport::new(args.relay_capacity);
    task::spawn(relay(transport.subscribe()));
    broadcaster.initialize(Arc::new(transport));

    let admin_broadcaster = Arc::clone(&broadcaster);
    let admin_run_id = run_id.clone();
    let socket_path = args.admin_socket.clone();
    task::spawn(async move {
        let handler = move |req: AdminRequest| handle_admin(&admin_broadcaster, &admin_run_id, req);
        if let Err(err) = run_server(&socket_path, handler).await {
            tracing::error!(error = ?err, "admin ipc server failed");
        }
    });

    let metrics_addr = args.metrics_addr;
    task::spawn(async move {
        if let Err(err) = metrics.serve(metrics_addr).await {
            tracing::error!(error = ?err, "metrics server error");
        }
    });

    broadcaster.start();
    info!(
        run_id = %run_id,
        sqlite = %args.sqlite_path,
        admin_socket = %args.admin_socket,
        metrics_addr = %args.metrics_addr,
        "ready"
    );
    if let Err(err) = store
        .log_incident(&run_id, "info", "ready", "leaderboardd booted and ready")
        .await
    {
        warn!(error = ?err, "failed to record ready incident");
    }

    tokio::signal::ctrl_c().await?;
    broadcaster.stop();
    if let Err(err) = store
        .log_incident(&run_id, "info", "shutdown", "leaderboardd stopped on signal")
        .await
    {
        warn!(error = ?err, "failed to record shutdown incident");
    }
    info!(run_id = %run_id, "stopped");
    Ok(())
}
