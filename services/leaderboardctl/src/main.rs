use admin_ipc::{send_request, AdminRequest, AdminResponse, DEFAULT_SOCKET_PATH};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(about = "Operate a running leaderboardd")]
struct Cli {
    #[arg(long, env = "ADMIN_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    socket: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print scheduler and snapshot state
    Status,
    /// Start the broadcast timer (no-op if running)
    Start,
    /// Stop the broadcast timer; an in-flight cycle still completes
    Stop,
    /// Request one cycle now, subject to the minimum-gap and single-flight gates
    Trigger,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let req = match cli.command {
        Command::Status => AdminRequest::Status,
        Command::Start => AdminRequest::Start,
        Command::Stop => AdminRequest::Stop,
        Command::Trigger => AdminRequest::Trigger,
    };

    let resp = send_request(&cli.socket, &req).await?;
    println!("{}", serde_json::to_string(&resp)?);
    if let AdminResponse::Error(message) = resp {
        bail!("leaderboardd rejected {req:?}: {message}");
    }
    Ok(())
}
