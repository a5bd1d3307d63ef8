//! Pulse server binary: CLI parsing, tracing setup, and the serve loop.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use pulse_server::{run_server, ServerConfig};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pulse-server",
    about = "Telemetry server for AI agent heartbeats and gateway errors",
    version
)]
struct Cli {
    #[arg(
        long,
        env = "PULSE_ROOT",
        default_value = ".",
        help = "Data root holding pulse.json, budget.json, and agents/<id>/sessions/"
    )]
    root: PathBuf,

    #[arg(
        long = "log-dir",
        env = "PULSE_LOG_DIR",
        help = "Directory holding gateway logs (pulse-YYYY-MM-DD.log); defaults to <root>/logs"
    )]
    log_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "PULSE_BIND",
        default_value = "127.0.0.1:4400",
        help = "Listen address in host:port form"
    )]
    bind: String,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let log_dir = cli.log_dir.unwrap_or_else(|| cli.root.join("logs"));
    run_server(ServerConfig {
        bind: cli.bind,
        root: cli.root,
        log_dir,
    })
    .await
}
