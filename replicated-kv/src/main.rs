use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use replicated_kv::{cli::Cli, runtime};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.node_config()?;
    let listener = TcpListener::bind(cli.listen_addr())
        .await
        .with_context(|| format!("failed to bind {}", cli.listen_addr()))?;
    let id = config.id;
    let heartbeat = config.timing.heartbeat_interval;

    let handle = runtime::launch(listener, config)?;
    info!(node = id, ?heartbeat, "node listening on {}", handle.local_addr());
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "failed to install ctrl-c handler");
    }
    info!("shutting down");
    handle.shutdown().await
}
