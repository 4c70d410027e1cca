//! `relay-node`: standalone channel relay process.

use anyhow::{Context, Result};
use relay_node::{load_config, RelayNode};
use relay_telemetry::{init_logging, register_metrics, TelemetryConfig, REGISTRY};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config().context("failed to load relay configuration")?;

    init_logging(&TelemetryConfig::from_env()).context("failed to initialize logging")?;
    let metrics = register_metrics().context("failed to register metrics")?;

    info!(
        version = channel_relay::VERSION,
        environment = ?config.relay.environment,
        addr = %config.relay.http_addr(),
        "Starting channel relay"
    );

    let node = RelayNode::build(config, metrics, REGISTRY.clone())?;
    let listener = node.bind().await?;
    node.serve(listener, shutdown_signal()).await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
    }
}
