//! # Relay Node
//!
//! Wiring for a standalone channel relay process.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (TOML file, then environment overrides)
//! 2. Validate it
//! 3. Initialize logging and metrics
//! 4. Build the signing secret source
//! 5. Build the relay with the Prometheus observer
//! 6. Spawn the backlog sweeper when a TTL is configured
//! 7. Serve HTTP until Ctrl-C, then shut down gracefully

pub mod config;
pub mod metrics;
pub mod observer;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use channel_relay::{run_eviction, ChannelRelay, RelayService};
use prometheus::Registry;
use relay_telemetry::RelayMetrics;
use tokio::net::TcpListener;
use tracing::info;

pub use config::{
    build_secret_source, load_config, load_config_from, NodeConfig, NodeConfigError, SigningConfig,
};
pub use metrics::metrics_router;
pub use observer::PrometheusObserver;

/// A fully wired relay, ready to bind and serve.
pub struct RelayNode {
    service: RelayService,
    relay: Arc<ChannelRelay>,
}

impl RelayNode {
    /// Build the relay and its HTTP service. Nothing is spawned yet.
    pub fn build(config: NodeConfig, metrics: Arc<RelayMetrics>, registry: Registry) -> Result<Self> {
        let secrets = build_secret_source(&config).context("no usable signing secret source")?;
        info!(source = %secrets.describe(), "Signing secret source configured");

        let relay = Arc::new(
            ChannelRelay::new(&config.relay, secrets)
                .with_observer(Arc::new(PrometheusObserver::new(metrics))),
        );
        let service = RelayService::new(config.relay, Arc::clone(&relay))
            .context("invalid relay configuration")?
            .with_routes(metrics_router(registry));

        Ok(Self { service, relay })
    }

    pub fn relay(&self) -> Arc<ChannelRelay> {
        Arc::clone(&self.relay)
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        Ok(self.service.bind().await?)
    }

    /// Serve until `shutdown` resolves. The backlog sweeper runs for as long
    /// as the server does.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sweeper = self.relay.buffer_ttl().map(|ttl| {
            info!(ttl = ?ttl, "Starting backlog sweeper");
            tokio::spawn(run_eviction(Arc::clone(&self.relay)))
        });

        let result = self.service.serve(listener, shutdown).await;

        if let Some(handle) = sweeper {
            handle.abort();
        }
        Ok(result?)
    }
}
