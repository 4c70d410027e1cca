//! Integration flows. Everything here is test-only.

#[cfg(test)]
mod consumer_flows;
#[cfg(test)]
mod node_flows;
#[cfg(test)]
mod router_flows;

#[cfg(test)]
pub(crate) mod harness {
    use std::sync::Arc;
    use std::time::Duration;

    use channel_relay::domain::Environment;
    use channel_relay::{ChannelRelay, RelayConfig, RelayStatsSnapshot};
    use prometheus::Registry;
    use relay_node::{NodeConfig, RelayNode};
    use relay_tail::{tail, TailEnd, TailError};
    use relay_telemetry::RelayMetrics;
    use tokio::sync::{mpsc, oneshot};
    use tokio::task::JoinHandle;

    pub(crate) const WAIT: Duration = Duration::from_secs(5);

    /// A relay node serving on 127.0.0.1 with its own metrics registry.
    pub(crate) struct RunningRelay {
        pub base_url: String,
        pub relay: Arc<ChannelRelay>,
        pub metrics: Arc<RelayMetrics>,
        server: JoinHandle<()>,
        stop: Option<oneshot::Sender<()>>,
    }

    impl RunningRelay {
        /// Trigger graceful shutdown and wait for the server to return.
        pub(crate) async fn shutdown(&mut self) {
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
            tokio::time::timeout(WAIT, &mut self.server)
                .await
                .expect("server did not stop")
                .expect("server task panicked");
        }
    }

    impl Drop for RunningRelay {
        fn drop(&mut self) {
            self.server.abort();
        }
    }

    pub(crate) fn test_config() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.environment = Environment::Test;
        config.http.host = "127.0.0.1".parse().unwrap();
        config.http.port = 0;
        config
    }

    pub(crate) async fn start(config: RelayConfig) -> RunningRelay {
        let registry = Registry::new();
        let metrics = Arc::new(RelayMetrics::new(&registry).unwrap());
        let node = RelayNode::build(
            NodeConfig {
                relay: config,
                ..NodeConfig::default()
            },
            Arc::clone(&metrics),
            registry,
        )
        .unwrap();

        let relay = node.relay();
        let listener = node.bind().await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let shutdown = async move {
                let _ = stopped.await;
            };
            let _ = node.serve(listener, shutdown).await;
        });

        RunningRelay {
            base_url,
            relay,
            metrics,
            server,
            stop: Some(stop),
        }
    }

    /// Poll the relay's stats until `ready` holds.
    pub(crate) async fn wait_for(relay: &ChannelRelay, ready: impl Fn(&RelayStatsSnapshot) -> bool) {
        tokio::time::timeout(WAIT, async {
            while !ready(&relay.stats()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("relay never reached the expected state");
    }

    /// A consumer tailing in the background.
    pub(crate) struct Tailer {
        messages: mpsc::UnboundedReceiver<String>,
        pub handle: JoinHandle<Result<TailEnd, TailError>>,
    }

    impl Tailer {
        pub(crate) fn spawn(base_url: &str, token: &str) -> Self {
            let (tx, messages) = mpsc::unbounded_channel();
            let base_url = base_url.to_string();
            let token = token.to_string();
            let handle = tokio::spawn(async move {
                tail(&base_url, &token, |message| {
                    let _ = tx.send(message.to_string());
                })
                .await
            });
            Self { messages, handle }
        }

        pub(crate) async fn next(&mut self) -> String {
            tokio::time::timeout(WAIT, self.messages.recv())
                .await
                .expect("no message within timeout")
                .expect("tail ended")
        }

        pub(crate) async fn end(self) -> Result<TailEnd, TailError> {
            tokio::time::timeout(WAIT, self.handle)
                .await
                .expect("tail did not end")
                .expect("tail task panicked")
        }
    }
}
