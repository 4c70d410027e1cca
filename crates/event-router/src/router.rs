//! Resolve-then-send routing with fire-and-forget delivery.

use crate::directory::{Endpoint, ServiceDirectory};
use crate::event::{channel_for, RouteError, RoutedEvent};
use crate::forwarder::EventForwarder;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// What [`EventRouter::route`] did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Forward spawned towards `endpoint`.
    Dispatched { channel: String, endpoint: Endpoint },
    /// No service claims the channel; the event was dropped.
    Unresolved { channel: String },
}

#[derive(Debug, Default)]
pub struct RouterStats {
    pub dispatched: AtomicU64,
    pub unresolved: AtomicU64,
    pub forwarded: AtomicU64,
    pub forward_failures: AtomicU64,
}

pub struct EventRouter {
    directory: Arc<dyn ServiceDirectory>,
    forwarder: Arc<dyn EventForwarder>,
    stats: Arc<RouterStats>,
}

impl EventRouter {
    pub fn new(directory: Arc<dyn ServiceDirectory>, forwarder: Arc<dyn EventForwarder>) -> Self {
        Self {
            directory,
            forwarder,
            stats: Arc::new(RouterStats::default()),
        }
    }

    /// Resolve the event's channel, then forward it in the background.
    ///
    /// Must be called from within a tokio runtime. Returns as soon as the
    /// forward is spawned; its result is only logged and counted.
    pub async fn route(&self, event: RoutedEvent) -> Result<RouteOutcome, RouteError> {
        let channel = channel_for(&event.message_type)?;

        let Some(endpoint) = self.directory.resolve(&channel).await? else {
            self.stats.unresolved.fetch_add(1, Ordering::Relaxed);
            warn!(
                channel = %channel,
                message_type = %event.message_type,
                "No service registered for channel, event dropped"
            );
            return Ok(RouteOutcome::Unresolved { channel });
        };

        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        debug!(channel = %channel, endpoint = %endpoint, "Dispatching event");

        let forwarder = Arc::clone(&self.forwarder);
        let stats = Arc::clone(&self.stats);
        let target = endpoint.clone();
        tokio::spawn(async move {
            match forwarder.forward(&target, &event).await {
                Ok(()) => {
                    stats.forwarded.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    stats.forward_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        endpoint = %target,
                        message_type = %event.message_type,
                        error = %e,
                        "Event forward failed"
                    );
                }
            }
        });

        Ok(RouteOutcome::Dispatched { channel, endpoint })
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{ServiceEntry, StaticDirectory, DEFAULT_LABEL_KEY};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct Recording {
        tx: mpsc::UnboundedSender<(Endpoint, RoutedEvent)>,
        fail: bool,
    }

    #[async_trait]
    impl EventForwarder for Recording {
        async fn forward(&self, endpoint: &Endpoint, event: &RoutedEvent) -> Result<(), RouteError> {
            let _ = self.tx.send((endpoint.clone(), event.clone()));
            if self.fail {
                Err(RouteError::Forward("refused".into()))
            } else {
                Ok(())
            }
        }
    }

    fn router(fail: bool) -> (EventRouter, mpsc::UnboundedReceiver<(Endpoint, RoutedEvent)>) {
        let directory = StaticDirectory::new();
        directory.register(
            ServiceEntry::new("deploy-svc", Endpoint::new("deploy", 80, "/events"))
                .with_label(DEFAULT_LABEL_KEY, "deploy"),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let router = EventRouter::new(Arc::new(directory), Arc::new(Recording { tx, fail }));
        (router, rx)
    }

    #[tokio::test]
    async fn test_route_dispatches_to_resolved_endpoint() {
        let (router, mut rx) = router(false);
        let event = RoutedEvent::new("Deploy.Started", serde_json::json!({"id": 3}));

        let outcome = router.route(event.clone()).await.unwrap();
        assert_eq!(
            outcome,
            RouteOutcome::Dispatched {
                channel: "deploy".into(),
                endpoint: Endpoint::new("deploy", 80, "/events"),
            }
        );

        let (endpoint, forwarded) = rx.recv().await.unwrap();
        assert_eq!(endpoint.host, "deploy");
        assert_eq!(forwarded, event);
        assert_eq!(router.stats().dispatched.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unresolved_channel() {
        let (router, _rx) = router(false);
        let outcome = router
            .route(RoutedEvent::new("Audit.Entry", serde_json::Value::Null))
            .await
            .unwrap();
        assert_eq!(outcome, RouteOutcome::Unresolved { channel: "audit".into() });
        assert_eq!(router.stats().unresolved.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_invalid_type_is_error() {
        let (router, _rx) = router(false);
        assert!(matches!(
            router.route(RoutedEvent::new("", serde_json::Value::Null)).await,
            Err(RouteError::InvalidType(_))
        ));
    }

    #[tokio::test]
    async fn test_forward_failure_is_not_returned() {
        let (router, mut rx) = router(true);
        let outcome = router
            .route(RoutedEvent::new("deploy:rollback", serde_json::Value::Null))
            .await
            .unwrap();
        assert!(matches!(outcome, RouteOutcome::Dispatched { .. }));

        rx.recv().await.unwrap();
        // Counter is bumped right after the forward returns
        for _ in 0..100 {
            if router.stats().forward_failures.load(Ordering::Relaxed) == 1 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("forward failure was not counted");
    }
}
