//! Relay observer exporting to Prometheus.

use std::sync::Arc;

use channel_relay::{AuthError, ChannelId, DeliveryMode, DropReason, RelayObserver};
use relay_telemetry::{metric_add, metric_inc, RelayMetrics};

/// Maps relay lifecycle events onto the `relay_*` counters.
pub struct PrometheusObserver {
    metrics: Arc<RelayMetrics>,
}

impl PrometheusObserver {
    pub fn new(metrics: Arc<RelayMetrics>) -> Self {
        Self { metrics }
    }
}

impl RelayObserver for PrometheusObserver {
    fn channel_created(&self, _channel: &ChannelId, token_usable: bool) {
        metric_inc!(self.metrics.channels_created);
        if !token_usable {
            metric_inc!(self.metrics.tokens_unavailable);
        }
    }

    fn message_buffered(&self, _channel: &ChannelId) {
        metric_inc!(self.metrics.messages_buffered);
    }

    fn message_delivered(&self, _channel: &ChannelId, mode: DeliveryMode) {
        metric_inc!(self.metrics.messages_delivered, &[mode.as_str()]);
    }

    fn message_dropped(&self, _channel: &ChannelId, reason: DropReason) {
        metric_inc!(self.metrics.messages_dropped, &[reason.as_str()]);
    }

    fn backlog_expired(&self, _channel: &ChannelId, messages: usize) {
        metric_inc!(self.metrics.backlogs_expired);
        metric_add!(self.metrics.messages_expired, messages as u64);
    }

    fn consumer_attached(&self, _channel: &ChannelId, _replayed: usize) {
        metric_inc!(self.metrics.consumers_attached);
    }

    fn consumer_superseded(&self, _channel: &ChannelId) {
        metric_inc!(self.metrics.consumers_superseded);
    }

    fn attach_rejected(&self, error: &AuthError) {
        metric_inc!(self.metrics.attaches_rejected, &[error.label()]);
    }

    fn consumer_disconnected(&self, _channel: &ChannelId) {
        metric_inc!(self.metrics.consumers_disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channel_relay::domain::{Environment, VerificationMode};
    use channel_relay::{ChannelRelay, ConsumerConnection, ProduceOutcome, RelayConfig, StaticSecret};
    use prometheus::Registry;

    fn relay_with(metrics: Arc<RelayMetrics>) -> ChannelRelay {
        let mut config = RelayConfig::default();
        config.environment = Environment::Test;
        config.token.verification = VerificationMode::Strict;
        let secrets = Arc::new(StaticSecret::new(b"observer-test-secret".to_vec()).unwrap());
        ChannelRelay::new(&config, secrets).with_observer(Arc::new(PrometheusObserver::new(metrics)))
    }

    #[tokio::test]
    async fn test_relay_events_reach_counters() {
        let metrics = Arc::new(RelayMetrics::new(&Registry::new()).unwrap());
        let relay = relay_with(Arc::clone(&metrics));

        let grant = relay.create_channel(None).await;
        relay.produce(&grant.channel_id, "one");
        relay.produce(&grant.channel_id, "two");

        let (conn, _rx) = ConsumerConnection::new();
        let report = relay.attach_consumer(grant.token.as_str(), conn).await.unwrap();
        assert_eq!(report.replayed, 2);

        assert_eq!(
            relay.produce(&grant.channel_id, "three"),
            ProduceOutcome::Delivered
        );
        assert!(matches!(
            relay.produce(&ChannelId::generate(), "lost"),
            ProduceOutcome::Dropped(DropReason::UnknownChannel)
        ));

        assert_eq!(metrics.channels_created.get(), 1);
        assert_eq!(metrics.messages_buffered.get(), 2);
        assert_eq!(metrics.messages_delivered.with_label_values(&["replayed"]).get(), 2);
        assert_eq!(metrics.messages_delivered.with_label_values(&["live"]).get(), 1);
        assert_eq!(
            metrics.messages_dropped.with_label_values(&["unknown_channel"]).get(),
            1
        );
        assert_eq!(metrics.consumers_attached.get(), 1);
    }

    #[tokio::test]
    async fn test_rejected_attach_is_labelled() {
        let metrics = Arc::new(RelayMetrics::new(&Registry::new()).unwrap());
        let relay = relay_with(Arc::clone(&metrics));

        let (conn, _rx) = ConsumerConnection::new();
        assert!(relay.attach_consumer("not-a-token", conn).await.is_err());
        assert_eq!(metrics.attaches_rejected.with_label_values(&["malformed"]).get(), 1);
    }
}
