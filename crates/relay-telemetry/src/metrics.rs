//! Prometheus metrics for the channel relay.
//!
//! All metrics follow the naming convention: `relay_<metric>_total`.
//! Label values are the stable `as_str` names of the relay's enums.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{Arc, Mutex};

use crate::TelemetryError;

lazy_static! {
    /// Process-wide registry served on `/metrics`
    pub static ref REGISTRY: Registry = Registry::new();

    static ref GLOBAL: Mutex<Option<Arc<RelayMetrics>>> = Mutex::new(None);
}

/// Counters mirroring the relay lifecycle.
#[derive(Clone)]
pub struct RelayMetrics {
    pub channels_created: IntCounter,
    pub tokens_unavailable: IntCounter,
    pub messages_buffered: IntCounter,
    /// Labels: `mode` = live | replayed
    pub messages_delivered: IntCounterVec,
    /// Labels: `reason` = unknown_channel | delivery_failed | buffer_full | evicted
    pub messages_dropped: IntCounterVec,
    pub backlogs_expired: IntCounter,
    pub messages_expired: IntCounter,
    pub consumers_attached: IntCounter,
    /// Labels: `reason` = malformed | bad_signature | expired | auth_unavailable
    pub attaches_rejected: IntCounterVec,
    pub consumers_superseded: IntCounter,
    pub consumers_disconnected: IntCounter,
}

impl RelayMetrics {
    /// Create the counters and register them with `registry`.
    pub fn new(registry: &Registry) -> Result<Self, TelemetryError> {
        let metrics = Self {
            channels_created: counter(
                "relay_channels_created_total",
                "Channels created with a buffering queue",
            )?,
            tokens_unavailable: counter(
                "relay_tokens_unavailable_total",
                "Channels handed out with the unusable token sentinel",
            )?,
            messages_buffered: counter(
                "relay_messages_buffered_total",
                "Messages queued for a consumer that has not attached yet",
            )?,
            messages_delivered: counter_vec(
                "relay_messages_delivered_total",
                "Messages handed to a live consumer",
                &["mode"],
            )?,
            messages_dropped: counter_vec(
                "relay_messages_dropped_total",
                "Messages lost, by reason",
                &["reason"],
            )?,
            backlogs_expired: counter(
                "relay_backlogs_expired_total",
                "Buffering channels discarded after their TTL",
            )?,
            messages_expired: counter(
                "relay_messages_expired_total",
                "Messages discarded together with an expired backlog",
            )?,
            consumers_attached: counter(
                "relay_consumers_attached_total",
                "Consumers attached after token verification",
            )?,
            attaches_rejected: counter_vec(
                "relay_attaches_rejected_total",
                "Attach attempts refused, by reason",
                &["reason"],
            )?,
            consumers_superseded: counter(
                "relay_consumers_superseded_total",
                "Consumers closed because a newer one attached to the same channel",
            )?,
            consumers_disconnected: counter(
                "relay_consumers_disconnected_total",
                "Live consumers that went away",
            )?,
        };
        metrics.register(registry)?;
        Ok(metrics)
    }

    fn register(&self, registry: &Registry) -> Result<(), TelemetryError> {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(self.channels_created.clone()),
            Box::new(self.tokens_unavailable.clone()),
            Box::new(self.messages_buffered.clone()),
            Box::new(self.messages_delivered.clone()),
            Box::new(self.messages_dropped.clone()),
            Box::new(self.backlogs_expired.clone()),
            Box::new(self.messages_expired.clone()),
            Box::new(self.consumers_attached.clone()),
            Box::new(self.attaches_rejected.clone()),
            Box::new(self.consumers_superseded.clone()),
            Box::new(self.consumers_disconnected.clone()),
        ];

        for collector in collectors {
            registry
                .register(collector)
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        }
        Ok(())
    }
}

fn counter(name: &str, help: &str) -> Result<IntCounter, TelemetryError> {
    IntCounter::new(name, help).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec, TelemetryError> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Register the relay metrics with the global [`REGISTRY`].
///
/// Repeated calls return the same handle.
pub fn register_metrics() -> Result<Arc<RelayMetrics>, TelemetryError> {
    let mut global = GLOBAL
        .lock()
        .map_err(|_| TelemetryError::MetricsInit("metrics lock poisoned".into()))?;

    if let Some(metrics) = global.as_ref() {
        return Ok(Arc::clone(metrics));
    }
    let metrics = Arc::new(RelayMetrics::new(&REGISTRY)?);
    *global = Some(Arc::clone(&metrics));
    Ok(metrics)
}

/// Encode every metric in `registry` as Prometheus text format.
pub fn encode_metrics(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
