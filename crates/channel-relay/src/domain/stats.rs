//! Relay counters and the observer hook.
//!
//! Drops are part of the relay's contract (nobody listening means the
//! message is gone), so every one of them is counted here and handed to the
//! [`RelayObserver`] for export.

use crate::domain::channel::ChannelId;
use crate::domain::error::AuthError;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Why a produced message was not delivered or buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// No queue and no live connection for the channel.
    UnknownChannel,
    /// The live connection's socket is gone.
    DeliveryFailed,
    /// Backlog at capacity under `drop_newest`.
    BufferFull,
    /// Older backlog entry pushed out under `drop_oldest`.
    Evicted,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::UnknownChannel => "unknown_channel",
            DropReason::DeliveryFailed => "delivery_failed",
            DropReason::BufferFull => "buffer_full",
            DropReason::Evicted => "evicted",
        }
    }
}

/// How a message reached its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Live,
    /// Flushed from the backlog on attach.
    Replayed,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Live => "live",
            DeliveryMode::Replayed => "replayed",
        }
    }
}

/// Hook for exporting relay events. Every method defaults to a no-op.
///
/// Called while the relay holds its table lock: implementations must be
/// quick and must not call back into the relay.
pub trait RelayObserver: Send + Sync {
    fn channel_created(&self, _channel: &ChannelId, _token_usable: bool) {}
    fn message_buffered(&self, _channel: &ChannelId) {}
    fn message_delivered(&self, _channel: &ChannelId, _mode: DeliveryMode) {}
    fn message_dropped(&self, _channel: &ChannelId, _reason: DropReason) {}
    fn backlog_expired(&self, _channel: &ChannelId, _messages: usize) {}
    fn consumer_attached(&self, _channel: &ChannelId, _replayed: usize) {}
    fn consumer_superseded(&self, _channel: &ChannelId) {}
    fn attach_rejected(&self, _error: &AuthError) {}
    fn consumer_disconnected(&self, _channel: &ChannelId) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RelayObserver for NoopObserver {}

/// Relay-wide counters.
///
/// Owned by one `ChannelRelay` and served as `/stats`. Process-level export
/// goes through a [`RelayObserver`], which sees the same events.
#[derive(Debug, Default)]
pub struct RelayStats {
    pub channels_created: AtomicU64,
    pub tokens_unavailable: AtomicU64,
    pub messages_buffered: AtomicU64,
    pub messages_delivered_live: AtomicU64,
    pub messages_replayed: AtomicU64,
    pub dropped_unknown_channel: AtomicU64,
    pub dropped_delivery_failed: AtomicU64,
    pub dropped_buffer_full: AtomicU64,
    pub dropped_evicted: AtomicU64,
    pub backlogs_expired: AtomicU64,
    pub messages_expired: AtomicU64,
    pub attaches_accepted: AtomicU64,
    pub attaches_rejected: AtomicU64,
    pub attaches_superseded: AtomicU64,
    pub disconnects: AtomicU64,
}

impl RelayStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::UnknownChannel => &self.dropped_unknown_channel,
            DropReason::DeliveryFailed => &self.dropped_delivery_failed,
            DropReason::BufferFull => &self.dropped_buffer_full,
            DropReason::Evicted => &self.dropped_evicted,
        };
        Self::incr(counter);
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RelayStatsSnapshot {
            channels_created: load(&self.channels_created),
            tokens_unavailable: load(&self.tokens_unavailable),
            messages_buffered: load(&self.messages_buffered),
            messages_delivered_live: load(&self.messages_delivered_live),
            messages_replayed: load(&self.messages_replayed),
            dropped: DropCounts {
                unknown_channel: load(&self.dropped_unknown_channel),
                delivery_failed: load(&self.dropped_delivery_failed),
                buffer_full: load(&self.dropped_buffer_full),
                evicted: load(&self.dropped_evicted),
            },
            backlogs_expired: load(&self.backlogs_expired),
            messages_expired: load(&self.messages_expired),
            attaches_accepted: load(&self.attaches_accepted),
            attaches_rejected: load(&self.attaches_rejected),
            attaches_superseded: load(&self.attaches_superseded),
            disconnects: load(&self.disconnects),
            buffering_channels: 0,
            buffered_messages: 0,
            live_connections: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub unknown_channel: u64,
    pub delivery_failed: u64,
    pub buffer_full: u64,
    pub evicted: u64,
}

impl DropCounts {
    pub fn total(&self) -> u64 {
        self.unknown_channel + self.delivery_failed + self.buffer_full + self.evicted
    }
}

/// Point-in-time view of [`RelayStats`] plus current table sizes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayStatsSnapshot {
    pub channels_created: u64,
    pub tokens_unavailable: u64,
    pub messages_buffered: u64,
    pub messages_delivered_live: u64,
    pub messages_replayed: u64,
    pub dropped: DropCounts,
    pub backlogs_expired: u64,
    pub messages_expired: u64,
    pub attaches_accepted: u64,
    pub attaches_rejected: u64,
    pub attaches_superseded: u64,
    pub disconnects: u64,
    /// Channels still holding a backlog
    pub buffering_channels: usize,
    /// Messages held across all backlogs
    pub buffered_messages: usize,
    /// Channels with an attached consumer
    pub live_connections: usize,
}
