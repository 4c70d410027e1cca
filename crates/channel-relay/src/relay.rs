//! Channel relay orchestration.
//!
//! Per channel id:
//!
//! ```text
//!  create_channel         attach                 disconnect
//!  ───────────────► Buffering ──────► Live ──────────────► Closed
//!                   (queue, no conn)  (conn, queue gone)   (nothing kept)
//! ```
//!
//! Both tables sit behind one mutex that is only ever held for in-memory
//! work. Token issuance and verification (which reach out to the credential
//! source) happen before the lock is taken. Delivery is a non-blocking push
//! onto the consumer's outbound queue, so drain, register and flush happen
//! in a single critical section and a concurrent `produce` either lands in
//! the backlog before the drain or goes live after the flush.

use crate::domain::buffer::{AppendOutcome, MessageBuffer};
use crate::domain::channel::{ChannelId, ConnectionId};
use crate::domain::config::RelayConfig;
use crate::domain::error::AuthError;
use crate::domain::policy::{verification_policy, VerificationPolicy};
use crate::domain::registry::{CloseReason, ConnectionRegistry, ConsumerConnection};
use crate::domain::stats::{
    DeliveryMode, DropReason, NoopObserver, RelayObserver, RelayStats, RelayStatsSnapshot,
};
use crate::domain::token::{self, Token, TokenIssuer};
use crate::ports::outbound::{SigningSecretSource, TimeSource};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Returned from channel creation.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelGrant {
    pub channel_id: ChannelId,
    pub token: Token,
}

/// What happened to one produced message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProduceOutcome {
    /// Pushed straight to the live consumer.
    Delivered,
    /// Held in the channel backlog.
    Buffered,
    Dropped(DropReason),
}

/// Result of a successful attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachReport {
    pub channel_id: ChannelId,
    /// Backlog messages flushed to the new consumer.
    pub replayed: usize,
    /// Whether an earlier consumer was closed to make room.
    pub superseded: bool,
}

struct RelayTables {
    buffers: MessageBuffer,
    connections: ConnectionRegistry,
}

/// In-memory relay between producers and late-attaching consumers.
pub struct ChannelRelay {
    tables: Mutex<RelayTables>,
    issuer: TokenIssuer,
    policy: Arc<dyn VerificationPolicy>,
    observer: Arc<dyn RelayObserver>,
    stats: RelayStats,
    buffer_ttl: Option<Duration>,
    sweep_interval: Duration,
}

impl ChannelRelay {
    pub fn new(config: &RelayConfig, secrets: Arc<dyn SigningSecretSource>) -> Self {
        Self {
            tables: Mutex::new(RelayTables {
                buffers: MessageBuffer::new(&config.buffer),
                connections: ConnectionRegistry::new(),
            }),
            issuer: TokenIssuer::new(secrets, &config.token),
            policy: verification_policy(&config.token),
            observer: Arc::new(NoopObserver),
            stats: RelayStats::default(),
            buffer_ttl: config.buffer.ttl,
            sweep_interval: config.buffer.sweep_interval,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RelayObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_time_source(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.issuer = self.issuer.with_time_source(clock);
        self
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Open a channel in `Buffering` and mint its consumer token.
    ///
    /// Never fails: if the signing secret is unavailable the channel is still
    /// usable for producing, and the grant carries [`Token::Unavailable`].
    pub async fn create_channel(&self, correlation_id: Option<ChannelId>) -> ChannelGrant {
        let channel_id = correlation_id.unwrap_or_else(ChannelId::generate);

        {
            let mut tables = self.tables.lock();
            if tables.connections.lookup(&channel_id).is_some() {
                debug!(channel_id = %channel_id, "Channel already live, no backlog created");
            } else if !tables.buffers.create(&channel_id) {
                debug!(channel_id = %channel_id, "Channel backlog already exists");
            }
        }

        let token = match self.issuer.issue(&channel_id).await {
            Ok(token) => token,
            Err(e) => {
                warn!(
                    channel_id = %channel_id,
                    error = %e,
                    "Signing secret unavailable, channel created without live tail"
                );
                RelayStats::incr(&self.stats.tokens_unavailable);
                Token::Unavailable
            }
        };

        RelayStats::incr(&self.stats.channels_created);
        self.observer.channel_created(&channel_id, token.is_usable());
        info!(
            channel_id = %channel_id,
            token = %token.fingerprint(),
            "Channel created"
        );

        ChannelGrant { channel_id, token }
    }

    /// Verify a presented token under the configured policy.
    ///
    /// Rejections are counted and logged with the token fingerprint only.
    pub async fn authorize(&self, token: &str) -> Result<ChannelId, AuthError> {
        match self.policy.authorize(&self.issuer, token).await {
            Ok(channel_id) => Ok(channel_id),
            Err(e) => {
                RelayStats::incr(&self.stats.attaches_rejected);
                self.observer.attach_rejected(&e);
                warn!(
                    token = %token::fingerprint(token),
                    reason = e.label(),
                    "Consumer attach rejected"
                );
                Err(e)
            }
        }
    }

    /// Verify `token`, then attach `connection` to the channel it grants.
    ///
    /// On rejection the connection is closed and nothing is exposed.
    pub async fn attach_consumer(
        &self,
        token: &str,
        connection: ConsumerConnection,
    ) -> Result<AttachReport, AuthError> {
        match self.authorize(token).await {
            Ok(channel_id) => Ok(self.attach(channel_id, connection)),
            Err(e) => {
                connection.close(CloseReason::Unauthorized(e.label().to_string()));
                Err(e)
            }
        }
    }

    /// Attach an already-authorized connection: drain the backlog, register
    /// the connection and flush the backlog to it, atomically.
    pub fn attach(&self, channel_id: ChannelId, connection: ConsumerConnection) -> AttachReport {
        let mut tables = self.tables.lock();

        let backlog = tables.buffers.drain_and_remove(&channel_id);

        let superseded = match tables.connections.lookup(&channel_id) {
            Some(previous) if previous.id() != connection.id() => {
                previous.close(CloseReason::Superseded);
                info!(
                    channel_id = %channel_id,
                    connection_id = %previous.id(),
                    "Closing superseded consumer"
                );
                true
            }
            _ => false,
        };
        if superseded {
            RelayStats::incr(&self.stats.attaches_superseded);
            self.observer.consumer_superseded(&channel_id);
        }

        if backlog.is_none() && !superseded {
            warn!(
                channel_id = %channel_id,
                "Attaching to channel with no backlog, messages produced earlier were not kept"
            );
        }

        tables
            .connections
            .attach(channel_id.clone(), connection.clone());
        RelayStats::incr(&self.stats.attaches_accepted);

        let backlog = backlog.unwrap_or_default();
        let total = backlog.len();
        let mut replayed = 0;
        for message in backlog {
            if !connection.deliver(message) {
                break;
            }
            replayed += 1;
            self.observer
                .message_delivered(&channel_id, DeliveryMode::Replayed);
        }
        RelayStats::add(&self.stats.messages_replayed, replayed as u64);

        if replayed < total {
            // Socket went away mid-flush; the rest of the backlog is lost
            self.discard_undelivered(&channel_id, total - replayed);
            self.detach_locked(&mut tables, connection.id());
        }

        self.observer.consumer_attached(&channel_id, replayed);
        info!(
            channel_id = %channel_id,
            connection_id = %connection.id(),
            replayed,
            "Consumer attached"
        );

        AttachReport {
            channel_id,
            replayed,
            superseded,
        }
    }

    /// Deliver live, else buffer, else drop. Never fails the producer.
    pub fn produce(&self, channel_id: &ChannelId, message: impl Into<String>) -> ProduceOutcome {
        let message = message.into();
        let mut tables = self.tables.lock();

        let live = tables.connections.lookup(channel_id).cloned();
        if let Some(connection) = live {
            if connection.deliver(message) {
                RelayStats::incr(&self.stats.messages_delivered_live);
                self.observer
                    .message_delivered(channel_id, DeliveryMode::Live);
                return ProduceOutcome::Delivered;
            }

            let dead = connection.id();
            warn!(
                channel_id = %channel_id,
                connection_id = %dead,
                "Live delivery failed, dropping message and disconnecting consumer"
            );
            self.detach_locked(&mut tables, dead);
            return self.dropped(channel_id, DropReason::DeliveryFailed);
        }

        match tables.buffers.append(channel_id, message) {
            AppendOutcome::Appended => {
                RelayStats::incr(&self.stats.messages_buffered);
                self.observer.message_buffered(channel_id);
                ProduceOutcome::Buffered
            }
            AppendOutcome::AppendedEvictingOldest => {
                RelayStats::incr(&self.stats.messages_buffered);
                self.observer.message_buffered(channel_id);
                debug!(channel_id = %channel_id, "Backlog full, evicted oldest message");
                self.dropped(channel_id, DropReason::Evicted);
                ProduceOutcome::Buffered
            }
            AppendOutcome::Full => {
                debug!(channel_id = %channel_id, "Backlog full, dropping incoming message");
                self.dropped(channel_id, DropReason::BufferFull)
            }
            AppendOutcome::UnknownChannel => {
                warn!(channel_id = %channel_id, "Message for unknown channel dropped");
                self.dropped(channel_id, DropReason::UnknownChannel)
            }
        }
    }

    fn dropped(&self, channel_id: &ChannelId, reason: DropReason) -> ProduceOutcome {
        self.stats.record_drop(reason);
        self.observer.message_dropped(channel_id, reason);
        ProduceOutcome::Dropped(reason)
    }

    /// Detach a consumer. Unknown or repeated calls are a no-op.
    ///
    /// The channel does not return to `Buffering`.
    pub fn on_disconnect(&self, connection: ConnectionId) -> Option<ChannelId> {
        let mut tables = self.tables.lock();
        self.detach_locked(&mut tables, connection)
    }

    /// Count messages that were handed to a consumer's queue but never
    /// written to its socket.
    pub fn discard_undelivered(&self, channel_id: &ChannelId, messages: usize) {
        if messages == 0 {
            return;
        }
        for _ in 0..messages {
            self.stats.record_drop(DropReason::DeliveryFailed);
            self.observer
                .message_dropped(channel_id, DropReason::DeliveryFailed);
        }
        warn!(
            channel_id = %channel_id,
            messages,
            "Consumer went away before queued messages were written"
        );
    }

    /// Close and detach every live consumer. Used on shutdown.
    ///
    /// Returns the number of consumers that were still connected.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        let mut tables = self.tables.lock();
        let mut closed = 0;
        for (channel_id, connection) in tables.connections.drain() {
            if !connection.is_closed() {
                connection.close(reason.clone());
                closed += 1;
            }
            RelayStats::incr(&self.stats.disconnects);
            self.observer.consumer_disconnected(&channel_id);
            debug!(
                channel_id = %channel_id,
                connection_id = %connection.id(),
                "Consumer closed"
            );
        }
        if closed > 0 {
            info!(consumers = closed, code = reason.code(), "Closed live consumers");
        }
        closed
    }

    fn detach_locked(
        &self,
        tables: &mut RelayTables,
        connection: ConnectionId,
    ) -> Option<ChannelId> {
        match tables.connections.detach(connection) {
            Some(channel_id) => {
                RelayStats::incr(&self.stats.disconnects);
                self.observer.consumer_disconnected(&channel_id);
                info!(
                    channel_id = %channel_id,
                    connection_id = %connection,
                    "Consumer detached, channel closed"
                );
                Some(channel_id)
            }
            None => {
                debug!(connection_id = %connection, "Disconnect for unattached connection");
                None
            }
        }
    }

    /// Discard backlogs older than the configured TTL.
    ///
    /// Returns the number of channels removed. Always 0 without a TTL.
    pub fn evict_expired(&self) -> usize {
        let Some(ttl) = self.buffer_ttl else {
            return 0;
        };

        let mut tables = self.tables.lock();
        let removed = tables.buffers.remove_expired(ttl);
        for (channel_id, messages) in &removed {
            RelayStats::incr(&self.stats.backlogs_expired);
            RelayStats::add(&self.stats.messages_expired, *messages as u64);
            self.observer.backlog_expired(channel_id, *messages);
            warn!(
                channel_id = %channel_id,
                messages,
                ttl_secs = ttl.as_secs(),
                "Discarding backlog of never-attached channel"
            );
        }
        removed.len()
    }

    pub fn buffer_ttl(&self) -> Option<Duration> {
        self.buffer_ttl
    }

    pub fn stats(&self) -> RelayStatsSnapshot {
        let mut snapshot = self.stats.snapshot();
        let tables = self.tables.lock();
        snapshot.buffering_channels = tables.buffers.channel_count();
        snapshot.buffered_messages = tables.buffers.message_count();
        snapshot.live_connections = tables.connections.len();
        snapshot
    }

    /// Messages held for `channel_id`, or `None` if it is not buffering.
    pub fn backlog_len(&self, channel_id: &ChannelId) -> Option<usize> {
        self.tables.lock().buffers.len_of(channel_id)
    }
}

/// Background TTL sweeper. Returns immediately when no TTL is configured.
pub async fn run_eviction(relay: Arc<ChannelRelay>) {
    if relay.buffer_ttl().is_none() {
        return;
    }

    let mut sweep = tokio::time::interval(relay.sweep_interval);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        sweep.tick().await;
        let removed = relay.evict_expired();
        if removed > 0 {
            debug!(removed, "Swept expired channel backlogs");
        }
    }
}
