//! Per-channel backlog of messages produced before a consumer attaches.
//!
//! Not synchronized on its own: [`ChannelRelay`](crate::ChannelRelay) owns
//! the only instance and mutates it under its table lock, which is what keeps
//! drain-then-register atomic with respect to `append`.

use crate::domain::channel::ChannelId;
use crate::domain::config::{BufferConfig, OverflowPolicy};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Result of [`MessageBuffer::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Message queued.
    Appended,
    /// Message queued after evicting the oldest entry to stay within the cap.
    AppendedEvictingOldest,
    /// Queue at capacity with `drop_newest`; incoming message discarded.
    Full,
    /// No queue was ever created for this channel (or it was drained).
    UnknownChannel,
}

struct ChannelQueue {
    messages: VecDeque<String>,
    created_at: Instant,
}

/// Ordered queues keyed by channel id.
pub struct MessageBuffer {
    queues: HashMap<ChannelId, ChannelQueue>,
    max_messages: Option<usize>,
    overflow: OverflowPolicy,
}

impl MessageBuffer {
    pub fn new(config: &BufferConfig) -> Self {
        Self {
            queues: HashMap::new(),
            max_messages: config.max_messages_per_channel,
            overflow: config.overflow,
        }
    }

    /// Allocate an empty queue. Returns false (and keeps the existing queue
    /// with its contents) if one is already present.
    pub fn create(&mut self, channel: &ChannelId) -> bool {
        if self.queues.contains_key(channel) {
            return false;
        }
        self.queues.insert(
            channel.clone(),
            ChannelQueue {
                messages: VecDeque::new(),
                created_at: Instant::now(),
            },
        );
        true
    }

    pub fn append(&mut self, channel: &ChannelId, message: String) -> AppendOutcome {
        let Some(queue) = self.queues.get_mut(channel) else {
            return AppendOutcome::UnknownChannel;
        };

        match self.max_messages {
            Some(max) if queue.messages.len() >= max => match self.overflow {
                OverflowPolicy::DropNewest => AppendOutcome::Full,
                OverflowPolicy::DropOldest => {
                    queue.messages.pop_front();
                    queue.messages.push_back(message);
                    AppendOutcome::AppendedEvictingOldest
                }
            },
            _ => {
                queue.messages.push_back(message);
                AppendOutcome::Appended
            }
        }
    }

    /// Remove the queue and return its messages in arrival order.
    ///
    /// `None` means no queue existed, as opposed to an empty backlog.
    pub fn drain_and_remove(&mut self, channel: &ChannelId) -> Option<Vec<String>> {
        self.queues
            .remove(channel)
            .map(|queue| queue.messages.into_iter().collect())
    }

    /// Drop every queue created more than `ttl` ago.
    ///
    /// Returns each removed channel with the number of messages discarded.
    pub fn remove_expired(&mut self, ttl: Duration) -> Vec<(ChannelId, usize)> {
        let now = Instant::now();
        let mut removed = Vec::new();

        self.queues.retain(|channel, queue| {
            if now.duration_since(queue.created_at) > ttl {
                removed.push((channel.clone(), queue.messages.len()));
                false
            } else {
                true
            }
        });

        removed
    }

    pub fn contains(&self, channel: &ChannelId) -> bool {
        self.queues.contains_key(channel)
    }

    /// Messages currently held for `channel`.
    pub fn len_of(&self, channel: &ChannelId) -> Option<usize> {
        self.queues.get(channel).map(|q| q.messages.len())
    }

    /// Number of channels in `Buffering`.
    pub fn channel_count(&self) -> usize {
        self.queues.len()
    }

    /// Total messages buffered across all channels.
    pub fn message_count(&self) -> usize {
        self.queues.values().map(|q| q.messages.len()).sum()
    }
}
