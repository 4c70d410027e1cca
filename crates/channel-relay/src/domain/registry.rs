//! Live consumer connections, at most one per channel.

use crate::domain::channel::{ChannelId, ConnectionId};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Why the relay is closing a consumer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    /// Another consumer attached to the same channel.
    Superseded,
    Unauthorized(String),
}

impl CloseReason {
    /// WebSocket close code.
    pub fn code(&self) -> u16 {
        match self {
            CloseReason::Normal => 1000,
            CloseReason::Superseded => 4001,
            CloseReason::Unauthorized(_) => 4003,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            CloseReason::Normal => "closed".to_string(),
            CloseReason::Superseded => "superseded by a newer consumer".to_string(),
            CloseReason::Unauthorized(why) => format!("unauthorized: {}", why),
        }
    }
}

/// Frame queued for a consumer's socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Message(String),
    Close(CloseReason),
}

/// Handle to one consumer's outbound queue.
///
/// The queue is unbounded so delivery never awaits while the relay holds its
/// table lock. The socket task owns the receiving half; once it goes away
/// every delivery fails.
#[derive(Debug, Clone)]
pub struct ConsumerConnection {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ConsumerConnection {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId::new(),
                outbound: tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a message. Returns false if the socket side is gone.
    pub fn deliver(&self, message: String) -> bool {
        self.outbound.send(Outbound::Message(message)).is_ok()
    }

    /// Ask the socket side to close. Best effort.
    pub fn close(&self, reason: CloseReason) {
        let _ = self.outbound.send(Outbound::Close(reason));
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Channel id to live connection, plus the reverse index used by `detach`.
#[derive(Default)]
pub struct ConnectionRegistry {
    by_channel: HashMap<ChannelId, ConsumerConnection>,
    by_connection: HashMap<ConnectionId, ChannelId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` for `channel`, returning the connection it
    /// replaced, if any.
    pub fn attach(
        &mut self,
        channel: ChannelId,
        connection: ConsumerConnection,
    ) -> Option<ConsumerConnection> {
        // A connection serves a single channel
        if let Some(old_channel) = self.by_connection.remove(&connection.id()) {
            if old_channel != channel {
                self.by_channel.remove(&old_channel);
            }
        }

        self.by_connection.insert(connection.id(), channel.clone());
        let previous = self.by_channel.insert(channel, connection.clone())?;

        if previous.id() == connection.id() {
            return None;
        }
        self.by_connection.remove(&previous.id());
        Some(previous)
    }

    pub fn lookup(&self, channel: &ChannelId) -> Option<&ConsumerConnection> {
        self.by_channel.get(channel)
    }

    /// Remove whatever channel maps to this exact connection.
    ///
    /// Unknown or already-detached connections are a no-op.
    pub fn detach(&mut self, connection: ConnectionId) -> Option<ChannelId> {
        let channel = self.by_connection.remove(&connection)?;
        self.by_channel.remove(&channel);
        Some(channel)
    }

    /// Remove every connection, returning each with its channel.
    pub fn drain(&mut self) -> Vec<(ChannelId, ConsumerConnection)> {
        self.by_connection.clear();
        self.by_channel.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.by_channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_channel.is_empty()
    }
}
