//! Consumer WebSocket session.
//!
//! The token has already been verified by the time a session exists; the
//! upgrade is refused before any backlog is exposed otherwise. A session
//! pumps the connection's outbound queue into the socket, one text frame per
//! message, and detaches from the relay when either side goes away.

use crate::domain::channel::{ChannelId, ConnectionId};
use crate::domain::registry::{CloseReason, ConsumerConnection, Outbound};
use crate::relay::{AttachReport, ChannelRelay};
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One attached consumer socket.
pub struct ConsumerSession {
    relay: Arc<ChannelRelay>,
    channel_id: ChannelId,
    connection_id: ConnectionId,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    ping_interval: Duration,
}

impl ConsumerSession {
    /// Register a new connection for an authorized channel.
    ///
    /// The backlog is flushed into the session's queue immediately and is
    /// written out once [`run`](Self::run) starts.
    pub fn attach(
        relay: Arc<ChannelRelay>,
        channel_id: ChannelId,
        ping_interval: Duration,
    ) -> (Self, AttachReport) {
        let (connection, outbound) = ConsumerConnection::new();
        let connection_id = connection.id();
        let report = relay.attach(channel_id.clone(), connection);

        (
            Self {
                relay,
                channel_id,
                connection_id,
                outbound,
                ping_interval,
            },
            report,
        )
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Drive the socket until the consumer leaves or the relay closes it.
    pub async fn run(mut self, socket: WebSocket) {
        let (mut sender, mut receiver) = socket.split();

        let mut ping = tokio::time::interval_at(
            tokio::time::Instant::now() + self.ping_interval,
            self.ping_interval,
        );
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                frame = self.outbound.recv() => match frame {
                    Some(Outbound::Message(text)) => {
                        if let Err(e) = sender.send(Message::Text(text)).await {
                            warn!(
                                channel_id = %self.channel_id,
                                connection_id = %self.connection_id,
                                error = %e,
                                "Failed to write to consumer"
                            );
                            self.relay.discard_undelivered(&self.channel_id, 1);
                            break;
                        }
                    }
                    Some(Outbound::Close(reason)) => {
                        debug!(
                            connection_id = %self.connection_id,
                            code = reason.code(),
                            "Relay closing consumer"
                        );
                        let _ = sender.send(Message::Close(Some(close_frame(&reason)))).await;
                        break;
                    }
                    // Relay dropped this connection
                    None => break,
                },
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(connection_id = %self.connection_id, "Consumer closed socket");
                        break;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(_)) => {
                        debug!(connection_id = %self.connection_id, "Ignoring consumer frame");
                    }
                    Some(Err(e)) => {
                        warn!(connection_id = %self.connection_id, error = %e, "WebSocket error");
                        break;
                    }
                },
                _ = ping.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }

        let undelivered = self.finish();
        info!(
            channel_id = %self.channel_id,
            connection_id = %self.connection_id,
            undelivered,
            "Consumer session ended"
        );
    }

    /// Detach from the relay and count whatever was still queued as failed
    /// deliveries. Detaching first means nothing new can be queued.
    fn finish(&mut self) -> usize {
        self.relay.on_disconnect(self.connection_id);
        self.outbound.close();

        let mut undelivered = 0;
        while let Ok(frame) = self.outbound.try_recv() {
            if let Outbound::Message(_) = frame {
                undelivered += 1;
            }
        }
        self.relay.discard_undelivered(&self.channel_id, undelivered);
        undelivered
    }
}

fn close_frame(reason: &CloseReason) -> CloseFrame<'static> {
    CloseFrame {
        code: reason.code(),
        reason: reason.reason().into(),
    }
}
