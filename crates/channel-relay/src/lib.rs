//! Channel Relay - lets a late-attaching consumer tail the messages an
//! asynchronous operation produces under a correlation id.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         CHANNEL RELAY                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  POST /channels      POST /channels/:id/messages   GET /stream   │
//! │        │                       │                       │         │
//! │        ▼                       ▼                       ▼         │
//! │  ┌──────────────────────────────────────────────────────────┐    │
//! │  │                     ChannelRelay                         │    │
//! │  │   create_channel     produce         attach_consumer     │    │
//! │  └─────┬─────────────────────┬─────────────────┬────────────┘    │
//! │        │                     │                 │                 │
//! │  ┌─────┴──────┐   ┌──────────┴───────┐  ┌──────┴─────────────┐   │
//! │  │ TokenIssuer│   │  MessageBuffer   │  │ ConnectionRegistry │   │
//! │  │ + Policy   │   │ (Buffering)      │  │ (Live)             │   │
//! │  └─────┬──────┘   └──────────────────┘  └────────────────────┘   │
//! └────────┼─────────────────────────────────────────────────────────┘
//!          │
//!   SigningSecretSource (static / env / mounted file)
//! ```
//!
//! # Delivery contract
//!
//! - Messages produced before the first attach are replayed, in order,
//!   when the consumer attaches.
//! - After attach, messages go straight to the consumer.
//! - A message for a channel with neither backlog nor consumer is dropped
//!   and counted; producing never fails.
//! - A token opens exactly the channel it was issued for.
//!
//! # Usage
//!
//! ```ignore
//! use channel_relay::{ChannelRelay, RelayConfig, RelayService, StaticSecret};
//!
//! let config = RelayConfig::default();
//! let secrets = Arc::new(StaticSecret::new(secret_bytes)?);
//! let relay = Arc::new(ChannelRelay::new(&config, secrets));
//! let service = RelayService::new(config, relay)?;
//! let listener = service.bind().await?;
//! service.serve(listener, shutdown_signal()).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod middleware;
pub mod ports;
pub mod relay;
pub mod service;
pub mod ws;

// Re-exports for public API
pub use adapters::{EnvSecret, FileSecret, StaticSecret};
pub use domain::config::RelayConfig;
pub use domain::error::{ApiError, AuthError, RelayError, SigningUnavailable, VerificationError};
pub use domain::stats::{DeliveryMode, DropReason, RelayObserver, RelayStatsSnapshot};
pub use domain::token::{Token, TokenIssuer};
pub use domain::{ChannelId, ConnectionId, ConsumerConnection};
pub use ports::{SigningSecretSource, TimeSource};
pub use relay::{run_eviction, AttachReport, ChannelGrant, ChannelRelay, ProduceOutcome};
pub use service::RelayService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
