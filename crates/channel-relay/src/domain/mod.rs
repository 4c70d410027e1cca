//! Domain types for the channel relay.
//!
//! The buffer and registry are plain data structures; synchronization lives
//! in [`crate::relay`].

pub mod buffer;
pub mod channel;
pub mod config;
pub mod error;
pub mod policy;
pub mod registry;
pub mod stats;
pub mod token;

// Re-exports for convenience
pub use buffer::{AppendOutcome, MessageBuffer};
pub use channel::{ChannelId, ChannelIdError, ConnectionId};
pub use config::{
    BufferConfig, ConfigError, CorsConfig, Environment, HttpConfig, OverflowPolicy, RelayConfig,
    TokenConfig, VerificationMode, WebSocketConfig,
};
pub use error::{ApiError, AuthError, RelayError, SigningUnavailable, VerificationError};
pub use policy::{verification_policy, AlwaysAllow, StrictVerification, VerificationPolicy};
pub use registry::{CloseReason, ConnectionRegistry, ConsumerConnection, Outbound};
pub use stats::{
    DeliveryMode, DropCounts, DropReason, NoopObserver, RelayObserver, RelayStats,
    RelayStatsSnapshot,
};
pub use token::{Token, TokenClaims, TokenIssuer, UNAVAILABLE_TOKEN};
