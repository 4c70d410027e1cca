//! # Event Router
//!
//! Producer-side counterpart of the channel relay: derive a named channel
//! from an event's type, find the service that owns it, and forward the
//! event without waiting for the outcome.
//!
//! ```text
//! RoutedEvent ──channel_for()──► "deploy" ──ServiceDirectory──► Endpoint
//!                                                                  │
//!                                           tokio::spawn(forward) ◄┘
//! ```
//!
//! Shares no state with the relay.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod directory;
pub mod event;
pub mod forwarder;
pub mod router;

pub use directory::{Endpoint, ServiceDirectory, ServiceEntry, StaticDirectory, DEFAULT_LABEL_KEY};
pub use event::{channel_for, RouteError, RoutedEvent};
pub use forwarder::{EventForwarder, HttpForwarder, EVENT_TYPE_HEADER};
pub use router::{EventRouter, RouteOutcome, RouterStats};
