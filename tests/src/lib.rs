//! # Channel Relay Test Suite
//!
//! Cross-crate flows against a relay served on an ephemeral port.
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── mod.rs              # Harness: spawn a node, tail a channel
//!     ├── consumer_flows.rs   # Buffer, replay, live, supersede, reject
//!     ├── node_flows.rs       # Metrics endpoint, TTL sweeper
//!     └── router_flows.rs     # Event router forwarding into the relay
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p relay-tests
//! cargo test -p relay-tests integration::consumer_flows
//! ```

pub mod integration;
