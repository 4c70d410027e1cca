//! Adapters for the relay's outbound ports.

pub mod secrets;

pub use secrets::{EnvSecret, FileSecret, StaticSecret};
