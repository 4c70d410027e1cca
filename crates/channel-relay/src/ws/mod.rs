//! WebSocket module for consumer live tailing.

pub mod handler;

pub use handler::ConsumerSession;
