//! Client side of the channel relay HTTP and WebSocket surface.

pub mod client;
pub mod tail;

pub use client::{ClientError, CreatedChannel, ProduceResult, RelayClient};
pub use tail::{stream_url, tail, TailEnd, TailError, CLOSE_SUPERSEDED, CLOSE_UNAUTHORIZED};
