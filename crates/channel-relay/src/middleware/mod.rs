//! HTTP middleware for the relay.
//!
//! Layer order: Request → CORS → Tracing → Handler

pub mod auth;
pub mod cors;
pub mod tracing;

pub use auth::{auth_rejection, extract_token, missing_token, TOKEN_HEADER};
pub use cors::create_cors_layer;
pub use tracing::TracingLayer;
