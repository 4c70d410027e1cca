//! Relay error types.
//!
//! Only authorization failures ever reach a caller as an `Err`. Unknown
//! channels and failed deliveries are reported as
//! [`ProduceOutcome`](crate::ProduceOutcome) values because producing must
//! never fail just because nobody is listening.

use serde::Serialize;
use thiserror::Error;

/// The credential source could not supply a signing secret.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("signing secret unavailable: {reason}")]
pub struct SigningUnavailable {
    pub reason: String,
}

impl SigningUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A consumer-presented token is invalid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("malformed token")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token expired at {expired_at}")]
    Expired { expired_at: u64 },
}

/// Why an attach attempt was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Token failed verification. Terminal for this attempt.
    #[error("token rejected: {0}")]
    Rejected(#[from] VerificationError),

    /// The channel was issued the unusable sentinel, or the signing secret
    /// cannot be fetched right now to verify.
    #[error("live tailing unavailable: {0}")]
    AuthUnavailable(String),
}

impl AuthError {
    /// Stable label for metrics and close frames.
    pub fn label(&self) -> &'static str {
        match self {
            AuthError::Rejected(VerificationError::Malformed) => "malformed",
            AuthError::Rejected(VerificationError::BadSignature) => "bad_signature",
            AuthError::Rejected(VerificationError::Expired { .. }) => "expired",
            AuthError::AuthUnavailable(_) => "auth_unavailable",
        }
    }
}

/// Service-level errors (startup and serving, never per message).
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::domain::config::ConfigError),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// Serving failed after bind
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Stable machine-readable error codes returned in HTTP error bodies.
pub mod codes {
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const INVALID_CHANNEL_ID: &str = "invalid_channel_id";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const MISSING_TOKEN: &str = "missing_token";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const AUTH_UNAVAILABLE: &str = "auth_unavailable";
}

/// HTTP error body: `{ "error": { "code": ..., "message": ... } }`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self })
    }
}

impl From<&AuthError> for ApiError {
    fn from(e: &AuthError) -> Self {
        match e {
            AuthError::Rejected(_) => ApiError::new(codes::UNAUTHORIZED, e.to_string()),
            AuthError::AuthUnavailable(_) => ApiError::new(codes::AUTH_UNAVAILABLE, e.to_string()),
        }
    }
}
