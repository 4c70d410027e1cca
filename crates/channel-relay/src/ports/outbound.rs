//! Outbound ports for the channel relay.

use crate::domain::error::SigningUnavailable;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    /// Current unix time in seconds.
    fn now(&self) -> u64;
}

/// System time implementation
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            // Clock before Unix epoch - return 0 rather than panic
            .unwrap_or(0)
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualTimeSource(AtomicU64);

impl ManualTimeSource {
    pub fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Key material used to sign channel tokens.
///
/// `Debug` is redacted so the secret never reaches a log line.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    /// Minimum accepted secret length in bytes.
    pub const MIN_LEN: usize = 16;

    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, SigningUnavailable> {
        let bytes = bytes.into();
        if bytes.len() < Self::MIN_LEN {
            return Err(SigningUnavailable::new(format!(
                "signing secret is {} bytes (min {})",
                bytes.len(),
                Self::MIN_LEN
            )));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningSecret(<{} bytes redacted>)", self.0.len())
    }
}

/// Capability to fetch the current signing secret.
///
/// Looked up on every issue/verify call and never cached by the relay, so a
/// rotated secret takes effect immediately.
#[async_trait]
pub trait SigningSecretSource: Send + Sync {
    async fn signing_secret(&self) -> Result<SigningSecret, SigningUnavailable>;

    /// Short label for logs.
    fn describe(&self) -> String;
}
