//! Relay configuration with validation.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

/// Main relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Deployment environment; gates insecure settings
    pub environment: Environment,
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Consumer WebSocket configuration
    pub websocket: WebSocketConfig,
    /// Token issuance and verification
    pub token: TokenConfig,
    /// Per-channel backlog bounds
    pub buffer: BufferConfig,
    /// CORS configuration
    pub cors: CorsConfig,
}

impl RelayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.lifetime.is_zero() {
            return Err(ConfigError::InvalidToken(
                "lifetime cannot be 0".into(),
            ));
        }

        if self.token.credential_timeout.is_zero() {
            return Err(ConfigError::InvalidToken(
                "credential_timeout cannot be 0".into(),
            ));
        }

        if self.token.verification == VerificationMode::AlwaysAllow
            && self.environment == Environment::Production
        {
            return Err(ConfigError::InsecureVerification);
        }

        if self.buffer.max_messages_per_channel == Some(0) {
            return Err(ConfigError::InvalidBuffer(
                "max_messages_per_channel cannot be 0".into(),
            ));
        }

        if self.buffer.ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(ConfigError::InvalidBuffer("ttl cannot be 0".into()));
        }

        if self.buffer.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidBuffer(
                "sweep_interval cannot be 0".into(),
            ));
        }

        if self.http.max_message_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_message_size cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Production,
    Development,
    Test,
}

impl std::str::FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            other => Err(ConfigError::Unknown(format!("environment '{}'", other))),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 7780)
    pub port: u16,
    /// Max producer message body in bytes (default: 1MB)
    pub max_message_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 7780,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Consumer WebSocket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Ping interval
    #[serde(with = "humantime_serde")]
    pub ping_interval: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// How consumer tokens are checked on attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    /// Signature and expiry are enforced
    #[default]
    Strict,
    /// Any well-formed token is accepted (never allowed in production)
    AlwaysAllow,
}

impl std::str::FromStr for VerificationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(VerificationMode::Strict),
            "always_allow" | "always-allow" => Ok(VerificationMode::AlwaysAllow),
            other => Err(ConfigError::Unknown(format!("verification mode '{}'", other))),
        }
    }
}

/// Token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Validity window from issuance
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,
    /// Upper bound on a signing secret lookup
    #[serde(with = "humantime_serde")]
    pub credential_timeout: Duration,
    /// Verification policy selected at startup
    pub verification: VerificationMode,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(30 * 60),
            credential_timeout: Duration::from_secs(5),
            verification: VerificationMode::Strict,
        }
    }
}

/// What to do when a bounded channel backlog is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest buffered message to make room
    #[default]
    DropOldest,
    /// Reject the incoming message
    DropNewest,
}

/// Backlog configuration. The defaults reproduce "buffer forever".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Cap on messages held for one never-attached channel (None = unbounded)
    pub max_messages_per_channel: Option<usize>,
    /// Overflow handling once the cap is reached
    pub overflow: OverflowPolicy,
    /// Discard never-attached backlogs older than this (None = never)
    #[serde(with = "humantime_serde")]
    pub ttl: Option<Duration>,
    /// How often the TTL sweeper runs
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_messages_per_channel: None,
            overflow: OverflowPolicy::DropOldest,
            ttl: None,
            sweep_interval: Duration::from_secs(10),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec![
                "Content-Type".to_string(),
                "Authorization".to_string(),
                "X-Relay-Token".to_string(),
            ],
            max_age: 86400, // 24 hours
        }
    }
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid token config: {0}")]
    InvalidToken(String),

    #[error("invalid buffer config: {0}")]
    InvalidBuffer(String),

    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    #[error(
        "SECURITY VIOLATION: always_allow token verification is not permitted in production. \
         Set environment to development/test or use strict verification."
    )]
    InsecureVerification,

    #[error("unknown {0}")]
    Unknown(String),
}
