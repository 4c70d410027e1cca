//! Channel and connection identifiers.
//!
//! A channel id is the correlation id of the operation producing messages.
//! Callers own uniqueness; the relay only checks that the id is usable as a
//! routing key. When the caller has no id of its own, one is generated as a
//! UUID v7 so ids sort by creation time in logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Maximum accepted length of a caller-supplied channel id.
pub const MAX_CHANNEL_ID_LEN: usize = 128;

/// Rejected channel id.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelIdError {
    #[error("channel id is empty")]
    Empty,
    #[error("channel id is {len} bytes (max {MAX_CHANNEL_ID_LEN})")]
    TooLong { len: usize },
    #[error("channel id may only contain A-Z a-z 0-9 . _ ~ -")]
    InvalidCharacters,
    #[error("channel id cannot be a relative path segment")]
    DotSegment,
}

/// Routing key under which produced messages are collected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId(String);

impl ChannelId {
    /// Generate a fresh, time-ordered channel id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Validate a caller-supplied correlation id.
    pub fn parse(s: &str) -> Result<Self, ChannelIdError> {
        if s.is_empty() {
            return Err(ChannelIdError::Empty);
        }
        if s.len() > MAX_CHANNEL_ID_LEN {
            return Err(ChannelIdError::TooLong { len: s.len() });
        }
        // Ids travel as a single URL path segment, unescaped
        if !s.bytes().all(is_unreserved) {
            return Err(ChannelIdError::InvalidCharacters);
        }
        if s == "." || s == ".." {
            return Err(ChannelIdError::DotSegment);
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'~' | b'-')
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ChannelId {
    type Error = ChannelIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identity of one live consumer connection.
///
/// Uses UUID v7, so two connections never compare equal even when they
/// attach to the same channel within the same millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
