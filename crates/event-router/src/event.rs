//! Routed events and channel derivation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by [`EventRouter::route`](crate::EventRouter::route).
///
/// Forward failures never reach the caller; they are logged and counted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("invalid event type: {0:?}")]
    InvalidType(String),

    #[error("service directory lookup failed: {0}")]
    Directory(String),

    #[error("forward failed: {0}")]
    Forward(String),
}

/// A message tagged with its type, e.g. `Deploy.Started`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedEvent {
    #[serde(rename = "type")]
    pub message_type: String,
    pub payload: serde_json::Value,
}

impl RoutedEvent {
    pub fn new(message_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
        }
    }
}

/// Named channel for a message type: the lower-cased segment before the
/// first `.`, `:` or `/`.
pub fn channel_for(message_type: &str) -> Result<String, RouteError> {
    let head = message_type
        .trim()
        .split(['.', ':', '/'])
        .next()
        .unwrap_or_default()
        .trim();

    if head.is_empty() {
        return Err(RouteError::InvalidType(message_type.to_string()));
    }
    Ok(head.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_for() {
        assert_eq!(channel_for("Deploy.Started").unwrap(), "deploy");
        assert_eq!(channel_for("build:log").unwrap(), "build");
        assert_eq!(channel_for("Pipeline/step/3").unwrap(), "pipeline");
        assert_eq!(channel_for("  Audit ").unwrap(), "audit");
    }

    #[test]
    fn test_channel_for_rejects_empty() {
        for bad in ["", "   ", ".Started", ":x", "/"] {
            assert!(
                matches!(channel_for(bad), Err(RouteError::InvalidType(_))),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn test_event_wire_shape() {
        let event = RoutedEvent::new("Deploy.Started", serde_json::json!({"id": 1}));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Deploy.Started");
        assert_eq!(json["payload"]["id"], 1);
    }
}
