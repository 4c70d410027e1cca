//! Service directory: named channel to network endpoint.

use crate::event::RouteError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Label a service carries to claim a named channel.
pub const DEFAULT_LABEL_KEY: &str = "relay.channel";

/// Where a resolved channel is served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Request path, starting with `/`
    pub path: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        Self {
            host: host.into(),
            port,
            path,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}", self.host, self.port, self.path)
    }
}

/// One registered service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub endpoint: Endpoint,
}

impl ServiceEntry {
    pub fn new(name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            name: name.into(),
            labels: HashMap::new(),
            endpoint,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Lookup of the service owning a named channel.
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    async fn resolve(&self, channel: &str) -> Result<Option<Endpoint>, RouteError>;
}

/// In-memory directory keyed by service name.
pub struct StaticDirectory {
    entries: DashMap<String, ServiceEntry>,
    label_key: String,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::with_label_key(DEFAULT_LABEL_KEY)
    }

    pub fn with_label_key(label_key: impl Into<String>) -> Self {
        Self {
            entries: DashMap::new(),
            label_key: label_key.into(),
        }
    }

    /// Add or replace a service.
    pub fn register(&self, entry: ServiceEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn deregister(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StaticDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceDirectory for StaticDirectory {
    /// When several services claim the channel, the one with the smallest
    /// name wins so resolution is stable.
    async fn resolve(&self, channel: &str) -> Result<Option<Endpoint>, RouteError> {
        let found = self
            .entries
            .iter()
            .filter(|entry| entry.labels.get(&self.label_key).map(String::as_str) == Some(channel))
            .min_by(|a, b| a.name.cmp(&b.name))
            .map(|entry| entry.endpoint.clone());
        Ok(found)
    }
}
