//! Signing secret sources.
//!
//! None of these cache: every token issue or verify performs a fresh lookup,
//! so rotating the underlying secret needs no relay restart.

use crate::domain::error::SigningUnavailable;
use crate::ports::outbound::{SigningSecret, SigningSecretSource};
use async_trait::async_trait;
use std::path::PathBuf;

/// Fixed in-memory secret. Intended for tests and local development.
#[derive(Debug, Clone)]
pub struct StaticSecret {
    secret: SigningSecret,
}

impl StaticSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, SigningUnavailable> {
        Ok(Self {
            secret: SigningSecret::new(bytes)?,
        })
    }
}

#[async_trait]
impl SigningSecretSource for StaticSecret {
    async fn signing_secret(&self) -> Result<SigningSecret, SigningUnavailable> {
        Ok(self.secret.clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

/// Secret read from an environment variable on every lookup.
#[derive(Debug, Clone)]
pub struct EnvSecret {
    var: String,
}

impl EnvSecret {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl SigningSecretSource for EnvSecret {
    async fn signing_secret(&self) -> Result<SigningSecret, SigningUnavailable> {
        let value = std::env::var(&self.var)
            .map_err(|e| SigningUnavailable::new(format!("env {}: {}", self.var, e)))?;
        SigningSecret::new(value.into_bytes())
    }

    fn describe(&self) -> String {
        format!("env:{}", self.var)
    }
}

/// Secret read from a mounted file on every lookup.
///
/// Trailing line endings are stripped, since secret stores projected into a
/// container filesystem usually add one.
#[derive(Debug, Clone)]
pub struct FileSecret {
    path: PathBuf,
}

impl FileSecret {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SigningSecretSource for FileSecret {
    async fn signing_secret(&self) -> Result<SigningSecret, SigningUnavailable> {
        let mut bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            SigningUnavailable::new(format!("file {}: {}", self.path.display(), e))
        })?;
        while matches!(bytes.last(), Some(b'\n') | Some(b'\r')) {
            bytes.pop();
        }
        SigningSecret::new(bytes)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
