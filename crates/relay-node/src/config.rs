//! Node configuration: optional TOML file plus environment overrides.
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `RELAY_CONFIG` | path of the TOML file |
//! | `RELAY_HOST` / `RELAY_PORT` | `http.host` / `http.port` |
//! | `RELAY_ENVIRONMENT` | `environment` |
//! | `RELAY_VERIFICATION` | `token.verification` |
//! | `RELAY_TOKEN_LIFETIME` | `token.lifetime` (e.g. `45m`) |
//! | `RELAY_SIGNING_SECRET_FILE` | `signing.file` |
//! | `RELAY_SIGNING_SECRET_ENV` | `signing.env` |

use std::path::PathBuf;
use std::sync::Arc;

use channel_relay::domain::{ConfigError, Environment, RelayConfig, VerificationMode};
use channel_relay::{EnvSecret, FileSecret, SigningSecretSource, SigningUnavailable, StaticSecret};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NodeConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    Override { var: &'static str, value: String },

    #[error(transparent)]
    Relay(#[from] ConfigError),

    #[error(
        "no signing secret configured in production; \
         set RELAY_SIGNING_SECRET_FILE or RELAY_SIGNING_SECRET_ENV"
    )]
    NoSigningSecret,

    #[error("development signing secret rejected: {0}")]
    Secret(#[from] SigningUnavailable),
}

/// Where the token signing secret lives. `file` wins over `env`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Mounted secret file, re-read on every lookup
    pub file: Option<PathBuf>,
    /// Environment variable holding the secret
    pub env: Option<String>,
}

/// Everything a relay process needs. Relay sections sit at the top level
/// of the TOML file next to `[signing]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    #[serde(flatten)]
    pub relay: RelayConfig,
    pub signing: SigningConfig,
}

/// Load from the process environment.
pub fn load_config() -> Result<NodeConfig, NodeConfigError> {
    load_config_from(|key| std::env::var(key).ok())
}

/// Load with an injectable variable lookup, then validate.
pub fn load_config_from(lookup: impl Fn(&str) -> Option<String>) -> Result<NodeConfig, NodeConfigError> {
    let mut config = match lookup("RELAY_CONFIG") {
        Some(path) => read_file(PathBuf::from(path))?,
        None => NodeConfig::default(),
    };
    apply_overrides(&mut config, &lookup)?;
    config.relay.validate()?;
    Ok(config)
}

fn read_file(path: PathBuf) -> Result<NodeConfig, NodeConfigError> {
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(source) => return Err(NodeConfigError::Read { path, source }),
    };
    toml::from_str(&text).map_err(|source| NodeConfigError::Parse { path, source })
}

fn apply_overrides(
    config: &mut NodeConfig,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<(), NodeConfigError> {
    if let Some(host) = lookup("RELAY_HOST") {
        config.relay.http.host = parse_var("RELAY_HOST", host, |v| v.parse().ok())?;
    }
    if let Some(port) = lookup("RELAY_PORT") {
        config.relay.http.port = parse_var("RELAY_PORT", port, |v| v.parse().ok())?;
    }
    if let Some(env) = lookup("RELAY_ENVIRONMENT") {
        config.relay.environment =
            parse_var("RELAY_ENVIRONMENT", env, |v| v.parse::<Environment>().ok())?;
    }
    if let Some(mode) = lookup("RELAY_VERIFICATION") {
        config.relay.token.verification =
            parse_var("RELAY_VERIFICATION", mode, |v| v.parse::<VerificationMode>().ok())?;
    }
    if let Some(lifetime) = lookup("RELAY_TOKEN_LIFETIME") {
        config.relay.token.lifetime =
            parse_var("RELAY_TOKEN_LIFETIME", lifetime, |v| humantime::parse_duration(v).ok())?;
    }
    if let Some(file) = lookup("RELAY_SIGNING_SECRET_FILE") {
        config.signing.file = Some(PathBuf::from(file));
    }
    if let Some(var) = lookup("RELAY_SIGNING_SECRET_ENV") {
        config.signing.env = Some(var);
    }
    Ok(())
}

fn parse_var<T>(
    var: &'static str,
    value: String,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, NodeConfigError> {
    parse(value.trim()).ok_or(NodeConfigError::Override { var, value })
}

/// Pick the secret source. Outside production a random per-process secret
/// is used when nothing is configured, so tokens do not survive a restart.
pub fn build_secret_source(config: &NodeConfig) -> Result<Arc<dyn SigningSecretSource>, NodeConfigError> {
    if let Some(path) = &config.signing.file {
        return Ok(Arc::new(FileSecret::new(path.clone())));
    }
    if let Some(var) = &config.signing.env {
        return Ok(Arc::new(EnvSecret::new(var.clone())));
    }
    if config.relay.environment == Environment::Production {
        return Err(NodeConfigError::NoSigningSecret);
    }

    warn!(
        environment = ?config.relay.environment,
        "No signing secret configured, using an ephemeral development secret"
    );
    let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    Ok(Arc::new(StaticSecret::new(secret.into_bytes())?))
}
