//! Token verification policies.
//!
//! The policy is chosen once at startup from [`TokenConfig::verification`].
//! Everything downstream calls [`VerificationPolicy::authorize`] and never
//! branches on the mode itself, so the bypass lives in exactly one type.

use crate::domain::channel::ChannelId;
use crate::domain::config::{TokenConfig, VerificationMode};
use crate::domain::error::AuthError;
use crate::domain::token::{self, TokenIssuer, UNAVAILABLE_TOKEN};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, warn};

/// Strategy deciding which channel a presented token grants.
#[async_trait]
pub trait VerificationPolicy: Send + Sync {
    async fn authorize(&self, issuer: &TokenIssuer, token: &str) -> Result<ChannelId, AuthError>;

    fn name(&self) -> &'static str;
}

/// Signature and expiry are enforced.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictVerification;

#[async_trait]
impl VerificationPolicy for StrictVerification {
    async fn authorize(&self, issuer: &TokenIssuer, token: &str) -> Result<ChannelId, AuthError> {
        issuer.verify(token).await
    }

    fn name(&self) -> &'static str {
        "strict"
    }
}

/// Accepts any well-formed token without checking signature or expiry.
///
/// Non-production only; config validation refuses it in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAllow;

#[async_trait]
impl VerificationPolicy for AlwaysAllow {
    async fn authorize(&self, _issuer: &TokenIssuer, token: &str) -> Result<ChannelId, AuthError> {
        if token == UNAVAILABLE_TOKEN {
            return Err(AuthError::AuthUnavailable(
                "channel was created without a usable token".into(),
            ));
        }

        let claims = TokenIssuer::decode_unverified(token)?;
        let channel = token::channel_of(&claims)?;
        warn!(
            channel_id = %channel,
            token = %token::fingerprint(token),
            "Token verification bypassed (always_allow)"
        );
        Ok(channel)
    }

    fn name(&self) -> &'static str {
        "always_allow"
    }
}

/// Build the policy selected by configuration.
pub fn verification_policy(config: &TokenConfig) -> Arc<dyn VerificationPolicy> {
    match config.verification {
        VerificationMode::Strict => Arc::new(StrictVerification),
        VerificationMode::AlwaysAllow => {
            error!(
                "TOKEN VERIFICATION DISABLED: any well-formed token will be accepted. \
                 Never run this configuration in production."
            );
            Arc::new(AlwaysAllow)
        }
    }
}
