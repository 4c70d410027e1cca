//! Channel-scoped bearer tokens.
//!
//! Wire format: `<hex(claims)>.<hex(hmac_sha256(secret, hex(claims)))>` where
//! `claims` is the JSON object `{"cid", "iat", "exp"}`. Tokens are stateless;
//! validity is signature plus expiry and nothing is tracked per token.
//!
//! When the signing secret cannot be fetched at issuance the channel still
//! gets created, but its token is the [`Token::Unavailable`] sentinel so that
//! attach attempts fail with a clear `AuthUnavailable`.

use crate::domain::channel::ChannelId;
use crate::domain::config::TokenConfig;
use crate::domain::error::{AuthError, SigningUnavailable, VerificationError};
use crate::ports::outbound::{SigningSecret, SigningSecretSource, SystemTimeSource, TimeSource};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Literal handed out in place of a token when signing was unavailable.
pub const UNAVAILABLE_TOKEN: &str = "unavailable";

/// Length of the log-safe token fingerprint.
const FINGERPRINT_LEN: usize = 8;

/// Credential returned from channel creation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Token {
    Signed(String),
    /// Channel was created while the signing secret was unreachable.
    Unavailable,
}

impl Token {
    pub fn as_str(&self) -> &str {
        match self {
            Token::Signed(s) => s,
            Token::Unavailable => UNAVAILABLE_TOKEN,
        }
    }

    /// Whether this token can ever be used to attach.
    pub fn is_usable(&self) -> bool {
        matches!(self, Token::Signed(_))
    }

    /// Short identifier that is safe to log.
    pub fn fingerprint(&self) -> String {
        fingerprint(self.as_str())
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        if s == UNAVAILABLE_TOKEN {
            Token::Unavailable
        } else {
            Token::Signed(s)
        }
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        match token {
            Token::Signed(s) => s,
            Token::Unavailable => UNAVAILABLE_TOKEN.to_string(),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Signed(_) => write!(f, "Token({})", self.fingerprint()),
            Token::Unavailable => f.write_str("Token(unavailable)"),
        }
    }
}

/// Log-safe fingerprint of a raw presented token: the first hex characters
/// of its signature segment.
pub fn fingerprint(raw: &str) -> String {
    match raw.split_once('.') {
        Some((_, sig)) => sig.chars().take(FINGERPRINT_LEN).collect(),
        None if raw == UNAVAILABLE_TOKEN => UNAVAILABLE_TOKEN.to_string(),
        None => "-".to_string(),
    }
}

/// Signed claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Channel id the token grants access to
    pub cid: String,
    /// Issued-at, unix seconds
    pub iat: u64,
    /// Expires-at, unix seconds (exclusive)
    pub exp: u64,
}

/// Mints and verifies channel tokens.
pub struct TokenIssuer {
    secrets: Arc<dyn SigningSecretSource>,
    clock: Arc<dyn TimeSource>,
    lifetime: Duration,
    credential_timeout: Duration,
}

impl TokenIssuer {
    pub fn new(secrets: Arc<dyn SigningSecretSource>, config: &TokenConfig) -> Self {
        Self {
            secrets,
            clock: Arc::new(SystemTimeSource),
            lifetime: config.lifetime,
            credential_timeout: config.credential_timeout,
        }
    }

    /// Replace the clock (tests).
    pub fn with_time_source(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Fetch the signing secret, bounded by the credential timeout.
    async fn secret(&self) -> Result<SigningSecret, SigningUnavailable> {
        match tokio::time::timeout(self.credential_timeout, self.secrets.signing_secret()).await {
            Ok(result) => result,
            Err(_) => Err(SigningUnavailable::new(format!(
                "{} did not answer within {:?}",
                self.secrets.describe(),
                self.credential_timeout
            ))),
        }
    }

    /// Mint a token for `channel` valid for the configured lifetime.
    pub async fn issue(&self, channel: &ChannelId) -> Result<Token, SigningUnavailable> {
        let secret = self.secret().await?;

        let iat = self.clock.now();
        let claims = TokenClaims {
            cid: channel.as_str().to_string(),
            iat,
            exp: iat.saturating_add(self.lifetime.as_secs()),
        };
        let body = serde_json::to_vec(&claims)
            .map_err(|e| SigningUnavailable::new(format!("encode claims: {}", e)))?;
        let payload = hex::encode(body);
        let signature = hex::encode(sign(&secret, payload.as_bytes())?);

        Ok(Token::Signed(format!("{}.{}", payload, signature)))
    }

    /// Check signature and expiry, returning the bound channel id.
    pub async fn verify(&self, token: &str) -> Result<ChannelId, AuthError> {
        if token == UNAVAILABLE_TOKEN {
            return Err(AuthError::AuthUnavailable(
                "channel was created without a usable token".into(),
            ));
        }

        let (payload, signature) = split(token)?;
        let claims = decode_claims(payload)?;
        let signature = hex::decode(signature).map_err(|_| VerificationError::Malformed)?;

        let secret = self
            .secret()
            .await
            .map_err(|e| AuthError::AuthUnavailable(e.reason))?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| AuthError::AuthUnavailable("unusable signing key".into()))?;
        mac.update(payload.as_bytes());
        // Constant-time comparison
        mac.verify_slice(&signature)
            .map_err(|_| VerificationError::BadSignature)?;

        if self.clock.now() >= claims.exp {
            return Err(VerificationError::Expired {
                expired_at: claims.exp,
            }
            .into());
        }

        channel_of(&claims)
    }

    /// Decode claims without checking signature or expiry.
    ///
    /// Only the `AlwaysAllow` policy may act on the result.
    pub fn decode_unverified(token: &str) -> Result<TokenClaims, VerificationError> {
        let (payload, _) = split(token)?;
        decode_claims(payload)
    }
}

/// Channel id bound by a set of claims.
pub(crate) fn channel_of(claims: &TokenClaims) -> Result<ChannelId, AuthError> {
    ChannelId::parse(&claims.cid).map_err(|_| VerificationError::Malformed.into())
}

fn sign(secret: &SigningSecret, payload: &[u8]) -> Result<Vec<u8>, SigningUnavailable> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SigningUnavailable::new("unusable signing key"))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn split(token: &str) -> Result<(&str, &str), VerificationError> {
    match token.split_once('.') {
        Some((payload, signature)) if !payload.is_empty() && !signature.is_empty() => {
            Ok((payload, signature))
        }
        _ => Err(VerificationError::Malformed),
    }
}

fn decode_claims(payload: &str) -> Result<TokenClaims, VerificationError> {
    let bytes = hex::decode(payload).map_err(|_| VerificationError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| VerificationError::Malformed)
}
