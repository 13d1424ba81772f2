//! Signed, time-limited bearer tokens.
//!
//! Tokens are HMAC-signed JWTs (HS256 on issue; any HS* algorithm accepted on
//! verification) carrying a [`TokenClaims`] payload. Refresh tokens use the
//! same format; their `jti` doubles as the primary key of the session row, so
//! revocation is checked by the session layer and never here.

use chrono::{SubsecRound, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Timestamp;

/// Minimum accepted length of the symmetric signing key, in bytes.
pub const MIN_SECRET_KEY_SIZE: usize = 32;

/// Token-layer failures. Expiry is kept apart from tampering because callers
/// react to it differently (renew vs. reject).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token is invalid")]
    Invalid,

    #[error("invalid key size: must be at least {min} bytes")]
    KeyTooShort { min: usize },

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Claims embedded in every issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Unique token id. For refresh tokens this equals the session id.
    #[serde(rename = "jti")]
    pub id: Uuid,
    /// Username of the token owner.
    #[serde(rename = "sub")]
    pub subject: String,
    pub role: String,
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: Timestamp,
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expired_at: Timestamp,
}

impl TokenClaims {
    /// Build claims valid for `ttl` from now, truncated to whole seconds so
    /// the returned value equals what a later verification decodes.
    pub fn new(subject: &str, role: &str, ttl: TimeDelta) -> Self {
        let now = Utc::now().trunc_subsecs(0);
        Self {
            id: Uuid::new_v4(),
            subject: subject.to_string(),
            role: role.to_string(),
            issued_at: now,
            expired_at: now + ttl,
        }
    }
}

/// Issues tokens. Injected into the user application.
pub trait TokenIssuer: Send + Sync {
    fn create_token(
        &self,
        subject: &str,
        role: &str,
        ttl: TimeDelta,
    ) -> Result<(String, TokenClaims), TokenError>;
}

/// Verifies tokens. This is the only capability the gateway receives.
pub trait TokenVerifier: Send + Sync {
    fn verify_token(&self, token: &str) -> Result<TokenClaims, TokenError>;
}

/// HMAC JWT implementation of [`TokenIssuer`] and [`TokenVerifier`].
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

impl TokenService {
    /// Rejects keys shorter than [`MIN_SECRET_KEY_SIZE`] bytes.
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_KEY_SIZE {
            return Err(TokenError::KeyTooShort {
                min: MIN_SECRET_KEY_SIZE,
            });
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "jti"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Sign an arbitrary claims value with HS256.
    pub fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

impl TokenIssuer for TokenService {
    fn create_token(
        &self,
        subject: &str,
        role: &str,
        ttl: TimeDelta,
    ) -> Result<(String, TokenClaims), TokenError> {
        let claims = TokenClaims::new(subject, role, ttl);
        let token = self.sign(&claims)?;
        Ok((token, claims))
    }
}

impl TokenVerifier for TokenService {
    fn verify_token(&self, token: &str) -> Result<TokenClaims, TokenError> {
        match decode::<TokenClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => Err(TokenError::Expired),
            Err(_) => Err(TokenError::Invalid),
        }
    }
}
