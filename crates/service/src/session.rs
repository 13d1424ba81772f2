//! Refresh-token sessions: renewal, revocation, lookup.
//!
//! Token signatures are checked by [`TokenVerifier`]; whether a refresh token
//! is still honoured is decided here against its session row.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use serde::Serialize;
use tessera_core::error::CoreError;
use tessera_core::token::{TokenIssuer, TokenVerifier};
use tessera_core::types::Timestamp;
use tessera_db::models::session::Session;
use uuid::Uuid;

use crate::deadline::with_deadline;
use crate::ports::SessionStore;

#[derive(Debug, Clone, Serialize)]
pub struct RenewedAccessToken {
    pub access_token: String,
    pub access_token_expires_at: Timestamp,
}

pub struct SessionApplication {
    sessions: Arc<dyn SessionStore>,
    verifier: Arc<dyn TokenVerifier>,
    issuer: Arc<dyn TokenIssuer>,
    access_token_duration: TimeDelta,
    operation_timeout: Duration,
}

impl SessionApplication {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        verifier: Arc<dyn TokenVerifier>,
        issuer: Arc<dyn TokenIssuer>,
        access_token_duration: TimeDelta,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            verifier,
            issuer,
            access_token_duration,
            operation_timeout,
        }
    }

    /// Mint a new access token from a refresh token.
    ///
    /// Fails with [`CoreError::Token`] for an expired or forged token,
    /// `NotFound` when no session carries its id, and `Unauthorized` when
    /// the session is blocked, expired, or belongs to a different token.
    pub async fn renew_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<RenewedAccessToken, CoreError> {
        with_deadline(self.operation_timeout, self.renew_inner(refresh_token)).await
    }

    async fn renew_inner(&self, refresh_token: &str) -> Result<RenewedAccessToken, CoreError> {
        let claims = self.verifier.verify_token(refresh_token)?;

        let session = self
            .sessions
            .get_session(claims.id)
            .await?
            .ok_or_else(|| CoreError::session_not_found(claims.id))?;

        if session.is_blocked {
            return Err(CoreError::Unauthorized("blocked session".into()));
        }
        if session.username != claims.subject {
            return Err(CoreError::Unauthorized("incorrect session user".into()));
        }
        if session.refresh_token != refresh_token {
            return Err(CoreError::Unauthorized("mismatched session token".into()));
        }
        if Utc::now() > session.expires_at {
            return Err(CoreError::Unauthorized("expired session".into()));
        }

        let (access_token, access_claims) =
            self.issuer
                .create_token(&claims.subject, &claims.role, self.access_token_duration)?;

        tracing::debug!(username = %claims.subject, session_id = %session.id, "Access token renewed");

        Ok(RenewedAccessToken {
            access_token,
            access_token_expires_at: access_claims.expired_at,
        })
    }

    /// Block a session so its refresh token is no longer honoured.
    ///
    /// Returns whether this call changed the session.
    pub async fn revoke_session(&self, id: Uuid) -> Result<bool, CoreError> {
        with_deadline(self.operation_timeout, async {
            let changed = self
                .sessions
                .block_session(id)
                .await?
                .ok_or_else(|| CoreError::session_not_found(id))?;
            if changed {
                tracing::info!(session_id = %id, "Session revoked");
            }
            Ok(changed)
        })
        .await
    }

    pub async fn get_session(&self, id: Uuid) -> Result<Session, CoreError> {
        with_deadline(self.operation_timeout, async {
            self.sessions
                .get_session(id)
                .await?
                .ok_or_else(|| CoreError::session_not_found(id))
        })
        .await
    }
}
