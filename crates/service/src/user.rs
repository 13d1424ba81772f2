//! User provisioning: create, update, login.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use serde::Serialize;
use tessera_core::error::CoreError;
use tessera_core::password::CredentialHasher;
use tessera_core::roles::ROLE_USER;
use tessera_core::tasks::{outbox_task_key, PayloadSendVerifyEmail, TASK_SEND_VERIFY_EMAIL};
use tessera_core::token::TokenIssuer;
use tessera_core::types::Timestamp;
use tessera_core::validation::{validate_create_user, validate_login, validate_update_user};
use tessera_db::models::outbox::{NewOutboxEvent, OutboxEvent};
use tessera_db::models::session::CreateSession;
use tessera_db::models::user::{CreateUser, User, UserPatch};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::deadline::with_deadline;
use crate::distributor::task_for_event;
use crate::ports::{OutboxStore, SessionStore, TaskDistributor, UserStore};

// ---------------------------------------------------------------------------
// Parameters and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
}

/// Only `username` is required; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateUserParams {
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoginParams {
    pub username: String,
    pub password: String,
    pub user_agent: String,
    pub client_ip: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedUser {
    pub user: User,
    /// Outbox events recorded with the user, as of the post-commit hand-off.
    pub events: Vec<OutboxEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub user: User,
    pub session_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: Timestamp,
    pub refresh_token_expires_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UserApplicationSettings {
    pub access_token_duration: TimeDelta,
    pub refresh_token_duration: TimeDelta,
    pub operation_timeout: Duration,
    pub conceal_unknown_users: bool,
}

impl From<&ServiceConfig> for UserApplicationSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            access_token_duration: config.access_token_duration,
            refresh_token_duration: config.refresh_token_duration,
            operation_timeout: config.operation_timeout,
            conceal_unknown_users: config.conceal_unknown_users,
        }
    }
}

pub struct UserApplication {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    outbox: Arc<dyn OutboxStore>,
    distributor: Arc<dyn TaskDistributor>,
    hasher: Arc<dyn CredentialHasher>,
    tokens: Arc<dyn TokenIssuer>,
    settings: UserApplicationSettings,
}

impl UserApplication {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        outbox: Arc<dyn OutboxStore>,
        distributor: Arc<dyn TaskDistributor>,
        hasher: Arc<dyn CredentialHasher>,
        tokens: Arc<dyn TokenIssuer>,
        settings: UserApplicationSettings,
    ) -> Self {
        Self {
            users,
            sessions,
            outbox,
            distributor,
            hasher,
            tokens,
            settings,
        }
    }

    /// Create a user and schedule its verification email.
    ///
    /// The user row and a `send_verify_email` outbox event commit together
    /// under the operation deadline. The event is then handed to the task
    /// queue on a separate timeout; if that fails or times out the event
    /// stays pending for the outbox relay and the call still succeeds.
    pub async fn create(&self, params: CreateUserParams) -> Result<CreatedUser, CoreError> {
        let (user, events) =
            with_deadline(self.settings.operation_timeout, self.provision(params)).await?;
        tracing::info!(username = %user.username, "User created");

        let mut handed_off = Vec::with_capacity(events.len());
        for event in events {
            handed_off.push(self.hand_off(event).await);
        }

        Ok(CreatedUser {
            user,
            events: handed_off,
        })
    }

    /// Validate, hash, and commit the user with its outbox event.
    async fn provision(
        &self,
        params: CreateUserParams,
    ) -> Result<(User, Vec<OutboxEvent>), CoreError> {
        validate_create_user(
            &params.username,
            &params.full_name,
            &params.email,
            &params.password,
        )?;

        let hashed_password = self.hash_password(params.password).await?;

        let payload = PayloadSendVerifyEmail {
            username: params.username.clone(),
        };
        let event = NewOutboxEvent {
            event_type: TASK_SEND_VERIFY_EMAIL.to_string(),
            payload: serde_json::to_value(&payload)
                .map_err(|e| CoreError::Internal(format!("failed to encode event payload: {e}")))?,
        };
        let input = CreateUser {
            username: params.username,
            full_name: params.full_name,
            email: params.email,
            hashed_password,
            role: Some(ROLE_USER.to_string()),
        };

        self.users.create_user(input, vec![event]).await
    }

    /// Best-effort immediate dispatch of a committed outbox event.
    ///
    /// Never fails: whatever does not get through is left for the relay.
    async fn hand_off(&self, event: OutboxEvent) -> OutboxEvent {
        let event_id = event.id;
        match tokio::time::timeout(self.settings.operation_timeout, self.try_hand_off(event.clone()))
            .await
        {
            Ok(event) => event,
            Err(_) => {
                tracing::warn!(
                    event_id,
                    task_key = %outbox_task_key(event_id),
                    "Task hand-off timed out; leaving event for the outbox relay",
                );
                event
            }
        }
    }

    async fn try_hand_off(&self, mut event: OutboxEvent) -> OutboxEvent {
        let task = task_for_event(&event);

        if let Err(e) = self.distributor.enqueue(task).await {
            tracing::warn!(
                event_id = event.id,
                task_key = %outbox_task_key(event.id),
                error = %e,
                "Task enqueue failed; leaving event for the outbox relay",
            );
            if let Err(e) = self.outbox.record_failure(event.id, &e.to_string()).await {
                tracing::warn!(event_id = event.id, error = %e, "Failed to record outbox failure");
            }
            event.attempts += 1;
            event.last_error = Some(e.to_string());
            return event;
        }

        match self.outbox.mark_dispatched(event.id).await {
            Ok(_) => event.dispatched_at = Some(Utc::now()),
            Err(e) => {
                // The relay will re-enqueue; the task key makes that a no-op.
                tracing::warn!(event_id = event.id, error = %e, "Failed to mark outbox event dispatched");
            }
        }
        event
    }

    /// Apply a partial update. A new password is re-hashed and stamps
    /// `password_changed_at`.
    pub async fn update(&self, params: UpdateUserParams) -> Result<User, CoreError> {
        with_deadline(self.settings.operation_timeout, self.update_inner(params)).await
    }

    async fn update_inner(&self, params: UpdateUserParams) -> Result<User, CoreError> {
        validate_update_user(
            &params.username,
            params.full_name.as_deref(),
            params.email.as_deref(),
            params.password.as_deref(),
        )?;

        let mut patch = UserPatch {
            full_name: params.full_name,
            email: params.email,
            ..Default::default()
        };
        if let Some(password) = params.password {
            patch.hashed_password = Some(self.hash_password(password).await?);
            patch.password_changed_at = Some(Utc::now());
        }

        let user = self
            .users
            .update_user(&params.username, patch)
            .await?
            .ok_or_else(|| CoreError::user_not_found(&params.username))?;

        tracing::info!(username = %user.username, "User updated");
        Ok(user)
    }

    /// Check credentials, issue an access/refresh token pair, and record a
    /// session keyed by the refresh token's id.
    pub async fn login(&self, params: LoginParams) -> Result<LoginResult, CoreError> {
        with_deadline(self.settings.operation_timeout, self.login_inner(params)).await
    }

    async fn login_inner(&self, params: LoginParams) -> Result<LoginResult, CoreError> {
        validate_login(&params.username, &params.password)?;

        let user = match self.users.get_user(&params.username).await? {
            Some(user) => user,
            None if self.settings.conceal_unknown_users => {
                return Err(CoreError::InvalidCredentials)
            }
            None => return Err(CoreError::user_not_found(&params.username)),
        };

        if !self
            .verify_password(params.password, user.hashed_password.clone())
            .await?
        {
            tracing::info!(username = %user.username, "Login rejected: wrong password");
            return Err(CoreError::InvalidCredentials);
        }

        let (access_token, access_claims) = self.tokens.create_token(
            &user.username,
            &user.role,
            self.settings.access_token_duration,
        )?;
        let (refresh_token, refresh_claims) = self.tokens.create_token(
            &user.username,
            &user.role,
            self.settings.refresh_token_duration,
        )?;

        let session = self
            .sessions
            .create_session(CreateSession {
                id: refresh_claims.id,
                username: user.username.clone(),
                refresh_token: refresh_token.clone(),
                user_agent: params.user_agent,
                client_ip: params.client_ip,
                expires_at: refresh_claims.expired_at,
            })
            .await?;

        tracing::info!(username = %user.username, session_id = %session.id, "User logged in");

        Ok(LoginResult {
            user,
            session_id: session.id,
            access_token,
            refresh_token,
            access_token_expires_at: access_claims.expired_at,
            refresh_token_expires_at: refresh_claims.expired_at,
        })
    }

    // -----------------------------------------------------------------------
    // Password hashing (blocking pool)
    // -----------------------------------------------------------------------

    async fn hash_password(&self, password: String) -> Result<String, CoreError> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| CoreError::Internal(format!("password hashing task failed: {e}")))?
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool, CoreError> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| CoreError::Internal(format!("password verification task failed: {e}")))?
    }
}
