//! PostgreSQL implementations of the store ports.
//!
//! Multi-statement operations run through [`with_transaction`]; single
//! statements go straight to the pool.

use async_trait::async_trait;
use tessera_core::error::CoreError;
use tessera_core::types::DbId;
use tessera_db::models::outbox::{NewOutboxEvent, OutboxEvent};
use tessera_db::models::session::{CreateSession, Session};
use tessera_db::models::user::{CreateUser, User, UserPatch};
use tessera_db::models::verification_code::{CreateVerificationCode, VerificationCode};
use tessera_db::repositories::{OutboxRepo, SessionRepo, UserRepo, VerificationCodeRepo};
use tessera_db::{map_db_error, with_transaction, DbPool};
use uuid::Uuid;

use crate::ports::{OutboxStore, SessionStore, UserStore, VerificationStore};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(
        &self,
        user: CreateUser,
        events: Vec<NewOutboxEvent>,
    ) -> Result<(User, Vec<OutboxEvent>), CoreError> {
        with_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let created = UserRepo::create(&mut *conn, &user)
                    .await
                    .map_err(map_db_error)?;

                let mut recorded = Vec::with_capacity(events.len());
                for event in &events {
                    let row = OutboxRepo::insert(&mut *conn, event)
                        .await
                        .map_err(map_db_error)?;
                    recorded.push(row);
                }

                Ok((created, recorded))
            })
        })
        .await
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>, CoreError> {
        UserRepo::find_by_username(&self.pool, username)
            .await
            .map_err(map_db_error)
    }

    async fn update_user(
        &self,
        username: &str,
        patch: UserPatch,
    ) -> Result<Option<User>, CoreError> {
        UserRepo::update(&self.pool, username, &patch)
            .await
            .map_err(map_db_error)
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, input: CreateSession) -> Result<Session, CoreError> {
        SessionRepo::create(&self.pool, &input)
            .await
            .map_err(map_db_error)
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, CoreError> {
        SessionRepo::find_by_id(&self.pool, id)
            .await
            .map_err(map_db_error)
    }

    async fn block_session(&self, id: Uuid) -> Result<Option<bool>, CoreError> {
        SessionRepo::block(&self.pool, id)
            .await
            .map_err(map_db_error)
    }
}

// ---------------------------------------------------------------------------
// Verification codes
// ---------------------------------------------------------------------------

#[async_trait]
impl VerificationStore for PgStore {
    async fn verify_email(
        &self,
        email_id: DbId,
        secret_code: &str,
    ) -> Result<Option<(User, VerificationCode)>, CoreError> {
        let secret_code = secret_code.to_string();
        with_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let Some(code) = VerificationCodeRepo::consume(&mut *conn, email_id, &secret_code)
                    .await
                    .map_err(map_db_error)?
                else {
                    return Ok(None);
                };

                let user = UserRepo::mark_email_verified(&mut *conn, &code.username)
                    .await
                    .map_err(map_db_error)?
                    .ok_or_else(|| CoreError::user_not_found(&code.username))?;

                Ok(Some((user, code)))
            })
        })
        .await
    }

    async fn issue_code(
        &self,
        input: CreateVerificationCode,
    ) -> Result<VerificationCode, CoreError> {
        with_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                if let Some(key) = &input.task_key {
                    if let Some(existing) = VerificationCodeRepo::find_by_task_key(&mut *conn, key)
                        .await
                        .map_err(map_db_error)?
                    {
                        return Ok(existing);
                    }
                }

                let expired = VerificationCodeRepo::expire_unused_for_user(&mut *conn, &input.username)
                    .await
                    .map_err(map_db_error)?;
                if expired > 0 {
                    tracing::debug!(username = %input.username, expired, "Expired earlier verification codes");
                }

                if let Some(created) = VerificationCodeRepo::create(&mut *conn, &input)
                    .await
                    .map_err(map_db_error)?
                {
                    return Ok(created);
                }

                // Lost an insert race on the same task key; the winner's row
                // is visible once its transaction committed.
                let key = input.task_key.as_deref().unwrap_or_default();
                VerificationCodeRepo::find_by_task_key(&mut *conn, key)
                    .await
                    .map_err(map_db_error)?
                    .ok_or_else(|| {
                        CoreError::Internal(format!("verification code for task {key} vanished"))
                    })
            })
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

#[async_trait]
impl OutboxStore for PgStore {
    async fn mark_dispatched(&self, id: DbId) -> Result<bool, CoreError> {
        OutboxRepo::mark_dispatched(&self.pool, id)
            .await
            .map_err(map_db_error)
    }

    async fn record_failure(&self, id: DbId, error: &str) -> Result<(), CoreError> {
        OutboxRepo::record_failure(&self.pool, id, error)
            .await
            .map_err(map_db_error)
    }
}
