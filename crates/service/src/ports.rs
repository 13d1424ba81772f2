//! Capability ports the applications depend on.
//!
//! Each port is an object-safe async trait held as `Arc<dyn ...>`, so tests
//! can substitute in-memory fakes for the PostgreSQL implementations.

use async_trait::async_trait;
use tessera_core::error::CoreError;
use tessera_core::tasks::{PayloadSendVerifyEmail, TaskOptions, TASK_SEND_VERIFY_EMAIL};
use tessera_core::types::DbId;
use tessera_db::models::outbox::{NewOutboxEvent, OutboxEvent};
use tessera_db::models::session::{CreateSession, Session};
use tessera_db::models::task::NewTask;
use tessera_db::models::user::{CreateUser, User, UserPatch};
use tessera_db::models::verification_code::{CreateVerificationCode, VerificationCode};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert the user and its outbox events in one transaction.
    ///
    /// Either everything is written or nothing is.
    async fn create_user(
        &self,
        user: CreateUser,
        events: Vec<NewOutboxEvent>,
    ) -> Result<(User, Vec<OutboxEvent>), CoreError>;

    async fn get_user(&self, username: &str) -> Result<Option<User>, CoreError>;

    /// `None` when the user does not exist.
    async fn update_user(&self, username: &str, patch: UserPatch)
        -> Result<Option<User>, CoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, input: CreateSession) -> Result<Session, CoreError>;

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, CoreError>;

    /// `None` when missing, otherwise whether the call changed the row.
    async fn block_session(&self, id: Uuid) -> Result<Option<bool>, CoreError>;
}

#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Consume the code and mark its user verified in one transaction.
    ///
    /// `None` when the code does not match, is used, or has expired.
    async fn verify_email(
        &self,
        email_id: DbId,
        secret_code: &str,
    ) -> Result<Option<(User, VerificationCode)>, CoreError>;

    /// Issue a code for `input.username`, expiring that user's earlier unused
    /// codes. When `input.task_key` already produced a code, that code is
    /// returned unchanged.
    async fn issue_code(&self, input: CreateVerificationCode)
        -> Result<VerificationCode, CoreError>;
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// `false` when the event was already dispatched.
    async fn mark_dispatched(&self, id: DbId) -> Result<bool, CoreError>;

    async fn record_failure(&self, id: DbId, error: &str) -> Result<(), CoreError>;
}

// ---------------------------------------------------------------------------
// Task distribution
// ---------------------------------------------------------------------------

/// Result of an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// A task with the same key already exists; nothing was written.
    Duplicate,
}

/// Producer side of the task queue.
#[async_trait]
pub trait TaskDistributor: Send + Sync {
    async fn enqueue(&self, task: NewTask) -> Result<EnqueueOutcome, CoreError>;

    async fn enqueue_send_verify_email(
        &self,
        payload: &PayloadSendVerifyEmail,
        options: TaskOptions,
        task_key: &str,
    ) -> Result<EnqueueOutcome, CoreError> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| CoreError::Internal(format!("failed to encode task payload: {e}")))?;
        self.enqueue(crate::distributor::new_task(
            task_key,
            TASK_SEND_VERIFY_EMAIL,
            payload,
            options,
        ))
        .await
    }
}
