use async_trait::async_trait;
use tessera_core::error::CoreError;
use tessera_db::models::task::Task;

/// How a failed task should be treated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// Reschedule with backoff, unless retries are exhausted.
    #[error("retryable: {0}")]
    Retry(String),

    /// Drop the task; another attempt cannot succeed.
    #[error("skipped: {0}")]
    Skip(String),
}

impl From<CoreError> for TaskError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Transient(_) | CoreError::Internal(_) => TaskError::Retry(err.to_string()),
            other => TaskError::Skip(other.to_string()),
        }
    }
}

/// Executes one task type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<(), TaskError>;
}
