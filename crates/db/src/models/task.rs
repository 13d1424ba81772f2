//! Queue task model.

use serde::Serialize;
use sqlx::FromRow;
use tessera_core::types::{DbId, Timestamp};

/// Waiting for `process_at`.
pub const TASK_STATE_PENDING: &str = "pending";

/// Claimed by a worker until `lease_until`.
pub const TASK_STATE_ACTIVE: &str = "active";

/// A row from the `tasks` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub task_key: String,
    pub task_type: String,
    pub queue: String,
    pub payload: serde_json::Value,
    pub max_retry: i32,
    pub retried: i32,
    pub state: String,
    pub process_at: Timestamp,
    pub lease_until: Option<Timestamp>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
}

impl Task {
    /// Whether another failure should drop the task instead of rescheduling it.
    pub fn retries_exhausted(&self) -> bool {
        self.retried >= self.max_retry
    }
}

/// DTO for enqueueing a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_key: String,
    pub task_type: String,
    pub queue: String,
    pub payload: serde_json::Value,
    pub max_retry: i32,
    pub process_at: Timestamp,
}
