use serde::Serialize;
use sqlx::FromRow;
use tessera_core::types::{DbId, Timestamp};

/// A row from the `verification_codes` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct VerificationCode {
    pub id: DbId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub secret_code: String,
    pub is_used: bool,
    pub task_key: Option<String>,
    pub created_at: Timestamp,
    pub expired_at: Timestamp,
}

/// DTO for issuing a code. `expired_at` comes from the column default.
#[derive(Debug, Clone)]
pub struct CreateVerificationCode {
    pub username: String,
    pub email: String,
    pub secret_code: String,
    /// Key of the queue task that produced the code, if any.
    pub task_key: Option<String>,
}
