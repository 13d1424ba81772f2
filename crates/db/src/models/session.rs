//! Refresh-token session model and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use tessera_core::types::Timestamp;
use uuid::Uuid;

/// A row from the `sessions` table. `id` is the refresh token's `jti`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub user_agent: String,
    pub client_ip: String,
    pub is_blocked: bool,
    pub expires_at: Timestamp,
    pub created_at: Timestamp,
}

/// DTO for creating a session at login.
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub id: Uuid,
    pub username: String,
    pub refresh_token: String,
    pub user_agent: String,
    pub client_ip: String,
    pub expires_at: Timestamp,
}
