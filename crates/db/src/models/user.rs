//! User entity model and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use tessera_core::types::Timestamp;

/// Full user row from the `users` table.
///
/// `hashed_password` is skipped on serialization.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct User {
    pub username: String,
    pub role: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub full_name: String,
    pub email: String,
    pub is_email_verified: bool,
    pub password_changed_at: Timestamp,
    pub created_at: Timestamp,
}

/// DTO for creating a new user. `role` falls back to the column default.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub hashed_password: String,
    pub role: Option<String>,
}

/// Partial update. `None` leaves the column unchanged.
///
/// `is_email_verified` is not patchable; only
/// `UserRepo::mark_email_verified` sets it.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub hashed_password: Option<String>,
    pub password_changed_at: Option<Timestamp>,
}
