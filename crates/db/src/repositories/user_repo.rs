//! Repository for the `users` table.

use sqlx::PgExecutor;

use crate::models::user::{CreateUser, User, UserPatch};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "username, role, hashed_password, full_name, email, \
                        is_email_verified, password_changed_at, created_at";

/// Provides persistence operations for users.
pub struct UserRepo;

impl UserRepo {
    /// Insert a new user, returning the created row.
    ///
    /// Fails with a unique violation on `users_pkey` or `uq_users_email`.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CreateUser,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (username, role, hashed_password, full_name, email)
             VALUES ($1, COALESCE($2, 'user'), $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(&input.username)
            .bind(&input.role)
            .bind(&input.hashed_password)
            .bind(&input.full_name)
            .bind(&input.email)
            .fetch_one(executor)
            .await
    }

    /// Find a user by username (case-sensitive).
    pub async fn find_by_username<'e, E: PgExecutor<'e>>(
        executor: E,
        username: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE username = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(executor)
            .await
    }

    /// Apply a partial update. Only non-`None` fields in `patch` are written.
    ///
    /// Returns `None` if no user with the given username exists.
    pub async fn update<'e, E: PgExecutor<'e>>(
        executor: E,
        username: &str,
        patch: &UserPatch,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            "UPDATE users SET
                full_name = COALESCE($2, full_name),
                email = COALESCE($3, email),
                hashed_password = COALESCE($4, hashed_password),
                password_changed_at = COALESCE($5, password_changed_at)
             WHERE username = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(username)
            .bind(&patch.full_name)
            .bind(&patch.email)
            .bind(&patch.hashed_password)
            .bind(patch.password_changed_at)
            .fetch_optional(executor)
            .await
    }

    /// Set `is_email_verified = true`. The flag never goes back to false.
    ///
    /// Returns `None` if the user does not exist.
    pub async fn mark_email_verified<'e, E: PgExecutor<'e>>(
        executor: E,
        username: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            "UPDATE users SET is_email_verified = true
             WHERE username = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(executor)
            .await
    }
}
