//! Repository for the `verification_codes` table.

use sqlx::PgExecutor;
use tessera_core::types::DbId;

use crate::models::verification_code::{CreateVerificationCode, VerificationCode};

const COLUMNS: &str = "id, username, email, secret_code, is_used, task_key, \
                        created_at, expired_at";

/// Provides persistence operations for email verification codes.
pub struct VerificationCodeRepo;

impl VerificationCodeRepo {
    /// Insert a new code.
    ///
    /// Returns `None` when a row with the same `task_key` already exists; the
    /// caller then reads that row with [`Self::find_by_task_key`].
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CreateVerificationCode,
    ) -> Result<Option<VerificationCode>, sqlx::Error> {
        let query = format!(
            "INSERT INTO verification_codes (username, email, secret_code, task_key)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (task_key) DO NOTHING
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VerificationCode>(&query)
            .bind(&input.username)
            .bind(&input.email)
            .bind(&input.secret_code)
            .bind(&input.task_key)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<VerificationCode>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM verification_codes WHERE id = $1");
        sqlx::query_as::<_, VerificationCode>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_task_key<'e, E: PgExecutor<'e>>(
        executor: E,
        task_key: &str,
    ) -> Result<Option<VerificationCode>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM verification_codes WHERE task_key = $1");
        sqlx::query_as::<_, VerificationCode>(&query)
            .bind(task_key)
            .fetch_optional(executor)
            .await
    }

    /// Expire every unused, still-valid code of `username`. Returns the count.
    pub async fn expire_unused_for_user<'e, E: PgExecutor<'e>>(
        executor: E,
        username: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE verification_codes SET expired_at = now()
             WHERE username = $1 AND is_used = false AND expired_at > now()",
        )
        .bind(username)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Consume a code: the check and the state change are one statement.
    ///
    /// Matches only when the id and secret agree, the code is unused, and it
    /// has not expired. Concurrent callers serialize on the row lock; the
    /// loser re-evaluates `is_used = false` after the winner commits and
    /// matches nothing. Returns `None` on any mismatch.
    pub async fn consume<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        secret_code: &str,
    ) -> Result<Option<VerificationCode>, sqlx::Error> {
        let query = format!(
            "UPDATE verification_codes
             SET is_used = true
             WHERE id = $1 AND secret_code = $2
               AND is_used = false AND expired_at > now()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VerificationCode>(&query)
            .bind(id)
            .bind(secret_code)
            .fetch_optional(executor)
            .await
    }
}
