//! Repository for the `sessions` table.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::session::{CreateSession, Session};

const COLUMNS: &str = "id, username, refresh_token, user_agent, client_ip, \
                        is_blocked, expires_at, created_at";

/// Provides persistence operations for refresh-token sessions.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new session, returning the created row.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CreateSession,
    ) -> Result<Session, sqlx::Error> {
        let query = format!(
            "INSERT INTO sessions (id, username, refresh_token, user_agent, client_ip, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(input.id)
            .bind(&input.username)
            .bind(&input.refresh_token)
            .bind(&input.user_agent)
            .bind(&input.client_ip)
            .bind(input.expires_at)
            .fetch_one(executor)
            .await
    }

    /// Find a session by id regardless of its blocked/expired state.
    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
    ) -> Result<Option<Session>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sessions WHERE id = $1");
        sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Block a session. Returns `None` if it does not exist, otherwise
    /// whether this call changed it.
    pub async fn block<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
    ) -> Result<Option<bool>, sqlx::Error> {
        // The CTE reads the pre-update value so an already-blocked row still
        // reports as found.
        let row: Option<(bool,)> = sqlx::query_as(
            "WITH target AS (SELECT id, is_blocked FROM sessions WHERE id = $1 FOR UPDATE)
             UPDATE sessions s SET is_blocked = true
             FROM target
             WHERE s.id = target.id
             RETURNING NOT target.is_blocked",
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(row.map(|(changed,)| changed))
    }
}
