//! Repository for the `outbox_events` table.

use sqlx::PgExecutor;
use tessera_core::types::DbId;

use crate::models::outbox::{NewOutboxEvent, OutboxEvent};

const COLUMNS: &str = "id, event_type, payload, attempts, last_error, created_at, dispatched_at";

/// Provides persistence operations for outbox events.
pub struct OutboxRepo;

impl OutboxRepo {
    /// Record an event. Call inside the transaction of the triggering write.
    pub async fn insert<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &NewOutboxEvent,
    ) -> Result<OutboxEvent, sqlx::Error> {
        let query = format!(
            "INSERT INTO outbox_events (event_type, payload)
             VALUES ($1, $2)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OutboxEvent>(&query)
            .bind(&input.event_type)
            .bind(&input.payload)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<Option<OutboxEvent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM outbox_events WHERE id = $1");
        sqlx::query_as::<_, OutboxEvent>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Lock up to `limit` undispatched events, oldest first.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent relays split the backlog
    /// instead of dispatching the same event twice. The locks are held until
    /// the surrounding transaction ends.
    pub async fn claim_pending<'e, E: PgExecutor<'e>>(
        executor: E,
        limit: i64,
    ) -> Result<Vec<OutboxEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM outbox_events
             WHERE dispatched_at IS NULL
             ORDER BY id
             LIMIT $1
             FOR UPDATE SKIP LOCKED"
        );
        sqlx::query_as::<_, OutboxEvent>(&query)
            .bind(limit)
            .fetch_all(executor)
            .await
    }

    /// Stamp `dispatched_at`. Returns `false` if it was already set.
    pub async fn mark_dispatched<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE outbox_events SET dispatched_at = now()
             WHERE id = $1 AND dispatched_at IS NULL",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count a failed dispatch attempt and keep the last error message.
    pub async fn record_failure<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE outbox_events SET attempts = attempts + 1, last_error = $2
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(executor)
        .await?;
        Ok(())
    }
}
