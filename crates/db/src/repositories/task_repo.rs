//! Repository for the `tasks` table, the durable task queue.
//!
//! Lifecycle: `enqueue` (pending) -> `claim_next` (active, leased) ->
//! `delete` on success or final failure, or `schedule_retry` back to pending.
//! An active task whose lease lapses is claimable again, which gives
//! at-least-once delivery across worker crashes.

use std::time::Duration;

use sqlx::PgExecutor;
use tessera_core::types::DbId;

use crate::models::task::{NewTask, Task, TASK_STATE_ACTIVE, TASK_STATE_PENDING};

const COLUMNS: &str = "\
    id, task_key, task_type, queue, payload, max_retry, retried, state, \
    process_at, lease_until, last_error, created_at";

/// Provides queue operations over the `tasks` table.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a task unless one with the same `task_key` exists.
    ///
    /// Returns `None` for a duplicate key.
    pub async fn enqueue<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &NewTask,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks (task_key, task_type, queue, payload, max_retry, process_at, state)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (task_key) DO NOTHING
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(&input.task_key)
            .bind(&input.task_type)
            .bind(&input.queue)
            .bind(&input.payload)
            .bind(input.max_retry)
            .bind(input.process_at)
            .bind(TASK_STATE_PENDING)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_key<'e, E: PgExecutor<'e>>(
        executor: E,
        task_key: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE task_key = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(task_key)
            .fetch_optional(executor)
            .await
    }

    /// Atomically claim the next ready task from `queue` and lease it.
    ///
    /// Ready means pending and due, or active with a lapsed lease. Uses
    /// `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers never claim the
    /// same row.
    pub async fn claim_next<'e, E: PgExecutor<'e>>(
        executor: E,
        queue: &str,
        lease: Duration,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks \
             SET state = $2, lease_until = now() + make_interval(secs => $3) \
             WHERE id = ( \
                 SELECT id FROM tasks \
                 WHERE queue = $1 \
                   AND ((state = $4 AND process_at <= now()) \
                     OR (state = $2 AND lease_until < now())) \
                 ORDER BY process_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(queue)
            .bind(TASK_STATE_ACTIVE)
            .bind(lease.as_secs_f64())
            .bind(TASK_STATE_PENDING)
            .fetch_optional(executor)
            .await
    }

    /// Remove a task (acknowledged, skipped, or out of retries).
    pub async fn delete<'e, E: PgExecutor<'e>>(executor: E, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Return a failed task to the queue after `delay`, counting the attempt.
    pub async fn schedule_retry<'e, E: PgExecutor<'e>>(
        executor: E,
        id: DbId,
        delay: Duration,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET
                state = $2,
                retried = retried + 1,
                process_at = now() + make_interval(secs => $3),
                lease_until = NULL,
                last_error = $4
             WHERE id = $1",
        )
        .bind(id)
        .bind(TASK_STATE_PENDING)
        .bind(delay.as_secs_f64())
        .bind(error)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
