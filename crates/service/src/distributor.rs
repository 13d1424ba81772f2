//! Producer side of the PostgreSQL task queue.

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tessera_core::error::CoreError;
use tessera_core::tasks::{outbox_task_key, Queue, TaskOptions, TASK_SEND_VERIFY_EMAIL};
use tessera_db::models::outbox::OutboxEvent;
use tessera_db::models::task::NewTask;
use tessera_db::repositories::TaskRepo;
use tessera_db::{map_db_error, DbPool};

use crate::ports::{EnqueueOutcome, TaskDistributor};

/// Build a task row that becomes claimable after `options.process_in`.
pub fn new_task(
    task_key: &str,
    task_type: &str,
    payload: serde_json::Value,
    options: TaskOptions,
) -> NewTask {
    let delay = TimeDelta::from_std(options.process_in).unwrap_or(TimeDelta::zero());
    NewTask {
        task_key: task_key.to_string(),
        task_type: task_type.to_string(),
        queue: options.queue.name().to_string(),
        payload,
        max_retry: options.max_retry,
        process_at: Utc::now() + delay,
    }
}

/// Enqueue options for the task an outbox event turns into.
pub fn options_for_event(event_type: &str) -> TaskOptions {
    match event_type {
        TASK_SEND_VERIFY_EMAIL => TaskOptions::default(),
        _ => TaskOptions {
            queue: Queue::Default,
            ..TaskOptions::default()
        },
    }
}

/// The task for an outbox event. Its key is derived from the event id, so
/// forwarding the same event twice enqueues once.
pub fn task_for_event(event: &OutboxEvent) -> NewTask {
    new_task(
        &outbox_task_key(event.id),
        &event.event_type,
        event.payload.clone(),
        options_for_event(&event.event_type),
    )
}

/// [`TaskDistributor`] writing to the `tasks` table.
#[derive(Clone)]
pub struct PgTaskDistributor {
    pool: DbPool,
}

impl PgTaskDistributor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskDistributor for PgTaskDistributor {
    async fn enqueue(&self, task: NewTask) -> Result<EnqueueOutcome, CoreError> {
        let inserted = TaskRepo::enqueue(&self.pool, &task)
            .await
            .map_err(map_db_error)?;

        match inserted {
            Some(row) => {
                tracing::info!(
                    task_id = row.id,
                    task_key = %row.task_key,
                    task_type = %row.task_type,
                    queue = %row.queue,
                    max_retry = row.max_retry,
                    "Enqueued task",
                );
                Ok(EnqueueOutcome::Enqueued)
            }
            None => {
                tracing::debug!(task_key = %task.task_key, "Task already enqueued");
                Ok(EnqueueOutcome::Duplicate)
            }
        }
    }
}
