//! Task processor: the consumer side of the PostgreSQL task queue.
//!
//! Runs `concurrency` polling loops. Each loop claims one task at a time with
//! [`TaskRepo::claim_next`] (`FOR UPDATE SKIP LOCKED`), picks the queue to
//! poll first by weighted random choice, and settles the task according to
//! the handler's result:
//!
//! | Result               | Effect                                         |
//! |----------------------|------------------------------------------------|
//! | `Ok(())`             | task deleted                                   |
//! | `Err(Retry)`         | rescheduled after `2^retried` s (capped), or dropped once `retried >= max_retry` |
//! | `Err(Skip)`          | task dropped                                   |
//! | no handler for type  | task dropped                                   |
//!
//! A handler that panics or overruns `task_timeout` counts as `Retry`.
//!
//! A worker that dies mid-task leaves the row `active`; once its lease lapses
//! another loop claims it again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tessera_core::error::CoreError;
use tessera_core::tasks::{retry_delay_secs, Queue};
use tessera_db::models::task::Task;
use tessera_db::repositories::TaskRepo;
use tessera_db::{map_db_error, DbPool};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::handler::{TaskError, TaskHandler};

/// Extra lease time beyond the handler timeout before a task is redelivered.
const LEASE_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Number of concurrent polling loops.
    pub concurrency: usize,
    /// Idle wait between polls when every queue is empty.
    pub poll_interval: Duration,
    /// Upper bound on one handler run; a timeout counts as retryable.
    pub task_timeout: Duration,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(500),
            task_timeout: Duration::from_secs(60),
        }
    }
}

/// What happened to a claimed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Retrying { delay_secs: i64 },
    Dropped { reason: String },
}

pub struct TaskProcessor {
    pool: DbPool,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    settings: ProcessorSettings,
}

impl TaskProcessor {
    pub fn new(pool: DbPool, settings: ProcessorSettings) -> Self {
        Self {
            pool,
            handlers: HashMap::new(),
            settings,
        }
    }

    /// Route tasks of `task_type` to `handler`.
    pub fn register(mut self, task_type: &str, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(task_type.to_string(), handler);
        self
    }

    fn lease(&self) -> Duration {
        self.settings.task_timeout + LEASE_MARGIN
    }

    /// Run the polling loops until `cancel` fires.
    ///
    /// Cancellation stops new claims; a task already being handled runs to
    /// completion before its loop exits. Returns once every loop has exited.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            concurrency = self.settings.concurrency,
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            task_types = ?self.handlers.keys().collect::<Vec<_>>(),
            "Task processor started",
        );

        let mut loops = JoinSet::new();
        for worker in 0..self.settings.concurrency {
            let this = Arc::clone(&self);
            let cancel = cancel.clone();
            loops.spawn(async move { this.poll_loop(worker, cancel).await });
        }

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Task processor loop panicked");
            }
        }
        tracing::info!("Task processor stopped");
    }

    async fn poll_loop(&self, worker: usize, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(worker, "Processor loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    // Drain ready tasks before going back to sleep.
                    while !cancel.is_cancelled() {
                        match self.process_next().await {
                            Ok(Some(_)) => continue,
                            Ok(None) => break,
                            Err(e) => {
                                tracing::error!(worker, error = %e, "Failed to poll task queue");
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Claim and settle at most one task. `Ok(None)` when every queue is idle.
    pub async fn process_next(&self) -> Result<Option<TaskOutcome>, CoreError> {
        let order = queue_order(&mut rand::rng());
        for queue in order {
            let claimed = TaskRepo::claim_next(&self.pool, queue.name(), self.lease())
                .await
                .map_err(map_db_error)?;
            if let Some(task) = claimed {
                return self.execute(task).await.map(Some);
            }
        }
        Ok(None)
    }

    async fn execute(&self, task: Task) -> Result<TaskOutcome, CoreError> {
        let Some(handler) = self.handlers.get(&task.task_type) else {
            tracing::warn!(
                task_id = task.id,
                task_type = %task.task_type,
                "No handler registered for task type; dropping",
            );
            return self.drop_task(&task, "unknown task type").await;
        };

        tracing::debug!(
            task_id = task.id,
            task_key = %task.task_key,
            task_type = %task.task_type,
            retried = task.retried,
            "Processing task",
        );

        let result = self.run_handler(Arc::clone(handler), task.clone()).await;

        match result {
            Ok(()) => {
                TaskRepo::delete(&self.pool, task.id)
                    .await
                    .map_err(map_db_error)?;
                tracing::info!(task_id = task.id, task_type = %task.task_type, "Task completed");
                Ok(TaskOutcome::Completed)
            }
            Err(TaskError::Skip(reason)) => {
                tracing::warn!(task_id = task.id, task_type = %task.task_type, reason = %reason, "Task skipped");
                self.drop_task(&task, &reason).await
            }
            Err(TaskError::Retry(reason)) if task.retries_exhausted() => {
                tracing::error!(
                    task_id = task.id,
                    task_type = %task.task_type,
                    payload = %task.payload,
                    retried = task.retried,
                    error = %reason,
                    "Task failed; retries exhausted",
                );
                self.drop_task(&task, &reason).await
            }
            Err(TaskError::Retry(reason)) => {
                let delay_secs = retry_delay_secs(task.retried);
                tracing::warn!(
                    task_id = task.id,
                    task_type = %task.task_type,
                    retried = task.retried + 1,
                    delay_secs,
                    error = %reason,
                    "Task failed; retrying",
                );
                TaskRepo::schedule_retry(
                    &self.pool,
                    task.id,
                    Duration::from_secs(delay_secs as u64),
                    &reason,
                )
                .await
                .map_err(map_db_error)?;
                Ok(TaskOutcome::Retrying { delay_secs })
            }
        }
    }

    /// Run the handler on its own tokio task so a panic surfaces as a
    /// retryable failure instead of unwinding the poll loop.
    async fn run_handler(&self, handler: Arc<dyn TaskHandler>, task: Task) -> Result<(), TaskError> {
        let task_id = task.id;
        let mut run = tokio::spawn(async move { handler.handle(&task).await });

        match tokio::time::timeout(self.settings.task_timeout, &mut run).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_panic() => {
                tracing::error!(task_id, "Task handler panicked");
                Err(TaskError::Retry("handler panicked".into()))
            }
            Ok(Err(e)) => Err(TaskError::Retry(format!("handler aborted: {e}"))),
            Err(_) => {
                run.abort();
                Err(TaskError::Retry("handler timed out".into()))
            }
        }
    }

    async fn drop_task(&self, task: &Task, reason: &str) -> Result<TaskOutcome, CoreError> {
        TaskRepo::delete(&self.pool, task.id)
            .await
            .map_err(map_db_error)?;
        Ok(TaskOutcome::Dropped {
            reason: reason.to_string(),
        })
    }
}

/// Order in which to poll the queues: the first is drawn with probability
/// proportional to its weight, the rest follow by the same rule.
pub fn queue_order<R: Rng + ?Sized>(rng: &mut R) -> Vec<Queue> {
    let mut remaining: Vec<Queue> = Queue::ALL.to_vec();
    let mut order = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let total: u32 = remaining.iter().map(|q| q.weight()).sum();
        let mut pick = rng.random_range(0..total);
        let idx = remaining
            .iter()
            .position(|q| {
                if pick < q.weight() {
                    true
                } else {
                    pick -= q.weight();
                    false
                }
            })
            .unwrap_or(0);
        order.push(remaining.remove(idx));
    }
    order
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn every_queue_is_polled_once() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let order = queue_order(&mut rng);
            assert_eq!(order.len(), 2);
            assert!(order.contains(&Queue::Critical));
            assert!(order.contains(&Queue::Default));
        }
    }

    #[test]
    fn critical_goes_first_about_two_thirds_of_the_time() {
        let mut rng = StdRng::seed_from_u64(42);
        let runs = 3000;
        let critical_first = (0..runs)
            .filter(|_| queue_order(&mut rng)[0] == Queue::Critical)
            .count();

        let share = critical_first as f64 / runs as f64;
        assert!((0.6..0.73).contains(&share), "critical share was {share}");
    }
}
