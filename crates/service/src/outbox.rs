//! Forwarding of committed outbox events to the task queue.
//!
//! Events are normally handed off right after the transaction that recorded
//! them. The relay picks up whatever that hand-off missed (queue down,
//! process crash) by polling for undispatched rows.

use std::sync::Arc;
use std::time::Duration;

use tessera_core::error::CoreError;
use tessera_db::repositories::OutboxRepo;
use tessera_db::{map_db_error, with_transaction, DbPool};
use tokio_util::sync::CancellationToken;

use crate::distributor::task_for_event;
use crate::ports::{EnqueueOutcome, TaskDistributor};

/// Counts from one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events now marked dispatched (including duplicates).
    pub dispatched: usize,
    /// Events whose task already existed.
    pub duplicates: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct OutboxRelay {
    pool: DbPool,
    distributor: Arc<dyn TaskDistributor>,
    batch_size: i64,
    poll_interval: Duration,
}

impl OutboxRelay {
    pub fn new(
        pool: DbPool,
        distributor: Arc<dyn TaskDistributor>,
        batch_size: i64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            distributor,
            batch_size,
            poll_interval,
        }
    }

    /// Forward up to `batch` undispatched events.
    ///
    /// The events stay row-locked (`SKIP LOCKED`) for the whole pass, so
    /// concurrent relays work on disjoint batches. Each event becomes a task
    /// keyed `outbox:{id}`; re-forwarding after a crash is a no-op at the
    /// queue.
    pub async fn dispatch_pending(&self, batch: i64) -> Result<DispatchReport, CoreError> {
        let distributor = Arc::clone(&self.distributor);

        with_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let events = OutboxRepo::claim_pending(&mut *conn, batch)
                    .await
                    .map_err(map_db_error)?;

                let mut report = DispatchReport::default();
                for event in events {
                    match distributor.enqueue(task_for_event(&event)).await {
                        Ok(outcome) => {
                            OutboxRepo::mark_dispatched(&mut *conn, event.id)
                                .await
                                .map_err(map_db_error)?;
                            report.dispatched += 1;
                            if outcome == EnqueueOutcome::Duplicate {
                                report.duplicates += 1;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                event_id = event.id,
                                attempts = event.attempts + 1,
                                error = %e,
                                "Outbox relay: enqueue failed",
                            );
                            OutboxRepo::record_failure(&mut *conn, event.id, &e.to_string())
                                .await
                                .map_err(map_db_error)?;
                            report.failed += 1;
                        }
                    }
                }

                Ok(report)
            })
        })
        .await
    }

    /// Poll until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            batch_size = self.batch_size,
            interval_ms = self.poll_interval.as_millis() as u64,
            "Outbox relay started"
        );

        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Outbox relay stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.dispatch_pending(self.batch_size).await {
                        Ok(report) if report.dispatched > 0 || report.failed > 0 => {
                            tracing::info!(
                                dispatched = report.dispatched,
                                duplicates = report.duplicates,
                                failed = report.failed,
                                "Outbox relay: pass complete"
                            );
                        }
                        Ok(_) => tracing::trace!("Outbox relay: nothing pending"),
                        Err(e) => tracing::error!(error = %e, "Outbox relay: pass failed"),
                    }
                }
            }
        }
    }
}
