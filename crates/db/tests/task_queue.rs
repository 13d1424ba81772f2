//! Integration tests for the `tasks` queue: idempotent enqueue, claiming,
//! leases, and retry scheduling.

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use tessera_db::models::task::{NewTask, TASK_STATE_ACTIVE, TASK_STATE_PENDING};
use tessera_db::repositories::TaskRepo;

const LEASE: Duration = Duration::from_secs(60);

fn new_task(key: &str, queue: &str) -> NewTask {
    NewTask {
        task_key: key.to_string(),
        task_type: "send_verify_email".to_string(),
        queue: queue.to_string(),
        payload: json!({ "username": "alice" }),
        max_retry: 3,
        process_at: Utc::now() - chrono::Duration::seconds(1),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_enqueue_is_idempotent_per_key(pool: PgPool) {
    let first = TaskRepo::enqueue(&pool, &new_task("k1", "critical")).await.unwrap();
    assert_eq!(first.unwrap().state, TASK_STATE_PENDING);

    let second = TaskRepo::enqueue(&pool, &new_task("k1", "critical")).await.unwrap();
    assert!(second.is_none());

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_claim_respects_queue_and_due_time(pool: PgPool) {
    let mut future = new_task("later", "critical");
    future.process_at = Utc::now() + chrono::Duration::hours(1);
    TaskRepo::enqueue(&pool, &future).await.unwrap();
    TaskRepo::enqueue(&pool, &new_task("now", "default")).await.unwrap();

    assert!(TaskRepo::claim_next(&pool, "critical", LEASE).await.unwrap().is_none());

    let claimed = TaskRepo::claim_next(&pool, "default", LEASE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.task_key, "now");
    assert_eq!(claimed.state, TASK_STATE_ACTIVE);
    assert!(claimed.lease_until.is_some());

    // Leased tasks are not handed out twice.
    assert!(TaskRepo::claim_next(&pool, "default", LEASE).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_lapsed_lease_is_redelivered(pool: PgPool) {
    TaskRepo::enqueue(&pool, &new_task("k1", "critical")).await.unwrap();
    let first = TaskRepo::claim_next(&pool, "critical", LEASE)
        .await
        .unwrap()
        .unwrap();

    sqlx::query("UPDATE tasks SET lease_until = now() - interval '1 second' WHERE id = $1")
        .bind(first.id)
        .execute(&pool)
        .await
        .unwrap();

    let again = TaskRepo::claim_next(&pool, "critical", LEASE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.retried, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_concurrent_claims_never_share_a_task(pool: PgPool) {
    TaskRepo::enqueue(&pool, &new_task("only", "critical")).await.unwrap();

    let (a, b) = tokio::join!(
        TaskRepo::claim_next(&pool, "critical", LEASE),
        TaskRepo::claim_next(&pool, "critical", LEASE),
    );

    let claimed = [a.unwrap(), b.unwrap()]
        .into_iter()
        .filter(Option::is_some)
        .count();
    assert_eq!(claimed, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_schedule_retry_and_delete(pool: PgPool) {
    TaskRepo::enqueue(&pool, &new_task("k1", "critical")).await.unwrap();
    let task = TaskRepo::claim_next(&pool, "critical", LEASE)
        .await
        .unwrap()
        .unwrap();

    assert!(TaskRepo::schedule_retry(&pool, task.id, Duration::from_secs(30), "smtp down")
        .await
        .unwrap());

    let retried = TaskRepo::find_by_key(&pool, "k1").await.unwrap().unwrap();
    assert_eq!(retried.retried, 1);
    assert_eq!(retried.state, TASK_STATE_PENDING);
    assert_eq!(retried.last_error.as_deref(), Some("smtp down"));
    assert!(retried.process_at > Utc::now());
    assert!(!retried.retries_exhausted());

    // Not due yet.
    assert!(TaskRepo::claim_next(&pool, "critical", LEASE).await.unwrap().is_none());

    assert!(TaskRepo::delete(&pool, task.id).await.unwrap());
    assert!(TaskRepo::find_by_key(&pool, "k1").await.unwrap().is_none());
}
