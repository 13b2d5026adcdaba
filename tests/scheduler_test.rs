#![cfg(feature = "sqlite")]

//! Tests for PeriodicScheduler.

use baton::{SchedulerBuilder, SqliteQueue, TaskQueue};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::time::Duration;

async fn setup_queue() -> (SqliteQueue, SqlitePool) {
    // A single connection: in-memory SQLite databases are per-connection.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    let queue = SqliteQueue::new(pool.clone());
    queue.run_migrations().await.unwrap();
    (queue, pool)
}

#[tokio::test]
async fn test_scheduler_enqueues_kickoffs() {
    let (queue, pool) = setup_queue().await;

    let params = serde_json::json!({
        "project_id": "acme",
        "dataset_id": "analytics",
        "table_id": "events",
    });
    let scheduler = SchedulerBuilder::new(queue)
        .every(Duration::from_millis(50), "export", params.clone())
        .run_on_start(true)
        .build();

    let handle = tokio::spawn(async move { scheduler.run().await });

    tokio::time::sleep(Duration::from_millis(120)).await;

    // Verify kickoffs were enqueued - new queue handle over the same pool
    let verify_queue = SqliteQueue::new(pool);
    let tasks = verify_queue.claim(10).await.unwrap();
    assert!(!tasks.is_empty());
    assert!(tasks.iter().all(|t| t.worker == "export"));
    assert_eq!(tasks[0].params, params);

    handle.abort();
}

#[tokio::test]
async fn test_scheduler_waits_for_interval_without_run_on_start() {
    let (queue, pool) = setup_queue().await;

    let scheduler = SchedulerBuilder::new(queue)
        .every(
            Duration::from_secs(60),
            "storage_load",
            serde_json::json!({}),
        )
        .build();

    let handle = tokio::spawn(async move { scheduler.run().await });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let verify_queue = SqliteQueue::new(pool);
    let tasks = verify_queue.claim(10).await.unwrap();
    assert!(tasks.is_empty());

    handle.abort();
}
