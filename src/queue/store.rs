//! Task queue trait and types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Unique identifier for a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub i64);

/// A task retrieved from the queue: a worker type name and the
/// parameters to bind it with.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub id: TaskId,
    pub worker: String,
    pub params: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Error type for queue operations.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unknown worker type: {0}")]
    UnknownWorker(String),
}

/// Trait for queue backends. Delivery is at-least-once; idempotence is
/// the workers' responsibility.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task for the named worker type.
    async fn enqueue(&self, worker: &str, params: serde_json::Value)
        -> Result<TaskId, QueueError>;

    /// Claim up to `limit` pending tasks atomically.
    async fn claim(&self, limit: usize) -> Result<Vec<QueuedTask>, QueueError>;

    /// Reset tasks stuck in "running" state back to "pending".
    /// Call on startup to recover from crashes.
    /// Returns the number of tasks recovered.
    async fn recover_orphans(&self) -> Result<usize, QueueError> {
        Ok(0) // Default: no-op for queues that don't support recovery
    }

    /// Mark a task as completed.
    async fn complete(&self, id: TaskId) -> Result<(), QueueError>;

    /// Mark a task as failed with an error message.
    async fn fail(&self, id: TaskId, error: &str) -> Result<(), QueueError>;
}
