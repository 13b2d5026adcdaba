//! # Baton
//!
//! A self-requeuing worker framework: workers execute in bounded time
//! slices, and any work that cannot finish hands itself off as a queued
//! continuation instead of blocking.
//!
//! Long-running, externally-asynchronous operations - a warehouse query
//! job, a paginated export, an HTTP batch sink - behave like a single
//! logical task while only ever running for a bounded slice, with
//! retries, exponential backoff, and a cap on fan-out.
//!
//! ## Why Baton?
//!
//! - **Continuations as data** - a worker emits `(worker type, params)`
//!   items; the harness submits them. Deciding to spawn work and
//!   submitting it are decoupled.
//! - **Bounded time slices** - polling loops carry a wall-clock budget
//!   and truncate themselves into a waiter continuation.
//! - **Classified retries** - external calls fail transient or
//!   permanent; only transient failures burn retry attempts.
//! - **Backpressure built in** - the export coordinator caps how many
//!   pages' worth of work can be queued at once.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use baton::{RunnerBuilder, SqliteQueue, WorkerEnv};
//!
//! let env = WorkerEnv::new(warehouse, lister, sink);
//! let queue = SqliteQueue::new(pool);
//! queue.run_migrations().await?;
//!
//! let runner = RunnerBuilder::new(queue, env)
//!     .max_concurrent(4)
//!     .build();
//!
//! runner.submit("export", serde_json::json!({
//!     "project_id": "acme",
//!     "dataset_id": "analytics",
//!     "table_id": "events",
//! })).await?;
//!
//! runner.run().await;
//! ```
//!
//! ## Custom workers
//!
//! Implement [`Worker`] plus [`WorkerDef`] and register the type:
//!
//! ```rust,ignore
//! let registry = WorkerRegistry::with_builtins().register::<MyWorker>();
//! ```
//!
//! ## Feature Flags
//!
//! - `sqlite` (default) - SQLite-backed task queue

pub mod log;
pub mod params;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod sink;
pub mod storage;
pub mod warehouse;
pub mod worker;
pub mod workers;

pub use log::{LogLevel, LogRecord, LogSink, NoopSink, TracingSink};
pub use params::{ParamKind, ParamSpec, Params};
pub use queue::{QueueError, QueuedTask, Runner, RunnerBuilder, TaskId, TaskQueue};
pub use registry::{WorkerDef, WorkerRegistry};
pub use retry::{CallError, RetryPolicy};
pub use scheduler::{PeriodicScheduler, SchedulerBuilder};
pub use sink::{BatchSink, HttpBatchSink};
pub use storage::{ObjectEntry, ObjectLister};
pub use warehouse::{AsyncJob, Field, FieldKind, JobState, QueryPage, TableRef, Warehouse};
pub use worker::{WorkItem, Worker, WorkerContext, WorkerEnv, WorkerError};
pub use workers::{
    begin_and_wait, expand_source_uris, ExportCoordinator, JobWaiter, PageExporter, PollConfig,
    StorageLoader,
};

#[cfg(feature = "sqlite")]
pub use queue::SqliteQueue;
