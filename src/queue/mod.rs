//! Task queue: storage trait, SQLite implementation, and the polling
//! runner harness.

pub mod runner;
pub mod store;

#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use runner::{Runner, RunnerBuilder};
pub use store::{QueueError, QueuedTask, TaskId, TaskQueue};

#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteQueue;
