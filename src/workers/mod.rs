//! Built-in worker types.

pub mod export;
pub mod import;
pub mod waiter;

pub use export::{ExportCoordinator, PageExporter};
pub use import::{expand_source_uris, StorageLoader};
pub use waiter::{begin_and_wait, JobWaiter, PollConfig};
