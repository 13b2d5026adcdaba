//! Paginated query source and asynchronous job seams.
//!
//! The warehouse is authoritative for job state; workers poll but never
//! own a job. Page cursors are opaque: `None` means start of stream, a
//! present cursor resumes after the page that produced it.

use std::fmt;

use async_trait::async_trait;

use crate::retry::CallError;

/// Fully-qualified table identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// Kind of a schema field, as reported by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
}

/// One field of the page schema.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// One page of query results: rows in field order, the schema that
/// describes them, and the cursor of the next page if one exists.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub rows: Vec<Vec<serde_json::Value>>,
    pub schema: Vec<Field>,
    pub next_cursor: Option<String>,
}

/// State of an externally-owned asynchronous job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Done,
}

/// Handle to a job owned by the external system.
///
/// Implementations refresh cached state behind interior mutability so
/// handles can be shared as trait objects. A job in [`JobState::Done`]
/// with an `error_result` finished in an error state.
#[async_trait]
pub trait AsyncJob: Send + Sync {
    /// The job's opaque identifier.
    fn id(&self) -> &str;

    /// Last observed state.
    fn state(&self) -> JobState;

    /// Error detail, present once the job has failed.
    fn error_result(&self) -> Option<String>;

    /// Start the job.
    async fn begin(&self) -> Result<(), CallError>;

    /// Refresh the observed state from the external system.
    async fn reload(&self) -> Result<(), CallError>;
}

/// Paginated read source plus the job surface needed to import into it.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Read one page of `table` starting at `cursor`.
    async fn query_page(
        &self,
        table: &TableRef,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<QueryPage, CallError>;

    /// Start a load of `source_uris` into `table`, returning the job
    /// handle.
    async fn begin_load(
        &self,
        table: &TableRef,
        source_uris: &[String],
    ) -> Result<Box<dyn AsyncJob>, CallError>;

    /// Reconstruct a handle to an existing job from its identifier.
    async fn job(&self, job_id: &str) -> Result<Box<dyn AsyncJob>, CallError>;
}
