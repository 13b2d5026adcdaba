//! Structured log sink for worker execution events.

/// Severity of a worker log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// The wire name of this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// One structured record emitted by a worker invocation.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: LogLevel,
    pub worker_type: String,
    pub instance_id: i64,
    pub execution_id: i64,
    pub message: String,
}

/// Receives worker log records. Fire-and-forget from the worker's
/// perspective; delivery guarantees are the sink's concern.
pub trait LogSink: Send + Sync {
    /// Accept one record.
    fn log(&self, record: LogRecord);
}

/// A no-op sink that discards all records.
///
/// Useful for testing or when log output is not needed.
#[derive(Debug, Clone, Default)]
pub struct NoopSink;

impl NoopSink {
    /// Create a new no-op sink.
    pub fn new() -> Self {
        Self
    }
}

impl LogSink for NoopSink {
    fn log(&self, _record: LogRecord) {}
}

/// Forwards records to the `tracing` subscriber as structured events.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Create a new tracing-backed sink.
    pub fn new() -> Self {
        Self
    }
}

impl LogSink for TracingSink {
    fn log(&self, record: LogRecord) {
        match record.level {
            LogLevel::Info => tracing::info!(
                worker = %record.worker_type,
                instance_id = record.instance_id,
                execution_id = record.execution_id,
                "{}",
                record.message
            ),
            LogLevel::Warning => tracing::warn!(
                worker = %record.worker_type,
                instance_id = record.instance_id,
                execution_id = record.execution_id,
                "{}",
                record.message
            ),
            LogLevel::Error => tracing::error!(
                worker = %record.worker_type,
                instance_id = record.instance_id,
                execution_id = record.execution_id,
                "{}",
                record.message
            ),
        }
    }
}
