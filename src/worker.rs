//! Worker execution contract: work items, errors, and the invocation
//! context shared by all worker types.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::log::{LogLevel, LogRecord, LogSink, TracingSink};
use crate::retry::{CallError, RetryPolicy};
use crate::sink::BatchSink;
use crate::storage::ObjectLister;
use crate::warehouse::Warehouse;
use crate::workers::waiter::PollConfig;

/// A follow-on unit of work destined for the external queue.
///
/// Creating one performs no I/O; items reach the queue only because the
/// harness drains the sequence a worker returns and submits each item in
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Registered worker type name.
    pub worker: String,
    /// Parameters for the named worker, satisfying its declared schema.
    pub params: serde_json::Value,
}

impl WorkItem {
    /// Create a work item for the named worker type.
    pub fn new(worker: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            worker: worker.into(),
            params,
        }
    }
}

/// Error raised by worker construction or execution.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// A declared parameter is missing or invalid. Fatal at construction,
    /// never retried.
    #[error("invalid parameter '{param}': {reason}")]
    Configuration { param: String, reason: String },

    /// Dispatch named a worker type that is not registered.
    #[error("unknown worker type '{0}'")]
    UnknownWorker(String),

    /// The tracked external job finished in an error state.
    #[error("external job '{job_id}' failed: {detail}")]
    ExternalJob { job_id: String, detail: String },

    /// Uniform wrapper for a failure escaping a worker's body. The
    /// original error stays reachable through the source chain.
    #[error("worker execution failed: {source}")]
    Execution {
        #[source]
        source: anyhow::Error,
    },
}

impl From<CallError> for WorkerError {
    fn from(err: CallError) -> Self {
        Self::Execution { source: err.into() }
    }
}

/// Shared collaborators handed to every worker invocation.
#[derive(Clone)]
pub struct WorkerEnv {
    warehouse: Arc<dyn Warehouse>,
    lister: Arc<dyn ObjectLister>,
    sink: Arc<dyn BatchSink>,
    log: Arc<dyn LogSink>,
    retry: RetryPolicy,
    poll: PollConfig,
}

impl WorkerEnv {
    /// Create an environment over the given external collaborators, with
    /// tracing-backed logging, a 5-attempt exponential retry ceiling, and
    /// default polling cadence.
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        lister: Arc<dyn ObjectLister>,
        sink: Arc<dyn BatchSink>,
    ) -> Self {
        Self {
            warehouse,
            lister,
            sink,
            log: Arc::new(TracingSink::new()),
            retry: RetryPolicy::exponential(5),
            poll: PollConfig::default(),
        }
    }

    /// Replace the log sink.
    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = log;
        self
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the polling cadence.
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// The paginated query source.
    pub fn warehouse(&self) -> &dyn Warehouse {
        self.warehouse.as_ref()
    }

    /// The object listing service.
    pub fn lister(&self) -> &dyn ObjectLister {
        self.lister.as_ref()
    }

    /// The batch delivery sink.
    pub fn sink(&self) -> &dyn BatchSink {
        self.sink.as_ref()
    }

    /// The retry policy applied by [`WorkerContext::retry`].
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The polling cadence for waiter loops.
    pub fn poll(&self) -> &PollConfig {
        &self.poll
    }
}

/// Per-invocation context: identity for logging plus the shared
/// environment. Constructed by the registry, owned by the worker.
#[derive(Clone)]
pub struct WorkerContext {
    env: WorkerEnv,
    worker_type: &'static str,
    instance_id: i64,
    execution_id: i64,
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("worker_type", &self.worker_type)
            .field("instance_id", &self.instance_id)
            .field("execution_id", &self.execution_id)
            .finish_non_exhaustive()
    }
}

impl WorkerContext {
    /// Create a context for one invocation of `worker_type`.
    pub fn new(env: WorkerEnv, worker_type: &'static str, instance_id: i64, execution_id: i64) -> Self {
        Self {
            env,
            worker_type,
            instance_id,
            execution_id,
        }
    }

    /// The shared environment.
    pub fn env(&self) -> &WorkerEnv {
        &self.env
    }

    /// The pipeline instance this invocation belongs to.
    pub fn instance_id(&self) -> i64 {
        self.instance_id
    }

    /// The queue execution this invocation runs under.
    pub fn execution_id(&self) -> i64 {
        self.execution_id
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.env.log.log(LogRecord {
            level,
            worker_type: self.worker_type.to_string(),
            instance_id: self.instance_id,
            execution_id: self.execution_id,
            message: message.to_string(),
        });
    }

    /// Emit an INFO record to the log sink.
    pub fn log_info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Emit a WARNING record to the log sink.
    pub fn log_warn(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    /// Emit an ERROR record to the log sink.
    pub fn log_error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Invoke an external call under the environment's retry policy.
    ///
    /// Transient failures are retried with backoff up to the policy's
    /// attempt ceiling; permanent failures propagate after one attempt.
    /// Every attempt is reported to the log sink with the operation name,
    /// attempt number, and elapsed time.
    pub async fn retry<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => {
                    self.log_info(&format!(
                        "{op}: attempt {attempt} succeeded in {:?}",
                        started.elapsed()
                    ));
                    return Ok(value);
                }
                Err(CallError::Permanent(err)) => {
                    self.log_error(&format!(
                        "{op}: attempt {attempt} rejected after {:?}: {err}",
                        started.elapsed()
                    ));
                    return Err(CallError::Permanent(err));
                }
                Err(CallError::Transient(err)) => {
                    match self.env.retry.delay_for_attempt(attempt) {
                        Some(delay) => {
                            self.log_warn(&format!(
                                "{op}: attempt {attempt} failed after {:?}, retrying in {delay:?}: {err}",
                                started.elapsed()
                            ));
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            self.log_error(&format!(
                                "{op}: gave up after {attempt} attempts in {:?}: {err}",
                                started.elapsed()
                            ));
                            return Err(CallError::Transient(err));
                        }
                    }
                }
            }
        }
    }
}

/// One schema-bound, retryable, enqueue-capable unit of execution.
///
/// Implementations supply the work body in [`run`](Worker::run); the
/// harness drives [`execute`](Worker::execute), which logs any terminal
/// failure before propagating it.
#[async_trait]
pub trait Worker: Send + Sync + std::fmt::Debug {
    /// The registered name of this worker type.
    fn worker_type(&self) -> &'static str;

    /// The invocation context.
    fn context(&self) -> &WorkerContext;

    /// The work body. Side effects happen here; the returned items are
    /// submitted to the queue by the harness, in order.
    async fn run(&self) -> Result<Vec<WorkItem>, WorkerError>;

    /// Drive the work body to completion.
    async fn execute(&self) -> Result<Vec<WorkItem>, WorkerError> {
        match self.run().await {
            Ok(items) => Ok(items),
            Err(err) => {
                self.context()
                    .log_error(&format!("worker execution failed: {err}"));
                Err(err)
            }
        }
    }
}
