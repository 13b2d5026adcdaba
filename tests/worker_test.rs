//! Tests for the worker execution contract: parameter binding at
//! construction, work-item emission order, retry accounting, and
//! terminal-failure logging.

use async_trait::async_trait;
use baton::{
    AsyncJob, BatchSink, CallError, LogLevel, LogRecord, LogSink, ObjectLister, ParamKind,
    ParamSpec, Params, QueryPage, RetryPolicy, TableRef, WorkItem, Worker, WorkerContext,
    WorkerDef, WorkerEnv, WorkerError, WorkerRegistry,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct NoWarehouse;

#[async_trait]
impl baton::Warehouse for NoWarehouse {
    async fn query_page(
        &self,
        _table: &TableRef,
        _cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<QueryPage, CallError> {
        Err(CallError::permanent(anyhow::anyhow!("not configured")))
    }

    async fn begin_load(
        &self,
        _table: &TableRef,
        _source_uris: &[String],
    ) -> Result<Box<dyn AsyncJob>, CallError> {
        Err(CallError::permanent(anyhow::anyhow!("not configured")))
    }

    async fn job(&self, _job_id: &str) -> Result<Box<dyn AsyncJob>, CallError> {
        Err(CallError::permanent(anyhow::anyhow!("not configured")))
    }
}

struct NoLister;

#[async_trait]
impl ObjectLister for NoLister {
    async fn list(&self, _prefix: &str) -> Result<Vec<baton::ObjectEntry>, CallError> {
        Err(CallError::permanent(anyhow::anyhow!("not configured")))
    }
}

struct NoSink;

#[async_trait]
impl BatchSink for NoSink {
    async fn send_batch(&self, _payload: &str) -> Result<(), CallError> {
        Err(CallError::permanent(anyhow::anyhow!("not configured")))
    }
}

#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl LogSink for MemorySink {
    fn log(&self, record: LogRecord) {
        self.records.lock().unwrap().push(record);
    }
}

fn env() -> WorkerEnv {
    WorkerEnv::new(Arc::new(NoWarehouse), Arc::new(NoLister), Arc::new(NoSink))
}

// Worker that emits one item per configured target, in order.
#[derive(Debug)]
struct FanOutWorker {
    ctx: WorkerContext,
    targets: Vec<String>,
}

impl WorkerDef for FanOutWorker {
    const NAME: &'static str = "fan_out";

    fn params() -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("targets", ParamKind::StringList, "Downstream worker types"),
            ParamSpec::with_default("tag", ParamKind::String, "default", "Forwarded marker"),
        ]
    }

    fn build(params: Params, ctx: WorkerContext) -> Result<Self, WorkerError> {
        Ok(Self {
            targets: params.str_list("targets")?,
            ctx,
        })
    }
}

#[async_trait]
impl Worker for FanOutWorker {
    fn worker_type(&self) -> &'static str {
        Self::NAME
    }

    fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    async fn run(&self) -> Result<Vec<WorkItem>, WorkerError> {
        Ok(self
            .targets
            .iter()
            .map(|target| WorkItem::new(target.clone(), json!({"from": Self::NAME})))
            .collect())
    }
}

// Worker whose body always fails with a transient call error.
#[derive(Debug)]
struct DoomedWorker {
    ctx: WorkerContext,
}

impl WorkerDef for DoomedWorker {
    const NAME: &'static str = "doomed";

    fn params() -> Vec<ParamSpec> {
        Vec::new()
    }

    fn build(_params: Params, ctx: WorkerContext) -> Result<Self, WorkerError> {
        Ok(Self { ctx })
    }
}

#[async_trait]
impl Worker for DoomedWorker {
    fn worker_type(&self) -> &'static str {
        Self::NAME
    }

    fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    async fn run(&self) -> Result<Vec<WorkItem>, WorkerError> {
        Err(CallError::transient(anyhow::anyhow!("upstream hiccup")).into())
    }
}

#[test]
fn test_work_item_is_inert() {
    let params = json!({"page_token": "abc"});
    let item = WorkItem::new("page_export", params.clone());
    assert_eq!(item.worker, "page_export");
    assert_eq!(item.params, params);
}

#[tokio::test]
async fn test_execute_emits_items_in_order() {
    let registry = WorkerRegistry::new().register::<FanOutWorker>();
    let worker = registry
        .build(
            "fan_out",
            &json!({"targets": ["alpha", "beta", "gamma"]}),
            &env(),
            1,
            1,
        )
        .unwrap();

    let items = worker.execute().await.unwrap();
    let names: Vec<&str> = items.iter().map(|i| i.worker.as_str()).collect();
    assert_eq!(names, ["alpha", "beta", "gamma"]);
}

#[tokio::test]
async fn test_missing_required_param_fails_construction() {
    let registry = WorkerRegistry::new().register::<FanOutWorker>();
    let err = registry
        .build("fan_out", &json!({"tag": "x"}), &env(), 1, 1)
        .unwrap_err();
    match err {
        WorkerError::Configuration { param, .. } => assert_eq!(param, "targets"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unknown_worker_fails_fast() {
    let registry = WorkerRegistry::new().register::<FanOutWorker>();
    let err = registry
        .build("fan_in", &json!({}), &env(), 1, 1)
        .unwrap_err();
    assert!(matches!(err, WorkerError::UnknownWorker(name) if name == "fan_in"));
}

#[tokio::test]
async fn test_execute_logs_and_propagates_failure() {
    let sink = Arc::new(MemorySink::default());
    let env = env().with_log(sink.clone());
    let registry = WorkerRegistry::new().register::<DoomedWorker>();
    let worker = registry.build("doomed", &json!({}), &env, 7, 42).unwrap();

    let err = worker.execute().await.unwrap_err();
    assert!(matches!(err, WorkerError::Execution { .. }));

    let records = sink.records.lock().unwrap();
    let last = records.last().unwrap();
    assert_eq!(last.level, LogLevel::Error);
    assert_eq!(last.level.as_str(), "ERROR");
    assert_eq!(last.worker_type, "doomed");
    assert_eq!(last.instance_id, 7);
    assert_eq!(last.execution_id, 42);
}

#[tokio::test]
async fn test_retry_transient_then_success() {
    let env = env().with_retry(RetryPolicy::fixed(5, Duration::from_millis(1)));
    let ctx = WorkerContext::new(env, "test", 1, 1);

    let calls = AtomicUsize::new(0);
    let result: Result<&str, CallError> = ctx
        .retry("flaky call", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CallError::transient(anyhow::anyhow!("try again")))
            } else {
                Ok("done")
            }
        })
        .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_permanent_attempts_once() {
    let env = env().with_retry(RetryPolicy::fixed(5, Duration::from_millis(1)));
    let ctx = WorkerContext::new(env, "test", 1, 1);

    let calls = AtomicUsize::new(0);
    let result: Result<(), CallError> = ctx
        .retry("rejected call", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CallError::permanent(anyhow::anyhow!("bad request")))
        })
        .await;

    assert!(matches!(result.unwrap_err(), CallError::Permanent(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_exhaustion_logs_error() {
    let sink = Arc::new(MemorySink::default());
    let env = env()
        .with_retry(RetryPolicy::fixed(3, Duration::from_millis(1)))
        .with_log(sink.clone());
    let ctx = WorkerContext::new(env, "test", 1, 1);

    let calls = AtomicUsize::new(0);
    let result: Result<(), CallError> = ctx
        .retry("hopeless call", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CallError::transient(anyhow::anyhow!("still down")))
        })
        .await;

    assert!(matches!(result.unwrap_err(), CallError::Transient(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let records = sink.records.lock().unwrap();
    assert_eq!(records.last().unwrap().level, LogLevel::Error);
    let warnings = records
        .iter()
        .filter(|r| r.level == LogLevel::Warning)
        .count();
    assert_eq!(warnings, 2);
}
