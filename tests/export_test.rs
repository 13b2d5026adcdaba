//! Tests for the paginated export pair: processor batching and
//! delivery, and the coordinator's bounded fan-out.

use async_trait::async_trait;
use baton::{
    AsyncJob, BatchSink, CallError, Field, FieldKind, LogLevel, LogRecord, LogSink, ObjectEntry,
    ObjectLister, QueryPage, RetryPolicy, TableRef, Worker, WorkerEnv, WorkerRegistry,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Warehouse serving canned pages keyed by cursor.
struct PagedWarehouse {
    pages: HashMap<Option<String>, QueryPage>,
}

impl PagedWarehouse {
    fn new(pages: Vec<(Option<&str>, QueryPage)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(cursor, page)| (cursor.map(str::to_string), page))
                .collect(),
        }
    }
}

#[async_trait]
impl baton::Warehouse for PagedWarehouse {
    async fn query_page(
        &self,
        _table: &TableRef,
        cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<QueryPage, CallError> {
        self.pages
            .get(&cursor.map(str::to_string))
            .cloned()
            .ok_or_else(|| CallError::permanent(anyhow::anyhow!("no page at cursor {cursor:?}")))
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
    async fn list(&self, _prefix: &str) -> Result<Vec<ObjectEntry>, CallError> {
        Err(CallError::permanent(anyhow::anyhow!("not configured")))
    }
}

// Sink recording every delivered payload.
#[derive(Default)]
struct RecordingSink {
    payloads: Mutex<Vec<String>>,
}

#[async_trait]
impl BatchSink for RecordingSink {
    async fn send_batch(&self, payload: &str) -> Result<(), CallError> {
        self.payloads.lock().unwrap().push(payload.to_string());
        Ok(())
    }
}

// Sink that fails every delivery, the way an HTTP 5xx would.
#[derive(Default)]
struct UnavailableSink {
    attempts: AtomicUsize,
}

#[async_trait]
impl BatchSink for UnavailableSink {
    async fn send_batch(&self, _payload: &str) -> Result<(), CallError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CallError::transient(anyhow::anyhow!(
            "sink returned 500 Internal Server Error"
        )))
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

fn schema() -> Vec<Field> {
    vec![
        Field::new("tid", FieldKind::String),
        Field::new("cid", FieldKind::String),
        Field::new("t", FieldKind::String),
        Field::new("ev", FieldKind::Float),
        Field::new("ua", FieldKind::String),
    ]
}

fn row(ev: f64) -> Vec<Value> {
    vec![
        json!("UA-12345-1"),
        json!("35009a79-1a05-49d7-b876-2b884d0f825b"),
        json!("event"),
        json!(ev),
        json!("User Agent / 1.0"),
    ]
}

fn source_params() -> Value {
    json!({
        "project_id": "acme",
        "dataset_id": "analytics",
        "table_id": "events",
        "batch_size": 20,
    })
}

#[tokio::test]
async fn test_processor_ships_one_batch() {
    let warehouse = PagedWarehouse::new(vec![(
        None,
        QueryPage {
            rows: vec![row(0.9), row(0.8)],
            schema: schema(),
            next_cursor: None,
        },
    )]);
    let sink = Arc::new(RecordingSink::default());
    let env = WorkerEnv::new(Arc::new(warehouse), Arc::new(NoLister), sink.clone());

    let registry = WorkerRegistry::with_builtins();
    let worker = registry
        .build("page_export", &source_params(), &env, 1, 1)
        .unwrap();

    let items = worker.execute().await.unwrap();
    assert!(items.is_empty());

    let payloads = sink.payloads.lock().unwrap();
    assert_eq!(payloads.len(), 1);
    assert_eq!(
        payloads[0],
        "tid=UA-12345-1&cid=35009a79-1a05-49d7-b876-2b884d0f825b&t=event&ev=0.9&ua=User+Agent+%2F+1.0&v=1\n\
         tid=UA-12345-1&cid=35009a79-1a05-49d7-b876-2b884d0f825b&t=event&ev=0.8&ua=User+Agent+%2F+1.0&v=1"
    );
}

#[tokio::test]
async fn test_processor_batches_by_configured_size() {
    let warehouse = PagedWarehouse::new(vec![(
        None,
        QueryPage {
            rows: vec![row(0.9), row(0.8), row(0.7)],
            schema: schema(),
            next_cursor: None,
        },
    )]);
    let sink = Arc::new(RecordingSink::default());
    let env = WorkerEnv::new(Arc::new(warehouse), Arc::new(NoLister), sink.clone());

    let mut params = source_params();
    params["batch_size"] = json!(2);
    let registry = WorkerRegistry::with_builtins();
    let worker = registry.build("page_export", &params, &env, 1, 1).unwrap();
    worker.execute().await.unwrap();

    // Two full records, then a short final batch.
    let payloads = sink.payloads.lock().unwrap();
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[0].lines().count(), 2);
    assert_eq!(payloads[1].lines().count(), 1);
}

#[tokio::test]
async fn test_processor_abandons_page_when_sink_unavailable() {
    let warehouse = PagedWarehouse::new(vec![(
        None,
        QueryPage {
            rows: vec![row(0.9)],
            schema: schema(),
            next_cursor: None,
        },
    )]);
    let sink = Arc::new(UnavailableSink::default());
    let log = Arc::new(MemorySink::default());
    let env = WorkerEnv::new(Arc::new(warehouse), Arc::new(NoLister), sink.clone())
        .with_retry(RetryPolicy::fixed(3, Duration::from_millis(1)))
        .with_log(log.clone());

    let registry = WorkerRegistry::with_builtins();
    let worker = registry
        .build("page_export", &source_params(), &env, 1, 1)
        .unwrap();

    // The page is abandoned, not failed: no items, no error.
    let items = worker.execute().await.unwrap();
    assert!(items.is_empty());
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);

    let records = log.records.lock().unwrap();
    assert!(records.iter().any(|r| r.level == LogLevel::Error));
}

fn two_pages() -> PagedWarehouse {
    PagedWarehouse::new(vec![
        (
            None,
            QueryPage {
                rows: vec![row(0.9)],
                schema: schema(),
                next_cursor: Some("abc".to_string()),
            },
        ),
        (
            Some("abc"),
            QueryPage {
                rows: vec![row(0.8)],
                schema: schema(),
                next_cursor: None,
            },
        ),
    ])
}

#[tokio::test]
async fn test_coordinator_respects_fan_out_cap() {
    let sink = Arc::new(RecordingSink::default());
    let env = WorkerEnv::new(Arc::new(two_pages()), Arc::new(NoLister), sink);

    let mut params = source_params();
    params["max_enqueued_pages"] = json!(1);
    let registry = WorkerRegistry::with_builtins();
    let worker = registry.build("export", &params, &env, 1, 1).unwrap();

    let items = worker.execute().await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].worker, "page_export");
    assert_eq!(items[0].params["page_token"], Value::Null);
    assert_eq!(items[1].worker, "export");
    assert_eq!(items[1].params["page_token"], "abc");
    assert_eq!(items[1].params["max_enqueued_pages"], 1);
}

#[tokio::test]
async fn test_coordinator_final_page_enqueues_processor_only() {
    let sink = Arc::new(RecordingSink::default());
    let env = WorkerEnv::new(Arc::new(two_pages()), Arc::new(NoLister), sink);

    let mut params = source_params();
    params["page_token"] = json!("abc");
    params["max_enqueued_pages"] = json!(1);
    let registry = WorkerRegistry::with_builtins();
    let worker = registry.build("export", &params, &env, 1, 1).unwrap();

    let items = worker.execute().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].worker, "page_export");
    assert_eq!(items[0].params["page_token"], "abc");
}

#[tokio::test]
async fn test_coordinator_walks_all_pages_under_cap() {
    let sink = Arc::new(RecordingSink::default());
    let env = WorkerEnv::new(Arc::new(two_pages()), Arc::new(NoLister), sink);

    let registry = WorkerRegistry::with_builtins();
    let worker = registry
        .build("export", &source_params(), &env, 1, 1)
        .unwrap();

    // Default cap (5) covers both pages: one processor each, no
    // coordinator continuation.
    let items = worker.execute().await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].worker, "page_export");
    assert_eq!(items[0].params["page_token"], Value::Null);
    assert_eq!(items[1].worker, "page_export");
    assert_eq!(items[1].params["page_token"], "abc");
}
