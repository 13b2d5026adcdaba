//! Paginated export: a one-page processor and the multi-page coordinator.
//!
//! The coordinator walks cursors and enqueues one [`PageExporter`] per
//! page, bounded by a fan-out cap; past the cap it enqueues a single
//! continuation of itself with the next cursor, keeping the chain
//! strictly linear. Each processor reads exactly one page, transforms
//! rows schema-driven, and ships them to the sink in batches.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::params::{ParamKind, ParamSpec, Params};
use crate::registry::WorkerDef;
use crate::warehouse::{Field, FieldKind, TableRef};
use crate::worker::{WorkItem, Worker, WorkerContext, WorkerError};

/// Protocol version pair appended to every encoded record.
const PROTOCOL_VERSION: (&str, &str) = ("v", "1");

/// Row budget for coordinator probe reads; just enough to learn the
/// next cursor.
const PROBE_PAGE_SIZE: u32 = 1;

const DEFAULT_PAGE_SIZE: u32 = 1000;
const DEFAULT_BATCH_SIZE: u32 = 20;
const DEFAULT_MAX_ENQUEUED_PAGES: u32 = 5;

fn source_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::required("project_id", ParamKind::String, "Source project"),
        ParamSpec::required("dataset_id", ParamKind::String, "Source dataset"),
        ParamSpec::required("table_id", ParamKind::String, "Source table"),
        ParamSpec::optional(
            "page_token",
            ParamKind::String,
            "Resume cursor; absent means start of stream",
        ),
        ParamSpec::with_default(
            "page_size",
            ParamKind::Number,
            DEFAULT_PAGE_SIZE,
            "Rows per read page",
        ),
        ParamSpec::with_default(
            "batch_size",
            ParamKind::Number,
            DEFAULT_BATCH_SIZE,
            "Records per sink batch",
        ),
    ]
}

fn encode_record(schema: &[Field], row: &[Value]) -> String {
    let mut encoded = form_urlencoded::Serializer::new(String::new());
    for (field, value) in schema.iter().zip(row) {
        encoded.append_pair(&field.name, &render_value(field.kind, value));
    }
    let (name, version) = PROTOCOL_VERSION;
    encoded.append_pair(name, version);
    encoded.finish()
}

fn render_value(kind: FieldKind, value: &Value) -> String {
    match kind {
        FieldKind::Float => match value.as_f64() {
            Some(f) => format!("{f:?}"),
            None => render_raw(value),
        },
        FieldKind::Integer => match value.as_i64() {
            Some(i) => i.to_string(),
            None => render_raw(value),
        },
        FieldKind::Boolean => match value.as_bool() {
            Some(true) => "1".to_string(),
            Some(false) => "0".to_string(),
            None => render_raw(value),
        },
        FieldKind::String => render_raw(value),
    }
}

fn render_raw(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Worker that exports one result page to the batch sink.
#[derive(Debug)]
pub struct PageExporter {
    ctx: WorkerContext,
    table: TableRef,
    cursor: Option<String>,
    page_size: u32,
    batch_size: usize,
}

impl WorkerDef for PageExporter {
    const NAME: &'static str = "page_export";

    fn params() -> Vec<ParamSpec> {
        source_params()
    }

    fn build(params: Params, ctx: WorkerContext) -> Result<Self, WorkerError> {
        Ok(Self {
            table: TableRef::new(
                params.str("project_id")?,
                params.str("dataset_id")?,
                params.str("table_id")?,
            ),
            cursor: params.opt_str("page_token").map(str::to_string),
            page_size: params.u32("page_size")?,
            batch_size: params.u32("batch_size")? as usize,
            ctx,
        })
    }
}

impl PageExporter {
    /// Ship one batch, clearing it on success. Returns false when the
    /// batch could not be delivered and the page should be abandoned.
    async fn ship(&self, batch: &mut Vec<String>) -> bool {
        let payload = batch.join("\n");
        let sink = self.ctx.env().sink();
        match self.ctx.retry("send batch", || sink.send_batch(&payload)).await {
            Ok(()) => {
                batch.clear();
                true
            }
            Err(err) => {
                self.ctx.log_error(&format!(
                    "abandoning page after undeliverable batch of {}: {err}",
                    batch.len()
                ));
                false
            }
        }
    }
}

#[async_trait]
impl Worker for PageExporter {
    fn worker_type(&self) -> &'static str {
        Self::NAME
    }

    fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    async fn run(&self) -> Result<Vec<WorkItem>, WorkerError> {
        let warehouse = self.ctx.env().warehouse();
        let cursor = self.cursor.as_deref();
        let page = self
            .ctx
            .retry("query page", || {
                warehouse.query_page(&self.table, cursor, self.page_size)
            })
            .await?;

        self.ctx.log_info(&format!(
            "exporting {} rows from {}",
            page.rows.len(),
            self.table
        ));

        let mut batch = Vec::with_capacity(self.batch_size);
        for row in &page.rows {
            batch.push(encode_record(&page.schema, row));
            if batch.len() >= self.batch_size && !self.ship(&mut batch).await {
                return Ok(Vec::new());
            }
        }
        if !batch.is_empty() {
            self.ship(&mut batch).await;
        }

        // The next page, if any, is the coordinator's business.
        Ok(Vec::new())
    }
}

/// Worker that walks pages and fans out one [`PageExporter`] per page.
#[derive(Debug)]
pub struct ExportCoordinator {
    ctx: WorkerContext,
    table: TableRef,
    cursor: Option<String>,
    page_size: u32,
    batch_size: u32,
    max_enqueued_pages: u32,
}

impl WorkerDef for ExportCoordinator {
    const NAME: &'static str = "export";

    fn params() -> Vec<ParamSpec> {
        let mut params = source_params();
        params.push(ParamSpec::with_default(
            "max_enqueued_pages",
            ParamKind::Number,
            DEFAULT_MAX_ENQUEUED_PAGES,
            "Fan-out cap: pages dispatched per coordinator invocation",
        ));
        params
    }

    fn build(params: Params, ctx: WorkerContext) -> Result<Self, WorkerError> {
        let max_enqueued_pages = params.u32("max_enqueued_pages")?;
        if max_enqueued_pages == 0 {
            return Err(WorkerError::Configuration {
                param: "max_enqueued_pages".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            table: TableRef::new(
                params.str("project_id")?,
                params.str("dataset_id")?,
                params.str("table_id")?,
            ),
            cursor: params.opt_str("page_token").map(str::to_string),
            page_size: params.u32("page_size")?,
            batch_size: params.u32("batch_size")?,
            max_enqueued_pages,
            ctx,
        })
    }
}

impl ExportCoordinator {
    fn source_fields(&self) -> Value {
        json!({
            "project_id": self.table.project_id,
            "dataset_id": self.table.dataset_id,
            "table_id": self.table.table_id,
            "page_size": self.page_size,
            "batch_size": self.batch_size,
        })
    }

    fn processor_item(&self, cursor: Option<&str>) -> WorkItem {
        let mut params = self.source_fields();
        params["page_token"] = match cursor {
            Some(token) => Value::String(token.to_string()),
            None => Value::Null,
        };
        WorkItem::new(PageExporter::NAME, params)
    }

    fn continuation_item(&self, cursor: &str) -> WorkItem {
        let mut params = self.source_fields();
        params["page_token"] = Value::String(cursor.to_string());
        params["max_enqueued_pages"] = Value::from(self.max_enqueued_pages);
        WorkItem::new(Self::NAME, params)
    }
}

#[async_trait]
impl Worker for ExportCoordinator {
    fn worker_type(&self) -> &'static str {
        Self::NAME
    }

    fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    async fn run(&self) -> Result<Vec<WorkItem>, WorkerError> {
        let warehouse = self.ctx.env().warehouse();
        let mut items = Vec::new();
        let mut cursor = self.cursor.clone();
        let mut pages = 0u32;

        loop {
            let current = cursor.as_deref();
            let page = self
                .ctx
                .retry("probe page", || {
                    warehouse.query_page(&self.table, current, PROBE_PAGE_SIZE)
                })
                .await?;

            items.push(self.processor_item(current));
            pages += 1;

            match page.next_cursor {
                Some(next) => {
                    if pages >= self.max_enqueued_pages {
                        self.ctx.log_info(&format!(
                            "fan-out cap reached after {pages} pages, continuing at next cursor"
                        ));
                        items.push(self.continuation_item(&next));
                        break;
                    }
                    cursor = Some(next);
                }
                None => {
                    self.ctx
                        .log_info(&format!("no further pages after {pages}, chain complete"));
                    break;
                }
            }
        }

        Ok(items)
    }
}
