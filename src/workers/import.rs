//! Object-storage import: expand source locators and bridge the load job.

use async_trait::async_trait;

use crate::params::{ParamKind, ParamSpec, Params};
use crate::registry::WorkerDef;
use crate::retry::CallError;
use crate::storage::ObjectLister;
use crate::warehouse::TableRef;
use crate::worker::{WorkItem, Worker, WorkerContext, WorkerError};
use crate::workers::waiter::begin_and_wait;

/// Expand source locators into concrete object paths.
///
/// Literal locators pass through unchanged, in input order. A locator
/// with a trailing glob segment (`prefix/*.ext`) lists `prefix` and
/// keeps entries whose remainder stays within the segment and ends with
/// `.ext`, in listing order. This is segment matching, not full glob
/// semantics.
pub async fn expand_source_uris(
    lister: &dyn ObjectLister,
    uris: &[String],
) -> Result<Vec<String>, CallError> {
    let mut expanded = Vec::new();
    for uri in uris {
        match uri.split_once('*') {
            None => expanded.push(uri.clone()),
            Some((prefix, suffix)) => {
                for entry in lister.list(prefix).await? {
                    let Some(rest) = entry.path.strip_prefix(prefix) else {
                        continue;
                    };
                    if !rest.contains('/') && rest.ends_with(suffix) {
                        expanded.push(entry.path.clone());
                    }
                }
            }
        }
    }
    Ok(expanded)
}

/// Worker that loads object-storage files into a warehouse table.
#[derive(Debug)]
pub struct StorageLoader {
    ctx: WorkerContext,
    table: TableRef,
    source_uris: Vec<String>,
}

impl WorkerDef for StorageLoader {
    const NAME: &'static str = "storage_load";

    fn params() -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("project_id", ParamKind::String, "Destination project"),
            ParamSpec::required("dataset_id", ParamKind::String, "Destination dataset"),
            ParamSpec::required("table_id", ParamKind::String, "Destination table"),
            ParamSpec::required(
                "source_uris",
                ParamKind::StringList,
                "Object locators; the last path segment may be a glob",
            ),
        ]
    }

    fn build(params: Params, ctx: WorkerContext) -> Result<Self, WorkerError> {
        Ok(Self {
            table: TableRef::new(
                params.str("project_id")?,
                params.str("dataset_id")?,
                params.str("table_id")?,
            ),
            source_uris: params.str_list("source_uris")?,
            ctx,
        })
    }
}

#[async_trait]
impl Worker for StorageLoader {
    fn worker_type(&self) -> &'static str {
        Self::NAME
    }

    fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    async fn run(&self) -> Result<Vec<WorkItem>, WorkerError> {
        let lister = self.ctx.env().lister();
        let uris = self
            .ctx
            .retry("expand source uris", || {
                expand_source_uris(lister, &self.source_uris)
            })
            .await?;

        self.ctx
            .log_info(&format!("loading {} files into {}", uris.len(), self.table));

        let warehouse = self.ctx.env().warehouse();
        let job = self
            .ctx
            .retry("begin load job", || warehouse.begin_load(&self.table, &uris))
            .await?;
        begin_and_wait(&self.ctx, job.as_ref(), None).await
    }
}
