//! Polling bridge to externally asynchronous jobs.
//!
//! [`begin_and_wait`] polls a job within a bounded wall-clock budget and,
//! when the budget runs out, hands the job off to a [`JobWaiter`]
//! continuation instead of blocking. The waiter re-enters the same loop
//! and re-enqueues itself until the job reaches a terminal state; there
//! is no cap on how often it does so.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::params::{ParamKind, ParamSpec, Params};
use crate::registry::WorkerDef;
use crate::warehouse::{AsyncJob, JobState};
use crate::worker::{WorkItem, Worker, WorkerContext, WorkerError};

/// Polling cadence and per-invocation wait budget.
///
/// These are configuration constants; the budget must stay well under
/// the host execution-time ceiling.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Wall-clock budget for one invocation's poll loop.
    pub budget: Duration,
    /// Sleep before the first re-poll.
    pub initial_interval: Duration,
    /// Cap on the doubling poll interval.
    pub max_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(30),
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(8),
        }
    }
}

/// Begin `job` if it has not started, then poll it to completion within
/// the environment's poll budget.
///
/// Returns the items to emit from the calling worker:
/// - job done cleanly: the `followup` item, if any;
/// - job done with an error result: [`WorkerError::ExternalJob`];
/// - budget exhausted: exactly one [`JobWaiter`] continuation carrying
///   the job id and the `followup`, verbatim.
pub async fn begin_and_wait(
    ctx: &WorkerContext,
    job: &dyn AsyncJob,
    followup: Option<WorkItem>,
) -> Result<Vec<WorkItem>, WorkerError> {
    let config = ctx.env().poll().clone();

    if job.state() == JobState::Pending {
        ctx.retry("begin job", || job.begin()).await?;
    }

    let started = Instant::now();
    let mut interval = config.initial_interval;
    loop {
        if job.state() == JobState::Done {
            return match job.error_result() {
                Some(detail) => Err(WorkerError::ExternalJob {
                    job_id: job.id().to_string(),
                    detail,
                }),
                None => {
                    ctx.log_info(&format!("job '{}' finished", job.id()));
                    Ok(followup.into_iter().collect())
                }
            };
        }

        if started.elapsed() >= config.budget {
            ctx.log_info(&format!(
                "job '{}' still running after {:?}, handing off",
                job.id(),
                started.elapsed()
            ));
            return Ok(vec![waiter_item(job.id(), followup)]);
        }

        tokio::time::sleep(interval).await;
        interval = (interval * 2).min(config.max_interval);
        ctx.retry("reload job", || job.reload()).await?;
    }
}

fn waiter_item(job_id: &str, followup: Option<WorkItem>) -> WorkItem {
    let mut params = Map::new();
    params.insert("job_id".to_string(), Value::String(job_id.to_string()));
    if let Some(next) = followup {
        params.insert("next_worker".to_string(), Value::String(next.worker));
        params.insert("next_params".to_string(), next.params);
    }
    WorkItem::new(JobWaiter::NAME, Value::Object(params))
}

/// Worker that resumes polling a job handed off by [`begin_and_wait`].
#[derive(Debug)]
pub struct JobWaiter {
    ctx: WorkerContext,
    job_id: String,
    next: Option<WorkItem>,
}

impl WorkerDef for JobWaiter {
    const NAME: &'static str = "job_waiter";

    fn params() -> Vec<ParamSpec> {
        vec![
            ParamSpec::required(
                "job_id",
                ParamKind::String,
                "Identifier of the tracked external job",
            ),
            ParamSpec::optional(
                "next_worker",
                ParamKind::String,
                "Worker type to enqueue once the job succeeds",
            ),
            ParamSpec::optional(
                "next_params",
                ParamKind::Json,
                "Parameters for the follow-up worker",
            ),
        ]
    }

    fn build(params: Params, ctx: WorkerContext) -> Result<Self, WorkerError> {
        let job_id = params.str("job_id")?.to_string();
        let next = params.opt_str("next_worker").map(|worker| {
            WorkItem::new(
                worker,
                params.value("next_params").cloned().unwrap_or(Value::Null),
            )
        });
        Ok(Self { ctx, job_id, next })
    }
}

#[async_trait]
impl Worker for JobWaiter {
    fn worker_type(&self) -> &'static str {
        Self::NAME
    }

    fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    async fn run(&self) -> Result<Vec<WorkItem>, WorkerError> {
        let warehouse = self.ctx.env().warehouse();
        let job = self
            .ctx
            .retry("load job handle", || warehouse.job(&self.job_id))
            .await?;
        begin_and_wait(&self.ctx, job.as_ref(), self.next.clone()).await
    }
}
