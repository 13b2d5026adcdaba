//! Periodic kickoff scheduler for enqueueing workers at intervals.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, error, info};

use crate::queue::TaskQueue;

/// A registered kickoff: a worker type enqueued with fixed parameters
/// at each interval.
#[derive(Clone)]
struct Kickoff {
    worker: String,
    params: serde_json::Value,
    interval: Duration,
    run_on_start: bool,
}

/// Periodic scheduler that enqueues registered kickoffs at intervals.
pub struct PeriodicScheduler<Q: TaskQueue> {
    queue: Arc<Q>,
    kickoffs: Vec<Kickoff>,
}

impl<Q: TaskQueue + 'static> PeriodicScheduler<Q> {
    /// Run all kickoffs indefinitely.
    pub async fn run(&self) -> ! {
        let handles: Vec<_> = self
            .kickoffs
            .iter()
            .cloned()
            .map(|kickoff| {
                let queue = self.queue.clone();
                tokio::spawn(async move { Self::run_kickoff(queue, kickoff).await })
            })
            .collect();

        // Keep handles in scope to maintain task references
        let _ = handles;

        // Wait forever (kickoffs run indefinitely)
        futures::future::pending::<()>().await;
        unreachable!()
    }

    async fn run_kickoff(queue: Arc<Q>, kickoff: Kickoff) {
        info!(
            worker = %kickoff.worker,
            interval_secs = kickoff.interval.as_secs(),
            run_on_start = kickoff.run_on_start,
            "Starting scheduled kickoff"
        );

        if kickoff.run_on_start {
            Self::enqueue(&queue, &kickoff).await;
        }

        let mut ticker = interval(kickoff.interval);
        ticker.tick().await; // Consume immediate first tick

        loop {
            ticker.tick().await;
            Self::enqueue(&queue, &kickoff).await;
        }
    }

    async fn enqueue(queue: &Arc<Q>, kickoff: &Kickoff) {
        debug!(worker = %kickoff.worker, "Enqueueing scheduled kickoff");

        if let Err(e) = queue.enqueue(&kickoff.worker, kickoff.params.clone()).await {
            error!(
                worker = %kickoff.worker,
                error = %e,
                "Failed to enqueue kickoff"
            );
        }
    }
}

/// Builder for configuring a PeriodicScheduler.
pub struct SchedulerBuilder<Q: TaskQueue> {
    queue: Q,
    kickoffs: Vec<Kickoff>,
}

impl<Q: TaskQueue + 'static> SchedulerBuilder<Q> {
    /// Create a new scheduler builder over the given queue.
    pub fn new(queue: Q) -> Self {
        Self {
            queue,
            kickoffs: Vec::new(),
        }
    }

    /// Enqueue `worker` with `params` every `interval`.
    pub fn every(
        mut self,
        interval: Duration,
        worker: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        self.kickoffs.push(Kickoff {
            worker: worker.into(),
            params,
            interval,
            run_on_start: false,
        });
        self
    }

    /// Set whether the most recently added kickoff also fires
    /// immediately on start. Defaults to false.
    pub fn run_on_start(mut self, run: bool) -> Self {
        if let Some(kickoff) = self.kickoffs.last_mut() {
            kickoff.run_on_start = run;
        }
        self
    }

    /// Build the scheduler.
    pub fn build(self) -> PeriodicScheduler<Q> {
        PeriodicScheduler {
            queue: Arc::new(self.queue),
            kickoffs: self.kickoffs,
        }
    }
}
