//! Polling harness that claims tasks and drives worker invocations.
//!
//! Each claimed task becomes one worker invocation: the registry binds
//! the task's parameters and constructs the worker, the harness drives
//! `execute()`, then submits every emitted work item back to the queue
//! in emission order before marking the task complete. Parallelism
//! across invocations is bounded by a semaphore; within an invocation
//! execution is sequential.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;

use super::store::{QueueError, QueuedTask, TaskId, TaskQueue};
use crate::registry::WorkerRegistry;
use crate::worker::{WorkItem, Worker, WorkerEnv, WorkerError};

/// A runner that executes workers from a queue.
pub struct Runner<Q: TaskQueue> {
    queue: Arc<Q>,
    registry: Arc<WorkerRegistry>,
    env: WorkerEnv,
    instance_id: i64,
    poll_interval: Duration,
    max_concurrent: usize,
}

impl<Q: TaskQueue + 'static> Runner<Q> {
    /// Submit a task for a registered worker type.
    ///
    /// Unknown worker types are rejected here, before anything reaches
    /// the queue.
    pub async fn submit<T: Serialize>(&self, worker: &str, params: T) -> Result<TaskId, QueueError> {
        if !self.registry.contains(worker) {
            return Err(QueueError::UnknownWorker(worker.to_string()));
        }
        let params = serde_json::to_value(params)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        self.queue.enqueue(worker, params).await
    }

    /// Run the task loop indefinitely.
    pub async fn run(&self) -> ! {
        // Recover any orphaned tasks from previous crashes
        let _ = self.queue.recover_orphans().await;

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        loop {
            let available = semaphore.available_permits();
            if available > 0 {
                if let Ok(tasks) = self.queue.claim(available).await {
                    for task in tasks {
                        let permit = semaphore.clone().acquire_owned().await.unwrap();
                        let queue = self.queue.clone();
                        let registry = self.registry.clone();
                        let env = self.env.clone();
                        let instance_id = self.instance_id;

                        tokio::spawn(async move {
                            let result =
                                Self::execute_task(&registry, &env, instance_id, &task).await;
                            match result {
                                Ok(items) => {
                                    Self::settle(queue.as_ref(), &registry, task.id, items).await;
                                }
                                Err(e) => {
                                    tracing::error!(
                                        worker = %task.worker,
                                        task_id = task.id.0,
                                        error = %e,
                                        "task failed"
                                    );
                                    let _ = queue.fail(task.id, &e.to_string()).await;
                                }
                            }
                            drop(permit);
                        });
                    }
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn execute_task(
        registry: &WorkerRegistry,
        env: &WorkerEnv,
        instance_id: i64,
        task: &QueuedTask,
    ) -> Result<Vec<WorkItem>, WorkerError> {
        let worker = registry.build(&task.worker, &task.params, env, instance_id, task.id.0)?;
        worker.execute().await
    }

    /// Submit emitted items in order, then complete the task. An item
    /// naming an unregistered worker fails the whole task instead.
    async fn settle(queue: &Q, registry: &WorkerRegistry, id: TaskId, items: Vec<WorkItem>) {
        if let Some(bad) = items.iter().find(|item| !registry.contains(&item.worker)) {
            let _ = queue
                .fail(id, &format!("emitted unknown worker type '{}'", bad.worker))
                .await;
            return;
        }
        for item in items {
            let _ = queue.enqueue(&item.worker, item.params).await;
        }
        let _ = queue.complete(id).await;
    }
}

/// Builder for constructing a Runner.
pub struct RunnerBuilder<Q: TaskQueue> {
    queue: Q,
    registry: WorkerRegistry,
    env: WorkerEnv,
    instance_id: i64,
    poll_interval: Duration,
    max_concurrent: usize,
}

impl<Q: TaskQueue + 'static> RunnerBuilder<Q> {
    /// Create a new builder over the given queue and environment, with
    /// the built-in worker types registered.
    pub fn new(queue: Q, env: WorkerEnv) -> Self {
        Self {
            queue,
            registry: WorkerRegistry::with_builtins(),
            env,
            instance_id: 0,
            poll_interval: Duration::from_secs(1),
            max_concurrent: 1,
        }
    }

    /// Replace the worker registry.
    pub fn registry(mut self, registry: WorkerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the pipeline instance id stamped on every invocation's logs.
    pub fn instance_id(mut self, instance_id: i64) -> Self {
        self.instance_id = instance_id;
        self
    }

    /// Set the poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the maximum concurrent invocations.
    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    /// Build the runner.
    pub fn build(self) -> Runner<Q> {
        Runner {
            queue: Arc::new(self.queue),
            registry: Arc::new(self.registry),
            env: self.env,
            instance_id: self.instance_id,
            poll_interval: self.poll_interval,
            max_concurrent: self.max_concurrent,
        }
    }
}
