//! Worker pools for offloaded handlers.
//!
//! Only plain values cross the pool boundary: the extracted argument list
//! goes in, one value comes out.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

/// Runs named tasks away from the request path.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Run `task` with `args` and wait for its result.
    async fn run(&self, task: &str, args: Vec<Value>) -> anyhow::Result<Value>;

    /// Whether `task` can be run at all; checked when routes are mounted.
    fn has_task(&self, task: &str) -> bool;
}

type TaskFn = Arc<dyn Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync>;

/// In-process pool: tasks run on tokio's blocking threads, at most
/// `capacity` at a time.
pub struct BoundedPool {
    tasks: HashMap<String, TaskFn>,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl BoundedPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            tasks: HashMap::new(),
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Register a task under `name` (a route's operation id).
    pub fn register<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.tasks.insert(name.into(), Arc::new(task));
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held by a running task.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl WorkerPool for BoundedPool {
    async fn run(&self, task: &str, args: Vec<Value>) -> anyhow::Result<Value> {
        let function = self
            .tasks
            .get(task)
            .cloned()
            .ok_or_else(|| anyhow!("unknown task '{}'", task))?;

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .context("worker pool is closed")?;

        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            function(args)
        })
        .await
        .with_context(|| format!("task '{}' did not complete", task))?;

        tracing::trace!(task, "offloaded task finished");
        result
    }

    fn has_task(&self, task: &str) -> bool {
        self.tasks.contains_key(task)
    }
}
