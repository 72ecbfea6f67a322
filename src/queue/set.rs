use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

use super::TaskHandler;
use super::TaskQueue;
use super::consume;
use crate::MAIN_QUEUE_NAME;
use crate::config::QueueConfig;

/// Named-queue multiplexer. The `main` queue serializes module
/// lifecycle work; hook queues run in parallel with it.
pub struct TaskQueueSet {
    queues: DashMap<String, Arc<TaskQueue>>,
    started: DashMap<String, ()>,
    delay_on_failed_task: Duration,
    shutdown: watch::Receiver<()>,
}

impl TaskQueueSet {
    pub fn new(
        config: &QueueConfig,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            queues: DashMap::new(),
            started: DashMap::new(),
            delay_on_failed_task: config.delay_on_failed_task(),
            shutdown,
        }
    }

    pub fn delay_on_failed_task(&self) -> Duration {
        self.delay_on_failed_task
    }

    /// The queue for module lifecycle transitions, created on first
    /// access.
    pub fn main(&self) -> Arc<TaskQueue> {
        self.queue_or_create(MAIN_QUEUE_NAME)
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<Arc<TaskQueue>> {
        self.queues.get(name).map(|q| q.clone())
    }

    pub fn queue_or_create(
        &self,
        name: &str,
    ) -> Arc<TaskQueue> {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TaskQueue::new(name)))
            .clone()
    }

    /// Ensures the queue exists and spawns its single consumer loop.
    /// Starting an already started queue is a no-op.
    pub fn start(
        &self,
        name: &str,
        handler: Arc<dyn TaskHandler>,
    ) {
        let queue = self.queue_or_create(name);

        if self.started.insert(name.to_string(), ()).is_some() {
            debug!(queue = name, "queue already started");
            return;
        }

        tokio::spawn(consume(
            queue,
            handler,
            self.delay_on_failed_task,
            self.shutdown.clone(),
        ));
    }

    pub fn is_started(
        &self,
        name: &str,
    ) -> bool {
        self.started.contains_key(name)
    }

    pub fn iterate<F>(
        &self,
        mut f: F,
    ) where
        F: FnMut(&TaskQueue),
    {
        for entry in self.queues.iter() {
            f(entry.value());
        }
    }
}
