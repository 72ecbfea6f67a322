//! Named task queues.
//!
//! Each queue is a single-consumer FIFO: one consumer loop peeks the
//! head, executes it through the [`TaskHandler`] and pops it only on
//! success. A failed task stays at the head, its failure count grows
//! and the consumer backs off before the next peek.

mod set;

pub use set::TaskQueueSet;


use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::debug;
use tracing::info;

use crate::task::Task;
use crate::task::TaskResult;
use crate::task::TaskStatus;

/// Executes one task; implemented by the operator dispatcher.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle_task(
        &self,
        task: Task,
    ) -> TaskResult;
}

pub struct TaskQueue {
    name: String,
    inner: Mutex<VecDeque<Task>>,
    notify: Notify,
    changes_enabled: AtomicBool,
}

impl TaskQueue {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            changes_enabled: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_last(
        &self,
        task: Task,
    ) {
        self.inner.lock().push_back(task);
        self.notify_changed();
    }

    pub fn add_first(
        &self,
        task: Task,
    ) {
        self.inner.lock().push_front(task);
        self.notify_changed();
    }

    pub fn peek(&self) -> Option<Task> {
        self.inner.lock().front().cloned()
    }

    pub fn pop(&self) -> Option<Task> {
        self.inner.lock().pop_front()
    }

    pub fn length(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Removes tasks for which the predicate returns false.
    pub fn filter<F>(
        &self,
        pred: F,
    ) where
        F: Fn(&Task) -> bool,
    {
        self.inner.lock().retain(|task| pred(task));
    }

    pub fn iterate<F>(
        &self,
        mut f: F,
    ) where
        F: FnMut(&Task),
    {
        for task in self.inner.lock().iter() {
            f(task);
        }
    }

    /// Suppresses wakeups during bulk prepopulation.
    pub fn changes_disable(&self) {
        self.changes_enabled.store(false, Ordering::SeqCst);
    }

    /// Re-enables wakeups and fires one for everything added meanwhile.
    pub fn changes_enable(&self) {
        self.changes_enabled.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub(crate) fn increment_head_failure_count(&self) {
        if let Some(task) = self.inner.lock().front_mut() {
            task.increment_failure_count();
        }
    }

    async fn wait_nonempty(&self) {
        loop {
            let notified = self.notify.notified();
            if !self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    fn notify_changed(&self) {
        if self.changes_enabled.load(Ordering::SeqCst) {
            self.notify.notify_one();
        }
    }
}

/// One consumer loop per queue. Exits on the shutdown signal.
pub(crate) async fn consume(
    queue: Arc<TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    delay_on_failed_task: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    info!(queue = %queue.name(), "queue consumer started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                info!(queue = %queue.name(), "queue consumer shutdown");
                return;
            }

            _ = queue.wait_nonempty() => {}
        }

        let Some(task) = queue.peek() else {
            continue;
        };

        let result = handler.handle_task(task).await;

        match result.status {
            TaskStatus::Success => {
                queue.pop();
                for task in result.head_tasks.into_iter().rev() {
                    queue.add_first(task);
                }
                for task in result.after_tasks {
                    queue.add_last(task);
                }
                if let Some(delay) = result.delay_before_next_task {
                    debug!(queue = %queue.name(), ?delay, "delay before next task");
                    if !sleep_or_shutdown(delay, &mut shutdown).await {
                        return;
                    }
                }
            }
            TaskStatus::Fail => {
                // keep the task at the head and back off
                queue.increment_head_failure_count();
                if !sleep_or_shutdown(delay_on_failed_task, &mut shutdown).await {
                    return;
                }
            }
        }
    }
}

/// Returns false when the shutdown signal interrupted the sleep.
async fn sleep_or_shutdown(
    delay: Duration,
    shutdown: &mut watch::Receiver<()>,
) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.changed() => false,
        _ = sleep(delay) => true,
    }
}
