//! Tasks: the unit of work the queues carry.
//!
//! Every external event is translated into one or more tasks; the queue
//! consumers execute them and requeue follow-ups from the task result.

use std::collections::HashMap;
use std::time::Duration;

use crate::MAIN_QUEUE_NAME;
use crate::hook::BindingContext;
use crate::hook::BindingType;


#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskType {
    GlobalHookRun,
    GlobalHookEnableKubernetesBindings,
    DiscoverModulesState,
    ModuleRun,
    ModuleDelete,
    ModuleHookRun,
    ModulePurge,
    ModuleManagerRetry,
}

/// Metadata carried by hook and module tasks.
#[derive(Clone, Debug, Default)]
pub struct HookMetadata {
    /// Human readable reason chain for the task, extended as tasks
    /// spawn follow-ups.
    pub event_description: String,
    pub module_name: Option<String>,
    pub hook_name: Option<String>,
    pub binding_type: Option<BindingType>,
    pub binding_context: Vec<BindingContext>,
    pub allow_failure: bool,
    /// Run OnStartup hooks and enable kubernetes bindings during this
    /// ModuleRun.
    pub on_startup_hooks: bool,
    /// Schedule a reload-all when this global hook changes the global
    /// values checksum.
    pub reload_all_on_values_changes: bool,
    /// Set on the final AfterAll task of a reload-all.
    pub last_after_all_hook: bool,
    /// Global values checksum captured before the AfterAll batch.
    pub values_checksum: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Task {
    task_type: TaskType,
    queue_name: String,
    log_labels: HashMap<String, String>,
    metadata: HookMetadata,
    failure_count: u32,
}

impl Task {
    pub fn new(task_type: TaskType) -> Self {
        Self {
            task_type,
            queue_name: MAIN_QUEUE_NAME.to_string(),
            log_labels: HashMap::new(),
            metadata: HookMetadata::default(),
            failure_count: 0,
        }
    }

    pub fn with_queue_name(
        mut self,
        queue_name: &str,
    ) -> Self {
        self.queue_name = queue_name.to_string();
        self
    }

    pub fn with_log_labels(
        mut self,
        log_labels: HashMap<String, String>,
    ) -> Self {
        self.log_labels = log_labels;
        self
    }

    pub fn with_metadata(
        mut self,
        metadata: HookMetadata,
    ) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn log_labels(&self) -> &HashMap<String, String> {
        &self.log_labels
    }

    pub fn metadata(&self) -> &HookMetadata {
        &self.metadata
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub(crate) fn increment_failure_count(&mut self) {
        self.failure_count += 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Success,
    Fail,
}

/// What the consumer does with the queue after one task execution.
#[derive(Debug)]
pub struct TaskResult {
    pub status: TaskStatus,
    /// Prepended to the queue head in order.
    pub head_tasks: Vec<Task>,
    /// Appended to the queue tail in order.
    pub after_tasks: Vec<Task>,
    /// Sleep before the next peek.
    pub delay_before_next_task: Option<Duration>,
}

impl TaskResult {
    pub fn success() -> Self {
        Self {
            status: TaskStatus::Success,
            head_tasks: Vec::new(),
            after_tasks: Vec::new(),
            delay_before_next_task: None,
        }
    }

    pub fn fail() -> Self {
        Self {
            status: TaskStatus::Fail,
            ..Self::success()
        }
    }

    pub fn with_head_tasks(
        mut self,
        head_tasks: Vec<Task>,
    ) -> Self {
        self.head_tasks = head_tasks;
        self
    }

    pub fn with_after_tasks(
        mut self,
        after_tasks: Vec<Task>,
    ) -> Self {
        self.after_tasks = after_tasks;
        self
    }

    pub fn with_delay_before_next_task(
        mut self,
        delay: Duration,
    ) -> Self {
        self.delay_before_next_task = Some(delay);
        self
    }
}
