//! Hooks: executables triggered at lifecycle points.
//!
//! A hook declares its bindings through a `--config` probe at
//! registration time and is then executed with binding contexts and
//! values files at each trigger. Shell hooks are one implementation of
//! the [`Hook`] capability set; anything exposing the same surface can
//! be driven by the dispatcher.

mod executor;
mod script;

pub use executor::HookExecutor;
pub use executor::safe_name;
pub use script::ScriptHook;
pub use script::search_hook_files;


use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::MAIN_QUEUE_NAME;
use crate::Result;
use crate::values::Values;
use crate::values::ValuesPatch;

/// Declared trigger kinds for hooks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BindingType {
    OnStartup,
    BeforeHelm,
    AfterHelm,
    AfterDeleteHelm,
    BeforeAll,
    AfterAll,
    Schedule,
    #[serde(rename = "kubernetes")]
    OnKubernetesEvent,
}

impl BindingType {
    /// The binding name hooks see in their binding context.
    pub fn context_name(&self) -> &'static str {
        match self {
            BindingType::OnStartup => "onStartup",
            BindingType::BeforeHelm => "beforeHelm",
            BindingType::AfterHelm => "afterHelm",
            BindingType::AfterDeleteHelm => "afterDeleteHelm",
            BindingType::BeforeAll => "beforeAll",
            BindingType::AfterAll => "afterAll",
            BindingType::Schedule => "schedule",
            BindingType::OnKubernetesEvent => "kubernetes",
        }
    }

    /// Bindings whose contexts carry the hook's kubernetes snapshots,
    /// taken just before invocation.
    pub fn includes_snapshots(&self) -> bool {
        matches!(
            self,
            BindingType::BeforeHelm | BindingType::AfterHelm | BindingType::AfterDeleteHelm
        )
    }
}

/// Structured invocation payload passed to a hook process.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingContext {
    pub binding: String,
    pub binding_type: BindingType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub include_all_snapshots: bool,
}

fn is_false(v: &bool) -> bool {
    !v
}

impl BindingContext {
    pub fn new(binding_type: BindingType) -> Self {
        Self {
            binding: binding_type.context_name().to_string(),
            binding_type,
            snapshots: None,
            include_all_snapshots: false,
        }
    }

    /// Context for the initial synchronization run of a kubernetes
    /// binding.
    pub fn synchronization(binding_name: &str) -> Self {
        Self {
            binding: binding_name.to_string(),
            binding_type: BindingType::OnKubernetesEvent,
            snapshots: None,
            include_all_snapshots: false,
        }
    }

    pub fn with_snapshots(
        mut self,
        snapshots: Value,
    ) -> Self {
        self.snapshots = Some(snapshots);
        self.include_all_snapshots = true;
        self
    }
}

/// Hook configuration announced by the `--config` probe.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookConfig {
    pub on_startup: Option<f64>,
    pub before_helm: Option<f64>,
    pub after_helm: Option<f64>,
    pub after_delete_helm: Option<f64>,
    pub before_all: Option<f64>,
    pub after_all: Option<f64>,
    #[serde(default)]
    pub schedule: Vec<ScheduleBinding>,
    #[serde(default)]
    pub kubernetes: Vec<KubernetesBinding>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBinding {
    pub crontab: String,
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default)]
    pub allow_failure: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesBinding {
    /// Binding name shown in synchronization contexts; defaults to the
    /// context name of the kubernetes binding type.
    #[serde(default = "default_kubernetes_binding_name")]
    pub name: String,
    pub api_version: String,
    pub kind: String,
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default)]
    pub allow_failure: bool,
}

fn default_queue() -> String {
    MAIN_QUEUE_NAME.to_string()
}

fn default_kubernetes_binding_name() -> String {
    BindingType::OnKubernetesEvent.context_name().to_string()
}

impl HookConfig {
    /// Ordering weight for an ordered binding, `None` when the hook
    /// does not subscribe to it.
    pub fn order_for(
        &self,
        binding: BindingType,
    ) -> Option<f64> {
        match binding {
            BindingType::OnStartup => self.on_startup,
            BindingType::BeforeHelm => self.before_helm,
            BindingType::AfterHelm => self.after_helm,
            BindingType::AfterDeleteHelm => self.after_delete_helm,
            BindingType::BeforeAll => self.before_all,
            BindingType::AfterAll => self.after_all,
            BindingType::Schedule if !self.schedule.is_empty() => Some(0.0),
            BindingType::OnKubernetesEvent if !self.kubernetes.is_empty() => Some(0.0),
            _ => None,
        }
    }

    pub fn has_binding(
        &self,
        binding: BindingType,
    ) -> bool {
        self.order_for(binding).is_some()
    }

    /// Queue names declared by schedule and kubernetes bindings.
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .schedule
            .iter()
            .map(|b| b.queue.clone())
            .chain(self.kubernetes.iter().map(|b| b.queue.clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Result of one hook invocation.
#[derive(Debug, Default)]
pub struct HookRunResult {
    /// Patch the hook wrote for its values section, if any.
    pub values_patch: Option<ValuesPatch>,
}

/// The capability set every hook variant exposes. The dispatcher and
/// discovery are generic over it.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    fn config(&self) -> &HookConfig;

    /// Executes the hook for a binding with prepared values trees.
    async fn run(
        &self,
        binding: BindingType,
        contexts: &[BindingContext],
        config_values: &Values,
        values: &Values,
    ) -> Result<HookRunResult>;
}
