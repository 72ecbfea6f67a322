//! Events the configuration-store watcher publishes to the operator.

/// State changes the dispatcher turns into queued tasks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModuleEvent {
    /// Some module sections of the configuration store changed: requeue
    /// a ModuleRun per affected module.
    ModulesChanged(Vec<String>),

    /// The global section changed: all modules must be reconciled via a
    /// reload-all.
    GlobalChanged,

    /// The enabled-modules state could not be computed consistently;
    /// the manager must retry before other queue tasks run.
    AmbiguousState,
}

/// Result of one discovery pass over the modules state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModulesState {
    /// Modules enabled after this pass, in registration order.
    pub enabled_modules: Vec<String>,
    /// Enabled now but not before: their ModuleRun carries
    /// `on_startup_hooks`.
    pub newly_enabled_modules: Vec<String>,
    /// Known modules that stopped being enabled and still have a
    /// release or were running.
    pub modules_to_disable: Vec<String>,
    /// Helm releases without a module directory behind them.
    pub released_unknown_modules: Vec<String>,
}
