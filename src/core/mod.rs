//! The lifecycle core: module arena, per-module state machine,
//! discovery and the task dispatcher.

mod events;
mod manager;
mod module;
mod operator;

pub use events::ModuleEvent;
pub use events::ModulesState;
pub use manager::ModuleManager;
pub use module::Module;
pub use operator::Operator;
pub use operator::queue_has_module_run_task;

#[cfg(test)]
mod operator_test;
