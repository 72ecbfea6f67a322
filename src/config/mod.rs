//! Configuration management for the module lifecycle operator.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support via `CONFIG_PATH`
//! - Environment variable overrides (highest priority)
//! - Component-wise validation
mod debug;
mod dirs;
mod helm;
mod monitor;
mod monitoring;
mod queue;

pub use debug::*;
pub use dirs::*;
pub use helm::*;
pub use monitor::*;
pub use monitoring::*;
pub use queue::*;


use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for the operator.
///
/// Sources are merged in the following order (later sources override
/// earlier ones):
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables with `OPERATOR__` prefix
/// 4. `MODULES_DIR` / `GLOBAL_HOOKS_DIR` environment variables
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct OperatorConfig {
    /// Modules, global hooks, tempfile and log directories
    pub dirs: DirsConfig,
    /// Helm release parameters
    pub helm: HelmConfig,
    /// Resource drift monitor parameters
    pub monitor: MonitorConfig,
    /// Task queue retry parameters
    pub queue: QueueConfig,
    /// Metrics and debug endpoint settings
    pub monitoring: MonitoringConfig,
    /// Development toggles
    pub debug: DebugConfig,
}

impl OperatorConfig {
    /// Creates a new configuration with hierarchical override support.
    ///
    /// # Example
    /// ```ignore
    /// std::env::set_var("OPERATOR__MONITOR__TICK_SECONDS", "1");
    /// let cfg = OperatorConfig::new()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path));
        }

        builder = builder.add_source(
            Environment::with_prefix("OPERATOR")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let mut config: Self = builder.build()?.try_deserialize()?;
        config.dirs.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-component configuration rules.
    pub fn validate(&self) -> Result<()> {
        self.dirs.validate()?;
        self.helm.validate()?;
        self.monitor.validate()?;
        self.queue.validate()?;
        self.monitoring.validate()?;
        Ok(())
    }
}
