use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::GLOBAL_HOOKS_DIR_ENV;
use crate::MODULES_DIR_ENV;
use crate::Result;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DirsConfig {
    /// Directory with `NNN-<name>` module directories
    #[serde(default = "default_modules_dir")]
    pub modules_dir: PathBuf,

    /// Directory with global hook executables
    #[serde(default = "default_global_hooks_dir")]
    pub global_hooks_dir: PathBuf,

    /// Directory for per-invocation hook tempfiles
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Directory for the log file appender
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for DirsConfig {
    fn default() -> Self {
        Self {
            modules_dir: default_modules_dir(),
            global_hooks_dir: default_global_hooks_dir(),
            temp_dir: default_temp_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl DirsConfig {
    /// `MODULES_DIR` and `GLOBAL_HOOKS_DIR` take precedence over file and
    /// prefixed-environment configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var(MODULES_DIR_ENV) {
            if !dir.is_empty() {
                self.modules_dir = PathBuf::from(dir);
            }
        }
        if let Ok(dir) = env::var(GLOBAL_HOOKS_DIR_ENV) {
            if !dir.is_empty() {
                self.global_hooks_dir = PathBuf::from(dir);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.modules_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("dirs.modules_dir must not be empty".into()));
        }
        if self.global_hooks_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("dirs.global_hooks_dir must not be empty".into()));
        }
        if self.temp_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("dirs.temp_dir must not be empty".into()));
        }
        Ok(())
    }
}

fn default_modules_dir() -> PathBuf {
    PathBuf::from("modules")
}
fn default_global_hooks_dir() -> PathBuf {
    PathBuf::from("global-hooks")
}
fn default_temp_dir() -> PathBuf {
    env::temp_dir().join("module-engine")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
