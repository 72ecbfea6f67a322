use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HelmConfig {
    /// Namespace every release is installed into; also the default
    /// namespace for monitored manifests without one.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Retained release history; passed as `--history-max` on every
    /// upgrade, so helm prunes revisions beyond it.
    #[serde(default = "default_history_max")]
    pub history_max: u32,
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            history_max: default_history_max(),
        }
    }
}

impl HelmConfig {
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::InvalidConfig("helm.namespace must not be empty".into()));
        }
        if self.history_max == 0 {
            return Err(Error::InvalidConfig("helm.history_max must be greater than 0".into()));
        }
        Ok(())
    }
}

fn default_namespace() -> String {
    "default".to_string()
}
fn default_history_max() -> u32 {
    10
}
