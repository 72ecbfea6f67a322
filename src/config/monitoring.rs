use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MonitoringConfig {
    /// Serve prometheus metrics and the read-only debug endpoints.
    #[serde(default = "default_metrics_enable")]
    pub metrics_enable: bool,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enable: default_metrics_enable(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> Result<()> {
        if self.metrics_enable && self.metrics_port == 0 {
            return Err(Error::InvalidConfig(
                "monitoring.metrics_port must be set when metrics are enabled".into(),
            ));
        }
        Ok(())
    }
}

fn default_metrics_enable() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9115
}
