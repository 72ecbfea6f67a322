use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MonitorConfig {
    /// Interval between resource presence checks.
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_tick_seconds(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_seconds == 0 {
            return Err(Error::InvalidConfig("monitor.tick_seconds must be greater than 0".into()));
        }
        Ok(())
    }
}

fn default_tick_seconds() -> u64 {
    5
}
