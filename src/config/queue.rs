use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QueueConfig {
    /// Sleep before the next peek after a failed task. The failed task
    /// stays at the queue head.
    #[serde(default = "default_delay_on_failed_task_ms")]
    pub delay_on_failed_task_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            delay_on_failed_task_ms: default_delay_on_failed_task_ms(),
        }
    }
}

impl QueueConfig {
    pub fn delay_on_failed_task(&self) -> Duration {
        Duration::from_millis(self.delay_on_failed_task_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.delay_on_failed_task_ms == 0 {
            return Err(Error::InvalidConfig(
                "queue.delay_on_failed_task_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_delay_on_failed_task_ms() -> u64 {
    5000
}
