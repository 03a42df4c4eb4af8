//! Schedule executor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleExecutorConfig {
    /// How often due schedules are checked, in milliseconds.
    #[serde(default = "default_execution_interval_ms")]
    pub execution_interval_ms: u64,

    /// Upper bound on a single workflow trigger, in milliseconds.
    #[serde(default = "default_trigger_timeout_ms")]
    pub trigger_timeout_ms: u64,
}

fn default_execution_interval_ms() -> u64 {
    30_000
}

fn default_trigger_timeout_ms() -> u64 {
    300_000
}

impl Default for ScheduleExecutorConfig {
    fn default() -> Self {
        Self {
            execution_interval_ms: default_execution_interval_ms(),
            trigger_timeout_ms: default_trigger_timeout_ms(),
        }
    }
}

impl ScheduleExecutorConfig {
    pub fn execution_interval(&self) -> Duration {
        Duration::from_millis(self.execution_interval_ms)
    }

    pub fn trigger_timeout(&self) -> Duration {
        Duration::from_millis(self.trigger_timeout_ms)
    }
}
