//! Configuration schema definitions.

use serde::{Deserialize, Serialize};

mod schema_delivery;
mod schema_recovery;

pub use schema_delivery::*;
pub use schema_recovery::*;

/// Shared default helper used by submodules.
pub(crate) fn default_true() -> bool {
    true
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConductorConfig {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    #[serde(default)]
    pub dlq: DlqSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub webhook: WebhookSettings,
}

/// General process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Directory for logs and file-backed stores.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "~/.conductor".to_string()
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
