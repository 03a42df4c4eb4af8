//! Webhook service configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::WebhookRetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookServiceConfig {
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Policy for webhooks registered without one.
    #[serde(default)]
    pub default_retry_policy: WebhookRetryPolicy,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    "Conductor-Webhook/1.0".to_string()
}

impl Default for WebhookServiceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            default_retry_policy: WebhookRetryPolicy::default(),
        }
    }
}

impl WebhookServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
