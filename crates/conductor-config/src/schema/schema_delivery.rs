//! Delivery configuration types (cron scheduler, webhooks).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::default_true;

/// Schedule executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_execution_interval_ms")]
    pub execution_interval_ms: u64,

    /// Upper bound on a single workflow trigger.
    #[serde(default = "default_trigger_timeout_ms")]
    pub trigger_timeout_ms: u64,

    /// Timezone for schedules that do not name one.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// URL template used to trigger workflows; `{workflow_id}` is substituted.
    #[serde(default)]
    pub workflow_endpoint: Option<String>,

    /// Schedules created at startup.
    #[serde(default)]
    pub schedules: Vec<ScheduleSeed>,
}

fn default_execution_interval_ms() -> u64 {
    30_000
}

fn default_trigger_timeout_ms() -> u64 {
    300_000
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            execution_interval_ms: default_execution_interval_ms(),
            trigger_timeout_ms: default_trigger_timeout_ms(),
            default_timezone: default_timezone(),
            workflow_endpoint: None,
            schedules: Vec::new(),
        }
    }
}

/// A schedule declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSeed {
    pub name: String,
    pub workflow_id: String,
    /// Five-field cron expression.
    pub cron_expression: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Webhook delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    /// Per-request HTTP timeout.
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub default_retry_policy: WebhookRetryPolicySettings,

    /// Webhooks registered at startup.
    #[serde(default)]
    pub endpoints: Vec<WebhookEndpoint>,
}

fn default_webhook_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    "Conductor-Webhook/1.0".to_string()
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_webhook_timeout_ms(),
            user_agent: default_user_agent(),
            default_retry_policy: WebhookRetryPolicySettings::default(),
            endpoints: Vec::new(),
        }
    }
}

/// Backoff policy for webhook deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRetryPolicySettings {
    #[serde(default = "default_webhook_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_webhook_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_webhook_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_webhook_max_retries() -> u32 {
    5
}

fn default_webhook_initial_delay_ms() -> u64 {
    1000
}

fn default_webhook_max_delay_ms() -> u64 {
    300_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for WebhookRetryPolicySettings {
    fn default() -> Self {
        Self {
            max_retries: default_webhook_max_retries(),
            initial_delay_ms: default_webhook_initial_delay_ms(),
            max_delay_ms: default_webhook_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// A webhook declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub event_type: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}
