//! Recovery configuration types (retry, circuit breaker, dead letter queue).

use serde::{Deserialize, Serialize};

use super::default_true;

/// Retry scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// How often the scheduler polls for due retries.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum attempts fetched per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum in-flight task executions.
    #[serde(default = "default_max_concurrent_retries")]
    pub max_concurrent_retries: usize,

    /// Upper bound on a single task execution.
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,

    /// Policy applied to tasks without a registered policy.
    #[serde(default)]
    pub default_policy: RetryPolicySettings,

    /// URL template used to re-run tasks; `{task_id}` is substituted.
    #[serde(default)]
    pub task_endpoint: Option<String>,
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_batch_size() -> usize {
    100
}

fn default_max_concurrent_retries() -> usize {
    10
}

fn default_execution_timeout_ms() -> u64 {
    300_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            max_concurrent_retries: default_max_concurrent_retries(),
            execution_timeout_ms: default_execution_timeout_ms(),
            default_policy: RetryPolicySettings::default(),
            task_endpoint: None,
        }
    }
}

/// Retry policy as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// One of `exponential`, `linear`, `fixed`.
    #[serde(default = "default_strategy")]
    pub strategy: String,

    #[serde(default)]
    pub backoff_multiplier: Option<f64>,

    #[serde(default)]
    pub retryable_errors: Vec<String>,

    #[serde(default)]
    pub non_retryable_errors: Vec<String>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_strategy() -> String {
    "exponential".to_string()
}

impl Default for RetryPolicySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            strategy: default_strategy(),
            backoff_multiplier: None,
            retryable_errors: Vec::new(),
            non_retryable_errors: Vec::new(),
        }
    }
}

/// Default circuit breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// How long a breaker stays open before probing.
    #[serde(default = "default_open_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_monitoring_window_ms")]
    pub monitoring_window_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_open_timeout_ms() -> u64 {
    60_000
}

fn default_monitoring_window_ms() -> u64 {
    300_000
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            timeout_ms: default_open_timeout_ms(),
            monitoring_window_ms: default_monitoring_window_ms(),
        }
    }
}

/// Dead letter queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqSettings {
    /// Storage backend: `memory` or `file`.
    #[serde(default = "default_dlq_storage")]
    pub storage: String,

    #[serde(default = "default_dlq_polling_interval_ms")]
    pub polling_interval_ms: u64,

    /// Resolved entries older than this are deleted.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Unresolved entries at or above this retry count are auto-archived.
    #[serde(default = "default_max_retry_limit")]
    pub max_retry_limit: u32,

    /// Unresolved entries older than this are auto-archived.
    #[serde(default = "default_archive_after_days")]
    pub archive_after_days: u32,

    #[serde(default = "default_true")]
    pub notification_enabled: bool,

    /// Optional URL receiving DLQ notifications.
    #[serde(default)]
    pub notification_webhook_url: Option<String>,
}

fn default_dlq_storage() -> String {
    "memory".to_string()
}

fn default_dlq_polling_interval_ms() -> u64 {
    30_000
}

fn default_retention_days() -> u32 {
    90
}

fn default_max_retry_limit() -> u32 {
    5
}

fn default_archive_after_days() -> u32 {
    30
}

impl Default for DlqSettings {
    fn default() -> Self {
        Self {
            storage: default_dlq_storage(),
            polling_interval_ms: default_dlq_polling_interval_ms(),
            retention_days: default_retention_days(),
            max_retry_limit: default_max_retry_limit(),
            archive_after_days: default_archive_after_days(),
            notification_enabled: default_true(),
            notification_webhook_url: None,
        }
    }
}
