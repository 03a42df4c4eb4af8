//! Recovery configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Retry scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySchedulerConfig {
    /// Poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum due attempts considered per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum in-flight task executions.
    #[serde(default = "default_max_concurrent_retries")]
    pub max_concurrent_retries: usize,

    /// Upper bound on a single task execution in milliseconds.
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,

    /// Policy for tasks without a registered policy. `None` means such tasks are not retried again.
    #[serde(default)]
    pub default_policy: Option<RetryPolicy>,
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

impl Default for RetrySchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            max_concurrent_retries: default_max_concurrent_retries(),
            execution_timeout_ms: default_execution_timeout_ms(),
            default_policy: None,
        }
    }
}

impl RetrySchedulerConfig {
    /// Get poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get execution timeout as Duration.
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failures in the closed state before opening.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Successes in the half-open state before closing.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Time spent open before probing, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Failures older than this window no longer count towards the threshold.
    #[serde(default = "default_monitoring_window_ms")]
    pub monitoring_window_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_monitoring_window_ms() -> u64 {
    300_000
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            timeout_ms: default_timeout_ms(),
            monitoring_window_ms: default_monitoring_window_ms(),
        }
    }
}

/// Partial update for a circuit breaker's configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitBreakerConfigUpdate {
    pub failure_threshold: Option<u32>,
    pub success_threshold: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub monitoring_window_ms: Option<u64>,
}

impl CircuitBreakerConfig {
    /// Merge a partial update into this configuration.
    pub fn merge(&mut self, update: &CircuitBreakerConfigUpdate) {
        if let Some(v) = update.failure_threshold {
            self.failure_threshold = v;
        }
        if let Some(v) = update.success_threshold {
            self.success_threshold = v;
        }
        if let Some(v) = update.timeout_ms {
            self.timeout_ms = v;
        }
        if let Some(v) = update.monitoring_window_ms {
            self.monitoring_window_ms = v;
        }
    }
}

/// DLQ processor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqProcessorConfig {
    #[serde(default = "default_dlq_polling_interval_ms")]
    pub polling_interval_ms: u64,

    /// Resolved entries older than this are deleted.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Unresolved entries at or above this retry count are auto-archived.
    #[serde(default = "default_max_retry_limit")]
    pub max_retry_limit: u32,

    #[serde(default = "default_notification_enabled")]
    pub notification_enabled: bool,

    /// Unresolved entries older than this are auto-archived.
    #[serde(default = "default_archive_after_days")]
    pub archive_after_days: u32,
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

fn default_notification_enabled() -> bool {
    true
}

fn default_archive_after_days() -> u32 {
    30
}

impl Default for DlqProcessorConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: default_dlq_polling_interval_ms(),
            retention_days: default_retention_days(),
            max_retry_limit: default_max_retry_limit(),
            notification_enabled: default_notification_enabled(),
            archive_after_days: default_archive_after_days(),
        }
    }
}

impl DlqProcessorConfig {
    /// Get polling interval as Duration.
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetrySchedulerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_concurrent_retries, 10);
        assert!(config.default_policy.is_none());

        let dlq = DlqProcessorConfig::default();
        assert_eq!(dlq.retention_days, 90);
        assert_eq!(dlq.archive_after_days, 30);
    }

    #[test]
    fn test_circuit_breaker_merge() {
        let mut config = CircuitBreakerConfig::default();
        config.merge(&CircuitBreakerConfigUpdate {
            failure_threshold: Some(10),
            timeout_ms: Some(5_000),
            ..Default::default()
        });
        assert_eq!(config.failure_threshold, 10);
        assert_eq!(config.success_threshold, 2);
        assert_eq!(config.timeout_ms, 5_000);
        assert_eq!(config.monitoring_window_ms, 300_000);
    }

    #[test]
    fn test_config_serialization() {
        let config = RetrySchedulerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RetrySchedulerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.execution_timeout_ms, config.execution_timeout_ms);
    }
}
