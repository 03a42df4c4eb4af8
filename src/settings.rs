//! Mapping from file settings to component configuration.

use anyhow::{Context, Result};

use conductor_config::{
    CircuitBreakerSettings, ConductorConfig, DlqSettings, RetryPolicySettings, RetrySettings,
    SchedulerSettings, WebhookSettings,
};
use conductor_recovery::{
    BackoffStrategy, CircuitBreakerConfig, DlqProcessorConfig, RetryPolicy, RetrySchedulerConfig,
};
use conductor_scheduler::ScheduleExecutorConfig;
use conductor_webhook::{WebhookRetryPolicy, WebhookServiceConfig};

pub(crate) fn retry_policy(settings: &RetryPolicySettings) -> Result<RetryPolicy> {
    let strategy: BackoffStrategy = settings
        .strategy
        .parse()
        .context("Invalid retry.default_policy.strategy")?;

    let mut policy = RetryPolicy::new(strategy)
        .with_max_retries(settings.max_retries)
        .with_delays(settings.initial_delay_ms, settings.max_delay_ms)
        .with_retryable_errors(settings.retryable_errors.iter().cloned())
        .with_non_retryable_errors(settings.non_retryable_errors.iter().cloned());
    if let Some(multiplier) = settings.backoff_multiplier {
        policy = policy.with_backoff_multiplier(multiplier);
    }
    policy.validate().context("Invalid retry.default_policy")?;
    Ok(policy)
}

pub(crate) fn retry_scheduler_config(settings: &RetrySettings) -> Result<RetrySchedulerConfig> {
    Ok(RetrySchedulerConfig {
        poll_interval_ms: settings.poll_interval_ms,
        batch_size: settings.batch_size,
        max_concurrent_retries: settings.max_concurrent_retries,
        execution_timeout_ms: settings.execution_timeout_ms,
        default_policy: Some(retry_policy(&settings.default_policy)?),
    })
}

pub(crate) fn circuit_breaker_config(settings: &CircuitBreakerSettings) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: settings.failure_threshold,
        success_threshold: settings.success_threshold,
        timeout_ms: settings.timeout_ms,
        monitoring_window_ms: settings.monitoring_window_ms,
    }
}

pub(crate) fn dlq_processor_config(settings: &DlqSettings) -> DlqProcessorConfig {
    DlqProcessorConfig {
        polling_interval_ms: settings.polling_interval_ms,
        retention_days: settings.retention_days,
        max_retry_limit: settings.max_retry_limit,
        notification_enabled: settings.notification_enabled,
        archive_after_days: settings.archive_after_days,
    }
}

pub(crate) fn schedule_executor_config(settings: &SchedulerSettings) -> ScheduleExecutorConfig {
    ScheduleExecutorConfig {
        execution_interval_ms: settings.execution_interval_ms,
        trigger_timeout_ms: settings.trigger_timeout_ms,
    }
}

pub(crate) fn webhook_service_config(settings: &WebhookSettings) -> WebhookServiceConfig {
    let policy = &settings.default_retry_policy;
    WebhookServiceConfig {
        timeout_ms: settings.timeout_ms,
        user_agent: settings.user_agent.clone(),
        default_retry_policy: WebhookRetryPolicy {
            max_retries: policy.max_retries,
            initial_delay_ms: policy.initial_delay_ms,
            max_delay_ms: policy.max_delay_ms,
            backoff_multiplier: policy.backoff_multiplier,
        },
    }
}

/// Everything the `run` command needs, resolved up front so bad settings fail
/// before any worker starts.
pub(crate) struct RuntimeSettings {
    pub retry: RetrySchedulerConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub dlq: DlqProcessorConfig,
    pub executor: ScheduleExecutorConfig,
    pub webhook: WebhookServiceConfig,
}

impl RuntimeSettings {
    pub fn from_config(config: &ConductorConfig) -> Result<Self> {
        Ok(Self {
            retry: retry_scheduler_config(&config.retry)?,
            circuit_breaker: circuit_breaker_config(&config.circuit_breaker),
            dlq: dlq_processor_config(&config.dlq),
            executor: schedule_executor_config(&config.scheduler),
            webhook: webhook_service_config(&config.webhook),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_map_through() {
        let settings = RuntimeSettings::from_config(&ConductorConfig::default()).unwrap();
        assert_eq!(settings.retry.poll_interval_ms, 30_000);
        assert_eq!(settings.retry.max_concurrent_retries, 10);
        let policy = settings.retry.default_policy.unwrap();
        assert_eq!(policy.strategy, BackoffStrategy::Exponential);
        assert_eq!(settings.circuit_breaker.failure_threshold, 5);
        assert_eq!(settings.dlq.retention_days, 90);
        assert_eq!(settings.executor.trigger_timeout_ms, 300_000);
        assert_eq!(settings.webhook.user_agent, "Conductor-Webhook/1.0");
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let mut config = ConductorConfig::default();
        config.retry.default_policy.strategy = "random".to_string();
        assert!(RuntimeSettings::from_config(&config).is_err());
    }

    #[test]
    fn test_retry_policy_error_lists() {
        let settings = RetryPolicySettings {
            strategy: "linear".to_string(),
            retryable_errors: vec!["timeout".to_string()],
            non_retryable_errors: vec!["invalid".to_string()],
            backoff_multiplier: Some(3.0),
            ..Default::default()
        };
        let policy = retry_policy(&settings).unwrap();
        assert_eq!(policy.strategy, BackoffStrategy::Linear);
        assert_eq!(policy.retryable_errors, vec!["timeout".to_string()]);
        assert_eq!(policy.non_retryable_errors, vec!["invalid".to_string()]);
        assert_eq!(policy.backoff_multiplier, Some(3.0));
    }
}
