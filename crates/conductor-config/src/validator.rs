//! Configuration validation.

use chrono_tz::Tz;

use crate::error::ConfigError;
use crate::schema::{ConductorConfig, RetryPolicySettings, WebhookRetryPolicySettings};

/// Poll intervals below this are accepted but flagged.
const MIN_RECOMMENDED_INTERVAL_MS: u64 = 1000;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &ConductorConfig) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_retry(config, &mut result);
        Self::validate_circuit_breaker(config, &mut result);
        Self::validate_dlq(config, &mut result);
        Self::validate_scheduler(config, &mut result);
        Self::validate_webhook(config, &mut result);

        Ok(result)
    }

    fn check_interval(path: &str, value: u64, result: &mut ValidationResult) {
        if value == 0 {
            result.add_error(ValidationError::new(path, "Interval must be greater than 0"));
        } else if value < MIN_RECOMMENDED_INTERVAL_MS {
            result.add_warning(ValidationWarning::new(
                path,
                format!("Interval of {}ms is very short and may cause heavy polling", value),
            ));
        }
    }

    fn check_url(path: &str, url: &str, result: &mut ValidationResult) {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            result.add_error(ValidationError::new(
                path,
                "URL must start with http:// or https://",
            ));
        }
    }

    fn check_timezone(path: &str, timezone: &str, result: &mut ValidationResult) {
        if timezone.parse::<Tz>().is_err() {
            result.add_error(ValidationError::new(
                path,
                format!("Unknown timezone '{}'", timezone),
            ));
        }
    }

    fn validate_retry_policy(path: &str, policy: &RetryPolicySettings, result: &mut ValidationResult) {
        let valid_strategies = ["exponential", "linear", "fixed"];
        if !valid_strategies.contains(&policy.strategy.as_str()) {
            result.add_error(ValidationError::new(
                format!("{}.strategy", path),
                format!(
                    "Unknown backoff strategy '{}', valid values: {:?}",
                    policy.strategy, valid_strategies
                ),
            ));
        }

        if policy.initial_delay_ms > policy.max_delay_ms {
            result.add_error(ValidationError::new(
                format!("{}.initial_delay_ms", path),
                "initial_delay_ms must not exceed max_delay_ms",
            ));
        }
    }

    fn validate_retry(config: &ConductorConfig, result: &mut ValidationResult) {
        let retry = &config.retry;
        Self::check_interval("retry.poll_interval_ms", retry.poll_interval_ms, result);

        if retry.max_concurrent_retries == 0 {
            result.add_error(ValidationError::new(
                "retry.max_concurrent_retries",
                "max_concurrent_retries must be greater than 0",
            ));
        }

        if retry.batch_size == 0 {
            result.add_error(ValidationError::new(
                "retry.batch_size",
                "batch_size must be greater than 0",
            ));
        }

        if retry.execution_timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "retry.execution_timeout_ms",
                "execution_timeout_ms must be greater than 0",
            ));
        }

        Self::validate_retry_policy("retry.default_policy", &retry.default_policy, result);

        if let Some(ref endpoint) = retry.task_endpoint {
            Self::check_url("retry.task_endpoint", endpoint, result);
        }
    }

    fn validate_circuit_breaker(config: &ConductorConfig, result: &mut ValidationResult) {
        let cb = &config.circuit_breaker;
        if cb.failure_threshold == 0 {
            result.add_error(ValidationError::new(
                "circuit_breaker.failure_threshold",
                "failure_threshold must be greater than 0",
            ));
        }
        if cb.success_threshold == 0 {
            result.add_error(ValidationError::new(
                "circuit_breaker.success_threshold",
                "success_threshold must be greater than 0",
            ));
        }
        if cb.timeout_ms == 0 {
            result.add_warning(ValidationWarning::new(
                "circuit_breaker.timeout_ms",
                "timeout_ms is 0, open breakers will probe immediately",
            ));
        }
    }

    fn validate_dlq(config: &ConductorConfig, result: &mut ValidationResult) {
        let dlq = &config.dlq;
        let valid_storage = ["memory", "file"];
        if !valid_storage.contains(&dlq.storage.as_str()) {
            result.add_error(ValidationError::new(
                "dlq.storage",
                format!(
                    "Unknown DLQ storage '{}', valid values: {:?}",
                    dlq.storage, valid_storage
                ),
            ));
        }

        Self::check_interval("dlq.polling_interval_ms", dlq.polling_interval_ms, result);

        if dlq.retention_days < dlq.archive_after_days {
            result.add_warning(ValidationWarning::new(
                "dlq.retention_days",
                "retention_days is shorter than archive_after_days, archived entries will be deleted early",
            ));
        }

        if let Some(ref url) = dlq.notification_webhook_url {
            Self::check_url("dlq.notification_webhook_url", url, result);
        }
    }

    fn validate_scheduler(config: &ConductorConfig, result: &mut ValidationResult) {
        let scheduler = &config.scheduler;
        Self::check_interval(
            "scheduler.execution_interval_ms",
            scheduler.execution_interval_ms,
            result,
        );
        Self::check_timezone(
            "scheduler.default_timezone",
            &scheduler.default_timezone,
            result,
        );

        if let Some(ref endpoint) = scheduler.workflow_endpoint {
            Self::check_url("scheduler.workflow_endpoint", endpoint, result);
        } else if !scheduler.schedules.is_empty() {
            result.add_warning(ValidationWarning::new(
                "scheduler.workflow_endpoint",
                "No workflow endpoint set, schedules will only be logged",
            ));
        }

        for (i, seed) in scheduler.schedules.iter().enumerate() {
            let path = format!("scheduler.schedules[{}]", i);
            if seed.name.is_empty() {
                result.add_error(ValidationError::new(format!("{}.name", path), "Name cannot be empty"));
            }
            if seed.cron_expression.split_whitespace().count() != 5 {
                result.add_error(ValidationError::new(
                    format!("{}.cron_expression", path),
                    "Cron expression must have 5 fields",
                ));
            }
            if let Some(ref tz) = seed.timezone {
                Self::check_timezone(&format!("{}.timezone", path), tz, result);
            }
        }
    }

    fn validate_webhook_policy(
        path: &str,
        policy: &WebhookRetryPolicySettings,
        result: &mut ValidationResult,
    ) {
        if policy.max_retries == 0 {
            result.add_error(ValidationError::new(
                format!("{}.max_retries", path),
                "max_retries must be at least 1",
            ));
        }
        if policy.initial_delay_ms > policy.max_delay_ms {
            result.add_error(ValidationError::new(
                format!("{}.initial_delay_ms", path),
                "initial_delay_ms must not exceed max_delay_ms",
            ));
        }
        if policy.backoff_multiplier < 1.0 {
            result.add_warning(ValidationWarning::new(
                format!("{}.backoff_multiplier", path),
                "backoff_multiplier below 1.0 makes delays shrink between attempts",
            ));
        }
    }

    fn validate_webhook(config: &ConductorConfig, result: &mut ValidationResult) {
        let webhook = &config.webhook;
        if webhook.timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "webhook.timeout_ms",
                "timeout_ms must be greater than 0",
            ));
        }

        Self::validate_webhook_policy(
            "webhook.default_retry_policy",
            &webhook.default_retry_policy,
            result,
        );

        for (i, endpoint) in webhook.endpoints.iter().enumerate() {
            let path = format!("webhook.endpoints[{}]", i);
            Self::check_url(&format!("{}.url", path), &endpoint.url, result);
            if endpoint.event_type.is_empty() {
                result.add_error(ValidationError::new(
                    format!("{}.event_type", path),
                    "event_type cannot be empty",
                ));
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
