//! Scheduler errors.

use thiserror::Error;

/// Why a cron expression failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    #[error("expected 5 fields, got {found}")]
    FieldCount { found: usize },

    #[error("{field} value {value} out of range {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("{field} has non-numeric token '{token}'")]
    InvalidNumber { field: &'static str, token: String },

    #[error("{field} has invalid step '{step}'")]
    InvalidStep { field: &'static str, step: String },

    #[error("{field} has invalid range '{range}'")]
    InvalidRange { field: &'static str, range: String },
}

/// Scheduler error types.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid cron expression: {0}")]
    InvalidCron(#[from] CronError),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Unable to calculate next execution time for '{0}'")]
    NoNextExecution(String),

    #[error("Schedule not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Workflow trigger failed: {0}")]
    Trigger(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_error_display() {
        let err = CronError::OutOfRange {
            field: "minute",
            value: 60,
            min: 0,
            max: 59,
        };
        assert_eq!(err.to_string(), "minute value 60 out of range 0-59");

        let err = SchedulerError::from(CronError::FieldCount { found: 4 });
        assert_eq!(
            err.to_string(),
            "Invalid cron expression: expected 5 fields, got 4"
        );
    }
}
