//! Retry attempt records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Retry attempt status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    Pending,
    Success,
    Failed,
}

impl RetryStatus {
    /// Whether no further transitions are permitted.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A scheduled retry of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub id: String,
    pub task_id: String,
    /// 1-based attempt number.
    pub attempt_number: u32,
    pub error_message: String,
    pub retry_at: DateTime<Utc>,
    pub status: RetryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RetryAttempt {
    /// Whether the attempt is pending and its retry time has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == RetryStatus::Pending && self.retry_at <= now
    }
}

/// Result of a next-retry calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NextRetry {
    pub next_retry_at: DateTime<Utc>,
    /// Delay before jitter.
    pub delay_ms: u64,
    pub jittered_delay_ms: u64,
    /// Attempt number of the scheduled retry.
    pub attempt: u32,
}
