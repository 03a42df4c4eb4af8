//! Retry engine: backoff dispatch and attempt bookkeeping.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use super::attempt::{NextRetry, RetryAttempt, RetryStatus};
use super::policy::{
    apply_jitter, fixed_backoff, linear_backoff, scaled_exponential_backoff, BackoffStrategy,
    RetryPolicy,
};
use super::store::RetryDatabase;
use crate::error::RecoveryResult;

/// Default jitter factor applied to computed delays.
pub const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Explicit decision for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Another attempt should be scheduled.
    Retry,
    /// The policy's retry budget is spent.
    Exhausted,
    /// The error is classified as permanent.
    NonRetryable,
}

/// Retry engine.
pub struct RetryEngine {
    db: Arc<dyn RetryDatabase>,
    jitter_factor: f64,
}

impl RetryEngine {
    /// Create a new retry engine over the given store.
    pub fn new(db: Arc<dyn RetryDatabase>) -> Self {
        Self {
            db,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    /// Set the jitter factor.
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Compute when the retry following `attempt` should run.
    pub fn calculate_next_retry(
        &self,
        attempt: u32,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> NextRetry {
        let delay_ms = match policy.strategy {
            BackoffStrategy::Exponential => scaled_exponential_backoff(
                attempt,
                policy.initial_delay_ms,
                policy.max_delay_ms,
                policy.backoff_multiplier.unwrap_or(2.0),
            ),
            BackoffStrategy::Linear => {
                linear_backoff(attempt, policy.initial_delay_ms, policy.max_delay_ms)
            }
            BackoffStrategy::Fixed => fixed_backoff(policy.initial_delay_ms, policy.max_delay_ms),
        };
        let jittered_delay_ms = apply_jitter(delay_ms, self.jitter_factor);
        let offset = i64::try_from(jittered_delay_ms).unwrap_or(i64::MAX);

        NextRetry {
            next_retry_at: now + Duration::milliseconds(offset),
            delay_ms,
            jittered_delay_ms,
            attempt: attempt + 1,
        }
    }

    /// Whether attempt `attempt_number` may be followed by another.
    pub fn can_retry(&self, attempt_number: u32, policy: &RetryPolicy) -> bool {
        attempt_number < policy.max_retries
    }

    /// Classify an error message against the policy's pattern lists.
    pub fn is_retryable_error(&self, error_message: &str, policy: &RetryPolicy) -> bool {
        if !policy.non_retryable_errors.is_empty() {
            return !policy
                .non_retryable_errors
                .iter()
                .any(|p| error_message.contains(p.as_str()));
        }
        if !policy.retryable_errors.is_empty() {
            return policy
                .retryable_errors
                .iter()
                .any(|p| error_message.contains(p.as_str()));
        }
        true
    }

    /// Decide what happens after attempt `attempt_number` failed with `error_message`.
    pub fn decide(
        &self,
        attempt_number: u32,
        error_message: &str,
        policy: &RetryPolicy,
    ) -> RetryDecision {
        if !self.is_retryable_error(error_message, policy) {
            RetryDecision::NonRetryable
        } else if !self.can_retry(attempt_number, policy) {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry
        }
    }

    /// Schedule the retry that follows `attempt_number` and persist it as pending.
    pub async fn create_retry_attempt(
        &self,
        task_id: &str,
        attempt_number: u32,
        error_message: &str,
        policy: &RetryPolicy,
    ) -> RecoveryResult<RetryAttempt> {
        policy.validate()?;
        let now = Utc::now();
        let next = self.calculate_next_retry(attempt_number, policy, now);

        let attempt = RetryAttempt {
            id: format!("retry_{}_{}_{}", task_id, next.attempt, Uuid::new_v4()),
            task_id: task_id.to_string(),
            attempt_number: next.attempt,
            error_message: error_message.to_string(),
            retry_at: next.next_retry_at,
            status: RetryStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.db.save_attempt(&attempt).await?;

        debug!(
            "Scheduled retry {} for task {} in {}ms",
            attempt.attempt_number, task_id, next.jittered_delay_ms
        );
        Ok(attempt)
    }

    /// Pending attempts whose retry time has passed.
    pub async fn get_due_retries(&self) -> RecoveryResult<Vec<RetryAttempt>> {
        self.db.get_due_retries(Utc::now()).await
    }

    /// Load an attempt by ID.
    pub async fn get_attempt(&self, id: &str) -> RecoveryResult<Option<RetryAttempt>> {
        self.db.get_attempt(id).await
    }

    /// Attempt history for a task.
    pub async fn attempt_history(&self, task_id: &str) -> RecoveryResult<Vec<RetryAttempt>> {
        self.db.list_attempts_for_task(task_id).await
    }

    /// Mark a pending attempt as succeeded.
    pub async fn mark_success(&self, id: &str) -> RecoveryResult<()> {
        self.transition(id, RetryStatus::Success).await
    }

    /// Mark a pending attempt as failed.
    pub async fn mark_failed(&self, id: &str) -> RecoveryResult<()> {
        self.transition(id, RetryStatus::Failed).await
    }

    async fn transition(&self, id: &str, status: RetryStatus) -> RecoveryResult<()> {
        self.db.update_attempt_status(id, status).await
    }
}
