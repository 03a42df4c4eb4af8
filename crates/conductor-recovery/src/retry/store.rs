//! Retry attempt persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::attempt::{RetryAttempt, RetryStatus};
use crate::error::{RecoveryError, RecoveryResult};

/// Storage for retry attempts.
#[async_trait]
pub trait RetryDatabase: Send + Sync {
    /// Insert or replace an attempt.
    async fn save_attempt(&self, attempt: &RetryAttempt) -> RecoveryResult<()>;

    /// Load an attempt by ID.
    async fn get_attempt(&self, id: &str) -> RecoveryResult<Option<RetryAttempt>>;

    /// Pending attempts ordered by `retry_at`, at most `limit`.
    async fn list_pending_retries(&self, limit: usize) -> RecoveryResult<Vec<RetryAttempt>>;

    /// Move a pending attempt to `status`.
    ///
    /// Fails with `InvalidState` if the attempt already reached a terminal
    /// status. The check and the write happen atomically.
    async fn update_attempt_status(&self, id: &str, status: RetryStatus) -> RecoveryResult<()>;

    /// Pending attempts with `retry_at <= now`, ordered by `retry_at`.
    async fn get_due_retries(&self, now: DateTime<Utc>) -> RecoveryResult<Vec<RetryAttempt>>;

    /// All attempts recorded for a task, oldest first.
    async fn list_attempts_for_task(&self, task_id: &str) -> RecoveryResult<Vec<RetryAttempt>>;
}

/// In-memory retry store.
pub struct MemoryRetryStore {
    attempts: RwLock<HashMap<String, RetryAttempt>>,
}

impl MemoryRetryStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self {
            attempts: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRetryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RetryDatabase for MemoryRetryStore {
    async fn save_attempt(&self, attempt: &RetryAttempt) -> RecoveryResult<()> {
        let mut attempts = self.attempts.write().await;
        attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn get_attempt(&self, id: &str) -> RecoveryResult<Option<RetryAttempt>> {
        let attempts = self.attempts.read().await;
        Ok(attempts.get(id).cloned())
    }

    async fn list_pending_retries(&self, limit: usize) -> RecoveryResult<Vec<RetryAttempt>> {
        let attempts = self.attempts.read().await;
        let mut pending: Vec<RetryAttempt> = attempts
            .values()
            .filter(|a| a.status == RetryStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|a| a.retry_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn update_attempt_status(&self, id: &str, status: RetryStatus) -> RecoveryResult<()> {
        let mut attempts = self.attempts.write().await;
        let attempt = attempts
            .get_mut(id)
            .ok_or_else(|| RecoveryError::NotFound(format!("retry attempt {}", id)))?;
        if attempt.status.is_terminal() {
            return Err(RecoveryError::InvalidState(format!(
                "retry attempt {} is already {:?}",
                id, attempt.status
            )));
        }
        attempt.status = status;
        attempt.updated_at = Utc::now();
        Ok(())
    }

    async fn get_due_retries(&self, now: DateTime<Utc>) -> RecoveryResult<Vec<RetryAttempt>> {
        let attempts = self.attempts.read().await;
        let mut due: Vec<RetryAttempt> = attempts
            .values()
            .filter(|a| a.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|a| a.retry_at);
        Ok(due)
    }

    async fn list_attempts_for_task(&self, task_id: &str) -> RecoveryResult<Vec<RetryAttempt>> {
        let attempts = self.attempts.read().await;
        let mut history: Vec<RetryAttempt> = attempts
            .values()
            .filter(|a| a.task_id == task_id)
            .cloned()
            .collect();
        history.sort_by_key(|a| (a.attempt_number, a.created_at));
        Ok(history)
    }
}
