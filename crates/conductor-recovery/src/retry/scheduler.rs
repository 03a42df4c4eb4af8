//! Retry scheduler worker.
//!
//! Polls the retry store for due attempts and re-executes them through a
//! [`TaskExecutor`], never exceeding `max_concurrent_retries` in-flight
//! executions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::attempt::RetryAttempt;
use super::engine::{RetryDecision, RetryEngine};
use super::policy::RetryPolicy;
use crate::config::RetrySchedulerConfig;
use crate::dlq::{DeadLetterQueue, ErrorDetails};
use crate::error::RecoveryResult;

/// Result of executing a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Executes the underlying business task.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run the task once.
    async fn execute(&self, task_id: &str) -> ExecutionOutcome;
}

/// What happened to a task after a failure or retry.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    /// The retry succeeded.
    Succeeded,
    /// Another attempt was scheduled.
    Rescheduled {
        next_attempt: u32,
        retry_at: DateTime<Utc>,
    },
    /// No further attempts; the task was dead-lettered if a DLQ is attached.
    Abandoned {
        reason: RetryDecision,
        dlq_entry_id: Option<String>,
    },
}

/// Published after every processed failure or retry.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    pub task_id: String,
    pub attempt_number: u32,
    pub outcome: RetryOutcome,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Retry scheduler worker.
pub struct RetryScheduler {
    engine: Arc<RetryEngine>,
    executor: Arc<dyn TaskExecutor>,
    config: RetrySchedulerConfig,
    policies: DashMap<String, RetryPolicy>,
    dead_letters: Option<Arc<DeadLetterQueue>>,
    semaphore: Arc<Semaphore>,
    in_flight: DashSet<String>,
    running: AtomicBool,
    cancel: parking_lot::Mutex<Option<CancellationToken>>,
    events: broadcast::Sender<RetryEvent>,
}

impl RetryScheduler {
    /// Create a new retry scheduler.
    pub fn new(
        engine: Arc<RetryEngine>,
        executor: Arc<dyn TaskExecutor>,
        config: RetrySchedulerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let permits = config.max_concurrent_retries.max(1);
        Self {
            engine,
            executor,
            config,
            policies: DashMap::new(),
            dead_letters: None,
            semaphore: Arc::new(Semaphore::new(permits)),
            in_flight: DashSet::new(),
            running: AtomicBool::new(false),
            cancel: parking_lot::Mutex::new(None),
            events,
        }
    }

    /// Dead-letter tasks whose retries are exhausted.
    pub fn with_dead_letter_queue(mut self, dlq: Arc<DeadLetterQueue>) -> Self {
        self.dead_letters = Some(dlq);
        self
    }

    /// Register the retry policy for a task.
    pub fn register_task_policy(&self, task_id: impl Into<String>, policy: RetryPolicy) {
        self.policies.insert(task_id.into(), policy);
    }

    /// Remove the retry policy for a task.
    pub fn unregister_task_policy(&self, task_id: &str) {
        self.policies.remove(task_id);
    }

    /// Subscribe to retry events.
    pub fn subscribe(&self) -> broadcast::Receiver<RetryEvent> {
        self.events.subscribe()
    }

    /// Number of executions currently in flight.
    pub fn active_retry_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Check if the polling loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the polling loop. Returns `None` if it is already running.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Retry scheduler is already running");
            return None;
        }

        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());
        let this = self.clone();

        Some(tokio::spawn(async move {
            info!(
                "Retry scheduler started (poll interval: {}ms, max concurrent: {})",
                this.config.poll_interval_ms, this.config.max_concurrent_retries
            );

            let mut interval = time::interval(this.config.poll_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = this.poll().await {
                            error!("Retry poll failed: {}", e);
                        }
                    }
                }
            }

            info!("Retry scheduler stopped");
        }))
    }

    /// Stop the polling loop. In-flight executions finish on their own.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Retry scheduler is not running");
            return;
        }
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
    }

    /// Dispatch due attempts into free concurrency slots. Returns the number dispatched.
    pub async fn poll(self: &Arc<Self>) -> RecoveryResult<usize> {
        if self.semaphore.available_permits() == 0 {
            debug!("Max concurrent retries reached, skipping poll");
            return Ok(0);
        }

        let due = self.engine.get_due_retries().await?;
        if due.is_empty() {
            debug!("No due retries found");
            return Ok(0);
        }

        let mut dispatched = 0;
        let candidates: Vec<RetryAttempt> = due
            .into_iter()
            .filter(|a| !self.in_flight.contains(&a.id))
            .take(self.config.batch_size)
            .collect();

        for attempt in candidates {
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                debug!("Retry window full, remaining attempts wait for the next poll");
                break;
            };

            self.in_flight.insert(attempt.id.clone());
            let this = self.clone();
            tokio::spawn(async move {
                this.execute_retry(attempt).await;
                drop(permit);
            });
            dispatched += 1;
        }

        if dispatched > 0 {
            info!("Dispatched {} due retries", dispatched);
        }
        Ok(dispatched)
    }

    /// Report a first failure of a task and let the policy decide.
    pub async fn report_failure(
        &self,
        task_id: &str,
        error_message: &str,
    ) -> RecoveryResult<RetryOutcome> {
        let outcome = self.handle_failure(task_id, 0, error_message).await?;
        self.publish(task_id, 0, outcome.clone(), Some(error_message));
        Ok(outcome)
    }

    async fn execute_retry(&self, attempt: RetryAttempt) {
        info!(
            "Executing retry for task {}, attempt {}",
            attempt.task_id, attempt.attempt_number
        );

        let outcome = match time::timeout(
            self.config.execution_timeout(),
            self.executor.execute(&attempt.task_id),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => ExecutionOutcome::failure(format!(
                "Task execution timed out after {}ms",
                self.config.execution_timeout_ms
            )),
        };

        let error = outcome
            .error
            .clone()
            .unwrap_or_else(|| "Unknown error".to_string());

        let result = if outcome.success {
            self.engine
                .mark_success(&attempt.id)
                .await
                .map(|_| RetryOutcome::Succeeded)
        } else {
            warn!("Retry failed for task {}: {}", attempt.task_id, error);
            match self
                .handle_failure(&attempt.task_id, attempt.attempt_number, &error)
                .await
            {
                Ok(next) => self.engine.mark_failed(&attempt.id).await.map(|_| next),
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(next) => {
                let error = (!outcome.success).then_some(error.as_str());
                self.publish(&attempt.task_id, attempt.attempt_number, next, error);
            }
            Err(e) => {
                error!("Error executing retry for task {}: {}", attempt.task_id, e);
                if let Err(e) = self.engine.mark_failed(&attempt.id).await {
                    debug!("Could not mark attempt {} failed: {}", attempt.id, e);
                }
            }
        }

        self.in_flight.remove(&attempt.id);
    }

    async fn handle_failure(
        &self,
        task_id: &str,
        attempt_number: u32,
        error_message: &str,
    ) -> RecoveryResult<RetryOutcome> {
        let policy = self
            .policies
            .get(task_id)
            .map(|p| p.value().clone())
            .or_else(|| self.config.default_policy.clone());

        let decision = match policy {
            Some(ref p) => self.engine.decide(attempt_number, error_message, p),
            None => RetryDecision::Exhausted,
        };

        if let (RetryDecision::Retry, Some(policy)) = (decision, policy.as_ref()) {
            let next = self
                .engine
                .create_retry_attempt(task_id, attempt_number, error_message, policy)
                .await?;
            debug!(
                "Scheduling next retry for task {}, attempt {}",
                task_id, next.attempt_number
            );
            return Ok(RetryOutcome::Rescheduled {
                next_attempt: next.attempt_number,
                retry_at: next.retry_at,
            });
        }

        warn!(
            "Giving up on task {} after attempt {} ({:?})",
            task_id, attempt_number, decision
        );

        let dlq_entry_id = match self.dead_letters {
            Some(ref dlq) => {
                let definition = serde_json::json!({
                    "task_id": task_id,
                    "policy": policy,
                });
                let entry = dlq
                    .add_failed_task(
                        task_id,
                        definition,
                        ErrorDetails::new(error_message),
                        attempt_number,
                    )
                    .await?;
                Some(entry.id)
            }
            None => None,
        };

        Ok(RetryOutcome::Abandoned {
            reason: decision,
            dlq_entry_id,
        })
    }

    fn publish(&self, task_id: &str, attempt_number: u32, outcome: RetryOutcome, error: Option<&str>) {
        let _ = self.events.send(RetryEvent {
            task_id: task_id.to_string(),
            attempt_number,
            outcome,
            error: error.map(str::to_string),
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
