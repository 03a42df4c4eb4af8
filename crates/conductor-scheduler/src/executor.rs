//! Schedule executor worker.
//!
//! Checks for due schedules on an interval (and once immediately on start),
//! triggers their workflows one at a time and records the outcome.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ScheduleExecutorConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::schedule::{Schedule, ScheduleStatus};
use crate::service::SchedulerCore;

/// Starts a workflow run.
#[async_trait]
pub trait WorkflowTrigger: Send + Sync {
    async fn trigger(&self, workflow_id: &str) -> SchedulerResult<()>;
}

/// Published after every schedule execution.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleExecutionEvent {
    pub schedule_id: String,
    pub schedule_name: String,
    pub workflow_id: String,
    pub status: ScheduleStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleExecutorStats {
    pub is_running: bool,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    /// When the last check for due schedules finished.
    pub last_execution_time: Option<DateTime<Utc>>,
    pub uptime_ms: Option<u64>,
}

/// Schedule executor worker.
pub struct ScheduleExecutor {
    core: Arc<SchedulerCore>,
    trigger: Arc<dyn WorkflowTrigger>,
    config: ScheduleExecutorConfig,
    total_executions: AtomicU64,
    successful_executions: AtomicU64,
    failed_executions: AtomicU64,
    last_execution_time: Mutex<Option<DateTime<Utc>>>,
    started_at: Mutex<Option<Instant>>,
    running: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
    events: broadcast::Sender<ScheduleExecutionEvent>,
}

impl ScheduleExecutor {
    pub fn new(
        core: Arc<SchedulerCore>,
        trigger: Arc<dyn WorkflowTrigger>,
        config: ScheduleExecutorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            core,
            trigger,
            config,
            total_executions: AtomicU64::new(0),
            successful_executions: AtomicU64::new(0),
            failed_executions: AtomicU64::new(0),
            last_execution_time: Mutex::new(None),
            started_at: Mutex::new(None),
            running: AtomicBool::new(false),
            cancel: Mutex::new(None),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleExecutionEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the check loop. Returns `None` if it is already running.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Schedule executor is already running");
            return None;
        }

        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());
        *self.started_at.lock() = Some(Instant::now());
        let this = self.clone();

        Some(tokio::spawn(async move {
            info!(
                "Schedule executor started (interval: {}ms)",
                this.config.execution_interval_ms
            );

            let mut interval = time::interval(this.config.execution_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = this.execute_due_schedules().await {
                            error!("Error executing schedules: {}", e);
                        }
                    }
                }
            }

            info!("Schedule executor stopped");
        }))
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Schedule executor is not running");
            return;
        }
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
        *self.started_at.lock() = None;
    }

    pub fn stats(&self) -> ScheduleExecutorStats {
        ScheduleExecutorStats {
            is_running: self.is_running(),
            total_executions: self.total_executions.load(Ordering::Relaxed),
            successful_executions: self.successful_executions.load(Ordering::Relaxed),
            failed_executions: self.failed_executions.load(Ordering::Relaxed),
            last_execution_time: *self.last_execution_time.lock(),
            uptime_ms: self
                .started_at
                .lock()
                .map(|started| started.elapsed().as_millis() as u64),
        }
    }

    /// Fire every due schedule in turn. Returns how many were executed.
    pub async fn execute_due_schedules(&self) -> SchedulerResult<usize> {
        let due = self.core.due_schedules(Utc::now()).await?;
        if !due.is_empty() {
            debug!("{} schedules due", due.len());
        }

        for schedule in &due {
            self.execute_schedule(schedule).await;
        }

        *self.last_execution_time.lock() = Some(Utc::now());
        Ok(due.len())
    }

    /// Trigger one schedule's workflow and record the result.
    pub async fn execute_schedule(&self, schedule: &Schedule) -> ScheduleExecutionEvent {
        let started = Instant::now();

        let outcome = match time::timeout(
            self.config.trigger_timeout(),
            self.trigger.trigger(&schedule.workflow_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SchedulerError::Trigger(format!(
                "Workflow trigger timed out after {}ms",
                self.config.trigger_timeout_ms
            ))),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let (status, error, result) = match outcome {
            Ok(()) => (
                ScheduleStatus::Success,
                None,
                Some(serde_json::json!({ "executed_at": Utc::now() })),
            ),
            Err(e) => (ScheduleStatus::Failed, Some(e.to_string()), None),
        };

        self.total_executions.fetch_add(1, Ordering::Relaxed);
        match status {
            ScheduleStatus::Success => {
                self.successful_executions.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Successfully executed schedule {} (duration: {}ms)",
                    schedule.id, duration_ms
                );
            }
            _ => {
                self.failed_executions.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Failed to execute schedule {}: {} (duration: {}ms)",
                    schedule.id,
                    error.as_deref().unwrap_or("unknown error"),
                    duration_ms
                );
            }
        }

        if let Err(e) = self
            .core
            .record_execution(
                &schedule.id,
                &schedule.workflow_id,
                status,
                duration_ms,
                error.clone(),
                result,
            )
            .await
        {
            error!("Failed to record execution of schedule {}: {}", schedule.id, e);
        }

        let event = ScheduleExecutionEvent {
            schedule_id: schedule.id.clone(),
            schedule_name: schedule.name.clone(),
            workflow_id: schedule.workflow_id.clone(),
            status,
            duration_ms,
            error,
            timestamp: Utc::now(),
        };
        let _ = self.events.send(event.clone());
        event
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
