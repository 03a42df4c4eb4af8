//! Schedule management.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cron::{parse_timezone, CronExpression};
use crate::error::{SchedulerError, SchedulerResult};
use crate::schedule::{
    CreateScheduleRequest, ExecutionHistory, HistoryFilter, Schedule, ScheduleFilter,
    ScheduleStatus, UpdateScheduleRequest, DEFAULT_PAGE_LIMIT,
};
use crate::store::ScheduleStore;

/// Owns schedule CRUD and execution history.
pub struct SchedulerCore {
    store: Arc<dyn ScheduleStore>,
    default_timezone: String,
}

impl SchedulerCore {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self {
            store,
            default_timezone: "UTC".to_string(),
        }
    }

    /// Timezone used when a request does not name one.
    pub fn with_default_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.default_timezone = timezone.into();
        self
    }

    /// Validate and persist a new schedule.
    pub async fn create_schedule(&self, request: CreateScheduleRequest) -> SchedulerResult<Schedule> {
        if request.name.trim().is_empty() {
            return Err(SchedulerError::Validation("Schedule name is required".to_string()));
        }
        if request.workflow_id.trim().is_empty() {
            return Err(SchedulerError::Validation("Workflow ID is required".to_string()));
        }

        let cron = CronExpression::parse(&request.cron_expression)?;
        let timezone = request
            .timezone
            .unwrap_or_else(|| self.default_timezone.clone());
        let now = Utc::now();
        let next = next_time(&cron, &timezone, now)?;

        let schedule = Schedule {
            id: format!("schedule_{}", Uuid::new_v4()),
            name: request.name,
            description: request.description,
            workflow_id: request.workflow_id,
            cron_expression: request.cron_expression,
            enabled: request.enabled,
            timezone,
            last_execution_time: None,
            next_execution_time: Some(next),
            created_at: now,
            updated_at: now,
            metadata: request.metadata,
        };

        self.store.save_schedule(&schedule).await?;
        info!(
            "Created schedule '{}' ({}) for workflow {}, next run at {}",
            schedule.name, schedule.id, schedule.workflow_id, next
        );
        Ok(schedule)
    }

    pub async fn get_schedule(&self, id: &str) -> SchedulerResult<Option<Schedule>> {
        self.store.get_schedule(id).await
    }

    /// Schedules matching the filter, paged with a default limit of 100.
    pub async fn list_schedules(&self, filter: &ScheduleFilter) -> SchedulerResult<Vec<Schedule>> {
        let schedules = self.store.list_schedules().await?;
        Ok(schedules
            .into_iter()
            .filter(|s| filter.matches(s))
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(DEFAULT_PAGE_LIMIT))
            .collect())
    }

    /// Enabled schedules whose next execution time has passed.
    pub async fn due_schedules(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<Schedule>> {
        let schedules = self.store.list_schedules().await?;
        Ok(schedules.into_iter().filter(|s| s.is_due(now)).collect())
    }

    /// Apply a partial update. The next execution time is only recomputed
    /// when the cron expression changes.
    pub async fn update_schedule(
        &self,
        id: &str,
        request: UpdateScheduleRequest,
    ) -> SchedulerResult<Schedule> {
        let mut schedule = self.require(id).await?;

        if let Some(timezone) = request.timezone {
            parse_timezone(&timezone)?;
            schedule.timezone = timezone;
        }

        if let Some(expression) = request.cron_expression {
            if expression != schedule.cron_expression {
                let cron = CronExpression::parse(&expression)?;
                schedule.next_execution_time =
                    Some(next_time(&cron, &schedule.timezone, Utc::now())?);
                schedule.cron_expression = expression;
            }
        }

        if let Some(name) = request.name {
            schedule.name = name;
        }
        if let Some(description) = request.description {
            schedule.description = Some(description);
        }
        if let Some(enabled) = request.enabled {
            schedule.enabled = enabled;
        }
        if let Some(metadata) = request.metadata {
            schedule.metadata = Some(metadata);
        }
        schedule.updated_at = Utc::now();

        self.store.update_schedule(&schedule).await?;
        debug!("Updated schedule {}", id);
        Ok(schedule)
    }

    /// Delete a schedule together with its history.
    pub async fn delete_schedule(&self, id: &str) -> SchedulerResult<()> {
        self.require(id).await?;
        self.store.delete_schedule(id).await?;
        self.store.delete_history(id).await?;
        info!("Deleted schedule {}", id);
        Ok(())
    }

    /// History of a schedule, newest first.
    pub async fn get_execution_history(
        &self,
        schedule_id: &str,
        filter: &HistoryFilter,
    ) -> SchedulerResult<Vec<ExecutionHistory>> {
        self.require(schedule_id).await?;

        let mut rows: Vec<ExecutionHistory> = self
            .store
            .list_history(schedule_id)
            .await?
            .into_iter()
            .filter(|h| filter.matches(h))
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        Ok(rows
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(DEFAULT_PAGE_LIMIT))
            .collect())
    }

    /// Append a history row for a finished execution and advance the schedule.
    pub async fn record_execution(
        &self,
        schedule_id: &str,
        workflow_id: &str,
        status: ScheduleStatus,
        duration_ms: u64,
        error: Option<String>,
        result: Option<serde_json::Value>,
    ) -> SchedulerResult<ExecutionHistory> {
        let mut schedule = self.require(schedule_id).await?;

        let now = Utc::now();
        let started_at = now - Duration::milliseconds(duration_ms as i64);
        let history = ExecutionHistory {
            id: format!("execution_{}", Uuid::new_v4()),
            schedule_id: schedule_id.to_string(),
            workflow_id: workflow_id.to_string(),
            status,
            started_at,
            completed_at: Some(now),
            duration_ms: Some(duration_ms),
            error,
            result,
        };
        schedule.last_execution_time = Some(started_at);
        if schedule.enabled {
            let cron = CronExpression::parse(&schedule.cron_expression)?;
            let tz = parse_timezone(&schedule.timezone)?;
            schedule.next_execution_time = cron.next_execution_in(now, &tz);
        }
        schedule.updated_at = now;

        // A schedule deleted meanwhile fails either write, so neither it nor
        // its history is resurrected.
        self.store.update_schedule(&schedule).await?;
        self.store.append_history(&history).await?;

        debug!(
            "Recorded {} execution of schedule {} ({}ms)",
            status, schedule_id, duration_ms
        );
        Ok(history)
    }

    async fn require(&self, id: &str) -> SchedulerResult<Schedule> {
        self.store
            .get_schedule(id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))
    }
}

fn next_time(
    cron: &CronExpression,
    timezone: &str,
    from: DateTime<Utc>,
) -> SchedulerResult<DateTime<Utc>> {
    let tz = parse_timezone(timezone)?;
    cron.next_execution_in(from, &tz)
        .ok_or_else(|| SchedulerError::NoNextExecution(cron.to_string()))
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
