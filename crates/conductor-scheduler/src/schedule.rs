//! Schedule and execution history types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one schedule execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A cron-driven workflow trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub workflow_id: String,
    pub cron_expression: String,
    pub enabled: bool,
    /// IANA timezone the expression is evaluated in.
    pub timezone: String,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub next_execution_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Schedule {
    /// Whether the schedule should fire at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_execution_time.is_some_and(|next| next <= now)
    }
}

/// One recorded execution. Never modified after being appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHistory {
    pub id: String,
    pub schedule_id: String,
    pub workflow_id: String,
    pub status: ScheduleStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// Input for creating a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub name: String,
    pub description: Option<String>,
    pub workflow_id: String,
    pub cron_expression: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Falls back to the scheduler's default timezone.
    pub timezone: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

impl CreateScheduleRequest {
    pub fn new(
        name: impl Into<String>,
        workflow_id: impl Into<String>,
        cron_expression: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            workflow_id: workflow_id.into(),
            cron_expression: cron_expression.into(),
            enabled: true,
            timezone: None,
            metadata: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Partial update of a schedule. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateScheduleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cron_expression: Option<String>,
    pub enabled: Option<bool>,
    pub timezone: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Default page size for listings.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Filter for [`list_schedules`](crate::SchedulerCore::list_schedules).
#[derive(Debug, Clone, Default)]
pub struct ScheduleFilter {
    pub enabled: Option<bool>,
    pub workflow_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ScheduleFilter {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Default::default()
        }
    }

    pub fn matches(&self, schedule: &Schedule) -> bool {
        self.enabled.is_none_or(|e| schedule.enabled == e)
            && self
                .workflow_id
                .as_ref()
                .is_none_or(|w| &schedule.workflow_id == w)
    }
}

/// Filter for execution history listings.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub status: Option<ScheduleStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl HistoryFilter {
    pub fn matches(&self, history: &ExecutionHistory) -> bool {
        self.status.is_none_or(|s| history.status == s)
            && self.start_date.is_none_or(|d| history.started_at >= d)
            && self.end_date.is_none_or(|d| history.started_at <= d)
    }
}
