//! # Conductor Scheduler
//!
//! Cron-driven workflow scheduling.
//!
//! ## Features
//!
//! - Five-field cron parsing with structured errors and timezone-aware evaluation
//! - Schedule CRUD with append-only execution history
//! - Background executor that fires due schedules and records outcomes

pub mod config;
pub mod cron;
pub mod error;
pub mod executor;
pub mod schedule;
pub mod service;
pub mod store;

pub use config::ScheduleExecutorConfig;
pub use cron::{
    get_next_execution_time, get_previous_execution_time, parse_timezone,
    validate_cron_expression, CronExpression,
};
pub use error::{CronError, SchedulerError, SchedulerResult};
pub use executor::{
    ScheduleExecutionEvent, ScheduleExecutor, ScheduleExecutorStats, WorkflowTrigger,
};
pub use schedule::{
    CreateScheduleRequest, ExecutionHistory, HistoryFilter, Schedule, ScheduleFilter,
    ScheduleStatus, UpdateScheduleRequest,
};
pub use service::SchedulerCore;
pub use store::{MemoryScheduleStore, ScheduleStore};
