//! Schedule persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{SchedulerError, SchedulerResult};
use crate::schedule::{ExecutionHistory, Schedule};

/// Storage for schedules and their execution history.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Insert or replace a schedule.
    async fn save_schedule(&self, schedule: &Schedule) -> SchedulerResult<()>;

    /// Replace an existing schedule. Fails with `NotFound` if it was deleted.
    async fn update_schedule(&self, schedule: &Schedule) -> SchedulerResult<()>;

    async fn get_schedule(&self, id: &str) -> SchedulerResult<Option<Schedule>>;

    /// All schedules, oldest first.
    async fn list_schedules(&self) -> SchedulerResult<Vec<Schedule>>;

    async fn delete_schedule(&self, id: &str) -> SchedulerResult<()>;

    /// Append a history row for its schedule. Fails with `NotFound` if the
    /// schedule no longer exists.
    async fn append_history(&self, history: &ExecutionHistory) -> SchedulerResult<()>;

    /// History rows for a schedule in insertion order.
    async fn list_history(&self, schedule_id: &str) -> SchedulerResult<Vec<ExecutionHistory>>;

    async fn delete_history(&self, schedule_id: &str) -> SchedulerResult<()>;
}

/// In-memory schedule store.
pub struct MemoryScheduleStore {
    schedules: RwLock<HashMap<String, Schedule>>,
    history: RwLock<HashMap<String, Vec<ExecutionHistory>>>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self {
            schedules: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryScheduleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn save_schedule(&self, schedule: &Schedule) -> SchedulerResult<()> {
        let mut schedules = self.schedules.write().await;
        schedules.insert(schedule.id.clone(), schedule.clone());
        Ok(())
    }

    async fn update_schedule(&self, schedule: &Schedule) -> SchedulerResult<()> {
        let mut schedules = self.schedules.write().await;
        match schedules.get_mut(&schedule.id) {
            Some(existing) => {
                *existing = schedule.clone();
                Ok(())
            }
            None => Err(SchedulerError::NotFound(schedule.id.clone())),
        }
    }

    async fn get_schedule(&self, id: &str) -> SchedulerResult<Option<Schedule>> {
        let schedules = self.schedules.read().await;
        Ok(schedules.get(id).cloned())
    }

    async fn list_schedules(&self) -> SchedulerResult<Vec<Schedule>> {
        let schedules = self.schedules.read().await;
        let mut all: Vec<Schedule> = schedules.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn delete_schedule(&self, id: &str) -> SchedulerResult<()> {
        let mut schedules = self.schedules.write().await;
        schedules.remove(id);
        Ok(())
    }

    async fn append_history(&self, history: &ExecutionHistory) -> SchedulerResult<()> {
        // Held across the push so a concurrent delete cannot leave orphan rows.
        let schedules = self.schedules.read().await;
        if !schedules.contains_key(&history.schedule_id) {
            return Err(SchedulerError::NotFound(history.schedule_id.clone()));
        }
        let mut rows = self.history.write().await;
        rows.entry(history.schedule_id.clone())
            .or_default()
            .push(history.clone());
        Ok(())
    }

    async fn list_history(&self, schedule_id: &str) -> SchedulerResult<Vec<ExecutionHistory>> {
        let rows = self.history.read().await;
        Ok(rows.get(schedule_id).cloned().unwrap_or_default())
    }

    async fn delete_history(&self, schedule_id: &str) -> SchedulerResult<()> {
        let mut rows = self.history.write().await;
        rows.remove(schedule_id);
        Ok(())
    }
}
