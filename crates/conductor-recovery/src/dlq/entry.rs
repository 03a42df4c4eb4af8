//! DLQ entry types, filters and statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Details of the failure that sent a task to the DLQ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Total executions, including the first.
    pub attempts: u32,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            code: None,
            timestamp: Utc::now(),
            attempts: 1,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// A permanently failed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: String,
    pub task_id: String,
    pub task_definition: serde_json::Value,
    pub error_details: ErrorDetails,
    pub retry_count: u32,
    pub added_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
}

impl DlqEntry {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// Filter for listing DLQ entries.
#[derive(Debug, Clone, Default)]
pub struct DlqFilter {
    pub task_id: Option<String>,
    pub resolved: Option<bool>,
    pub min_retry_count: Option<u32>,
    pub max_retry_count: Option<u32>,
    pub added_after: Option<DateTime<Utc>>,
    pub added_before: Option<DateTime<Utc>>,
    pub offset: usize,
}

impl DlqFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn resolved(mut self, resolved: bool) -> Self {
        self.resolved = Some(resolved);
        self
    }

    pub fn min_retry_count(mut self, count: u32) -> Self {
        self.min_retry_count = Some(count);
        self
    }

    pub fn max_retry_count(mut self, count: u32) -> Self {
        self.max_retry_count = Some(count);
        self
    }

    pub fn added_after(mut self, at: DateTime<Utc>) -> Self {
        self.added_after = Some(at);
        self
    }

    pub fn added_before(mut self, at: DateTime<Utc>) -> Self {
        self.added_before = Some(at);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Whether an entry passes every set criterion.
    pub fn matches(&self, entry: &DlqEntry) -> bool {
        if let Some(ref task_id) = self.task_id {
            if &entry.task_id != task_id {
                return false;
            }
        }
        if let Some(resolved) = self.resolved {
            if entry.is_resolved() != resolved {
                return false;
            }
        }
        if self.min_retry_count.is_some_and(|min| entry.retry_count < min) {
            return false;
        }
        if self.max_retry_count.is_some_and(|max| entry.retry_count > max) {
            return false;
        }
        if self.added_after.is_some_and(|after| entry.added_at < after) {
            return false;
        }
        if self.added_before.is_some_and(|before| entry.added_at > before) {
            return false;
        }
        true
    }

    /// Filter, sort newest first, then apply offset and limit.
    pub fn apply<I>(&self, entries: I, limit: Option<usize>) -> Vec<DlqEntry>
    where
        I: IntoIterator<Item = DlqEntry>,
    {
        let mut matched: Vec<DlqEntry> = entries.into_iter().filter(|e| self.matches(e)).collect();
        matched.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        matched
            .into_iter()
            .skip(self.offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Aggregate DLQ statistics, computed at call time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DlqStats {
    pub total_entries: usize,
    pub unresolved_entries: usize,
    pub resolved_entries: usize,
    /// Age of the oldest entry in milliseconds.
    pub oldest_entry_age_ms: i64,
    pub average_retry_count: f64,
}

impl DlqStats {
    pub fn from_entries<'a, I>(entries: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a DlqEntry>,
    {
        let mut stats = Self::default();
        let mut retry_sum: u64 = 0;
        let mut oldest: Option<DateTime<Utc>> = None;

        for entry in entries {
            stats.total_entries += 1;
            if entry.is_resolved() {
                stats.resolved_entries += 1;
            } else {
                stats.unresolved_entries += 1;
            }
            retry_sum += u64::from(entry.retry_count);
            oldest = Some(oldest.map_or(entry.added_at, |o| o.min(entry.added_at)));
        }

        if stats.total_entries > 0 {
            stats.average_retry_count = retry_sum as f64 / stats.total_entries as f64;
        }
        stats.oldest_entry_age_ms = oldest.map_or(0, |o| (now - o).num_milliseconds());
        stats
    }
}
