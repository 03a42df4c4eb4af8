//! Dead letter queue facade over a [`DlqStorage`].

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::entry::{DlqEntry, DlqFilter, DlqStats, ErrorDetails};
use super::store::DlqStorage;
use crate::error::{RecoveryError, RecoveryResult};

/// Dead letter queue.
pub struct DeadLetterQueue {
    store: Arc<dyn DlqStorage>,
    entry_added: broadcast::Sender<DlqEntry>,
}

impl DeadLetterQueue {
    /// Create a queue backed by the given store.
    pub fn new(store: Arc<dyn DlqStorage>) -> Self {
        let (entry_added, _) = broadcast::channel(100);
        Self { store, entry_added }
    }

    /// Receive every entry added to the queue.
    pub fn subscribe(&self) -> broadcast::Receiver<DlqEntry> {
        self.entry_added.subscribe()
    }

    /// Record a task that exhausted its retries. Always creates a new entry.
    pub async fn add_failed_task(
        &self,
        task_id: &str,
        task_definition: serde_json::Value,
        mut error_details: ErrorDetails,
        retry_count: u32,
    ) -> RecoveryResult<DlqEntry> {
        error_details.attempts = retry_count.saturating_add(1);

        let entry = DlqEntry {
            id: format!("dlq-{}", Uuid::new_v4()),
            task_id: task_id.to_string(),
            task_definition,
            error_details,
            retry_count,
            added_at: Utc::now(),
            resolved_at: None,
            resolution_notes: None,
        };

        self.store.add_entry(&entry).await?;
        warn!(
            "Task {} moved to DLQ as {} after {} retries: {}",
            task_id, entry.id, retry_count, entry.error_details.message
        );

        let _ = self.entry_added.send(entry.clone());
        Ok(entry)
    }

    pub async fn get_entry(&self, id: &str) -> RecoveryResult<Option<DlqEntry>> {
        self.store.get_entry(id).await
    }

    pub async fn list_entries(
        &self,
        filter: &DlqFilter,
        limit: Option<usize>,
    ) -> RecoveryResult<Vec<DlqEntry>> {
        self.store.list_entries(filter, limit).await
    }

    /// Mark an entry resolved. Resolving again overwrites the notes and timestamp.
    pub async fn resolve_entry(&self, id: &str, notes: &str) -> RecoveryResult<DlqEntry> {
        let notes = notes.to_string();
        let entry = self
            .store
            .modify_entry(
                id,
                Box::new(move |entry| {
                    entry.resolved_at = Some(Utc::now());
                    entry.resolution_notes = Some(notes);
                }),
            )
            .await?;
        info!("Resolved DLQ entry {}", id);
        Ok(entry)
    }

    /// Reset an entry for another round of processing.
    ///
    /// Resolution state is left untouched.
    pub async fn resubmit_entry(
        &self,
        id: &str,
        modified_definition: Option<serde_json::Value>,
    ) -> RecoveryResult<DlqEntry> {
        let entry = self
            .store
            .modify_entry(
                id,
                Box::new(move |entry| {
                    if let Some(definition) = modified_definition {
                        entry.task_definition = definition;
                    }
                    entry.retry_count = 0;
                }),
            )
            .await?;
        info!("Resubmitted DLQ entry {} for task {}", id, entry.task_id);
        Ok(entry)
    }

    /// Resolve several entries. Missing IDs are skipped.
    pub async fn batch_resolve(&self, ids: &[String], notes: &str) -> RecoveryResult<usize> {
        let mut resolved = 0;
        for id in ids {
            match self.resolve_entry(id, notes).await {
                Ok(_) => resolved += 1,
                Err(RecoveryError::NotFound(_)) => {
                    debug!("Skipping unknown DLQ entry {} in batch resolve", id)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(resolved)
    }

    pub async fn get_stats(&self) -> RecoveryResult<DlqStats> {
        self.store.get_stats().await
    }

    /// Delete resolved entries whose resolution is older than the retention period.
    pub async fn cleanup_resolved(&self, retention_days: u32) -> RecoveryResult<usize> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let resolved = self
            .store
            .list_entries(&DlqFilter::new().resolved(true), None)
            .await?;

        let mut deleted = 0;
        for entry in resolved {
            if entry.resolved_at.is_some_and(|at| at < cutoff) {
                self.store.delete_entry(&entry.id).await?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!("Cleaned up {} resolved DLQ entries", deleted);
        }
        Ok(deleted)
    }

    /// Whether an unresolved entry exists for the task.
    pub async fn is_in_dlq(&self, task_id: &str) -> RecoveryResult<bool> {
        let filter = DlqFilter::new().task_id(task_id).resolved(false);
        Ok(!self.store.list_entries(&filter, Some(1)).await?.is_empty())
    }

    pub async fn get_entries_by_task_id(&self, task_id: &str) -> RecoveryResult<Vec<DlqEntry>> {
        self.store
            .list_entries(&DlqFilter::new().task_id(task_id), None)
            .await
    }

    /// Unresolved entries, newest first.
    pub async fn get_pending_entries(&self, limit: Option<usize>) -> RecoveryResult<Vec<DlqEntry>> {
        self.store
            .list_entries(&DlqFilter::new().resolved(false), limit)
            .await
    }

    /// Unresolved entries that were retried at least once.
    pub async fn get_failed_entries(&self, limit: Option<usize>) -> RecoveryResult<Vec<DlqEntry>> {
        let filter = DlqFilter::new().resolved(false).min_retry_count(1);
        self.store.list_entries(&filter, limit).await
    }

    /// Unresolved entries, oldest first.
    pub async fn get_backlog(&self, limit: Option<usize>) -> RecoveryResult<Vec<DlqEntry>> {
        let mut entries = self
            .store
            .list_entries(&DlqFilter::new().resolved(false), None)
            .await?;
        entries.reverse();
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}
