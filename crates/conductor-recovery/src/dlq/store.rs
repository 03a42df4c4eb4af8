//! DLQ persistence.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::entry::{DlqEntry, DlqFilter, DlqStats};
use crate::error::{RecoveryError, RecoveryResult};

/// In-place edit applied to a stored entry.
pub type EntryUpdate = Box<dyn FnOnce(&mut DlqEntry) + Send>;

/// Storage for DLQ entries.
#[async_trait]
pub trait DlqStorage: Send + Sync {
    /// Insert a new entry.
    async fn add_entry(&self, entry: &DlqEntry) -> RecoveryResult<()>;

    /// Load an entry by ID.
    async fn get_entry(&self, id: &str) -> RecoveryResult<Option<DlqEntry>>;

    /// Entries matching the filter, newest first.
    async fn list_entries(
        &self,
        filter: &DlqFilter,
        limit: Option<usize>,
    ) -> RecoveryResult<Vec<DlqEntry>>;

    /// Replace an existing entry.
    async fn update_entry(&self, entry: &DlqEntry) -> RecoveryResult<()>;

    /// Apply `update` to the stored entry atomically and return the result.
    ///
    /// Concurrent calls for the same entry never lose each other's changes.
    async fn modify_entry(&self, id: &str, update: EntryUpdate) -> RecoveryResult<DlqEntry>;

    /// Delete an entry.
    async fn delete_entry(&self, id: &str) -> RecoveryResult<()>;

    /// Aggregate statistics.
    async fn get_stats(&self) -> RecoveryResult<DlqStats>;
}

/// In-memory DLQ store.
pub struct MemoryDlqStore {
    entries: RwLock<HashMap<String, DlqEntry>>,
}

impl MemoryDlqStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryDlqStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DlqStorage for MemoryDlqStore {
    async fn add_entry(&self, entry: &DlqEntry) -> RecoveryResult<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.id) {
            return Err(RecoveryError::AlreadyExists(format!("DLQ entry {}", entry.id)));
        }
        entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn get_entry(&self, id: &str) -> RecoveryResult<Option<DlqEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.get(id).cloned())
    }

    async fn list_entries(
        &self,
        filter: &DlqFilter,
        limit: Option<usize>,
    ) -> RecoveryResult<Vec<DlqEntry>> {
        let entries = self.entries.read().await;
        Ok(filter.apply(entries.values().cloned(), limit))
    }

    async fn update_entry(&self, entry: &DlqEntry) -> RecoveryResult<()> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&entry.id) {
            Some(existing) => {
                *existing = entry.clone();
                Ok(())
            }
            None => Err(RecoveryError::NotFound(format!("DLQ entry {}", entry.id))),
        }
    }

    async fn modify_entry(&self, id: &str, update: EntryUpdate) -> RecoveryResult<DlqEntry> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| RecoveryError::NotFound(format!("DLQ entry {}", id)))?;
        update(entry);
        Ok(entry.clone())
    }

    async fn delete_entry(&self, id: &str) -> RecoveryResult<()> {
        let mut entries = self.entries.write().await;
        entries.remove(id);
        Ok(())
    }

    async fn get_stats(&self) -> RecoveryResult<DlqStats> {
        let entries = self.entries.read().await;
        Ok(DlqStats::from_entries(entries.values(), Utc::now()))
    }
}

/// File system based DLQ store.
///
/// Entries are stored as individual JSON files:
/// ```text
/// {storage_path}/
/// └── dlq/
///     └── {entry_id}.json
/// ```
pub struct FileDlqStore {
    storage_path: PathBuf,
    /// Serializes read-modify-write cycles on entry files.
    write_lock: Mutex<()>,
}

impl FileDlqStore {
    /// Create a new file-based store, creating the directory if needed.
    pub async fn new(storage_path: impl Into<PathBuf>) -> RecoveryResult<Self> {
        let storage_path = storage_path.into();
        let dir = storage_path.join("dlq");
        fs::create_dir_all(&dir).await.map_err(|e| {
            RecoveryError::Storage(format!("Failed to create DLQ directory: {}", e))
        })?;

        debug!("FileDlqStore initialized at {:?}", storage_path);
        Ok(Self {
            storage_path,
            write_lock: Mutex::new(()),
        })
    }

    fn entries_dir(&self) -> PathBuf {
        self.storage_path.join("dlq")
    }

    fn entry_path(&self, id: &str) -> PathBuf {
        self.entries_dir().join(format!("{}.json", id))
    }

    async fn write_entry(&self, entry: &DlqEntry) -> RecoveryResult<()> {
        let content = serde_json::to_string_pretty(entry)?;
        fs::write(self.entry_path(&entry.id), content)
            .await
            .map_err(|e| RecoveryError::Storage(format!("Failed to write DLQ entry: {}", e)))
    }

    async fn read_entry(&self, id: &str) -> RecoveryResult<Option<DlqEntry>> {
        let path = self.entry_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| RecoveryError::Storage(format!("Failed to read DLQ entry: {}", e)))?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn load_all(&self) -> RecoveryResult<Vec<DlqEntry>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(self.entries_dir()).await.map_err(|e| {
            RecoveryError::Storage(format!("Failed to read DLQ directory: {}", e))
        })?;

        while let Some(item) = dir.next_entry().await.map_err(|e| {
            RecoveryError::Storage(format!("Failed to read directory entry: {}", e))
        })? {
            let path = item.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<DlqEntry>(&content) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!("Failed to deserialize DLQ entry from {:?}: {}", path, e),
                },
                Err(e) => warn!("Failed to read DLQ entry {:?}: {}", path, e),
            }
        }

        Ok(entries)
    }
}

#[async_trait]
impl DlqStorage for FileDlqStore {
    async fn add_entry(&self, entry: &DlqEntry) -> RecoveryResult<()> {
        if self.entry_path(&entry.id).exists() {
            return Err(RecoveryError::AlreadyExists(format!("DLQ entry {}", entry.id)));
        }
        self.write_entry(entry).await?;
        debug!("Saved DLQ entry '{}'", entry.id);
        Ok(())
    }

    async fn get_entry(&self, id: &str) -> RecoveryResult<Option<DlqEntry>> {
        self.read_entry(id).await
    }

    async fn list_entries(
        &self,
        filter: &DlqFilter,
        limit: Option<usize>,
    ) -> RecoveryResult<Vec<DlqEntry>> {
        Ok(filter.apply(self.load_all().await?, limit))
    }

    async fn update_entry(&self, entry: &DlqEntry) -> RecoveryResult<()> {
        let _guard = self.write_lock.lock().await;
        if !self.entry_path(&entry.id).exists() {
            return Err(RecoveryError::NotFound(format!("DLQ entry {}", entry.id)));
        }
        self.write_entry(entry).await
    }

    async fn modify_entry(&self, id: &str, update: EntryUpdate) -> RecoveryResult<DlqEntry> {
        let _guard = self.write_lock.lock().await;
        let mut entry = self
            .read_entry(id)
            .await?
            .ok_or_else(|| RecoveryError::NotFound(format!("DLQ entry {}", id)))?;
        update(&mut entry);
        self.write_entry(&entry).await?;
        Ok(entry)
    }

    async fn delete_entry(&self, id: &str) -> RecoveryResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.entry_path(id);
        if path.exists() {
            fs::remove_file(&path).await.map_err(|e| {
                RecoveryError::Storage(format!("Failed to delete DLQ entry: {}", e))
            })?;
            debug!("Deleted DLQ entry '{}'", id);
        }
        Ok(())
    }

    async fn get_stats(&self) -> RecoveryResult<DlqStats> {
        let entries = self.load_all().await?;
        Ok(DlqStats::from_entries(&entries, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::entry::ErrorDetails;
    use tempfile::TempDir;

    fn entry(id: &str, task: &str) -> DlqEntry {
        DlqEntry {
            id: id.to_string(),
            task_id: task.to_string(),
            task_definition: serde_json::json!({ "kind": "export" }),
            error_details: ErrorDetails::new("disk full").with_code("ENOSPC"),
            retry_count: 2,
            added_at: Utc::now(),
            resolved_at: None,
            resolution_notes: None,
        }
    }

    #[tokio::test]
    async fn test_memory_store_rejects_duplicate_id() {
        let store = MemoryDlqStore::new();
        store.add_entry(&entry("dlq-1", "t")).await.unwrap();
        let result = store.add_entry(&entry("dlq-1", "t")).await;
        assert!(matches!(result, Err(RecoveryError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_memory_store_update_missing() {
        let store = MemoryDlqStore::new();
        let result = store.update_entry(&entry("dlq-x", "t")).await;
        assert!(matches!(result, Err(RecoveryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_memory_store_modify_missing() {
        let store = MemoryDlqStore::new();
        let result = store.modify_entry("dlq-x", Box::new(|_| {})).await;
        assert!(matches!(result, Err(RecoveryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_file_store_concurrent_modify_loses_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(FileDlqStore::new(temp_dir.path()).await.unwrap());
        let mut e = entry("dlq-1", "task-a");
        e.retry_count = 0;
        store.add_entry(&e).await.unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .modify_entry("dlq-1", Box::new(|entry| entry.retry_count += 1))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let loaded = store.get_entry("dlq-1").await.unwrap().unwrap();
        assert_eq!(loaded.retry_count, 10);
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileDlqStore::new(temp_dir.path()).await.unwrap();

        let mut e = entry("dlq-1", "task-a");
        store.add_entry(&e).await.unwrap();
        store.add_entry(&entry("dlq-2", "task-b")).await.unwrap();

        let loaded = store.get_entry("dlq-1").await.unwrap().unwrap();
        assert_eq!(loaded, e);

        e.resolved_at = Some(Utc::now());
        e.resolution_notes = Some("fixed upstream".to_string());
        store.update_entry(&e).await.unwrap();

        let unresolved = store
            .list_entries(&DlqFilter::new().resolved(false), None)
            .await
            .unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].task_id, "task-b");

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.resolved_entries, 1);

        store.delete_entry("dlq-1").await.unwrap();
        assert!(store.get_entry("dlq-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileDlqStore::new(temp_dir.path()).await.unwrap();
            store.add_entry(&entry("dlq-keep", "task-a")).await.unwrap();
        }
        let reopened = FileDlqStore::new(temp_dir.path()).await.unwrap();
        let all = reopened.list_entries(&DlqFilter::new(), None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "dlq-keep");
    }
}
