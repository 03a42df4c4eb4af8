//! Background maintenance of the dead letter queue.
//!
//! Each cycle archives entries that exceeded the retry limit or aged out,
//! announces recent arrivals and deletes resolved entries past retention.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::entry::{DlqEntry, DlqFilter, DlqStats};
use super::notifier::{DlqNotifier, NotificationKind};
use super::queue::DeadLetterQueue;
use crate::config::DlqProcessorConfig;
use crate::error::RecoveryResult;

/// Entries younger than this get a pending notification.
const RECENT_WINDOW_HOURS: i64 = 24;

/// Counters accumulated across processing cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DlqProcessorStats {
    pub processed_entries: u64,
    pub archived_entries: u64,
    pub notifications_sent: u64,
    pub cleanup_cycles: u64,
    pub last_processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DlqProcessorStatus {
    pub is_running: bool,
    pub config: DlqProcessorConfig,
    pub stats: DlqProcessorStats,
}

/// Snapshot of the unresolved backlog.
#[derive(Debug, Clone, Serialize)]
pub struct BacklogReport {
    pub timestamp: DateTime<Utc>,
    pub stats: DlqStats,
    pub pending_count: usize,
    pub failed_count: usize,
    pub high_retry_entries: Vec<DlqEntry>,
}

/// DLQ processor worker.
pub struct DlqProcessor {
    queue: Arc<DeadLetterQueue>,
    config: DlqProcessorConfig,
    notifier: Option<Arc<dyn DlqNotifier>>,
    stats: Mutex<DlqProcessorStats>,
    running: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
}

impl DlqProcessor {
    pub fn new(queue: Arc<DeadLetterQueue>, config: DlqProcessorConfig) -> Self {
        Self {
            queue,
            config,
            notifier: None,
            stats: Mutex::new(DlqProcessorStats::default()),
            running: AtomicBool::new(false),
            cancel: Mutex::new(None),
        }
    }

    /// Send notifications through the given notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn DlqNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the processing loop. Returns `None` if it is already running.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("DLQ processor is already running");
            return None;
        }

        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());
        let this = self.clone();

        Some(tokio::spawn(async move {
            info!(
                "DLQ processor started (interval: {}ms)",
                this.config.polling_interval_ms
            );

            let mut interval = time::interval(this.config.polling_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = this.process_once().await {
                            error!("DLQ processing cycle failed: {}", e);
                        }
                    }
                }
            }

            info!("DLQ processor stopped");
        }))
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("DLQ processor is not running");
            return;
        }
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
    }

    /// Run one full maintenance cycle.
    pub async fn process_once(&self) -> RecoveryResult<()> {
        let started = Instant::now();

        let over_limit = self.archive_over_retry_limit().await?;
        let aged = self.archive_aged_entries().await?;
        let notified = if self.config.notification_enabled {
            self.notify_recent_entries().await?
        } else {
            0
        };
        let cleaned = self.queue.cleanup_resolved(self.config.retention_days).await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        {
            let mut stats = self.stats.lock();
            stats.archived_entries += (over_limit + aged) as u64;
            stats.processed_entries += (over_limit + aged + cleaned) as u64;
            stats.notifications_sent += notified as u64;
            stats.cleanup_cycles += 1;
            stats.last_processing_time_ms = elapsed_ms;
        }

        debug!(
            "DLQ cycle: {} over retry limit, {} aged out, {} notified, {} cleaned in {}ms",
            over_limit, aged, notified, cleaned, elapsed_ms
        );
        Ok(())
    }

    async fn archive_over_retry_limit(&self) -> RecoveryResult<usize> {
        let limit = self.config.max_retry_limit;
        let filter = DlqFilter::new().resolved(false).min_retry_count(limit);
        let entries = self.queue.list_entries(&filter, None).await?;
        let note = format!("Auto-archived: Exceeded {} retry limit", limit);

        let mut archived = 0;
        for entry in entries {
            let resolved = self.queue.resolve_entry(&entry.id, &note).await?;
            archived += 1;
            if self.config.notification_enabled {
                self.notify(&resolved, NotificationKind::Archived).await;
            }
        }

        if archived > 0 {
            info!("Archived {} DLQ entries over the retry limit", archived);
        }
        Ok(archived)
    }

    async fn archive_aged_entries(&self) -> RecoveryResult<usize> {
        let days = self.config.archive_after_days;
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let filter = DlqFilter::new().resolved(false).added_before(cutoff);
        let entries = self.queue.list_entries(&filter, None).await?;
        let note = format!("Auto-archived after {} days without resolution", days);

        let mut archived = 0;
        for entry in entries {
            self.queue.resolve_entry(&entry.id, &note).await?;
            archived += 1;
        }

        if archived > 0 {
            info!("Archived {} DLQ entries older than {} days", archived, days);
        }
        Ok(archived)
    }

    async fn notify_recent_entries(&self) -> RecoveryResult<usize> {
        let since = Utc::now() - Duration::hours(RECENT_WINDOW_HOURS);
        let filter = DlqFilter::new().resolved(false).added_after(since);
        let entries = self.queue.list_entries(&filter, None).await?;

        let mut sent = 0;
        for entry in &entries {
            if self.notify(entry, NotificationKind::Pending).await {
                sent += 1;
            }
        }
        Ok(sent)
    }

    async fn notify(&self, entry: &DlqEntry, kind: NotificationKind) -> bool {
        let Some(ref notifier) = self.notifier else {
            return false;
        };
        match notifier.send(entry, kind).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send DLQ {} notification for {}: {}", kind, entry.id, e);
                false
            }
        }
    }

    pub fn status(&self) -> DlqProcessorStatus {
        DlqProcessorStatus {
            is_running: self.is_running(),
            config: self.config.clone(),
            stats: self.stats.lock().clone(),
        }
    }

    pub async fn generate_backlog_report(&self) -> RecoveryResult<BacklogReport> {
        let stats = self.queue.get_stats().await?;
        let pending_count = self.queue.get_pending_entries(None).await?.len();
        let failed_count = self.queue.get_failed_entries(None).await?.len();
        let high_retry_entries = self
            .queue
            .list_entries(
                &DlqFilter::new()
                    .resolved(false)
                    .min_retry_count(self.config.max_retry_limit),
                None,
            )
            .await?;

        Ok(BacklogReport {
            timestamp: Utc::now(),
            stats,
            pending_count,
            failed_count,
            high_retry_entries,
        })
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = DlqProcessorStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::{DlqStorage, ErrorDetails, MemoryDlqStore};
    use crate::error::RecoveryError;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, NotificationKind)>>,
    }

    #[async_trait::async_trait]
    impl DlqNotifier for RecordingNotifier {
        async fn send(&self, entry: &DlqEntry, kind: NotificationKind) -> RecoveryResult<()> {
            self.sent.lock().push((entry.task_id.clone(), kind));
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait::async_trait]
    impl DlqNotifier for FailingNotifier {
        async fn send(&self, _entry: &DlqEntry, _kind: NotificationKind) -> RecoveryResult<()> {
            Err(RecoveryError::Notification("unreachable".to_string()))
        }
    }

    async fn seeded() -> (Arc<DeadLetterQueue>, Arc<MemoryDlqStore>) {
        let store = Arc::new(MemoryDlqStore::new());
        let queue = Arc::new(DeadLetterQueue::new(store.clone()));

        queue
            .add_failed_task("recent", serde_json::json!({}), ErrorDetails::new("x"), 1)
            .await
            .unwrap();
        queue
            .add_failed_task("hammered", serde_json::json!({}), ErrorDetails::new("x"), 7)
            .await
            .unwrap();
        let mut old = queue
            .add_failed_task("forgotten", serde_json::json!({}), ErrorDetails::new("x"), 1)
            .await
            .unwrap();
        old.added_at = Utc::now() - Duration::days(45);
        store.update_entry(&old).await.unwrap();

        (queue, store)
    }

    #[tokio::test]
    async fn test_process_once_archives_and_notifies() {
        let (queue, _) = seeded().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let processor = DlqProcessor::new(queue.clone(), DlqProcessorConfig::default())
            .with_notifier(notifier.clone());

        processor.process_once().await.unwrap();

        let hammered = queue.get_entries_by_task_id("hammered").await.unwrap();
        assert_eq!(
            hammered[0].resolution_notes.as_deref(),
            Some("Auto-archived: Exceeded 5 retry limit")
        );
        let forgotten = queue.get_entries_by_task_id("forgotten").await.unwrap();
        assert_eq!(
            forgotten[0].resolution_notes.as_deref(),
            Some("Auto-archived after 30 days without resolution")
        );
        assert!(queue.is_in_dlq("recent").await.unwrap());

        let sent = notifier.sent.lock().clone();
        assert!(sent.contains(&("hammered".to_string(), NotificationKind::Archived)));
        assert!(sent.contains(&("recent".to_string(), NotificationKind::Pending)));
        assert_eq!(sent.len(), 2);

        let status = processor.status();
        assert!(!status.is_running);
        assert_eq!(status.stats.archived_entries, 2);
        assert_eq!(status.stats.notifications_sent, 2);
        assert_eq!(status.stats.cleanup_cycles, 1);
    }

    #[tokio::test]
    async fn test_notifications_disabled() {
        let (queue, _) = seeded().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let config = DlqProcessorConfig {
            notification_enabled: false,
            ..Default::default()
        };
        let processor = DlqProcessor::new(queue, config).with_notifier(notifier.clone());

        processor.process_once().await.unwrap();
        assert!(notifier.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_abort_cycle() {
        let (queue, _) = seeded().await;
        let processor = DlqProcessor::new(queue, DlqProcessorConfig::default())
            .with_notifier(Arc::new(FailingNotifier));

        processor.process_once().await.unwrap();
        let stats = processor.status().stats;
        assert_eq!(stats.notifications_sent, 0);
        assert_eq!(stats.archived_entries, 2);
    }

    #[tokio::test]
    async fn test_backlog_report_and_reset() {
        let (queue, _) = seeded().await;
        let processor = DlqProcessor::new(queue, DlqProcessorConfig::default());

        let report = processor.generate_backlog_report().await.unwrap();
        assert_eq!(report.stats.total_entries, 3);
        assert_eq!(report.pending_count, 3);
        assert_eq!(report.failed_count, 3);
        assert_eq!(report.high_retry_entries.len(), 1);
        assert_eq!(report.high_retry_entries[0].task_id, "hammered");

        processor.process_once().await.unwrap();
        assert_eq!(processor.status().stats.cleanup_cycles, 1);
        processor.reset_stats();
        assert_eq!(processor.status().stats, DlqProcessorStats::default());
    }

    #[tokio::test]
    async fn test_start_stop() {
        let store = Arc::new(MemoryDlqStore::new());
        let queue = Arc::new(DeadLetterQueue::new(store));
        let config = DlqProcessorConfig {
            polling_interval_ms: 20,
            ..Default::default()
        };
        let processor = Arc::new(DlqProcessor::new(queue, config));

        let handle = processor.start().unwrap();
        assert!(processor.start().is_none());
        tokio::time::sleep(std::time::Duration::from_millis(70)).await;
        assert!(processor.is_running());

        processor.stop();
        handle.await.unwrap();
        assert!(!processor.is_running());
        assert!(processor.status().stats.cleanup_cycles >= 2);
    }
}
