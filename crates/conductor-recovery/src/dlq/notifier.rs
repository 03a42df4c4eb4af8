//! DLQ notifications.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::entry::DlqEntry;
use crate::error::{RecoveryError, RecoveryResult};

/// Why an entry is being announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Pending,
    Archived,
    Failed,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Archived => write!(f, "archived"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Sink for DLQ notifications.
#[async_trait]
pub trait DlqNotifier: Send + Sync {
    async fn send(&self, entry: &DlqEntry, kind: NotificationKind) -> RecoveryResult<()>;
}

/// Writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl DlqNotifier for LogNotifier {
    async fn send(&self, entry: &DlqEntry, kind: NotificationKind) -> RecoveryResult<()> {
        match kind {
            NotificationKind::Failed => warn!(
                "DLQ {} entry {} for task {}: {}",
                kind, entry.id, entry.task_id, entry.error_details.message
            ),
            _ => info!(
                "DLQ {} entry {} for task {} (retries: {})",
                kind, entry.id, entry.task_id, entry.retry_count
            ),
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct NotificationPayload<'a> {
    kind: NotificationKind,
    timestamp: chrono::DateTime<Utc>,
    entry: &'a DlqEntry,
}

/// Posts notifications as JSON to an HTTP endpoint.
pub struct WebhookNotifier {
    url: String,
    headers: HashMap<String, String>,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, Duration::from_secs(30))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            url: url.into(),
            headers: HashMap::new(),
            client,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl DlqNotifier for WebhookNotifier {
    async fn send(&self, entry: &DlqEntry, kind: NotificationKind) -> RecoveryResult<()> {
        let payload = NotificationPayload {
            kind,
            timestamp: Utc::now(),
            entry,
        };

        let mut request = self.client.post(&self.url).json(&payload);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RecoveryError::Notification(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RecoveryError::Notification(format!("HTTP {}: {}", status, body)));
        }

        debug!("DLQ {} notification for {} delivered to {}", kind, entry.id, self.url);
        Ok(())
    }
}
