//! Webhook and delivery types.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event types emitted by the recovery core.
pub mod event_types {
    /// A failed task was retried.
    pub const TASK_RETRY: &str = "task.retry";
    /// A schedule fired.
    pub const SCHEDULE_EXECUTED: &str = "schedule.executed";
    /// A task succeeded after failing.
    pub const ERROR_RECOVERED: &str = "error.recovered";

    pub const ALL: [&str; 3] = [TASK_RETRY, SCHEDULE_EXECUTED, ERROR_RECOVERED];
}

/// Per-webhook retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRetryPolicy {
    /// Total attempts before a delivery is marked failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    300_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for WebhookRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl WebhookRetryPolicy {
    /// Delay before retrying after `attempt` failed, without jitter.
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        delay.min(self.max_delay_ms as f64) as u64
    }

    pub fn merge(&mut self, update: &WebhookRetryPolicyUpdate) {
        if let Some(v) = update.max_retries {
            self.max_retries = v;
        }
        if let Some(v) = update.initial_delay_ms {
            self.initial_delay_ms = v;
        }
        if let Some(v) = update.max_delay_ms {
            self.max_delay_ms = v;
        }
        if let Some(v) = update.backoff_multiplier {
            self.backoff_multiplier = v;
        }
    }
}

/// Partial retry policy; unset fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookRetryPolicyUpdate {
    pub max_retries: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

/// A registered endpoint for one event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: String,
    pub event_type: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub enabled: bool,
    pub retry_policy: WebhookRetryPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failed,
    Retrying,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Retrying => write!(f, "retrying"),
        }
    }
}

/// One event sent to one webhook, across all of its attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: String,
    pub webhook_id: String,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub status: DeliveryStatus,
    /// Starts at 1.
    pub attempt_number: u32,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A domain event to fan out to webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl OutboundEvent {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWebhookRequest {
    pub event_type: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub retry_policy: Option<WebhookRetryPolicyUpdate>,
    pub secret: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

impl CreateWebhookRequest {
    pub fn new(event_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            url: url.into(),
            headers: HashMap::new(),
            enabled: true,
            retry_policy: None,
            secret: None,
            metadata: None,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_retry_policy(mut self, policy: WebhookRetryPolicyUpdate) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWebhookRequest {
    pub url: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub enabled: Option<bool>,
    pub retry_policy: Option<WebhookRetryPolicyUpdate>,
    pub secret: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct WebhookFilter {
    pub event_type: Option<String>,
    pub enabled: Option<bool>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl WebhookFilter {
    pub fn matches(&self, webhook: &Webhook) -> bool {
        self.event_type
            .as_ref()
            .is_none_or(|t| &webhook.event_type == t)
            && self.enabled.is_none_or(|e| webhook.enabled == e)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeliveryFilter {
    pub webhook_id: Option<String>,
    pub status: Option<DeliveryStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl DeliveryFilter {
    pub fn matches(&self, delivery: &WebhookDelivery) -> bool {
        self.webhook_id
            .as_ref()
            .is_none_or(|w| &delivery.webhook_id == w)
            && self.status.is_none_or(|s| delivery.status == s)
            && self.start_date.is_none_or(|d| delivery.created_at >= d)
            && self.end_date.is_none_or(|d| delivery.created_at <= d)
    }
}
