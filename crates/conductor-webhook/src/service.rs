//! Webhook delivery service.
//!
//! Fans domain events out to registered webhooks and retries failed
//! deliveries with exponential backoff. Pending deliveries wait in a
//! min-heap keyed on their due time, drained by a single task that sleeps
//! until the head is due.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WebhookServiceConfig;
use crate::error::{WebhookError, WebhookResult};
use crate::http::HttpClient;
use crate::signing::{SIGNATURE_HEADER, TIMESTAMP_HEADER, sign};
use crate::store::WebhookDatabase;
use crate::types::{
    CreateWebhookRequest, DeliveryFilter, DeliveryStatus, OutboundEvent, UpdateWebhookRequest,
    Webhook, WebhookDelivery, WebhookFilter, WebhookRetryPolicy,
};

/// Minimum delay between two attempts of a delivery.
const MIN_BACKOFF_MS: u64 = 100;

/// Lifecycle events published by the service.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    Registered(Webhook),
    Updated(Webhook),
    Deleted(Webhook),
    DeliveryQueued(WebhookDelivery),
    DeliverySucceeded(WebhookDelivery),
    DeliveryRetrying(WebhookDelivery),
    DeliveryFailed(WebhookDelivery),
}

/// Queue entry.
#[derive(Debug, Clone)]
struct QueuedDelivery {
    delivery_id: String,
    due_at: DateTime<Utc>,
    seq: u64,
}

impl PartialEq for QueuedDelivery {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedDelivery {}

impl PartialOrd for QueuedDelivery {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedDelivery {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed so the earliest due time sits on top of the max-heap.
        other
            .due_at
            .cmp(&self.due_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Webhook delivery service.
pub struct WebhookService {
    db: Arc<dyn WebhookDatabase>,
    http: Arc<dyn HttpClient>,
    config: WebhookServiceConfig,
    queue: parking_lot::Mutex<BinaryHeap<QueuedDelivery>>,
    seq: AtomicU64,
    draining: AtomicBool,
    wake: Notify,
    shutdown: CancellationToken,
    events: broadcast::Sender<WebhookEvent>,
}

impl WebhookService {
    pub fn new(
        db: Arc<dyn WebhookDatabase>,
        http: Arc<dyn HttpClient>,
        config: WebhookServiceConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            db,
            http,
            config,
            queue: parking_lot::Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            draining: AtomicBool::new(false),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
            events,
        }
    }

    /// Subscribe to webhook and delivery events.
    pub fn subscribe(&self) -> broadcast::Receiver<WebhookEvent> {
        self.events.subscribe()
    }

    /// Number of deliveries waiting in the queue.
    pub fn queued_count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Register a webhook for one event type.
    pub async fn register_webhook(&self, request: CreateWebhookRequest) -> WebhookResult<Webhook> {
        if request.event_type.trim().is_empty() {
            return Err(WebhookError::Validation(
                "Event type must not be empty".to_string(),
            ));
        }
        validate_url(&request.url)?;

        let mut retry_policy = self.config.default_retry_policy.clone();
        if let Some(ref update) = request.retry_policy {
            retry_policy.merge(update);
        }
        validate_policy(&retry_policy)?;

        let now = Utc::now();
        let webhook = Webhook {
            id: format!("webhook_{}", Uuid::new_v4()),
            event_type: request.event_type,
            url: request.url,
            headers: request.headers,
            enabled: request.enabled,
            retry_policy,
            secret: request.secret,
            created_at: now,
            updated_at: now,
            metadata: request.metadata,
        };

        self.db.save_webhook(&webhook).await?;
        info!(
            "Registered webhook {} for {} -> {}",
            webhook.id, webhook.event_type, webhook.url
        );
        self.publish(WebhookEvent::Registered(webhook.clone()));
        Ok(webhook)
    }

    pub async fn update_webhook(
        &self,
        id: &str,
        request: UpdateWebhookRequest,
    ) -> WebhookResult<Webhook> {
        let mut webhook = self
            .db
            .get_webhook(id)
            .await?
            .ok_or_else(|| WebhookError::NotFound(id.to_string()))?;

        if let Some(url) = request.url {
            validate_url(&url)?;
            webhook.url = url;
        }
        if let Some(headers) = request.headers {
            webhook.headers = headers;
        }
        if let Some(enabled) = request.enabled {
            webhook.enabled = enabled;
        }
        if let Some(ref update) = request.retry_policy {
            webhook.retry_policy.merge(update);
            validate_policy(&webhook.retry_policy)?;
        }
        if let Some(secret) = request.secret {
            webhook.secret = Some(secret);
        }
        if let Some(metadata) = request.metadata {
            webhook.metadata = Some(metadata);
        }
        webhook.updated_at = Utc::now();

        self.db.update_webhook(&webhook).await?;
        debug!("Updated webhook {}", id);
        self.publish(WebhookEvent::Updated(webhook.clone()));
        Ok(webhook)
    }

    pub async fn delete_webhook(&self, id: &str) -> WebhookResult<()> {
        let webhook = self
            .db
            .get_webhook(id)
            .await?
            .ok_or_else(|| WebhookError::NotFound(id.to_string()))?;

        self.db.delete_webhook(id).await?;
        info!("Deleted webhook {}", id);
        self.publish(WebhookEvent::Deleted(webhook));
        Ok(())
    }

    pub async fn get_webhook(&self, id: &str) -> WebhookResult<Option<Webhook>> {
        self.db.get_webhook(id).await
    }

    pub async fn list_webhooks(&self, filter: &WebhookFilter) -> WebhookResult<Vec<Webhook>> {
        self.db.list_webhooks(filter).await
    }

    pub async fn get_delivery(&self, id: &str) -> WebhookResult<Option<WebhookDelivery>> {
        self.db.get_delivery(id).await
    }

    pub async fn list_deliveries(
        &self,
        filter: &DeliveryFilter,
    ) -> WebhookResult<Vec<WebhookDelivery>> {
        self.db.list_deliveries(filter).await
    }

    /// Create one delivery per enabled webhook subscribed to the event and
    /// queue them. Returns the created deliveries.
    pub async fn trigger_event(
        self: &Arc<Self>,
        event: OutboundEvent,
    ) -> WebhookResult<Vec<WebhookDelivery>> {
        let filter = WebhookFilter {
            event_type: Some(event.event_type.clone()),
            enabled: Some(true),
            limit: Some(usize::MAX),
            offset: 0,
        };
        let webhooks = self.db.list_webhooks(&filter).await?;
        if webhooks.is_empty() {
            debug!("No webhooks registered for {}", event.event_type);
            return Ok(Vec::new());
        }

        let mut deliveries = Vec::with_capacity(webhooks.len());
        for webhook in webhooks {
            let now = Utc::now();
            let delivery = WebhookDelivery {
                id: format!("delivery_{}", Uuid::new_v4()),
                webhook_id: webhook.id.clone(),
                event_type: event.event_type.clone(),
                event_data: event.data.clone(),
                status: DeliveryStatus::Pending,
                attempt_number: 1,
                status_code: None,
                response_body: None,
                error: None,
                next_retry_at: None,
                sent_at: None,
                completed_at: None,
                created_at: now,
                updated_at: now,
            };
            self.db.save_delivery(&delivery).await?;
            self.enqueue(&delivery.id, now);
            self.publish(WebhookEvent::DeliveryQueued(delivery.clone()));
            deliveries.push(delivery);
        }

        debug!(
            "Queued {} deliveries for event {} ({})",
            deliveries.len(),
            event.id,
            event.event_type
        );
        self.ensure_draining();
        Ok(deliveries)
    }

    /// Send a failed delivery again.
    pub async fn retry_delivery(self: &Arc<Self>, id: &str) -> WebhookResult<WebhookDelivery> {
        let mut delivery = self
            .db
            .get_delivery(id)
            .await?
            .ok_or_else(|| WebhookError::DeliveryNotFound(id.to_string()))?;

        if delivery.status != DeliveryStatus::Failed {
            return Err(WebhookError::InvalidState(format!(
                "Can only retry failed deliveries, current status: {}",
                delivery.status
            )));
        }

        let now = Utc::now();
        delivery.status = DeliveryStatus::Retrying;
        delivery.attempt_number += 1;
        delivery.next_retry_at = None;
        delivery.completed_at = None;
        delivery.updated_at = now;
        self.db.update_delivery(&delivery).await?;

        info!(
            "Manually retrying delivery {} (attempt {})",
            delivery.id, delivery.attempt_number
        );
        self.enqueue(&delivery.id, now);
        self.ensure_draining();
        Ok(delivery)
    }

    /// Stop the drain task and drop queued deliveries. Their stored state is
    /// left as is.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let dropped = {
            let mut queue = self.queue.lock();
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        if dropped > 0 {
            warn!("Webhook service shut down with {} queued deliveries", dropped);
        }
    }

    fn enqueue(&self, delivery_id: &str, due_at: DateTime<Utc>) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.queue.lock().push(QueuedDelivery {
            delivery_id: delivery_id.to_string(),
            due_at,
            seq,
        });
        self.wake.notify_one();
    }

    fn ensure_draining(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            this.drain().await;
        });
    }

    async fn drain(&self) {
        loop {
            self.drain_queue().await;
            self.draining.store(false, Ordering::SeqCst);

            // An enqueue may have raced with the release of the guard.
            let pending = !self.queue.lock().is_empty();
            if !pending
                || self.shutdown.is_cancelled()
                || self.draining.swap(true, Ordering::SeqCst)
            {
                break;
            }
        }
    }

    async fn drain_queue(&self) {
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }

            let head = self.queue.lock().peek().map(|q| q.due_at);
            let Some(due_at) = head else {
                return;
            };

            let now = Utc::now();
            if due_at > now {
                let wait = (due_at - now).to_std().unwrap_or_default();
                tokio::select! {
                    _ = self.shutdown.cancelled() => return,
                    _ = tokio::time::sleep(wait) => {}
                    _ = self.wake.notified() => {}
                }
                continue;
            }

            let next = self.queue.lock().pop();
            if let Some(queued) = next {
                if let Err(e) = self.send_delivery(&queued.delivery_id).await {
                    error!("Failed to process delivery {}: {}", queued.delivery_id, e);
                }
            }
        }
    }

    async fn send_delivery(&self, delivery_id: &str) -> WebhookResult<()> {
        let Some(mut delivery) = self.db.get_delivery(delivery_id).await? else {
            warn!("Queued delivery {} no longer exists", delivery_id);
            return Ok(());
        };
        if delivery.status.is_terminal() {
            debug!("Delivery {} already {}", delivery.id, delivery.status);
            return Ok(());
        }

        let Some(webhook) = self.db.get_webhook(&delivery.webhook_id).await? else {
            let now = Utc::now();
            delivery.status = DeliveryStatus::Failed;
            delivery.error = Some("Webhook configuration not found".to_string());
            delivery.next_retry_at = None;
            delivery.completed_at = Some(now);
            delivery.updated_at = now;
            self.db.update_delivery(&delivery).await?;
            warn!(
                "Delivery {} failed: webhook {} not found",
                delivery.id, delivery.webhook_id
            );
            self.publish(WebhookEvent::DeliveryFailed(delivery));
            return Ok(());
        };

        let body = serde_json::to_string(&delivery.event_data)?;
        let headers = self.build_headers(&webhook, &body);

        debug!(
            "Sending delivery {} to {} (attempt {})",
            delivery.id, webhook.url, delivery.attempt_number
        );
        let sent_at = Utc::now();
        let result = self
            .http
            .post(&webhook.url, body, &headers, self.config.timeout())
            .await;

        match result {
            Ok(response) if response.is_success() => {
                let now = Utc::now();
                delivery.status = DeliveryStatus::Success;
                delivery.status_code = Some(response.status_code);
                delivery.response_body = Some(response.body);
                delivery.error = None;
                delivery.next_retry_at = None;
                delivery.sent_at = Some(sent_at);
                delivery.completed_at = Some(now);
                delivery.updated_at = now;
                self.db.update_delivery(&delivery).await?;
                info!(
                    "Delivered {} to webhook {} (HTTP {})",
                    delivery.id, webhook.id, response.status_code
                );
                self.publish(WebhookEvent::DeliverySucceeded(delivery));
                Ok(())
            }
            Ok(response) => {
                let message = format!("HTTP {}", response.status_code);
                delivery.status_code = Some(response.status_code);
                delivery.response_body = Some(response.body);
                delivery.sent_at = Some(sent_at);
                self.handle_failure(delivery, &webhook.retry_policy, message)
                    .await
            }
            Err(e) => {
                delivery.status_code = None;
                delivery.response_body = None;
                self.handle_failure(delivery, &webhook.retry_policy, e.to_string())
                    .await
            }
        }
    }

    fn build_headers(&self, webhook: &Webhook, body: &str) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("User-Agent".to_string(), self.config.user_agent.clone());
        for (key, value) in &webhook.headers {
            headers.insert(key.clone(), value.clone());
        }

        if let Some(ref secret) = webhook.secret {
            headers.insert(SIGNATURE_HEADER.to_string(), sign(body.as_bytes(), secret));
            headers.insert(TIMESTAMP_HEADER.to_string(), Utc::now().to_rfc3339());
        }
        headers
    }

    async fn handle_failure(
        &self,
        mut delivery: WebhookDelivery,
        policy: &WebhookRetryPolicy,
        message: String,
    ) -> WebhookResult<()> {
        let now = Utc::now();
        delivery.updated_at = now;

        if delivery.attempt_number >= policy.max_retries {
            delivery.status = DeliveryStatus::Failed;
            delivery.error = Some(format!(
                "Max retries exceeded after {} attempts",
                delivery.attempt_number
            ));
            delivery.next_retry_at = None;
            delivery.completed_at = Some(now);
            self.db.update_delivery(&delivery).await?;
            warn!(
                "Delivery {} failed permanently: {}",
                delivery.id, message
            );
            self.publish(WebhookEvent::DeliveryFailed(delivery));
            return Ok(());
        }

        let delay_ms = backoff_with_jitter(policy, delivery.attempt_number);
        let retry_at = now + TimeDelta::milliseconds(delay_ms as i64);
        delivery.status = DeliveryStatus::Retrying;
        delivery.error = Some(message);
        delivery.attempt_number += 1;
        delivery.next_retry_at = Some(retry_at);
        self.db.update_delivery(&delivery).await?;

        debug!(
            "Delivery {} will retry in {}ms (attempt {})",
            delivery.id, delay_ms, delivery.attempt_number
        );
        self.enqueue(&delivery.id, retry_at);
        self.publish(WebhookEvent::DeliveryRetrying(delivery));
        Ok(())
    }

    fn publish(&self, event: WebhookEvent) {
        let _ = self.events.send(event);
    }
}

/// Backoff for the attempt that just failed, with ±10% jitter.
pub fn backoff_with_jitter(policy: &WebhookRetryPolicy, attempt: u32) -> u64 {
    let base = policy.base_delay_ms(attempt) as f64;
    let jitter = base * 0.1 * rand::thread_rng().gen_range(-1.0..=1.0);
    ((base + jitter).max(0.0) as u64).max(MIN_BACKOFF_MS)
}

fn validate_url(url: &str) -> WebhookResult<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| WebhookError::Validation(format!("Invalid webhook URL '{}': {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(WebhookError::Validation(format!(
            "Unsupported URL scheme '{}'",
            scheme
        ))),
    }
}

fn validate_policy(policy: &WebhookRetryPolicy) -> WebhookResult<()> {
    if policy.max_retries == 0 {
        return Err(WebhookError::Validation(
            "max_retries must be at least 1".to_string(),
        ));
    }
    if policy.initial_delay_ms > policy.max_delay_ms {
        return Err(WebhookError::Validation(
            "initial_delay_ms must not exceed max_delay_ms".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
