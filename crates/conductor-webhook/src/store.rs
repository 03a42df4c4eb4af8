//! Webhook and delivery persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{WebhookError, WebhookResult};
use crate::types::{DeliveryFilter, Webhook, WebhookDelivery, WebhookFilter};

/// Default page size for listings.
const DEFAULT_PAGE_LIMIT: usize = 100;

/// Storage for webhooks and deliveries.
#[async_trait]
pub trait WebhookDatabase: Send + Sync {
    async fn save_webhook(&self, webhook: &Webhook) -> WebhookResult<()>;

    async fn get_webhook(&self, id: &str) -> WebhookResult<Option<Webhook>>;

    /// Webhooks matching the filter, oldest first.
    async fn list_webhooks(&self, filter: &WebhookFilter) -> WebhookResult<Vec<Webhook>>;

    /// Replace an existing webhook.
    async fn update_webhook(&self, webhook: &Webhook) -> WebhookResult<()>;

    async fn delete_webhook(&self, id: &str) -> WebhookResult<()>;

    async fn save_delivery(&self, delivery: &WebhookDelivery) -> WebhookResult<()>;

    async fn get_delivery(&self, id: &str) -> WebhookResult<Option<WebhookDelivery>>;

    /// Deliveries matching the filter, newest first.
    async fn list_deliveries(&self, filter: &DeliveryFilter)
    -> WebhookResult<Vec<WebhookDelivery>>;

    /// Replace an existing delivery.
    async fn update_delivery(&self, delivery: &WebhookDelivery) -> WebhookResult<()>;
}

/// In-memory webhook store.
pub struct MemoryWebhookStore {
    webhooks: RwLock<HashMap<String, Webhook>>,
    deliveries: RwLock<HashMap<String, WebhookDelivery>>,
}

impl MemoryWebhookStore {
    pub fn new() -> Self {
        Self {
            webhooks: RwLock::new(HashMap::new()),
            deliveries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryWebhookStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookDatabase for MemoryWebhookStore {
    async fn save_webhook(&self, webhook: &Webhook) -> WebhookResult<()> {
        let mut webhooks = self.webhooks.write().await;
        webhooks.insert(webhook.id.clone(), webhook.clone());
        Ok(())
    }

    async fn get_webhook(&self, id: &str) -> WebhookResult<Option<Webhook>> {
        let webhooks = self.webhooks.read().await;
        Ok(webhooks.get(id).cloned())
    }

    async fn list_webhooks(&self, filter: &WebhookFilter) -> WebhookResult<Vec<Webhook>> {
        let webhooks = self.webhooks.read().await;
        let mut matched: Vec<Webhook> = webhooks
            .values()
            .filter(|w| filter.matches(w))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(DEFAULT_PAGE_LIMIT))
            .collect())
    }

    async fn update_webhook(&self, webhook: &Webhook) -> WebhookResult<()> {
        let mut webhooks = self.webhooks.write().await;
        match webhooks.get_mut(&webhook.id) {
            Some(existing) => {
                *existing = webhook.clone();
                Ok(())
            }
            None => Err(WebhookError::NotFound(webhook.id.clone())),
        }
    }

    async fn delete_webhook(&self, id: &str) -> WebhookResult<()> {
        let mut webhooks = self.webhooks.write().await;
        webhooks.remove(id);
        Ok(())
    }

    async fn save_delivery(&self, delivery: &WebhookDelivery) -> WebhookResult<()> {
        let mut deliveries = self.deliveries.write().await;
        deliveries.insert(delivery.id.clone(), delivery.clone());
        Ok(())
    }

    async fn get_delivery(&self, id: &str) -> WebhookResult<Option<WebhookDelivery>> {
        let deliveries = self.deliveries.read().await;
        Ok(deliveries.get(id).cloned())
    }

    async fn list_deliveries(
        &self,
        filter: &DeliveryFilter,
    ) -> WebhookResult<Vec<WebhookDelivery>> {
        let deliveries = self.deliveries.read().await;
        let mut matched: Vec<WebhookDelivery> = deliveries
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(DEFAULT_PAGE_LIMIT))
            .collect())
    }

    async fn update_delivery(&self, delivery: &WebhookDelivery) -> WebhookResult<()> {
        let mut deliveries = self.deliveries.write().await;
        match deliveries.get_mut(&delivery.id) {
            Some(existing) => {
                *existing = delivery.clone();
                Ok(())
            }
            None => Err(WebhookError::DeliveryNotFound(delivery.id.clone())),
        }
    }
}
