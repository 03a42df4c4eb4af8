//! # Conductor Webhook
//!
//! Outbound webhooks for recovery events: registration, HMAC-signed
//! delivery over HTTP, and per-webhook retry with exponential backoff.

pub mod config;
pub mod error;
pub mod http;
pub mod service;
pub mod signing;
pub mod store;
pub mod types;

pub use config::WebhookServiceConfig;
pub use error::{WebhookError, WebhookResult};
pub use http::{HttpClient, HttpResponse, ReqwestHttpClient};
pub use service::{WebhookEvent, WebhookService, backoff_with_jitter};
pub use signing::{SIGNATURE_HEADER, TIMESTAMP_HEADER, sign, verify_signature};
pub use store::{MemoryWebhookStore, WebhookDatabase};
pub use types::{
    CreateWebhookRequest, DeliveryFilter, DeliveryStatus, OutboundEvent, UpdateWebhookRequest,
    Webhook, WebhookDelivery, WebhookFilter, WebhookRetryPolicy, WebhookRetryPolicyUpdate,
    event_types,
};
