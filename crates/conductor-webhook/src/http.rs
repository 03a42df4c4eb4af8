//! Outbound HTTP.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{WebhookError, WebhookResult};

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Sends webhook requests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// POST a pre-serialized JSON body. Transport failures are errors; any
    /// HTTP status is a response.
    async fn post(
        &self,
        url: &str,
        body: String,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> WebhookResult<HttpResponse>;
}

/// [`HttpClient`] backed by reqwest.
#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post(
        &self,
        url: &str,
        body: String,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> WebhookResult<HttpResponse> {
        let mut request = self.client.post(url).timeout(timeout);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| WebhookError::Http(e.to_string()))?;

        let status_code = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(HttpResponse { status_code, body })
    }
}
