//! Webhook errors.

use thiserror::Error;

/// Webhook error types.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Webhook not found: {0}")]
    NotFound(String),

    #[error("Delivery not found: {0}")]
    DeliveryNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for webhook operations.
pub type WebhookResult<T> = Result<T, WebhookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WebhookError::InvalidState("delivery is pending".to_string());
        assert_eq!(err.to_string(), "Invalid state: delivery is pending");
    }
}
