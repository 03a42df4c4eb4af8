//! Recovery errors.

use thiserror::Error;

/// Recovery error types.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// Malformed policy or input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Record not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Operation not permitted in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Dependency refused by an open circuit.
    #[error("Circuit open for service: {0}")]
    CircuitOpen(String),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Notification delivery failed.
    #[error("Notification failed: {0}")]
    Notification(String),

    /// JSON error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for recovery operations.
pub type RecoveryResult<T> = Result<T, RecoveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RecoveryError::NotFound("dlq-123".to_string());
        assert_eq!(err.to_string(), "Not found: dlq-123");

        let err = RecoveryError::CircuitOpen("payments".to_string());
        assert!(err.to_string().contains("payments"));
    }

    #[test]
    fn test_serde_error_from() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = RecoveryError::from(json_err);
        assert!(matches!(err, RecoveryError::Serialization(_)));
    }
}
