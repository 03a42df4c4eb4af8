//! # Conductor Recovery
//!
//! Error-recovery primitives for failed units of work.
//!
//! ## Features
//!
//! - Backoff calculation (exponential, linear, fixed) with jitter
//! - Retry attempt bookkeeping and a bounded-concurrency retry scheduler
//! - Per-dependency circuit breakers with lifecycle events
//! - Dead letter queue with retention cleanup and a background processor

pub mod circuit_breaker;
pub mod config;
pub mod dlq;
pub mod error;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreakerEvent, CircuitBreakerMetrics, CircuitBreakerRecord, CircuitBreakerRegistry,
    CircuitEventType, CircuitState,
};
pub use config::{
    CircuitBreakerConfig, CircuitBreakerConfigUpdate, DlqProcessorConfig, RetrySchedulerConfig,
};
pub use dlq::{
    DeadLetterQueue, DlqEntry, DlqFilter, DlqNotifier, DlqProcessor, DlqStats, DlqStorage,
    EntryUpdate, ErrorDetails, FileDlqStore, LogNotifier, MemoryDlqStore, NotificationKind,
    WebhookNotifier,
};
pub use error::{RecoveryError, RecoveryResult};
pub use retry::{
    BackoffStrategy, ExecutionOutcome, MemoryRetryStore, NextRetry, RetryAttempt, RetryDatabase,
    RetryDecision, RetryEngine, RetryEvent, RetryOutcome, RetryPolicy, RetryScheduler,
    RetryStatus, TaskExecutor,
};

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;
