//! Retry engine and retry scheduler worker.

mod attempt;
mod engine;
mod policy;
mod scheduler;
mod store;

pub use attempt::{NextRetry, RetryAttempt, RetryStatus};
pub use engine::{RetryDecision, RetryEngine, DEFAULT_JITTER_FACTOR};
pub use policy::{
    apply_jitter, fixed_backoff, linear_backoff, exponential_backoff, BackoffStrategy, RetryPolicy,
};
pub use scheduler::{ExecutionOutcome, RetryEvent, RetryOutcome, RetryScheduler, TaskExecutor};
pub use store::{MemoryRetryStore, RetryDatabase};
