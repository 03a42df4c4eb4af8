//! Retry policies and backoff formulas.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{RecoveryError, RecoveryResult};

/// Backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Exponential,
    Linear,
    Fixed,
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exponential => "exponential",
            Self::Linear => "linear",
            Self::Fixed => "fixed",
        };
        f.write_str(s)
    }
}

impl FromStr for BackoffStrategy {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exponential" => Ok(Self::Exponential),
            "linear" => Ok(Self::Linear),
            "fixed" => Ok(Self::Fixed),
            other => Err(RecoveryError::Validation(format!(
                "Unknown backoff strategy: {}",
                other
            ))),
        }
    }
}

/// Retry policy for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub strategy: BackoffStrategy,
    /// Growth factor for exponential backoff; 2 when unset.
    #[serde(default)]
    pub backoff_multiplier: Option<f64>,
    /// Substrings that mark an error as retryable.
    #[serde(default)]
    pub retryable_errors: Vec<String>,
    /// Substrings that mark an error as permanent. Takes precedence over `retryable_errors`.
    #[serde(default)]
    pub non_retryable_errors: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            strategy: BackoffStrategy::Exponential,
            backoff_multiplier: None,
            retryable_errors: Vec::new(),
            non_retryable_errors: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given strategy and default limits.
    pub fn new(strategy: BackoffStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial and maximum delay.
    pub fn with_delays(mut self, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.initial_delay_ms = initial_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Set the exponential growth factor.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self
    }

    /// Set the retryable error patterns.
    pub fn with_retryable_errors<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_errors = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the non-retryable error patterns.
    pub fn with_non_retryable_errors<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_retryable_errors = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Check the policy invariants.
    pub fn validate(&self) -> RecoveryResult<()> {
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(RecoveryError::Validation(format!(
                "initial_delay_ms ({}) exceeds max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            )));
        }
        if let Some(m) = self.backoff_multiplier {
            if !m.is_finite() || m <= 0.0 {
                return Err(RecoveryError::Validation(format!(
                    "backoff_multiplier must be a positive number, got {}",
                    m
                )));
            }
        }
        Ok(())
    }
}

/// `min(multiplier^attempt * base, max)`, saturating on overflow.
pub(crate) fn scaled_exponential_backoff(
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
    multiplier: f64,
) -> u64 {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let delay = multiplier.powi(exponent) * base_ms as f64;
    if !delay.is_finite() || delay >= max_ms as f64 {
        max_ms
    } else {
        delay as u64
    }
}

/// `min(2^attempt * base, max)`.
pub fn exponential_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    2u64.checked_pow(attempt)
        .and_then(|factor| base_ms.checked_mul(factor))
        .map_or(max_ms, |delay| delay.min(max_ms))
}

/// `min(base * (attempt + 1), max)`.
pub fn linear_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    base_ms
        .saturating_mul(u64::from(attempt) + 1)
        .min(max_ms)
}

/// `min(base, max)`.
pub fn fixed_backoff(base_ms: u64, max_ms: u64) -> u64 {
    base_ms.min(max_ms)
}

/// Perturb a delay by a uniform draw in `[-factor*delay, +factor*delay]`, floored at 0.
pub fn apply_jitter(delay_ms: u64, factor: f64) -> u64 {
    let spread = delay_ms as f64 * factor.abs();
    if spread == 0.0 {
        return delay_ms;
    }
    let offset = rand::thread_rng().gen_range(-spread..=spread);
    (delay_ms as f64 + offset).max(0.0).round() as u64
}
