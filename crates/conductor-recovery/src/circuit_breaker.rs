//! Per-dependency circuit breakers.
//!
//! A breaker starts `Closed`. Consecutive failures open it, after
//! `timeout_ms` it becomes `HalfOpen` on the next read, and enough
//! successes in that state close it again. Any failure while half-open
//! reopens it.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::{CircuitBreakerConfig, CircuitBreakerConfigUpdate};
use crate::error::{RecoveryError, RecoveryResult};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Persistent state of one breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerRecord {
    pub service_name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_state_change_at: DateTime<Utc>,
    /// Set only while open.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub config: CircuitBreakerConfig,
}

impl CircuitBreakerRecord {
    fn new(service_name: &str, config: CircuitBreakerConfig, now: DateTime<Utc>) -> Self {
        Self {
            service_name: service_name.to_string(),
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            last_failure_at: None,
            last_success_at: None,
            last_state_change_at: now,
            next_retry_at: None,
            config,
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failed_requests as f64 / self.total_requests as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitEventType {
    Opened,
    HalfOpened,
    Closed,
    Success,
    Failure,
    Reset,
}

/// Published on every transition, success and failure.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerEvent {
    pub service_name: String,
    pub event_type: CircuitEventType,
    pub timestamp: DateTime<Utc>,
    pub details: Option<serde_json::Value>,
}

/// Request counters for one breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerMetrics {
    pub service_name: String,
    pub state: CircuitState,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub failure_rate: f64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_state_change_at: DateTime<Utc>,
}

impl From<&CircuitBreakerRecord> for CircuitBreakerMetrics {
    fn from(record: &CircuitBreakerRecord) -> Self {
        Self {
            service_name: record.service_name.clone(),
            state: record.state,
            total_requests: record.total_requests,
            successful_requests: record.successful_requests,
            failed_requests: record.failed_requests,
            failure_rate: record.failure_rate(),
            last_failure_at: record.last_failure_at,
            last_success_at: record.last_success_at,
            last_state_change_at: record.last_state_change_at,
        }
    }
}

/// Registry of breakers keyed by dependency name.
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    records: Mutex<HashMap<String, CircuitBreakerRecord>>,
    events: broadcast::Sender<CircuitBreakerEvent>,
}

impl CircuitBreakerRegistry {
    /// Create a registry; breakers created on first use get `default_config`.
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            default_config,
            records: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CircuitBreakerEvent> {
        self.events.subscribe()
    }

    /// Create a breaker explicitly. Fails if one already exists.
    pub fn initialize(
        &self,
        service_name: &str,
        config: Option<CircuitBreakerConfig>,
    ) -> RecoveryResult<CircuitBreakerRecord> {
        let mut records = self.records.lock();
        if records.contains_key(service_name) {
            return Err(RecoveryError::AlreadyExists(format!(
                "Circuit breaker {}",
                service_name
            )));
        }
        let config = config.unwrap_or_else(|| self.default_config.clone());
        let record = CircuitBreakerRecord::new(service_name, config, Utc::now());
        records.insert(service_name.to_string(), record.clone());
        debug!("Initialized circuit breaker for {}", service_name);
        Ok(record)
    }

    /// Record a failed call and return the resulting state.
    pub fn record_failure(&self, service_name: &str, error: Option<&str>) -> CircuitState {
        let now = Utc::now();
        let mut pending = Vec::new();

        let state = {
            let mut records = self.records.lock();
            let record = self.entry(&mut records, service_name, now);
            Self::check_half_open(record, now, &mut pending);

            let window = Duration::milliseconds(record.config.monitoring_window_ms as i64);
            if record.state == CircuitState::Closed
                && record.last_failure_at.is_some_and(|at| now - at > window)
            {
                record.failure_count = 0;
            }

            record.failure_count += 1;
            record.failed_requests += 1;
            record.total_requests += 1;
            record.last_failure_at = Some(now);
            pending.push(event(
                service_name,
                CircuitEventType::Failure,
                now,
                error.map(|e| serde_json::json!({ "error": e })),
            ));

            match record.state {
                CircuitState::Closed
                    if record.failure_count >= record.config.failure_threshold =>
                {
                    Self::transition(record, CircuitState::Open, now, &mut pending);
                }
                CircuitState::HalfOpen => {
                    Self::transition(record, CircuitState::Open, now, &mut pending);
                }
                _ => {}
            }
            record.state
        };

        self.publish(pending);
        state
    }

    /// Record a successful call and return the resulting state.
    pub fn record_success(&self, service_name: &str) -> CircuitState {
        let now = Utc::now();
        let mut pending = Vec::new();

        let state = {
            let mut records = self.records.lock();
            let record = self.entry(&mut records, service_name, now);
            Self::check_half_open(record, now, &mut pending);

            record.successful_requests += 1;
            record.total_requests += 1;
            record.last_success_at = Some(now);
            pending.push(event(service_name, CircuitEventType::Success, now, None));

            match record.state {
                CircuitState::HalfOpen => {
                    record.success_count += 1;
                    if record.success_count >= record.config.success_threshold {
                        Self::transition(record, CircuitState::Closed, now, &mut pending);
                    }
                }
                CircuitState::Closed => record.failure_count = 0,
                CircuitState::Open => {}
            }
            record.state
        };

        self.publish(pending);
        state
    }

    /// Current state, moving an expired open breaker to half-open.
    pub fn get_state(&self, service_name: &str) -> Option<CircuitState> {
        self.get_record(service_name).map(|r| r.state)
    }

    /// Snapshot of one breaker after the lazy half-open check.
    pub fn get_record(&self, service_name: &str) -> Option<CircuitBreakerRecord> {
        let now = Utc::now();
        let mut pending = Vec::new();
        let record = {
            let mut records = self.records.lock();
            records.get_mut(service_name).map(|record| {
                Self::check_half_open(record, now, &mut pending);
                record.clone()
            })
        };
        self.publish(pending);
        record
    }

    /// Snapshot of every breaker after the lazy half-open check.
    pub fn get_all(&self) -> Vec<CircuitBreakerRecord> {
        let now = Utc::now();
        let mut pending = Vec::new();
        let mut all: Vec<CircuitBreakerRecord> = {
            let mut records = self.records.lock();
            records
                .values_mut()
                .map(|record| {
                    Self::check_half_open(record, now, &mut pending);
                    record.clone()
                })
                .collect()
        };
        self.publish(pending);
        all.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        all
    }

    /// Whether calls may proceed. Unknown services are reported unavailable.
    pub fn is_service_available(&self, service_name: &str) -> bool {
        matches!(
            self.get_state(service_name),
            Some(CircuitState::Closed | CircuitState::HalfOpen)
        )
    }

    /// Fail fast with [`RecoveryError::CircuitOpen`] when the breaker is open.
    ///
    /// A service without a breaker passes, so a first call can create one.
    pub fn guard(&self, service_name: &str) -> RecoveryResult<()> {
        match self.get_state(service_name) {
            Some(CircuitState::Open) => Err(RecoveryError::CircuitOpen(service_name.to_string())),
            _ => Ok(()),
        }
    }

    /// Force a breaker back to closed with cleared counters.
    pub fn reset(&self, service_name: &str) -> RecoveryResult<()> {
        let now = Utc::now();
        let mut pending = Vec::new();
        {
            let mut records = self.records.lock();
            let record = records
                .get_mut(service_name)
                .ok_or_else(|| not_found(service_name))?;
            let config = record.config.clone();
            *record = CircuitBreakerRecord::new(service_name, config, now);
            pending.push(event(service_name, CircuitEventType::Reset, now, None));
        }
        info!("Circuit breaker for {} reset", service_name);
        self.publish(pending);
        Ok(())
    }

    pub fn update_config(
        &self,
        service_name: &str,
        update: &CircuitBreakerConfigUpdate,
    ) -> RecoveryResult<CircuitBreakerConfig> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(service_name)
            .ok_or_else(|| not_found(service_name))?;
        record.config.merge(update);
        Ok(record.config.clone())
    }

    pub fn get_metrics(&self, service_name: &str) -> Option<CircuitBreakerMetrics> {
        self.get_record(service_name)
            .map(|r| CircuitBreakerMetrics::from(&r))
    }

    pub fn get_all_metrics(&self) -> Vec<CircuitBreakerMetrics> {
        self.get_all().iter().map(CircuitBreakerMetrics::from).collect()
    }

    fn entry<'a>(
        &self,
        records: &'a mut HashMap<String, CircuitBreakerRecord>,
        service_name: &str,
        now: DateTime<Utc>,
    ) -> &'a mut CircuitBreakerRecord {
        records
            .entry(service_name.to_string())
            .or_insert_with(|| {
                debug!("Auto-initializing circuit breaker for {}", service_name);
                CircuitBreakerRecord::new(service_name, self.default_config.clone(), now)
            })
    }

    fn check_half_open(
        record: &mut CircuitBreakerRecord,
        now: DateTime<Utc>,
        pending: &mut Vec<CircuitBreakerEvent>,
    ) {
        if record.state == CircuitState::Open && record.next_retry_at.is_some_and(|at| now >= at) {
            Self::transition(record, CircuitState::HalfOpen, now, pending);
        }
    }

    fn transition(
        record: &mut CircuitBreakerRecord,
        to: CircuitState,
        now: DateTime<Utc>,
        pending: &mut Vec<CircuitBreakerEvent>,
    ) {
        let from = record.state;
        record.state = to;
        record.failure_count = 0;
        record.success_count = 0;
        record.last_state_change_at = now;
        record.next_retry_at = match to {
            CircuitState::Open => {
                Some(now + Duration::milliseconds(record.config.timeout_ms as i64))
            }
            _ => None,
        };

        let event_type = match to {
            CircuitState::Open => {
                warn!("Circuit breaker for {} opened", record.service_name);
                CircuitEventType::Opened
            }
            CircuitState::HalfOpen => {
                info!("Circuit breaker for {} half-open", record.service_name);
                CircuitEventType::HalfOpened
            }
            CircuitState::Closed => {
                info!("Circuit breaker for {} closed", record.service_name);
                CircuitEventType::Closed
            }
        };

        pending.push(event(
            &record.service_name,
            event_type,
            now,
            Some(serde_json::json!({ "from": from, "to": to })),
        ));
    }

    fn publish(&self, events: Vec<CircuitBreakerEvent>) {
        for e in events {
            let _ = self.events.send(e);
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

fn event(
    service_name: &str,
    event_type: CircuitEventType,
    timestamp: DateTime<Utc>,
    details: Option<serde_json::Value>,
) -> CircuitBreakerEvent {
    CircuitBreakerEvent {
        service_name: service_name.to_string(),
        event_type,
        timestamp,
        details,
    }
}

fn not_found(service_name: &str) -> RecoveryError {
    RecoveryError::NotFound(format!("Circuit breaker {}", service_name))
}

#[cfg(test)]
#[path = "circuit_breaker_tests.rs"]
mod tests;
