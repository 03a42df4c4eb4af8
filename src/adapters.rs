//! Bridges from the recovery workers to the outside world.
//!
//! Task re-execution and workflow triggering go over HTTP when an endpoint
//! template is configured and are only logged otherwise. HTTP calls are
//! guarded by a circuit breaker per downstream.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, warn};

use conductor_recovery::{CircuitBreakerRegistry, ExecutionOutcome, TaskExecutor};
use conductor_scheduler::{SchedulerError, SchedulerResult, WorkflowTrigger};

/// Breaker name for task re-execution calls.
pub(crate) const TASK_SERVICE: &str = "task-executor";

/// Breaker name for workflow trigger calls.
pub(crate) const WORKFLOW_SERVICE: &str = "workflow-trigger";

/// POST to an endpoint template, tracking the outcome on a circuit breaker.
struct GuardedEndpoint {
    client: Client,
    template: String,
    placeholder: &'static str,
    service: &'static str,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl GuardedEndpoint {
    fn new(
        template: String,
        placeholder: &'static str,
        service: &'static str,
        breakers: Arc<CircuitBreakerRegistry>,
    ) -> Self {
        if breakers.initialize(service, None).is_err() {
            debug!("Circuit breaker {} already registered", service);
        }
        Self {
            client: Client::new(),
            template,
            placeholder,
            service,
            breakers,
        }
    }

    async fn post(&self, id: &str, body: serde_json::Value) -> Result<(), String> {
        self.breakers.guard(self.service).map_err(|e| e.to_string())?;

        let url = self.template.replace(self.placeholder, id);
        let result = match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(format!("HTTP {} from {}", response.status(), url)),
            Err(e) => Err(format!("Request to {} failed: {}", url, e)),
        };

        match result {
            Ok(()) => {
                self.breakers.record_success(self.service);
                Ok(())
            }
            Err(message) => {
                self.breakers.record_failure(self.service, Some(&message));
                Err(message)
            }
        }
    }
}

/// Re-runs tasks through `POST {task_endpoint}`.
pub(crate) struct HttpTaskExecutor {
    endpoint: GuardedEndpoint,
}

impl HttpTaskExecutor {
    pub fn new(template: impl Into<String>, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            endpoint: GuardedEndpoint::new(template.into(), "{task_id}", TASK_SERVICE, breakers),
        }
    }
}

#[async_trait]
impl TaskExecutor for HttpTaskExecutor {
    async fn execute(&self, task_id: &str) -> ExecutionOutcome {
        match self.endpoint.post(task_id, json!({ "task_id": task_id })).await {
            Ok(()) => ExecutionOutcome::success(),
            Err(message) => ExecutionOutcome::failure(message),
        }
    }
}

/// Used when no task endpoint is configured. Every retry counts as a success.
pub(crate) struct LoggingTaskExecutor;

#[async_trait]
impl TaskExecutor for LoggingTaskExecutor {
    async fn execute(&self, task_id: &str) -> ExecutionOutcome {
        info!("Retry requested for task {} (no task endpoint configured)", task_id);
        ExecutionOutcome::success()
    }
}

/// Starts workflows through `POST {workflow_endpoint}`.
pub(crate) struct HttpWorkflowTrigger {
    endpoint: GuardedEndpoint,
}

impl HttpWorkflowTrigger {
    pub fn new(template: impl Into<String>, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            endpoint: GuardedEndpoint::new(
                template.into(),
                "{workflow_id}",
                WORKFLOW_SERVICE,
                breakers,
            ),
        }
    }
}

#[async_trait]
impl WorkflowTrigger for HttpWorkflowTrigger {
    async fn trigger(&self, workflow_id: &str) -> SchedulerResult<()> {
        self.endpoint
            .post(workflow_id, json!({ "workflow_id": workflow_id }))
            .await
            .map_err(|message| {
                warn!("Workflow {} trigger failed: {}", workflow_id, message);
                SchedulerError::Trigger(message)
            })
    }
}

pub(crate) struct LoggingWorkflowTrigger;

#[async_trait]
impl WorkflowTrigger for LoggingWorkflowTrigger {
    async fn trigger(&self, workflow_id: &str) -> SchedulerResult<()> {
        info!("Workflow {} due (no workflow endpoint configured)", workflow_id);
        Ok(())
    }
}
