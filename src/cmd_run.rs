//! `conductor run`: wire the stores, workers and webhook fan-out, then wait
//! for Ctrl-C.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use conductor_config::{ConductorConfig, ConfigValidator};
use conductor_recovery::{
    CircuitBreakerEvent, CircuitBreakerRegistry, DeadLetterQueue, DlqNotifier, DlqProcessor,
    DlqStorage, FileDlqStore, LogNotifier, MemoryDlqStore, MemoryRetryStore, RetryEngine,
    RetryEvent, RetryOutcome, RetryScheduler, TaskExecutor, WebhookNotifier,
};
use conductor_scheduler::{
    CreateScheduleRequest, MemoryScheduleStore, ScheduleExecutionEvent, ScheduleExecutor,
    SchedulerCore, WorkflowTrigger,
};
use conductor_webhook::{
    CreateWebhookRequest, MemoryWebhookStore, OutboundEvent, ReqwestHttpClient, WebhookService,
    event_types,
};

use crate::adapters::{
    HttpTaskExecutor, HttpWorkflowTrigger, LoggingTaskExecutor, LoggingWorkflowTrigger,
};
use crate::settings::RuntimeSettings;

pub(crate) async fn run(config: ConductorConfig, data_dir: &Path) -> Result<()> {
    let validation = ConfigValidator::validate(&config)?;
    for warning in &validation.warnings {
        warn!("Config warning at {}: {}", warning.path, warning.message);
    }
    if !validation.is_valid() {
        for e in &validation.errors {
            error!("Config error at {}: {}", e.path, e.message);
        }
        bail!(
            "Configuration has {} error(s), run `conductor config validate` for details",
            validation.errors.len()
        );
    }
    let settings = RuntimeSettings::from_config(&config)?;

    info!("Starting Conductor (data dir: {})", data_dir.display());

    let breakers = Arc::new(CircuitBreakerRegistry::new(settings.circuit_breaker.clone()));

    // Dead letter queue
    let dlq_storage: Arc<dyn DlqStorage> = match config.dlq.storage.as_str() {
        "file" => Arc::new(
            FileDlqStore::new(data_dir)
                .await
                .context("Failed to open file DLQ store")?,
        ),
        _ => Arc::new(MemoryDlqStore::new()),
    };
    let dlq = Arc::new(DeadLetterQueue::new(dlq_storage));
    let notifier: Arc<dyn DlqNotifier> = match config.dlq.notification_webhook_url {
        Some(ref url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };
    let dlq_processor =
        Arc::new(DlqProcessor::new(dlq.clone(), settings.dlq.clone()).with_notifier(notifier));

    // Retries
    let executor: Arc<dyn TaskExecutor> = match config.retry.task_endpoint {
        Some(ref endpoint) => Arc::new(HttpTaskExecutor::new(endpoint.clone(), breakers.clone())),
        None => Arc::new(LoggingTaskExecutor),
    };
    let engine = Arc::new(RetryEngine::new(Arc::new(MemoryRetryStore::new())));
    let retry_scheduler = Arc::new(
        RetryScheduler::new(engine, executor, settings.retry.clone())
            .with_dead_letter_queue(dlq.clone()),
    );

    // Schedules
    let scheduler = Arc::new(
        SchedulerCore::new(Arc::new(MemoryScheduleStore::new()))
            .with_default_timezone(config.scheduler.default_timezone.clone()),
    );
    seed_schedules(&scheduler, &config).await?;
    let trigger: Arc<dyn WorkflowTrigger> = match config.scheduler.workflow_endpoint {
        Some(ref endpoint) => {
            Arc::new(HttpWorkflowTrigger::new(endpoint.clone(), breakers.clone()))
        }
        None => Arc::new(LoggingWorkflowTrigger),
    };
    let schedule_executor = Arc::new(ScheduleExecutor::new(
        scheduler.clone(),
        trigger,
        settings.executor.clone(),
    ));

    // Webhooks
    let webhooks = Arc::new(WebhookService::new(
        Arc::new(MemoryWebhookStore::new()),
        Arc::new(ReqwestHttpClient::new()),
        settings.webhook.clone(),
    ));
    seed_webhooks(&webhooks, &config).await?;

    let forwarders = vec![
        forward(
            retry_scheduler.subscribe(),
            webhooks.clone(),
            retry_events,
        ),
        forward(
            schedule_executor.subscribe(),
            webhooks.clone(),
            schedule_events,
        ),
        log_breaker_events(breakers.subscribe()),
    ];

    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    workers.extend(retry_scheduler.start());
    workers.extend(dlq_processor.start());
    workers.extend(schedule_executor.start());
    info!("Conductor running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");

    retry_scheduler.stop();
    dlq_processor.stop();
    schedule_executor.stop();
    for worker in workers {
        if let Err(e) = worker.await {
            warn!("Worker task ended abnormally: {}", e);
        }
    }

    webhooks.shutdown();
    for forwarder in forwarders {
        forwarder.abort();
    }

    let stats = schedule_executor.stats();
    info!(
        "Conductor stopped ({} schedule executions, {} failed, {} retries in flight)",
        stats.total_executions,
        stats.failed_executions,
        retry_scheduler.active_retry_count()
    );
    Ok(())
}

async fn seed_schedules(scheduler: &SchedulerCore, config: &ConductorConfig) -> Result<()> {
    for seed in &config.scheduler.schedules {
        let mut request =
            CreateScheduleRequest::new(&seed.name, &seed.workflow_id, &seed.cron_expression)
                .with_enabled(seed.enabled);
        if let Some(ref description) = seed.description {
            request = request.with_description(description);
        }
        if let Some(ref timezone) = seed.timezone {
            request = request.with_timezone(timezone);
        }

        scheduler
            .create_schedule(request)
            .await
            .with_context(|| format!("Failed to create schedule '{}'", seed.name))?;
    }
    Ok(())
}

async fn seed_webhooks(webhooks: &WebhookService, config: &ConductorConfig) -> Result<()> {
    for endpoint in &config.webhook.endpoints {
        let mut request = CreateWebhookRequest::new(&endpoint.event_type, &endpoint.url)
            .with_enabled(endpoint.enabled);
        for (key, value) in &endpoint.headers {
            request = request.with_header(key, value);
        }
        if let Some(ref secret) = endpoint.secret {
            request = request.with_secret(secret);
        }

        webhooks.register_webhook(request).await.with_context(|| {
            format!(
                "Failed to register webhook {} for {}",
                endpoint.url, endpoint.event_type
            )
        })?;
    }
    Ok(())
}

/// Turn worker events into outbound webhook events until the channel closes.
fn forward<E, F>(
    mut rx: broadcast::Receiver<E>,
    webhooks: Arc<WebhookService>,
    to_outbound: F,
) -> JoinHandle<()>
where
    E: Clone + Send + 'static,
    F: Fn(&E) -> Vec<OutboundEvent> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    for outbound in to_outbound(&event) {
                        let event_type = outbound.event_type.clone();
                        if let Err(e) = webhooks.trigger_event(outbound).await {
                            error!("Failed to fan out {} event: {}", event_type, e);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Webhook forwarder lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_breaker_events(mut rx: broadcast::Receiver<CircuitBreakerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!(
                    "Circuit breaker {}: {:?}",
                    event.service_name, event.event_type
                ),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Breaker event log lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Every processed retry goes to `task.retry`; a successful one also goes to
/// `error.recovered`.
pub(crate) fn retry_events(event: &RetryEvent) -> Vec<OutboundEvent> {
    let payload = retry_payload(event);
    let mut events = vec![OutboundEvent::new(event_types::TASK_RETRY, payload.clone())];
    if event.outcome == RetryOutcome::Succeeded {
        events.push(OutboundEvent::new(event_types::ERROR_RECOVERED, payload));
    }
    events
}

pub(crate) fn schedule_events(event: &ScheduleExecutionEvent) -> Vec<OutboundEvent> {
    match serde_json::to_value(event) {
        Ok(payload) => vec![OutboundEvent::new(event_types::SCHEDULE_EXECUTED, payload)],
        Err(e) => {
            error!("Failed to serialize schedule event: {}", e);
            Vec::new()
        }
    }
}

fn retry_payload(event: &RetryEvent) -> Value {
    let outcome = match event.outcome {
        RetryOutcome::Succeeded => json!({ "type": "succeeded" }),
        RetryOutcome::Rescheduled {
            next_attempt,
            retry_at,
        } => json!({
            "type": "rescheduled",
            "next_attempt": next_attempt,
            "retry_at": retry_at,
        }),
        RetryOutcome::Abandoned {
            reason,
            ref dlq_entry_id,
        } => json!({
            "type": "abandoned",
            "reason": format!("{:?}", reason),
            "dlq_entry_id": dlq_entry_id,
        }),
    };

    json!({
        "task_id": event.task_id,
        "attempt_number": event.attempt_number,
        "outcome": outcome,
        "error": event.error,
        "timestamp": event.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conductor_recovery::RetryDecision;
    use conductor_scheduler::ScheduleStatus;

    fn retry_event(outcome: RetryOutcome) -> RetryEvent {
        RetryEvent {
            task_id: "task-1".to_string(),
            attempt_number: 2,
            outcome,
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_successful_retry_is_also_a_recovery() {
        let events = retry_events(&retry_event(RetryOutcome::Succeeded));
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["task.retry", "error.recovered"]);
        assert_eq!(events[0].data["task_id"], "task-1");
        assert_eq!(events[0].data["outcome"]["type"], "succeeded");
    }

    #[test]
    fn test_abandoned_retry_payload() {
        let events = retry_events(&retry_event(RetryOutcome::Abandoned {
            reason: RetryDecision::Exhausted,
            dlq_entry_id: Some("dlq-1".to_string()),
        }));
        assert_eq!(events.len(), 1);
        let outcome = &events[0].data["outcome"];
        assert_eq!(outcome["type"], "abandoned");
        assert_eq!(outcome["reason"], "Exhausted");
        assert_eq!(outcome["dlq_entry_id"], "dlq-1");
    }

    #[test]
    fn test_schedule_event_payload() {
        let events = schedule_events(&ScheduleExecutionEvent {
            schedule_id: "schedule_1".to_string(),
            schedule_name: "nightly".to_string(),
            workflow_id: "wf".to_string(),
            status: ScheduleStatus::Failed,
            duration_ms: 12,
            error: Some("boom".to_string()),
            timestamp: Utc::now(),
        });
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "schedule.executed");
        assert_eq!(events[0].data["status"], "failed");
        assert_eq!(events[0].data["error"], "boom");
    }

    #[tokio::test]
    async fn test_seed_schedules_from_config() {
        let config = conductor_config::ConfigLoader::load_str(
            r#"
            [[scheduler.schedules]]
            name = "weekday-report"
            workflow_id = "report"
            cron_expression = "0 9 * * 1-5"
            timezone = "Europe/Berlin"
            "#,
        )
        .unwrap();

        let scheduler = SchedulerCore::new(Arc::new(MemoryScheduleStore::new()));
        seed_schedules(&scheduler, &config).await.unwrap();

        let schedules = scheduler
            .list_schedules(&Default::default())
            .await
            .unwrap();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].timezone, "Europe/Berlin");
        assert!(schedules[0].next_execution_time.is_some());
    }
}
