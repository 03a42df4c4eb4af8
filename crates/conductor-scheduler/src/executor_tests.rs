use super::*;
use crate::schedule::{CreateScheduleRequest, HistoryFilter};
use crate::store::{MemoryScheduleStore, ScheduleStore};
use std::time::Duration;

#[derive(Default)]
struct ScriptedTrigger {
    calls: Mutex<Vec<String>>,
    failing: Vec<String>,
    delay: Option<Duration>,
}

#[async_trait]
impl WorkflowTrigger for ScriptedTrigger {
    async fn trigger(&self, workflow_id: &str) -> SchedulerResult<()> {
        self.calls.lock().push(workflow_id.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.iter().any(|w| w == workflow_id) {
            return Err(SchedulerError::Trigger(format!("{} rejected", workflow_id)));
        }
        Ok(())
    }
}

struct Fixture {
    store: Arc<MemoryScheduleStore>,
    core: Arc<SchedulerCore>,
}

impl Fixture {
    fn new() -> Self {
        let store = Arc::new(MemoryScheduleStore::new());
        let core = Arc::new(SchedulerCore::new(store.clone()));
        Self { store, core }
    }

    async fn due_schedule(&self, name: &str, workflow_id: &str) -> Schedule {
        let mut schedule = self
            .core
            .create_schedule(CreateScheduleRequest::new(name, workflow_id, "* * * * *"))
            .await
            .unwrap();
        schedule.next_execution_time = Some(Utc::now() - chrono::Duration::seconds(1));
        self.store.save_schedule(&schedule).await.unwrap();
        schedule
    }

    fn executor(&self, trigger: Arc<ScriptedTrigger>, config: ScheduleExecutorConfig) -> Arc<ScheduleExecutor> {
        Arc::new(ScheduleExecutor::new(self.core.clone(), trigger, config))
    }
}

#[tokio::test]
async fn test_executes_only_due_schedules() {
    let fixture = Fixture::new();
    let due = fixture.due_schedule("due", "wf-due").await;
    fixture
        .core
        .create_schedule(CreateScheduleRequest::new("later", "wf-later", "0 0 1 1 *"))
        .await
        .unwrap();

    let trigger = Arc::new(ScriptedTrigger::default());
    let executor = fixture.executor(trigger.clone(), ScheduleExecutorConfig::default());

    assert_eq!(executor.execute_due_schedules().await.unwrap(), 1);
    assert_eq!(*trigger.calls.lock(), vec!["wf-due".to_string()]);

    let history = fixture
        .core
        .get_execution_history(&due.id, &HistoryFilter::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ScheduleStatus::Success);
    assert!(history[0].result.as_ref().unwrap().get("executed_at").is_some());

    let updated = fixture.core.get_schedule(&due.id).await.unwrap().unwrap();
    assert!(updated.next_execution_time.unwrap() > Utc::now());

    // Not due any more.
    assert_eq!(executor.execute_due_schedules().await.unwrap(), 0);

    let stats = executor.stats();
    assert_eq!(stats.total_executions, 1);
    assert_eq!(stats.successful_executions, 1);
    assert!(stats.last_execution_time.is_some());
    assert!(stats.uptime_ms.is_none());
}

#[tokio::test]
async fn test_failed_trigger_is_recorded() {
    let fixture = Fixture::new();
    let schedule = fixture.due_schedule("broken", "wf-broken").await;

    let trigger = Arc::new(ScriptedTrigger {
        failing: vec!["wf-broken".to_string()],
        ..Default::default()
    });
    let executor = fixture.executor(trigger, ScheduleExecutorConfig::default());
    let mut events = executor.subscribe();

    executor.execute_due_schedules().await.unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.status, ScheduleStatus::Failed);
    assert_eq!(event.schedule_name, "broken");
    assert!(event.error.unwrap().contains("wf-broken rejected"));

    let history = fixture
        .core
        .get_execution_history(&schedule.id, &HistoryFilter::default())
        .await
        .unwrap();
    assert_eq!(history[0].status, ScheduleStatus::Failed);
    assert!(history[0].error.is_some());
    assert_eq!(executor.stats().failed_executions, 1);
}

#[tokio::test]
async fn test_trigger_timeout() {
    let fixture = Fixture::new();
    let schedule = fixture.due_schedule("slow", "wf-slow").await;

    let trigger = Arc::new(ScriptedTrigger {
        delay: Some(Duration::from_millis(200)),
        ..Default::default()
    });
    let config = ScheduleExecutorConfig {
        trigger_timeout_ms: 20,
        ..Default::default()
    };
    let executor = fixture.executor(trigger, config);

    let event = executor.execute_schedule(&schedule).await;
    assert_eq!(event.status, ScheduleStatus::Failed);
    assert!(event.error.unwrap().contains("timed out after 20ms"));
}

#[tokio::test]
async fn test_start_runs_immediately_and_stops() {
    let fixture = Fixture::new();
    fixture.due_schedule("boot", "wf-boot").await;

    let trigger = Arc::new(ScriptedTrigger::default());
    let config = ScheduleExecutorConfig {
        execution_interval_ms: 60_000,
        ..Default::default()
    };
    let executor = fixture.executor(trigger.clone(), config);

    let handle = executor.start().unwrap();
    assert!(executor.start().is_none());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(trigger.calls.lock().len(), 1);
    let stats = executor.stats();
    assert!(stats.is_running);
    assert!(stats.uptime_ms.is_some());

    executor.stop();
    handle.await.unwrap();
    assert!(!executor.is_running());
}
