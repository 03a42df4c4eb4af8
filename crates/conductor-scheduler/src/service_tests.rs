use super::*;
use crate::error::CronError;
use crate::store::MemoryScheduleStore;

fn core() -> SchedulerCore {
    SchedulerCore::new(Arc::new(MemoryScheduleStore::new()))
}

#[tokio::test]
async fn test_create_schedule_computes_next_time() {
    let core = core();
    let before = Utc::now();
    let schedule = core
        .create_schedule(CreateScheduleRequest::new("sync", "wf-1", "*/5 * * * *"))
        .await
        .unwrap();

    assert!(schedule.id.starts_with("schedule_"));
    assert!(schedule.enabled);
    assert_eq!(schedule.timezone, "UTC");
    let next = schedule.next_execution_time.unwrap();
    assert!(next > before);
    assert!(next <= before + Duration::minutes(6));

    let loaded = core.get_schedule(&schedule.id).await.unwrap().unwrap();
    assert_eq!(loaded, schedule);
}

#[tokio::test]
async fn test_create_rejects_bad_input() {
    let core = core();

    let err = core
        .create_schedule(CreateScheduleRequest::new("bad", "wf", "* * *"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::InvalidCron(CronError::FieldCount { found: 3 })
    ));

    let err = core
        .create_schedule(CreateScheduleRequest::new("never", "wf", "0 0 30 2 *"))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::NoNextExecution(_)));

    let err = core
        .create_schedule(CreateScheduleRequest::new("", "wf", "* * * * *"))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Validation(_)));

    let err = core
        .create_schedule(
            CreateScheduleRequest::new("tz", "wf", "* * * * *").with_timezone("Nowhere/Land"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTimezone(_)));
}

#[tokio::test]
async fn test_default_timezone() {
    let core = SchedulerCore::new(Arc::new(MemoryScheduleStore::new()))
        .with_default_timezone("Asia/Tokyo");
    let schedule = core
        .create_schedule(CreateScheduleRequest::new("jp", "wf", "0 9 * * *"))
        .await
        .unwrap();
    assert_eq!(schedule.timezone, "Asia/Tokyo");
    // 09:00 JST is 00:00 UTC.
    assert_eq!(
        schedule.next_execution_time.unwrap().format("%H:%M").to_string(),
        "00:00"
    );
}

#[tokio::test]
async fn test_update_recomputes_only_on_cron_change() {
    let core = core();
    let schedule = core
        .create_schedule(CreateScheduleRequest::new("s", "wf", "0 0 1 1 *"))
        .await
        .unwrap();
    let original_next = schedule.next_execution_time;

    let renamed = core
        .update_schedule(
            &schedule.id,
            UpdateScheduleRequest {
                name: Some("renamed".to_string()),
                cron_expression: Some("0 0 1 1 *".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "renamed");
    assert_eq!(renamed.next_execution_time, original_next);

    let rescheduled = core
        .update_schedule(
            &schedule.id,
            UpdateScheduleRequest {
                cron_expression: Some("* * * * *".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_ne!(rescheduled.next_execution_time, original_next);
    assert!(rescheduled.next_execution_time.unwrap() <= Utc::now() + Duration::minutes(1));

    let err = core
        .update_schedule(
            &schedule.id,
            UpdateScheduleRequest {
                cron_expression: Some("99 * * * *".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidCron(CronError::OutOfRange { .. })));
}

#[tokio::test]
async fn test_update_and_delete_missing() {
    let core = core();
    assert!(matches!(
        core.update_schedule("nope", UpdateScheduleRequest::default()).await,
        Err(SchedulerError::NotFound(_))
    ));
    assert!(matches!(
        core.delete_schedule("nope").await,
        Err(SchedulerError::NotFound(_))
    ));
    assert!(matches!(
        core.get_execution_history("nope", &HistoryFilter::default()).await,
        Err(SchedulerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_schedules_filters_and_pages() {
    let core = core();
    for i in 0..5 {
        core.create_schedule(
            CreateScheduleRequest::new(format!("s{}", i), format!("wf-{}", i % 2), "* * * * *")
                .with_enabled(i != 4),
        )
        .await
        .unwrap();
    }

    assert_eq!(core.list_schedules(&ScheduleFilter::default()).await.unwrap().len(), 5);
    assert_eq!(core.list_schedules(&ScheduleFilter::enabled(true)).await.unwrap().len(), 4);

    let wf0 = ScheduleFilter {
        workflow_id: Some("wf-0".to_string()),
        ..Default::default()
    };
    assert_eq!(core.list_schedules(&wf0).await.unwrap().len(), 3);

    let page = ScheduleFilter {
        limit: Some(2),
        offset: 4,
        ..Default::default()
    };
    assert_eq!(core.list_schedules(&page).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_record_execution_advances_schedule() {
    let core = core();
    let schedule = core
        .create_schedule(CreateScheduleRequest::new("s", "wf", "* * * * *"))
        .await
        .unwrap();

    let history = core
        .record_execution(
            &schedule.id,
            "wf",
            ScheduleStatus::Success,
            250,
            None,
            Some(serde_json::json!({ "ok": true })),
        )
        .await
        .unwrap();

    let completed = history.completed_at.unwrap();
    assert_eq!(completed - history.started_at, Duration::milliseconds(250));

    let updated = core.get_schedule(&schedule.id).await.unwrap().unwrap();
    assert_eq!(updated.last_execution_time, Some(history.started_at));
    assert!(updated.next_execution_time.unwrap() > completed);
}

#[tokio::test]
async fn test_record_execution_on_disabled_keeps_next_time() {
    let core = core();
    let schedule = core
        .create_schedule(CreateScheduleRequest::new("s", "wf", "0 0 1 1 *").with_enabled(false))
        .await
        .unwrap();

    core.record_execution(&schedule.id, "wf", ScheduleStatus::Failed, 10, Some("boom".into()), None)
        .await
        .unwrap();

    let updated = core.get_schedule(&schedule.id).await.unwrap().unwrap();
    assert_eq!(updated.next_execution_time, schedule.next_execution_time);
    assert!(updated.last_execution_time.is_some());
}

#[tokio::test]
async fn test_history_filter_sort_and_delete() {
    let core = core();
    let schedule = core
        .create_schedule(CreateScheduleRequest::new("s", "wf", "* * * * *"))
        .await
        .unwrap();

    for (status, duration) in [
        (ScheduleStatus::Success, 3_000),
        (ScheduleStatus::Failed, 2_000),
        (ScheduleStatus::Success, 1_000),
    ] {
        core.record_execution(&schedule.id, "wf", status, duration, None, None)
            .await
            .unwrap();
    }

    let all = core
        .get_execution_history(&schedule.id, &HistoryFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].started_at >= w[1].started_at));

    let failed = core
        .get_execution_history(
            &schedule.id,
            &HistoryFilter {
                status: Some(ScheduleStatus::Failed),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);

    core.delete_schedule(&schedule.id).await.unwrap();
    assert!(core.get_schedule(&schedule.id).await.unwrap().is_none());

    let recreated = core
        .create_schedule(CreateScheduleRequest::new("s2", "wf", "* * * * *"))
        .await
        .unwrap();
    assert!(core
        .get_execution_history(&recreated.id, &HistoryFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_due_schedules() {
    let store = Arc::new(MemoryScheduleStore::new());
    let core = SchedulerCore::new(store.clone());
    let mut schedule = core
        .create_schedule(CreateScheduleRequest::new("s", "wf", "* * * * *"))
        .await
        .unwrap();

    assert!(core.due_schedules(Utc::now()).await.unwrap().is_empty());

    schedule.next_execution_time = Some(Utc::now() - Duration::seconds(5));
    store.save_schedule(&schedule).await.unwrap();
    assert_eq!(core.due_schedules(Utc::now()).await.unwrap().len(), 1);
}

/// Store that deletes the target schedule just before one of its writes runs,
/// as a concurrent `delete_schedule` would.
struct DeletingStore {
    inner: MemoryScheduleStore,
    before_update: bool,
}

impl DeletingStore {
    async fn drop_schedule(&self, id: &str) {
        self.inner.delete_schedule(id).await.unwrap();
        self.inner.delete_history(id).await.unwrap();
    }
}

#[async_trait::async_trait]
impl ScheduleStore for DeletingStore {
    async fn save_schedule(&self, schedule: &Schedule) -> SchedulerResult<()> {
        self.inner.save_schedule(schedule).await
    }

    async fn update_schedule(&self, schedule: &Schedule) -> SchedulerResult<()> {
        if self.before_update {
            self.drop_schedule(&schedule.id).await;
        }
        self.inner.update_schedule(schedule).await
    }

    async fn get_schedule(&self, id: &str) -> SchedulerResult<Option<Schedule>> {
        self.inner.get_schedule(id).await
    }

    async fn list_schedules(&self) -> SchedulerResult<Vec<Schedule>> {
        self.inner.list_schedules().await
    }

    async fn delete_schedule(&self, id: &str) -> SchedulerResult<()> {
        self.inner.delete_schedule(id).await
    }

    async fn append_history(&self, history: &ExecutionHistory) -> SchedulerResult<()> {
        if !self.before_update {
            self.drop_schedule(&history.schedule_id).await;
        }
        self.inner.append_history(history).await
    }

    async fn list_history(&self, schedule_id: &str) -> SchedulerResult<Vec<ExecutionHistory>> {
        self.inner.list_history(schedule_id).await
    }

    async fn delete_history(&self, schedule_id: &str) -> SchedulerResult<()> {
        self.inner.delete_history(schedule_id).await
    }
}

#[tokio::test]
async fn test_record_execution_does_not_resurrect_deleted_schedule() {
    for before_update in [true, false] {
        let store = Arc::new(DeletingStore {
            inner: MemoryScheduleStore::new(),
            before_update,
        });
        let core = SchedulerCore::new(store.clone());
        let schedule = core
            .create_schedule(CreateScheduleRequest::new("s", "wf", "* * * * *"))
            .await
            .unwrap();

        let err = core
            .record_execution(&schedule.id, "wf", ScheduleStatus::Success, 5, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound(_)));

        assert!(core.get_schedule(&schedule.id).await.unwrap().is_none());
        assert!(store.inner.list_history(&schedule.id).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_update_does_not_resurrect_deleted_schedule() {
    let core = SchedulerCore::new(Arc::new(DeletingStore {
        inner: MemoryScheduleStore::new(),
        before_update: true,
    }));
    let schedule = core
        .create_schedule(CreateScheduleRequest::new("s", "wf", "* * * * *"))
        .await
        .unwrap();

    let err = core
        .update_schedule(
            &schedule.id,
            UpdateScheduleRequest {
                name: Some("renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::NotFound(_)));
    assert!(core.get_schedule(&schedule.id).await.unwrap().is_none());
}
