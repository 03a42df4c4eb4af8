use super::*;

fn registry_with(timeout_ms: u64) -> CircuitBreakerRegistry {
    CircuitBreakerRegistry::new(CircuitBreakerConfig {
        timeout_ms,
        ..Default::default()
    })
}

#[test]
fn test_opens_after_failure_threshold() {
    let registry = registry_with(60_000);

    for _ in 0..4 {
        assert_eq!(registry.record_failure("payments", Some("503")), CircuitState::Closed);
    }
    assert_eq!(registry.record_failure("payments", Some("503")), CircuitState::Open);

    let record = registry.get_record("payments").unwrap();
    assert_eq!(record.failure_count, 0);
    assert_eq!(record.failed_requests, 5);
    assert!(record.next_retry_at.is_some());
    assert!(!registry.is_service_available("payments"));
}

#[test]
fn test_full_recovery_cycle() {
    let registry = registry_with(0);

    for _ in 0..5 {
        registry.record_failure("search", None);
    }
    // A zero timeout expires immediately, so the next read probes.
    assert_eq!(registry.get_state("search"), Some(CircuitState::HalfOpen));
    assert!(registry.get_record("search").unwrap().next_retry_at.is_none());

    assert_eq!(registry.record_success("search"), CircuitState::HalfOpen);
    assert_eq!(registry.record_success("search"), CircuitState::Closed);

    let record = registry.get_record("search").unwrap();
    assert_eq!(record.success_count, 0);
    assert_eq!(record.failure_count, 0);
    assert!(registry.is_service_available("search"));
}

#[test]
fn test_half_open_failure_reopens() {
    let registry = registry_with(0);
    for _ in 0..5 {
        registry.record_failure("mail", None);
    }
    assert_eq!(registry.get_state("mail"), Some(CircuitState::HalfOpen));

    registry
        .update_config(
            "mail",
            &CircuitBreakerConfigUpdate {
                timeout_ms: Some(60_000),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(registry.record_failure("mail", Some("again")), CircuitState::Open);
    assert_eq!(registry.get_state("mail"), Some(CircuitState::Open));
}

#[test]
fn test_success_in_closed_resets_failures() {
    let registry = registry_with(60_000);
    for _ in 0..4 {
        registry.record_failure("db", None);
    }
    registry.record_success("db");
    assert_eq!(registry.get_record("db").unwrap().failure_count, 0);

    for _ in 0..4 {
        registry.record_failure("db", None);
    }
    assert_eq!(registry.get_state("db"), Some(CircuitState::Closed));
}

#[test]
fn test_stale_failures_fall_out_of_window() {
    let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig {
        monitoring_window_ms: 10,
        ..Default::default()
    });
    for _ in 0..4 {
        registry.record_failure("cache", None);
    }
    std::thread::sleep(std::time::Duration::from_millis(30));
    assert_eq!(registry.record_failure("cache", None), CircuitState::Closed);
    assert_eq!(registry.get_record("cache").unwrap().failure_count, 1);
}

#[test]
fn test_initialize_twice_fails() {
    let registry = CircuitBreakerRegistry::default();
    registry.initialize("api", None).unwrap();
    assert!(matches!(
        registry.initialize("api", None),
        Err(RecoveryError::AlreadyExists(_))
    ));
}

#[test]
fn test_initialize_with_custom_config() {
    let registry = CircuitBreakerRegistry::default();
    let config = CircuitBreakerConfig {
        failure_threshold: 1,
        ..Default::default()
    };
    registry.initialize("fragile", Some(config)).unwrap();
    assert_eq!(registry.record_failure("fragile", None), CircuitState::Open);
}

#[test]
fn test_unknown_service() {
    let registry = CircuitBreakerRegistry::default();
    assert!(!registry.is_service_available("ghost"));
    assert!(registry.get_state("ghost").is_none());
    assert!(registry.guard("ghost").is_ok());
    assert!(matches!(registry.reset("ghost"), Err(RecoveryError::NotFound(_))));
    assert!(matches!(
        registry.update_config("ghost", &CircuitBreakerConfigUpdate::default()),
        Err(RecoveryError::NotFound(_))
    ));
}

#[test]
fn test_guard_and_reset() {
    let registry = registry_with(60_000);
    for _ in 0..5 {
        registry.record_failure("billing", None);
    }
    assert!(matches!(
        registry.guard("billing"),
        Err(RecoveryError::CircuitOpen(ref name)) if name == "billing"
    ));

    registry.reset("billing").unwrap();
    assert!(registry.guard("billing").is_ok());
    let record = registry.get_record("billing").unwrap();
    assert_eq!(record.state, CircuitState::Closed);
    assert_eq!(record.total_requests, 0);
    assert_eq!(record.config.timeout_ms, 60_000);
}

#[test]
fn test_metrics() {
    let registry = CircuitBreakerRegistry::default();
    registry.record_success("a");
    registry.record_success("a");
    registry.record_success("a");
    registry.record_failure("a", None);
    registry.record_success("b");

    let metrics = registry.get_metrics("a").unwrap();
    assert_eq!(metrics.total_requests, 4);
    assert_eq!(metrics.failed_requests, 1);
    assert!((metrics.failure_rate - 0.25).abs() < f64::EPSILON);
    assert!(metrics.last_failure_at.is_some());

    let all = registry.get_all_metrics();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].service_name, "a");
    assert_eq!(all[1].failure_rate, 0.0);
}

#[test]
fn test_get_all_applies_half_open_check() {
    let registry = registry_with(0);
    for _ in 0..5 {
        registry.record_failure("x", None);
    }
    registry.record_success("y");

    let all = registry.get_all();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].state, CircuitState::HalfOpen);
    assert_eq!(all[1].state, CircuitState::Closed);
}

#[test]
fn test_events_published() {
    let registry = registry_with(60_000);
    let mut rx = registry.subscribe();

    registry.initialize("queue", Some(CircuitBreakerConfig {
        failure_threshold: 1,
        ..Default::default()
    }))
    .unwrap();
    registry.record_failure("queue", Some("refused"));

    let failure = rx.try_recv().unwrap();
    assert_eq!(failure.event_type, CircuitEventType::Failure);
    assert_eq!(failure.details.unwrap()["error"], "refused");

    let opened = rx.try_recv().unwrap();
    assert_eq!(opened.event_type, CircuitEventType::Opened);
    assert_eq!(opened.service_name, "queue");
    assert_eq!(opened.details.unwrap()["to"], "open");

    registry.record_success("queue");
    assert_eq!(rx.try_recv().unwrap().event_type, CircuitEventType::Success);
    assert!(rx.try_recv().is_err());
}
