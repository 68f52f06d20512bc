use std::time::Duration;

use super::*;
use crate::clock::FakeClock;

fn breaker(clock: FakeClock) -> CircuitBreaker<FakeClock> {
    let config = CircuitBreakerConfig {
        failure_threshold: 3,
        success_threshold: 2,
        recovery_timeout: Duration::from_millis(100),
        half_open_max_requests: 3,
        window: Duration::from_secs(60),
        excluded_error_kinds: vec!["validation".into()],
    };
    CircuitBreaker::new("downstream", config, clock)
}

/// Scenario S3 from the spec: three failures open the breaker, a call
/// within the recovery timeout is rejected, after the timeout it goes
/// half-open, two successes close it, and a half-open failure reopens it.
#[test]
fn scenario_s3_opens_recovers_and_reopens() {
    let clock = FakeClock::new();
    let cb = breaker(clock.clone());

    for _ in 0..3 {
        cb.try_acquire().unwrap().failure();
    }
    assert_eq!(cb.state(), CircuitState::Open);

    let err = cb.try_acquire().unwrap_err();
    assert!(matches!(err, PoolError::CircuitOpen { .. }));

    clock.advance(Duration::from_millis(100));
    let p1 = cb.try_acquire().unwrap();
    assert_eq!(cb.state(), CircuitState::HalfOpen);
    p1.success();
    let p2 = cb.try_acquire().unwrap();
    p2.success();
    assert_eq!(cb.state(), CircuitState::Closed);

    // Drive it open again and confirm a half-open failure reopens it.
    for _ in 0..3 {
        cb.try_acquire().unwrap().failure();
    }
    clock.advance(Duration::from_millis(100));
    let p3 = cb.try_acquire().unwrap();
    assert_eq!(cb.state(), CircuitState::HalfOpen);
    p3.failure();
    assert_eq!(cb.state(), CircuitState::Open);
}

#[test]
fn half_open_admits_at_most_configured_concurrent_trials() {
    let clock = FakeClock::new();
    let cb = breaker(clock.clone());
    for _ in 0..3 {
        cb.try_acquire().unwrap().failure();
    }
    clock.advance(Duration::from_millis(100));

    let p1 = cb.try_acquire().unwrap();
    let p2 = cb.try_acquire().unwrap();
    let p3 = cb.try_acquire().unwrap();
    assert!(cb.try_acquire().is_err());
    drop(p1);
    drop(p2);
    drop(p3);
}

#[test]
fn open_before_recovery_timeout_elapses_stays_open() {
    let clock = FakeClock::new();
    let cb = breaker(clock.clone());
    for _ in 0..3 {
        cb.try_acquire().unwrap().failure();
    }
    clock.advance(Duration::from_millis(99));
    assert!(matches!(cb.try_acquire(), Err(PoolError::CircuitOpen { .. })));
    assert_eq!(cb.state(), CircuitState::Open);
}

#[test]
fn excluded_error_kind_counts_as_success() {
    let clock = FakeClock::new();
    let cb = breaker(clock);
    cb.try_acquire().unwrap().resolve(Some("validation"));
    cb.try_acquire().unwrap().resolve(Some("validation"));
    cb.try_acquire().unwrap().resolve(Some("validation"));
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.stats().failed_calls, 0);
}

#[test]
fn zero_requests_has_zero_failure_rate() {
    let cb = breaker(FakeClock::new());
    assert_eq!(cb.stats().failure_rate(), 0.0);
}

#[test]
fn stats_track_totals() {
    let cb = breaker(FakeClock::new());
    cb.try_acquire().unwrap().success();
    cb.try_acquire().unwrap().failure();
    let stats = cb.stats();
    assert_eq!(stats.total_calls, 2);
    assert_eq!(stats.successful_calls, 1);
    assert_eq!(stats.failed_calls, 1);
    assert_eq!(stats.failure_rate(), 0.5);
}

#[test]
fn dropping_an_unresolved_permit_counts_as_failure() {
    let cb = breaker(FakeClock::new());
    {
        let _permit = cb.try_acquire().unwrap();
    }
    assert_eq!(cb.stats().failed_calls, 1);
}

#[test]
fn reset_returns_to_closed_with_clean_counters() {
    let clock = FakeClock::new();
    let cb = breaker(clock);
    for _ in 0..3 {
        cb.try_acquire().unwrap().failure();
    }
    assert_eq!(cb.state(), CircuitState::Open);
    cb.reset();
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[test]
fn stats_record_a_bounded_history_of_state_changes() {
    let cb = breaker(FakeClock::new());
    for _ in 0..3 {
        cb.try_acquire().unwrap().failure();
    }
    let changes = cb.stats().state_changes;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].from, CircuitState::Closed);
    assert_eq!(changes[0].to, CircuitState::Open);
}

#[test]
fn trip_forces_open_from_closed() {
    let cb = breaker(FakeClock::new());
    assert_eq!(cb.state(), CircuitState::Closed);
    cb.trip();
    assert_eq!(cb.state(), CircuitState::Open);
}

#[test]
fn on_state_change_callback_fires() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();
    let config = CircuitBreakerConfig { failure_threshold: 1, ..CircuitBreakerConfig::default() };
    let cb = CircuitBreaker::new("dep", config, FakeClock::new())
        .with_on_state_change(move |_from, _to| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
    cb.try_acquire().unwrap().failure();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
