use super::*;

#[test]
fn record_check_resets_opposite_streak() {
    let mut state = InstanceHealthState::default();
    state.record_check(HealthCheckResult::unhealthy("boom"));
    state.record_check(HealthCheckResult::unhealthy("boom"));
    assert_eq!(state.consecutive_failures, 2);
    state.record_check(HealthCheckResult::healthy());
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(state.consecutive_successes, 1);
}

#[test]
fn history_is_capped_at_100_entries() {
    let mut state = InstanceHealthState::default();
    for _ in 0..150 {
        state.record_check(HealthCheckResult::healthy());
    }
    assert_eq!(state.history.len(), 100);
}

#[test]
fn crossed_unhealthy_honors_configured_threshold() {
    let config = HealthMonitorConfig::default();
    let mut state = InstanceHealthState::default();
    for _ in 0..(config.unhealthy_threshold - 1) {
        state.record_check(HealthCheckResult::unhealthy("x"));
    }
    assert!(!state.crossed_unhealthy(&config));
    state.record_check(HealthCheckResult::unhealthy("x"));
    assert!(state.crossed_unhealthy(&config));
}

#[test]
fn crossed_recovered_honors_configured_threshold() {
    let config = HealthMonitorConfig::default();
    let mut state = InstanceHealthState::default();
    state.record_check(HealthCheckResult::healthy());
    assert!(!state.crossed_recovered(&config));
    state.record_check(HealthCheckResult::healthy());
    assert!(state.crossed_recovered(&config));
}

#[test]
fn can_attempt_recovery_respects_max_attempts() {
    let config = HealthMonitorConfig::default();
    let mut state = InstanceHealthState::default();
    for _ in 0..config.max_recovery_attempts {
        state.record_recovery_attempt();
    }
    assert!(!state.can_attempt_recovery(&config, None));
}

#[test]
fn can_attempt_recovery_respects_cooldown() {
    let config = HealthMonitorConfig::default();
    let mut state = InstanceHealthState::default();
    state.record_recovery_attempt();
    assert!(!state.can_attempt_recovery(&config, Some(Duration::from_secs(1))));
    assert!(state.can_attempt_recovery(&config, Some(Duration::from_secs(61))));
}

#[test]
fn reset_recovery_state_clears_attempts() {
    let mut state = InstanceHealthState::default();
    state.record_recovery_attempt();
    state.reset_recovery_state();
    assert_eq!(state.recovery_attempts, 0);
}

#[yare::parameterized(
    exhausted_attempts_terminates = { false, HealthCheckResult::unhealthy(""), RecoveryAction::Terminate },
    connection_error_restarts = { true, HealthCheckResult::unhealthy("connection refused"), RecoveryAction::Restart },
    timeout_restarts = { true, HealthCheckResult::unhealthy("request timeout"), RecoveryAction::Restart },
    network_restarts = { true, HealthCheckResult::unhealthy("network unreachable"), RecoveryAction::Restart },
    high_memory_migrates = {
        true,
        HealthCheckResult { status: HealthStatus::Unhealthy, error_rate: 0.0, memory_usage_pct: 96.0, cpu_pct: 0.0, active_requests: 0, latency_ms: 0.0, last_check_at_ms: 0, error_message: Some("oom".into()) },
        RecoveryAction::Migrate
    },
    mid_error_rate_degrades = {
        true,
        HealthCheckResult { status: HealthStatus::Degraded, error_rate: 0.2, memory_usage_pct: 10.0, cpu_pct: 0.0, active_requests: 0, latency_ms: 0.0, last_check_at_ms: 0, error_message: None },
        RecoveryAction::Degrade
    },
    otherwise_restarts = {
        true,
        HealthCheckResult { status: HealthStatus::Unhealthy, error_rate: 0.0, memory_usage_pct: 10.0, cpu_pct: 0.0, active_requests: 0, latency_ms: 0.0, last_check_at_ms: 0, error_message: Some("mystery".into()) },
        RecoveryAction::Restart
    },
)]
fn determine_recovery_action_matches_rules(
    allowed: bool,
    result: HealthCheckResult,
    expected: RecoveryAction,
) {
    let config = HealthMonitorConfig::default();
    assert_eq!(determine_recovery_action(&config, &result, allowed), expected);
}
