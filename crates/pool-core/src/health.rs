// SPDX-License-Identifier: MIT

//! Health-check result types and the per-instance health state machine
//! (§4.8). The monitor's background polling loop lives in `pool-engine`
//! (it needs an async runtime); everything here is pure bookkeeping so it
//! is testable without one.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

crate::simple_display! {
    HealthStatus {
        Healthy => "healthy",
        Degraded => "degraded",
        Unhealthy => "unhealthy",
        Unknown => "unknown",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub error_rate: f64,
    /// Renamed from the Python original's `memory_usage_pct` to match
    /// spec.md's `{..., memory_pct, cpu_pct, ...}` schema.
    pub memory_usage_pct: f64,
    pub cpu_pct: f64,
    pub active_requests: u32,
    pub latency_ms: f64,
    pub last_check_at_ms: u64,
    pub error_message: Option<String>,
}

impl HealthCheckResult {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            error_rate: 0.0,
            memory_usage_pct: 0.0,
            cpu_pct: 0.0,
            active_requests: 0,
            latency_ms: 0.0,
            last_check_at_ms: 0,
            error_message: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            error_rate: 0.0,
            memory_usage_pct: 0.0,
            cpu_pct: 0.0,
            active_requests: 0,
            latency_ms: 0.0,
            last_check_at_ms: 0,
            error_message: Some(message.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Restart,
    Recover,
    Migrate,
    Degrade,
    Escalate,
    Terminate,
    Alert,
}

crate::simple_display! {
    RecoveryAction {
        Restart => "restart",
        Recover => "recover",
        Migrate => "migrate",
        Degrade => "degrade",
        Escalate => "escalate",
        Terminate => "terminate",
        Alert => "alert",
    }
}

#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    pub check_interval: Duration,
    pub check_timeout: Duration,
    pub unhealthy_threshold: u32,
    pub healthy_threshold: u32,
    pub degraded_error_rate_threshold: f64,
    pub unhealthy_error_rate_threshold: f64,
    pub memory_critical_pct: f64,
    pub max_recovery_attempts: u32,
    pub recovery_cooldown: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            check_timeout: Duration::from_secs(10),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
            degraded_error_rate_threshold: 0.1,
            unhealthy_error_rate_threshold: 0.5,
            memory_critical_pct: 95.0,
            max_recovery_attempts: 3,
            recovery_cooldown: Duration::from_secs(60),
        }
    }
}

/// Tracked per instance by the monitor. `last_recovery_at` is an
/// `Instant`-comparable marker; the caller's `Clock` owns the actual
/// `Instant` values so this struct stays clock-generic via plain `Duration`
/// math performed by the caller.
#[derive(Debug, Clone, Default)]
pub struct InstanceHealthState {
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub recovery_attempts: u32,
    pub last_result: Option<HealthCheckResult>,
    pub history: Vec<HealthCheckResult>,
}

const HISTORY_CAP: usize = 100;

impl InstanceHealthState {
    pub fn record_check(&mut self, result: HealthCheckResult) {
        if result.is_healthy() {
            self.consecutive_successes += 1;
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
            self.consecutive_successes = 0;
        }
        self.history.push(result.clone());
        if self.history.len() > HISTORY_CAP {
            let overflow = self.history.len() - HISTORY_CAP;
            self.history.drain(0..overflow);
        }
        self.last_result = Some(result);
    }

    pub fn record_recovery_attempt(&mut self) {
        self.recovery_attempts += 1;
    }

    pub fn reset_recovery_state(&mut self) {
        self.recovery_attempts = 0;
    }

    /// Whether recovery is permitted given the elapsed time since the last
    /// attempt (caller supplies the elapsed duration since it owns the clock).
    pub fn can_attempt_recovery(
        &self,
        config: &HealthMonitorConfig,
        elapsed_since_last_recovery: Option<Duration>,
    ) -> bool {
        if self.recovery_attempts >= config.max_recovery_attempts {
            return false;
        }
        match elapsed_since_last_recovery {
            Some(elapsed) if elapsed < config.recovery_cooldown => false,
            _ => true,
        }
    }

    pub fn crossed_unhealthy(&self, config: &HealthMonitorConfig) -> bool {
        self.consecutive_failures >= config.unhealthy_threshold
    }

    pub fn crossed_recovered(&self, config: &HealthMonitorConfig) -> bool {
        self.consecutive_successes >= config.healthy_threshold
    }
}

/// Pure recovery-action selection (§4.8). `recovery_allowed` folds in the
/// attempt/cooldown check the caller already performed via
/// [`InstanceHealthState::can_attempt_recovery`].
pub fn determine_recovery_action(
    config: &HealthMonitorConfig,
    result: &HealthCheckResult,
    recovery_allowed: bool,
) -> RecoveryAction {
    if !recovery_allowed {
        return RecoveryAction::Terminate;
    }

    let message = result.error_message.as_deref().unwrap_or("").to_lowercase();
    if ["connection", "timeout", "network"].iter().any(|kw| message.contains(kw)) {
        return RecoveryAction::Restart;
    }

    if result.memory_usage_pct > config.memory_critical_pct {
        return RecoveryAction::Migrate;
    }

    if result.error_rate >= config.degraded_error_rate_threshold
        && result.error_rate < config.unhealthy_error_rate_threshold
    {
        return RecoveryAction::Degrade;
    }

    RecoveryAction::Restart
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
