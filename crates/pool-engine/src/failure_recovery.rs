// SPDX-License-Identifier: MIT

//! Failure-recovery service (§4.10): a failure event log with window-based
//! pruning, pattern detection, and a retry-with-backoff executor that maps
//! failure types onto restart/recover/migrate/escalate strategies.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pool_core::clock::{Clock, SystemClock};
use pool_core::health::RecoveryAction;
use pool_core::key::InstanceKey;
use pool_wire::alert::{Alert, AlertSeverity, AlertSink};
use serde_json::Value;

use crate::error::EngineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureType {
    HealthCheckFailed,
    InitializationFailed,
    ExecutionError,
    ResourceExhausted,
    Timeout,
    ConnectionLost,
    ContainerCrashed,
    Unknown,
}

pool_core::simple_display! {
    FailureType {
        HealthCheckFailed => "health_check_failed",
        InitializationFailed => "initialization_failed",
        ExecutionError => "execution_error",
        ResourceExhausted => "resource_exhausted",
        Timeout => "timeout",
        ConnectionLost => "connection_lost",
        ContainerCrashed => "container_crashed",
        Unknown => "unknown",
    }
}

#[derive(Debug, Clone)]
pub struct FailureEvent {
    pub event_id: String,
    pub instance_key: InstanceKey,
    pub failure_type: FailureType,
    pub timestamp_ms: u64,
    pub error_message: Option<String>,
    pub details: Value,
    pub recovery_attempted: bool,
    pub recovery_strategy: Option<RecoveryAction>,
    pub recovery_status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FailureTypeConfig {
    pub action: RecoveryAction,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl FailureTypeConfig {
    fn new(action: RecoveryAction, max_retries: u32, retry_delay_secs: u64) -> Self {
        Self {
            action,
            max_retries,
            retry_delay: Duration::from_secs(retry_delay_secs),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(300),
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.retry_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

#[derive(Debug, Clone)]
pub struct FailureRecoveryConfig {
    pub actions: HashMap<FailureType, FailureTypeConfig>,
    pub pattern_detection_window: Duration,
    pub max_failures_per_hour: u32,
}

impl Default for FailureRecoveryConfig {
    fn default() -> Self {
        let mut actions = HashMap::new();
        actions.insert(FailureType::HealthCheckFailed, FailureTypeConfig::new(RecoveryAction::Restart, 3, 10));
        actions.insert(FailureType::InitializationFailed, FailureTypeConfig::new(RecoveryAction::Restart, 2, 30));
        actions.insert(FailureType::ExecutionError, FailureTypeConfig::new(RecoveryAction::Recover, 2, 10));
        actions.insert(FailureType::ResourceExhausted, FailureTypeConfig::new(RecoveryAction::Migrate, 1, 60));
        actions.insert(FailureType::Timeout, FailureTypeConfig::new(RecoveryAction::Restart, 2, 10));
        actions.insert(FailureType::ConnectionLost, FailureTypeConfig::new(RecoveryAction::Restart, 5, 5));
        actions.insert(FailureType::ContainerCrashed, FailureTypeConfig::new(RecoveryAction::Recover, 3, 30));
        actions.insert(FailureType::Unknown, FailureTypeConfig::new(RecoveryAction::Escalate, 0, 0));
        Self {
            actions,
            pattern_detection_window: Duration::from_secs(60 * 60),
            max_failures_per_hour: 10,
        }
    }
}

/// The operations the pool manager exposes back to failure-recovery to
/// carry out a chosen strategy. Kept as a trait so this module doesn't
/// depend on `pool_manager` directly.
#[async_trait]
pub trait RecoveryExecutor: Send + Sync {
    async fn restart_instance(&self, key: &InstanceKey) -> EngineResult<()>;
    async fn recover_instance_state(&self, key: &InstanceKey) -> EngineResult<()>;
    async fn downgrade_tier(&self, key: &InstanceKey) -> EngineResult<()>;
}

struct InstanceState {
    events: VecDeque<FailureEvent>,
    attempts: u32,
}

impl Default for InstanceState {
    fn default() -> Self {
        Self { events: VecDeque::new(), attempts: 0 }
    }
}

pub struct FailureRecoveryService<C: Clock = SystemClock> {
    config: FailureRecoveryConfig,
    clock: C,
    executor: Arc<dyn RecoveryExecutor>,
    alert_sink: Arc<dyn AlertSink>,
    states: Mutex<HashMap<InstanceKey, InstanceState>>,
    in_flight: Mutex<HashSet<InstanceKey>>,
}

impl<C: Clock + 'static> FailureRecoveryService<C> {
    pub fn new(
        config: FailureRecoveryConfig,
        clock: C,
        executor: Arc<dyn RecoveryExecutor>,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            config,
            clock,
            executor,
            alert_sink,
            states: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn events_for(&self, key: &InstanceKey) -> Vec<FailureEvent> {
        self.states.lock().get(key).map(|s| s.events.iter().cloned().collect()).unwrap_or_default()
    }

    /// §4.10 `report_failure`. Spawns the recovery task rather than awaiting
    /// it; callers observe outcomes via `events_for` or their own callbacks
    /// on the [`RecoveryExecutor`].
    pub fn report_failure(
        self: &Arc<Self>,
        key: InstanceKey,
        failure_type: FailureType,
        message: Option<String>,
        details: Value,
        auto_recover: bool,
    ) {
        let event = FailureEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            instance_key: key.clone(),
            failure_type,
            timestamp_ms: self.clock.epoch_ms(),
            error_message: message,
            details,
            recovery_attempted: false,
            recovery_strategy: None,
            recovery_status: None,
        };

        let pattern_breached = {
            let mut states = self.states.lock();
            let state = states.entry(key.clone()).or_default();
            state.events.push_front(event);
            self.prune_window(state);
            state.events.len() as u32 >= self.config.max_failures_per_hour
        };

        if !auto_recover {
            return;
        }

        if !self.in_flight.lock().insert(key.clone()) {
            tracing::debug!(%key, "recovery already in progress, short-circuiting");
            return;
        }

        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.run_recovery(key, failure_type, pattern_breached).await;
        });
    }

    fn prune_window(&self, state: &mut InstanceState) {
        let cutoff = self.clock.epoch_ms().saturating_sub(self.config.pattern_detection_window.as_millis() as u64);
        state.events.retain(|e| e.timestamp_ms >= cutoff);
    }

    async fn run_recovery(&self, key: InstanceKey, failure_type: FailureType, pattern_breached: bool) {
        let type_config = self.config.actions.get(&failure_type).cloned().unwrap_or_else(|| {
            FailureTypeConfig::new(RecoveryAction::Escalate, 0, 0)
        });
        let action = if pattern_breached { RecoveryAction::Escalate } else { type_config.action };

        if action == RecoveryAction::Escalate {
            self.escalate(&key, "failure pattern exceeded threshold or unknown failure type").await;
            self.in_flight.lock().remove(&key);
            return;
        }

        let attempt = self.states.lock().get(&key).map(|s| s.attempts).unwrap_or(0);
        tokio::time::sleep(type_config.delay_for(attempt)).await;

        let result = match action {
            RecoveryAction::Restart => self.executor.restart_instance(&key).await,
            RecoveryAction::Recover => {
                match self.executor.recover_instance_state(&key).await {
                    Ok(()) => self.executor.restart_instance(&key).await,
                    Err(e) => Err(e),
                }
            }
            RecoveryAction::Migrate => {
                match self.executor.downgrade_tier(&key).await {
                    Ok(()) => self.executor.restart_instance(&key).await,
                    Err(e) => Err(e),
                }
            }
            _ => Ok(()),
        };

        self.record_outcome(&key, &result);

        match result {
            Ok(()) => {
                if let Some(state) = self.states.lock().get_mut(&key) {
                    state.attempts = 0;
                }
            }
            Err(_) if attempt + 1 < type_config.max_retries => {
                if let Some(state) = self.states.lock().get_mut(&key) {
                    state.attempts += 1;
                }
                self.in_flight.lock().remove(&key);
                let service_key = key.clone();
                // re-enter directly; the in-flight guard was released above
                // so a fresh `report_failure` call is not required.
                Box::pin(self.run_recovery(service_key, failure_type, false)).await;
                return;
            }
            Err(_) => {
                self.escalate(&key, "recovery retries exhausted").await;
            }
        }

        self.in_flight.lock().remove(&key);
    }

    fn record_outcome(&self, key: &InstanceKey, result: &EngineResult<()>) {
        if let Some(state) = self.states.lock().get_mut(key) {
            if let Some(event) = state.events.front_mut() {
                event.recovery_attempted = true;
                event.recovery_status = Some(match result {
                    Ok(()) => "succeeded".to_string(),
                    Err(e) => format!("failed: {e}"),
                });
            }
        }
    }

    async fn escalate(&self, key: &InstanceKey, reason: &str) {
        let alert = Alert::new(
            format!("agent instance {key} requires escalation"),
            reason.to_string(),
            AlertSeverity::Critical,
            "failure_recovery",
            self.clock.epoch_ms(),
        );
        if let Err(e) = self.alert_sink.send_alert(&alert).await {
            tracing::warn!(%key, error = %e, "failed to deliver escalation alert");
        }
    }
}

#[cfg(test)]
#[path = "failure_recovery_tests.rs"]
mod tests;
