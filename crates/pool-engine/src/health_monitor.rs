// SPDX-License-Identifier: MIT

//! Async wrapper around the pure health bookkeeping in `pool_core::health`
//! (§4.8): per-instance background polling, callback dispatch, and
//! recovery-action selection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pool_core::clock::{Clock, SystemClock};
use pool_core::health::{
    determine_recovery_action, HealthCheckResult, HealthMonitorConfig, InstanceHealthState,
    RecoveryAction,
};
use pool_core::key::InstanceKey;
use tokio::task::JoinHandle;

use crate::instance::AgentInstance;

type UnhealthyCallback = Arc<dyn Fn(InstanceKey, HealthCheckResult) + Send + Sync>;
type RecoveredCallback = Arc<dyn Fn(InstanceKey) + Send + Sync>;

/// §4.8: maintains one [`InstanceHealthState`] per monitored instance and
/// drives a polling task for each. `on_unhealthy`/`on_recovered` callbacks
/// are invoked synchronously from the polling task, matching the lifecycle
/// listener convention elsewhere in the core.
pub struct HealthMonitor<C: Clock = SystemClock> {
    config: HealthMonitorConfig,
    clock: C,
    states: Mutex<HashMap<InstanceKey, InstanceHealthState>>,
    last_recovery_at: Mutex<HashMap<InstanceKey, Instant>>,
    tasks: Mutex<HashMap<InstanceKey, JoinHandle<()>>>,
    on_unhealthy: Mutex<Vec<UnhealthyCallback>>,
    on_recovered: Mutex<Vec<RecoveredCallback>>,
}

impl<C: Clock + 'static> HealthMonitor<C> {
    pub fn new(config: HealthMonitorConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            states: Mutex::new(HashMap::new()),
            last_recovery_at: Mutex::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            on_unhealthy: Mutex::new(Vec::new()),
            on_recovered: Mutex::new(Vec::new()),
        }
    }

    pub fn on_unhealthy<F>(&self, callback: F)
    where
        F: Fn(InstanceKey, HealthCheckResult) + Send + Sync + 'static,
    {
        self.on_unhealthy.lock().push(Arc::new(callback));
    }

    pub fn on_recovered<F>(&self, callback: F)
    where
        F: Fn(InstanceKey) + Send + Sync + 'static,
    {
        self.on_recovered.lock().push(Arc::new(callback));
    }

    pub fn state_of(&self, key: &InstanceKey) -> Option<InstanceHealthState> {
        self.states.lock().get(key).cloned()
    }

    /// §4.8 `check_instance`: bounds the instance's own `health_check()` by
    /// `check_timeout_seconds`, synthesizing `unhealthy` on timeout, then
    /// folds the result into that instance's counters and fires callbacks
    /// on threshold crossings.
    pub async fn check_instance(&self, instance: &AgentInstance<C>) -> HealthCheckResult {
        let result = match tokio::time::timeout(self.config.check_timeout, instance.health_check()).await {
            Ok(result) => result,
            Err(_) => HealthCheckResult::unhealthy("health check timed out"),
        };

        let key = instance.instance_key.clone();
        let (crossed_unhealthy, crossed_recovered) = {
            let mut states = self.states.lock();
            let state = states.entry(key.clone()).or_default();
            let was_unhealthy = state.consecutive_failures >= self.config.unhealthy_threshold;
            state.record_check(result.clone());
            let crossed_unhealthy = !was_unhealthy && state.crossed_unhealthy(&self.config);
            let crossed_recovered = was_unhealthy && state.crossed_recovered(&self.config);
            if crossed_recovered {
                state.reset_recovery_state();
            }
            (crossed_unhealthy, crossed_recovered)
        };

        if crossed_unhealthy {
            for callback in self.on_unhealthy.lock().iter() {
                callback(key.clone(), result.clone());
            }
        }
        if crossed_recovered {
            for callback in self.on_recovered.lock().iter() {
                callback(key.clone());
            }
        }

        result
    }

    /// §4.8 recovery-action selector, folding in this instance's own
    /// attempt/cooldown bookkeeping.
    pub fn recovery_action(&self, key: &InstanceKey, result: &HealthCheckResult) -> RecoveryAction {
        let elapsed = self.last_recovery_at.lock().get(key).map(|at| self.clock.now().saturating_duration_since(*at));
        let allowed = self
            .states
            .lock()
            .get(key)
            .map(|state| state.can_attempt_recovery(&self.config, elapsed))
            .unwrap_or(true);
        determine_recovery_action(&self.config, result, allowed)
    }

    pub fn record_recovery_attempt(&self, key: &InstanceKey) {
        if let Some(state) = self.states.lock().get_mut(key) {
            state.record_recovery_attempt();
        }
        self.last_recovery_at.lock().insert(key.clone(), self.clock.now());
    }

    /// §4.8 `start_monitoring`: spawns a task polling `check_instance` every
    /// `interval` until the instance reaches a terminal state or
    /// `stop_monitoring` is called.
    pub fn start_monitoring(self: &Arc<Self>, instance: Arc<AgentInstance<C>>, interval: Duration) {
        let key = instance.instance_key.clone();
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if instance.lifecycle().status().is_terminal() {
                    break;
                }
                monitor.check_instance(&instance).await;
            }
        });
        if let Some(previous) = self.tasks.lock().insert(key, handle) {
            previous.abort();
        }
    }

    pub fn stop_monitoring(&self, key: &InstanceKey) {
        if let Some(handle) = self.tasks.lock().remove(key) {
            handle.abort();
        }
        self.states.lock().remove(key);
        self.last_recovery_at.lock().remove(key);
    }

    pub fn stop_all(&self) {
        for (_, handle) in self.tasks.lock().drain() {
            handle.abort();
        }
        self.states.lock().clear();
        self.last_recovery_at.lock().clear();
    }
}

#[cfg(test)]
#[path = "health_monitor_tests.rs"]
mod tests;
