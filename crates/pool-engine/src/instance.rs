// SPDX-License-Identifier: MIT

//! The agent instance wrapper (§4.5): one wrapped agent object plus the
//! concurrency semaphore, lifecycle, rolling metrics, and circuit breaker
//! that guard every call into it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pool_adapters::backend::Backend;
use pool_core::breaker::{CircuitBreaker, CircuitBreakerConfig};
use pool_core::clock::{Clock, SystemClock};
use pool_core::health::{HealthCheckResult, HealthStatus};
use pool_core::key::InstanceKey;
use pool_core::lifecycle::{InstanceStatus, Lifecycle, Trigger};
use pool_core::metrics::InstanceMetrics;
use pool_wire::agent::{AgentContract, AgentEvent};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::{EngineError, EngineResult};

/// One hosted agent plus everything that governs access to it. Backends
/// create these; the pool manager owns them by key.
pub struct AgentInstance<C: Clock = SystemClock> {
    pub instance_key: InstanceKey,
    agent: Arc<dyn AgentContract>,
    /// The backend `agent` was created on. `execute` routes every call
    /// through here (not straight to `agent`) so a backend's own
    /// bookkeeping — e.g. the shared-pool's LRU/LFU/FIFO slot tracking —
    /// sees real traffic, not just admission.
    backend: Arc<dyn Backend>,
    clock: C,
    lifecycle: Lifecycle<C>,
    breaker: CircuitBreaker<C>,
    semaphore: Semaphore,
    active_requests: Mutex<u32>,
    metrics: Mutex<InstanceMetrics>,
    last_activity_ms: Mutex<u64>,
}

impl<C: Clock> AgentInstance<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance_key: InstanceKey,
        agent: Arc<dyn AgentContract>,
        backend: Arc<dyn Backend>,
        max_concurrent_requests: u32,
        breaker_config: CircuitBreakerConfig,
        clock: C,
    ) -> Self {
        let lifecycle = Lifecycle::new(instance_key.clone(), clock.clone());
        let breaker_name = instance_key.as_str().to_string();
        let breaker = CircuitBreaker::new(breaker_name, breaker_config, clock.clone());
        let now = clock.epoch_ms();
        Self {
            instance_key,
            agent,
            backend,
            clock,
            lifecycle,
            breaker,
            semaphore: Semaphore::new(max_concurrent_requests as usize),
            active_requests: Mutex::new(0),
            metrics: Mutex::new(InstanceMetrics::new()),
            last_activity_ms: Mutex::new(now),
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle<C> {
        &self.lifecycle
    }

    pub fn breaker(&self) -> &CircuitBreaker<C> {
        &self.breaker
    }

    pub fn metrics(&self) -> InstanceMetrics {
        self.metrics.lock().clone()
    }

    pub fn active_requests(&self) -> u32 {
        *self.active_requests.lock()
    }

    pub fn last_activity_ms(&self) -> u64 {
        *self.last_activity_ms.lock()
    }

    /// §4.5 `execute`: admission, streaming, bookkeeping, and release, in
    /// that order regardless of how the agent call ends.
    pub async fn execute(
        &self,
        conversation_id: &str,
        message: &str,
        context: Value,
    ) -> EngineResult<Vec<AgentEvent>> {
        if !self.lifecycle.status().is_active() {
            return Err(EngineError::InstanceNotActive(self.instance_key.clone()));
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| EngineError::InstanceNotActive(self.instance_key.clone()))?;

        {
            let mut active = self.active_requests.lock();
            *active += 1;
            if *active == 1 && self.lifecycle.status() == InstanceStatus::Ready {
                self.lifecycle.transition(Trigger::Execute, None, None)?;
            }
        }
        *self.last_activity_ms.lock() = self.clock.epoch_ms();

        let permit = self.breaker.try_acquire()?;
        let start = self.clock.now();
        let result = self.backend.execute(&self.instance_key, conversation_id, message, context).await;
        let latency_ms = self.clock.now().duration_since(start).as_secs_f64() * 1000.0;

        match &result {
            Ok(_) => {
                permit.success();
                self.metrics.lock().record_success(latency_ms);
            }
            Err(e) => {
                permit.failure();
                self.metrics.lock().record_failure(latency_ms, self.clock.epoch_ms());
                tracing::warn!(instance_key = %self.instance_key, error = %e, "agent execute failed");
            }
        }

        {
            let mut active = self.active_requests.lock();
            *active = active.saturating_sub(1);
            if *active == 0 && self.lifecycle.status() == InstanceStatus::Executing {
                self.lifecycle.transition(Trigger::Complete, None, None)?;
            }
        }

        Ok(result?)
    }

    /// Drives the lifecycle from `created` through to `ready`, for use
    /// right after a backend hands back a freshly created instance.
    pub fn mark_ready(&self) -> EngineResult<()> {
        self.lifecycle.transition(Trigger::Initialize, None, None)?;
        self.lifecycle.transition(Trigger::InitSucceed, None, None)?;
        Ok(())
    }

    /// Marks initialization as failed, e.g. when a backend's readiness
    /// probe times out after the instance object already exists.
    pub fn mark_init_failed(&self, reason: impl Into<String>) -> EngineResult<()> {
        self.lifecycle.transition(Trigger::Initialize, None, None)?;
        self.lifecycle.transition(Trigger::InitFail, Some(reason.into()), None)?;
        Ok(())
    }

    /// §4.5 `health_check`. Wall-clock is the check itself; the agent's
    /// own `health()` call is not expected to be instant.
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = self.clock.now();
        if self.lifecycle.status().is_terminal() {
            return HealthCheckResult::unhealthy("instance is in a terminal state");
        }

        let metrics = self.metrics.lock().clone();
        let error_rate = metrics.error_rate();
        let status = if error_rate >= 0.5 {
            HealthStatus::Unhealthy
        } else if error_rate >= 0.1 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let mut result = match status {
            HealthStatus::Healthy => HealthCheckResult::healthy(),
            _ => HealthCheckResult::unhealthy(format!("error_rate={error_rate:.3}")),
        };
        result.status = status;
        result.error_rate = error_rate;
        result.active_requests = self.active_requests();
        result.latency_ms = self.clock.now().duration_since(start).as_secs_f64() * 1000.0;
        result.last_check_at_ms = self.clock.epoch_ms();
        result
    }

    /// §4.5 `stop`: graceful drain (bounded by `timeout`) then forced
    /// teardown; non-graceful skips straight to the terminate path.
    pub async fn stop(&self, graceful: bool, timeout: Duration) -> EngineResult<()> {
        if graceful {
            if self.lifecycle.can_transition(Trigger::Pause) {
                self.lifecycle.transition(Trigger::Pause, Some("draining".into()), None)?;
            }
            let deadline = self.clock.now() + timeout;
            while self.active_requests() > 0 && self.clock.now() < deadline {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }

        if self.lifecycle.can_transition(Trigger::Terminate) {
            self.lifecycle.transition(Trigger::Terminate, None, None)?;
        } else if self.lifecycle.can_transition(Trigger::ForceTerminate) {
            self.lifecycle.transition(Trigger::ForceTerminate, Some("forced".into()), None)?;
        }

        let _ = self.agent.shutdown(graceful, timeout.as_secs()).await;

        if self.lifecycle.can_transition(Trigger::FinishTerminate) {
            self.lifecycle.transition(Trigger::FinishTerminate, None, None)?;
        } else if self.lifecycle.can_transition(Trigger::ForceTerminated) {
            self.lifecycle.transition(Trigger::ForceTerminated, None, None)?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
