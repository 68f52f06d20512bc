// SPDX-License-Identifier: MIT

//! Per-dependency circuit breaker.
//!
//! `CircuitBreaker` is deliberately call-shape agnostic: it hands out a
//! [`Permit`] that the caller resolves with [`Permit::success`] or
//! [`Permit::failure`] after running whatever it was guarding (sync or
//! async — the breaker itself holds no `tokio` dependency, matching
//! `pool-core`'s dependency stack). `pool-engine` wraps this around the
//! agent instance's `execute`.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::PoolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

crate::simple_display! {
    CircuitState {
        Closed => "closed",
        Open => "open",
        HalfOpen => "half_open",
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout: Duration,
    pub half_open_max_requests: u32,
    pub window: Duration,
    /// Error "kinds" that count as successes for breaker purposes (e.g.
    /// client-side validation errors). Matched by the caller via
    /// [`Permit::excluded`].
    pub excluded_error_kinds: Vec<String>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_requests: 3,
            window: Duration::from_secs(60),
            excluded_error_kinds: Vec::new(),
        }
    }
}

/// How many past transitions [`CircuitBreakerStats::state_changes`] keeps.
const STATE_CHANGE_HISTORY_CAP: usize = 20;

/// One recorded `from -> to` transition, with the wall-clock time it happened.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StateChange {
    pub from: CircuitState,
    pub to: CircuitState,
    pub at_ms: u64,
}

/// Observability counters, supplementing the spec's breaker state with the
/// fields the Python original's `CircuitBreakerStats` tracks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
    /// Newest-last, capped at `STATE_CHANGE_HISTORY_CAP` entries.
    pub state_changes: Vec<StateChange>,
}

impl CircuitBreakerStats {
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.failed_calls as f64 / self.total_calls as f64
        }
    }
}

struct Inner {
    state: CircuitState,
    failure_timestamps: VecDeque<std::time::Instant>,
    consecutive_successes: u32,
    half_open_inflight: u32,
    opened_at: Option<std::time::Instant>,
    stats: CircuitBreakerStats,
}

/// A trial attempt admitted by the breaker; the caller must resolve it.
pub struct Permit<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    resolved: bool,
}

impl<C: Clock> Permit<'_, C> {
    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.record_failure();
    }

    /// Resolve as a success when the observed error matches one of the
    /// breaker's `excluded_error_kinds`.
    pub fn resolve(self, error_kind: Option<&str>) {
        let excluded = error_kind
            .map(|k| self.breaker.config.excluded_error_kinds.iter().any(|e| e == k))
            .unwrap_or(false);
        if error_kind.is_none() || excluded {
            self.success();
        } else {
            self.failure();
        }
    }
}

impl<C: Clock> Drop for Permit<'_, C> {
    fn drop(&mut self) {
        if !self.resolved {
            // Caller dropped the permit without resolving it (e.g. panicked
            // mid-call): treat as a failure so the breaker doesn't stay
            // half-open indefinitely waiting for a response that never comes.
            self.breaker.record_failure();
        }
    }
}

pub struct CircuitBreaker<C: Clock = SystemClock> {
    pub name: String,
    config: CircuitBreakerConfig,
    clock: C,
    inner: Mutex<Inner>,
    on_state_change: Option<Box<dyn Fn(CircuitState, CircuitState) + Send + Sync>>,
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, clock: C) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_timestamps: VecDeque::new(),
                consecutive_successes: 0,
                half_open_inflight: 0,
                opened_at: None,
                stats: CircuitBreakerStats::default(),
            }),
            on_state_change: None,
        }
    }

    pub fn with_on_state_change(
        mut self,
        cb: impl Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    ) -> Self {
        self.on_state_change = Some(Box::new(cb));
        self
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        self.inner.lock().stats.clone()
    }

    /// Request permission to make one call through the breaker.
    pub fn try_acquire(&self) -> Result<Permit<'_, C>, PoolError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let elapsed = inner.opened_at.map(|t| now.duration_since(t)).unwrap_or_default();
            if elapsed >= self.config.recovery_timeout {
                self.transition(&mut inner, CircuitState::HalfOpen);
            } else {
                inner.stats.rejected_calls += 1;
                let retry_after_ms = (self.config.recovery_timeout - elapsed).as_millis() as u64;
                return Err(PoolError::CircuitOpen { name: self.name.clone(), retry_after_ms });
            }
        }

        if inner.state == CircuitState::HalfOpen {
            if inner.half_open_inflight >= self.config.half_open_max_requests {
                inner.stats.rejected_calls += 1;
                return Err(PoolError::CircuitOpen { name: self.name.clone(), retry_after_ms: 0 });
            }
            inner.half_open_inflight += 1;
        }

        inner.stats.total_calls += 1;
        Ok(Permit { breaker: self, resolved: false })
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.stats.successful_calls += 1;

        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_inflight = inner.half_open_inflight.saturating_sub(1);
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Closed => {
                inner.failure_timestamps.clear();
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.stats.failed_calls += 1;

        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_inflight = inner.half_open_inflight.saturating_sub(1);
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Closed => {
                inner.failure_timestamps.push_back(now);
                let window = self.config.window;
                while inner
                    .failure_timestamps
                    .front()
                    .is_some_and(|t| now.duration_since(*t) > window)
                {
                    inner.failure_timestamps.pop_front();
                }
                if inner.failure_timestamps.len() as u32 >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed);
        inner.failure_timestamps.clear();
        inner.consecutive_successes = 0;
        inner.half_open_inflight = 0;
    }

    /// Force the breaker open, e.g. from an out-of-band signal.
    pub fn trip(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Open);
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        match to {
            CircuitState::Open => {
                inner.opened_at = Some(self.clock.now());
                inner.consecutive_successes = 0;
                inner.half_open_inflight = 0;
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes = 0;
                inner.half_open_inflight = 0;
            }
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.failure_timestamps.clear();
                inner.consecutive_successes = 0;
            }
        }

        inner.stats.state_changes.push(StateChange { from, to, at_ms: self.clock.epoch_ms() });
        if inner.stats.state_changes.len() > STATE_CHANGE_HISTORY_CAP {
            inner.stats.state_changes.remove(0);
        }

        if let Some(cb) = &self.on_state_change {
            cb(from, to);
        }
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
