// SPDX-License-Identifier: MIT

//! The per-instance lifecycle state machine.
//!
//! Holds one state, a fixed transition table, and an append-only event
//! history. `transition` is the only way to change state; every call either
//! succeeds and emits a [`LifecycleEvent`] to subscribers, or fails fatally
//! with [`PoolError::InvalidStateTransition`] (§4.1).

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::{PoolError, PoolResult};
use crate::key::InstanceKey;

/// States an instance can be in. Transitions are restricted to the table in
/// [`Lifecycle::target_state`] — attempting anything else is a programming
/// error (`InvalidStateTransition`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Created,
    Initializing,
    Ready,
    Executing,
    Paused,
    Unhealthy,
    Degraded,
    InitFailed,
    Terminating,
    Terminated,
}

crate::simple_display! {
    InstanceStatus {
        Created => "created",
        Initializing => "initializing",
        Ready => "ready",
        Executing => "executing",
        Paused => "paused",
        Unhealthy => "unhealthy",
        Degraded => "degraded",
        InitFailed => "init_failed",
        Terminating => "terminating",
        Terminated => "terminated",
    }
}

impl InstanceStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Ready | Self::Executing | Self::Degraded)
    }

    pub fn is_healthy(self) -> bool {
        !matches!(self, Self::Unhealthy | Self::Degraded | Self::InitFailed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::InitFailed)
    }
}

/// Triggers that drive a lifecycle transition. `Force*` variants bypass the
/// graceful path and may fire from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Initialize,
    InitSucceed,
    InitFail,
    RetryInit,
    Execute,
    Complete,
    Pause,
    Resume,
    MarkUnhealthy,
    Recover,
    Degrade,
    Terminate,
    FinishTerminate,
    ForceTerminate,
    ForceTerminated,
}

crate::simple_display! {
    Trigger {
        Initialize => "initialize",
        InitSucceed => "init_succeed",
        InitFail => "init_fail",
        RetryInit => "retry_init",
        Execute => "execute",
        Complete => "complete",
        Pause => "pause",
        Resume => "resume",
        MarkUnhealthy => "mark_unhealthy",
        Recover => "recover",
        Degrade => "degrade",
        Terminate => "terminate",
        FinishTerminate => "finish_terminate",
        ForceTerminate => "force_terminate",
        ForceTerminated => "force_terminated",
    }
}

/// Emitted on every successful transition and delivered in-order,
/// synchronously, to every subscriber (§5: lifecycle events for a single
/// instance are totally ordered).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub instance_key: InstanceKey,
    pub from: InstanceStatus,
    pub to: InstanceStatus,
    pub timestamp_ms: u64,
    pub reason: Option<String>,
    pub details: Option<String>,
}

type Listener = Box<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Per-instance lifecycle state machine.
///
/// Generic over [`Clock`] so tests can drive it with a [`crate::clock::FakeClock`]
/// and assert exact event timestamps.
pub struct Lifecycle<C: Clock = SystemClock> {
    instance_key: InstanceKey,
    clock: C,
    state: RwLock<InstanceStatus>,
    history: RwLock<Vec<LifecycleEvent>>,
    listeners: RwLock<Vec<Listener>>,
}

impl<C: Clock> Lifecycle<C> {
    pub fn new(instance_key: InstanceKey, clock: C) -> Self {
        Self {
            instance_key,
            clock,
            state: RwLock::new(InstanceStatus::Created),
            history: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn status(&self) -> InstanceStatus {
        *self.state.read()
    }

    pub fn history(&self) -> Vec<LifecycleEvent> {
        self.history.read().clone()
    }

    pub fn subscribe(&self, listener: impl Fn(&LifecycleEvent) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    pub fn can_transition(&self, trigger: Trigger) -> bool {
        Self::target_state(*self.state.read(), trigger).is_some()
    }

    /// Apply `trigger`, recording and broadcasting a [`LifecycleEvent`] on
    /// success. Listener panics/errors must never block the transition —
    /// here a listener is a plain closure, so we only guard against one
    /// listener's panic taking down the others by catching unwind.
    pub fn transition(
        &self,
        trigger: Trigger,
        reason: Option<String>,
        details: Option<String>,
    ) -> PoolResult<InstanceStatus> {
        let from = *self.state.read();
        let Some(to) = Self::target_state(from, trigger) else {
            return Err(PoolError::InvalidStateTransition {
                instance_key: self.instance_key.clone(),
                from: from.to_string(),
                trigger: trigger.to_string(),
            });
        };

        let event = LifecycleEvent {
            instance_key: self.instance_key.clone(),
            from,
            to,
            timestamp_ms: self.clock.epoch_ms(),
            reason,
            details,
        };

        *self.state.write() = to;
        self.history.write().push(event.clone());

        for listener in self.listeners.read().iter() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(&event)));
            if result.is_err() {
                tracing::warn!(
                    instance_key = %event.instance_key,
                    "lifecycle listener panicked; transition already committed"
                );
            }
        }

        Ok(to)
    }

    /// The fixed transition table (§3). Returns `None` for any pair not
    /// listed here — that is the only source of `InvalidStateTransition`.
    fn target_state(from: InstanceStatus, trigger: Trigger) -> Option<InstanceStatus> {
        use InstanceStatus::*;
        use Trigger::*;

        match (from, trigger) {
            (Created, Initialize) => Some(Initializing),
            (Initializing, InitSucceed) => Some(Ready),
            (Initializing, InitFail) => Some(InitFailed),
            (InitFailed, RetryInit) => Some(Initializing),

            (Ready, Execute) => Some(Executing),
            (Executing, Complete) => Some(Ready),

            (Ready, Pause) => Some(Paused),
            (Paused, Resume) => Some(Ready),
            (Executing, Pause) => Some(Paused),

            (Ready, MarkUnhealthy) => Some(Unhealthy),
            (Executing, MarkUnhealthy) => Some(Unhealthy),
            (Paused, MarkUnhealthy) => Some(Unhealthy),

            (Unhealthy, Recover) => Some(Ready),
            (Unhealthy, Degrade) => Some(Degraded),
            (Degraded, Recover) => Some(Ready),
            (Degraded, Degrade) => Some(Unhealthy),
            (Ready, Degrade) => Some(Degraded),

            (Ready, Terminate) => Some(Terminating),
            (Paused, Terminate) => Some(Terminating),
            (Unhealthy, Terminate) => Some(Terminating),
            (Degraded, Terminate) => Some(Terminating),
            (InitFailed, Terminate) => Some(Terminating),
            (Executing, ForceTerminate) => Some(Terminating),
            (Terminating, FinishTerminate) => Some(Terminated),

            (Created, ForceTerminated) => Some(Terminated),
            (Initializing, ForceTerminated) => Some(Terminated),

            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
