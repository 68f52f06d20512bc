// SPDX-License-Identifier: MIT

//! Auto-scaler (§4.11): metric-driven scale-up/scale-down decisions per
//! instance, with cooldowns, capacity bounds, and a background evaluation
//! loop.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pool_core::clock::{Clock, SystemClock};
use pool_core::config::ScalingPolicy;
use pool_core::key::InstanceKey;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingMetricsSample {
    pub cpu_utilization: f64,
    pub memory_utilization: f64,
    pub queue_depth: f64,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDirection {
    Up,
    Down,
    None,
}

pool_core::simple_display! {
    ScalingDirection {
        Up => "up",
        Down => "down",
        None => "none",
    }
}

#[derive(Debug, Clone)]
pub struct ScalingEvent {
    pub event_id: String,
    pub instance_key: InstanceKey,
    pub direction: ScalingDirection,
    pub reason: String,
    pub previous_count: u32,
    pub target_count: u32,
    pub confidence: f64,
    pub success: bool,
    pub error: Option<String>,
}

struct InstanceScalingState {
    policy: ScalingPolicy,
    samples: VecDeque<ScalingMetricsSample>,
    current_count: u32,
    last_scale_up: Option<Instant>,
    last_scale_down: Option<Instant>,
    events: VecDeque<ScalingEvent>,
}

impl InstanceScalingState {
    fn new(policy: ScalingPolicy, initial_count: u32) -> Self {
        Self {
            policy,
            samples: VecDeque::new(),
            current_count: initial_count,
            last_scale_up: None,
            last_scale_down: None,
            events: VecDeque::new(),
        }
    }
}

const EVENT_HISTORY_CAP: usize = 100;

type ScalingEventCallback = Arc<dyn Fn(&ScalingEvent) + Send + Sync>;

pub struct AutoScaler<C: Clock = SystemClock> {
    clock: C,
    default_policy: ScalingPolicy,
    states: Mutex<HashMap<InstanceKey, InstanceScalingState>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    on_event: Mutex<Vec<ScalingEventCallback>>,
}

impl<C: Clock + 'static> AutoScaler<C> {
    pub fn new(default_policy: ScalingPolicy, clock: C) -> Self {
        Self {
            clock,
            default_policy,
            states: Mutex::new(HashMap::new()),
            loop_handle: Mutex::new(None),
            on_event: Mutex::new(Vec::new()),
        }
    }

    /// Fired every time a scale decision is recorded, manual or automatic
    /// (§4.14: "auto-scaler events increment metrics").
    pub fn on_event<F>(&self, callback: F)
    where
        F: Fn(&ScalingEvent) + Send + Sync + 'static,
    {
        self.on_event.lock().push(Arc::new(callback));
    }

    pub fn set_policy(&self, key: InstanceKey, policy: ScalingPolicy, initial_count: u32) {
        self.states.lock().insert(key, InstanceScalingState::new(policy, initial_count));
    }

    pub fn current_count(&self, key: &InstanceKey) -> Option<u32> {
        self.states.lock().get(key).map(|s| s.current_count)
    }

    pub fn events_for(&self, key: &InstanceKey) -> Vec<ScalingEvent> {
        self.states.lock().get(key).map(|s| s.events.iter().cloned().collect()).unwrap_or_default()
    }

    /// §4.11 `report_metrics`: appends to the ring buffer (capped at
    /// `2 × evaluation_periods`) and evaluates immediately.
    pub fn report_metrics(&self, key: &InstanceKey, sample: ScalingMetricsSample) -> Option<ScalingEvent> {
        let event = {
            let mut states = self.states.lock();
            let state = states
                .entry(key.clone())
                .or_insert_with(|| InstanceScalingState::new(self.default_policy.clone(), 1));
            let cap = state.policy.evaluation_periods * 2;
            state.samples.push_back(sample);
            while state.samples.len() > cap {
                state.samples.pop_front();
            }
            self.evaluate_locked(key, state)
        };
        self.notify(event.as_ref());
        event
    }

    pub fn evaluate(&self, key: &InstanceKey) -> Option<ScalingEvent> {
        let event = {
            let mut states = self.states.lock();
            let state = states.get_mut(key)?;
            self.evaluate_locked(key, state)
        };
        self.notify(event.as_ref());
        event
    }

    fn notify(&self, event: Option<&ScalingEvent>) {
        let Some(event) = event else { return };
        for callback in self.on_event.lock().iter() {
            callback(event);
        }
    }

    fn evaluate_locked(&self, key: &InstanceKey, state: &mut InstanceScalingState) -> Option<ScalingEvent> {
        if state.samples.len() < state.policy.evaluation_periods {
            return None;
        }

        let n = state.samples.len() as f64;
        let (mut cpu, mut mem, mut queue, mut latency) = (0.0, 0.0, 0.0, 0.0);
        for s in &state.samples {
            cpu += s.cpu_utilization;
            mem += s.memory_utilization;
            queue += s.queue_depth;
            latency += s.latency_ms;
        }
        let (cpu, mem, queue, latency) = (cpu / n, mem / n, queue / n, latency / n);
        let policy = &state.policy;
        let now = self.clock.now();

        let up_cooling_down = state.last_scale_up.is_some_and(|at| now.saturating_duration_since(at) < policy.scale_up_cooldown);
        let down_cooling_down = state.last_scale_down.is_some_and(|at| now.saturating_duration_since(at) < policy.scale_down_cooldown);

        let exceeded = [
            (cpu, policy.cpu_up, "cpu_utilization"),
            (mem, policy.memory_up, "memory_utilization"),
            (queue, policy.queue_up, "queue_depth"),
            (latency, policy.latency_up_ms, "latency"),
        ]
        .into_iter()
        .find(|(avg, threshold, _)| avg > threshold);

        if !up_cooling_down && state.current_count < policy.max_instances {
            if let Some((avg, threshold, reason)) = exceeded {
                let confidence = (avg / threshold).min(1.0);
                let target = (state.current_count + policy.scale_up_increment).min(policy.max_instances);
                return Some(self.record_event(key, state, ScalingDirection::Up, reason, target, confidence));
            }
        }

        let all_below = cpu < policy.cpu_down
            && mem < policy.memory_down
            && queue < policy.queue_down
            && latency < policy.latency_down_ms;

        if !down_cooling_down && all_below && state.current_count > policy.min_instances {
            let target = state.current_count.saturating_sub(policy.scale_down_increment).max(policy.min_instances);
            return Some(self.record_event(key, state, ScalingDirection::Down, "low_utilization", target, 1.0));
        }

        None
    }

    fn record_event(
        &self,
        key: &InstanceKey,
        state: &mut InstanceScalingState,
        direction: ScalingDirection,
        reason: &str,
        target_count: u32,
        confidence: f64,
    ) -> ScalingEvent {
        let previous = state.current_count;
        state.current_count = target_count;
        let now = self.clock.now();
        match direction {
            ScalingDirection::Up => state.last_scale_up = Some(now),
            ScalingDirection::Down => state.last_scale_down = Some(now),
            ScalingDirection::None => {}
        }
        let event = ScalingEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            instance_key: key.clone(),
            direction,
            reason: reason.to_string(),
            previous_count: previous,
            target_count,
            confidence,
            success: true,
            error: None,
        };
        state.events.push_back(event.clone());
        if state.events.len() > EVENT_HISTORY_CAP {
            state.events.pop_front();
        }
        event
    }

    /// §4.11 manual `scale`: bypasses cooldown/threshold checks but still
    /// respects `min_instances`/`max_instances`.
    pub fn scale(&self, key: &InstanceKey, direction: ScalingDirection, reason: &str, target_count: Option<u32>) -> Option<ScalingEvent> {
        let event = {
            let mut states = self.states.lock();
            let state = states.entry(key.clone()).or_insert_with(|| InstanceScalingState::new(self.default_policy.clone(), 1));
            let policy = state.policy.clone();
            let target = target_count.unwrap_or_else(|| match direction {
                ScalingDirection::Up => state.current_count + policy.scale_up_increment,
                ScalingDirection::Down => state.current_count.saturating_sub(policy.scale_down_increment),
                ScalingDirection::None => state.current_count,
            });
            let clamped = target.clamp(policy.min_instances, policy.max_instances);
            self.record_event(key, state, direction, reason, clamped, 1.0)
        };
        self.notify(Some(&event));
        Some(event)
    }

    /// Starts a background loop evaluating every tracked instance every
    /// `interval`. Intended to be started once by the orchestrator.
    pub fn start_background_loop(self: &Arc<Self>, interval: Duration) {
        let scaler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let keys: Vec<InstanceKey> = scaler.states.lock().keys().cloned().collect();
                for key in keys {
                    scaler.evaluate(&key);
                }
            }
        });
        if let Some(previous) = self.loop_handle.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_background_loop(&self) {
        if let Some(handle) = self.loop_handle.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "autoscaler_tests.rs"]
mod tests;
