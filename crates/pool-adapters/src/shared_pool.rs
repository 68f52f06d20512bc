// SPDX-License-Identifier: MIT

//! Warm-tier backend (§4.6.2): a fixed-size array of slots, each either
//! free or bound to one instance. New keys evict an existing slot by the
//! configured policy once the pool is full.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use pool_core::clock::{Clock, SystemClock};
use pool_core::config::EvictionPolicy;
use pool_core::health::HealthCheckResult;
use pool_core::key::InstanceKey;
use pool_wire::agent::AgentContract;
use serde_json::Value;

use crate::backend::{
    Backend, BackendError, BackendResult, BackendStats, InstanceConfig, InstanceFactory,
};

const GRACEFUL_EVICTION_BUDGET: Duration = Duration::from_secs(5);

struct Slot {
    key: InstanceKey,
    handle: Arc<dyn AgentContract>,
    last_used_at: Instant,
    request_count: u64,
    assigned_at: Instant,
}

struct State {
    slots: Vec<Option<Slot>>,
    key_to_slot: HashMap<InstanceKey, usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct SharedPoolConfig {
    pub pool_size: usize,
    pub eviction_policy: EvictionPolicy,
}

impl Default for SharedPoolConfig {
    fn default() -> Self {
        Self { pool_size: 4, eviction_policy: EvictionPolicy::Lru }
    }
}

pub struct SharedPoolBackend<C: Clock = SystemClock> {
    config: SharedPoolConfig,
    factory: Arc<dyn InstanceFactory>,
    clock: C,
    state: Mutex<State>,
    creation_lock: tokio::sync::Mutex<()>,
}

impl SharedPoolBackend<SystemClock> {
    pub fn new(config: SharedPoolConfig, factory: Arc<dyn InstanceFactory>) -> Self {
        Self::with_clock(config, factory, SystemClock)
    }
}

impl<C: Clock> SharedPoolBackend<C> {
    pub fn with_clock(config: SharedPoolConfig, factory: Arc<dyn InstanceFactory>, clock: C) -> Self {
        let slots = (0..config.pool_size).map(|_| None).collect();
        Self {
            config,
            factory,
            clock,
            state: Mutex::new(State { slots, key_to_slot: HashMap::new() }),
            creation_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Picks a free slot, or the eviction victim by the configured policy
    /// if every slot is bound. Removes the victim from bookkeeping and
    /// returns it (caller is responsible for stopping it) along with the
    /// slot index to rebind.
    fn reserve_slot(&self, state: &mut State) -> (usize, Option<(InstanceKey, Slot)>) {
        if let Some(idx) = state.slots.iter().position(|s| s.is_none()) {
            return (idx, None);
        }

        let victim_idx = match self.config.eviction_policy {
            EvictionPolicy::Lru => state
                .slots
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.as_ref().map(|s| s.last_used_at))
                .map(|(i, _)| i),
            EvictionPolicy::Lfu => state
                .slots
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.as_ref().map(|s| s.request_count))
                .map(|(i, _)| i),
            EvictionPolicy::Fifo => state
                .slots
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.as_ref().map(|s| s.assigned_at))
                .map(|(i, _)| i),
        }
        .unwrap_or(0);

        let Some(victim) = state.slots[victim_idx].take() else {
            return (victim_idx, None);
        };
        state.key_to_slot.remove(&victim.key);
        let victim_key = victim.key.clone();
        (victim_idx, Some((victim_key, victim)))
    }
}

#[async_trait]
impl<C: Clock> Backend for SharedPoolBackend<C> {
    async fn start(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn stop(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn create_instance(&self, config: InstanceConfig) -> BackendResult<Arc<dyn AgentContract>> {
        let _creation_guard = self.creation_lock.lock().await;

        if let Some(existing) = self.get_instance(&config.instance_key) {
            return Ok(existing);
        }

        let (slot_idx, victim) = {
            let mut state = self.state.lock();
            self.reserve_slot(&mut state)
        };

        if let Some((victim_key, victim_slot)) = victim {
            let _ = tokio::time::timeout(
                GRACEFUL_EVICTION_BUDGET,
                self.factory.destroy(&victim_key, &victim_slot.handle, true),
            )
            .await;
        }

        let instance_key = config.instance_key.clone();
        let handle = self.factory.create(&config).await?;
        let now = self.clock.now();

        let mut state = self.state.lock();
        state.slots[slot_idx] = Some(Slot {
            key: instance_key.clone(),
            handle: handle.clone(),
            last_used_at: now,
            request_count: 0,
            assigned_at: now,
        });
        state.key_to_slot.insert(instance_key, slot_idx);

        Ok(handle)
    }

    async fn destroy_instance(&self, instance_key: &InstanceKey, graceful: bool) -> BackendResult<()> {
        let slot = {
            let mut state = self.state.lock();
            let Some(idx) = state.key_to_slot.remove(instance_key) else {
                return Err(BackendError::NotFound(instance_key.clone()));
            };
            state.slots[idx].take()
        };
        let Some(slot) = slot else { return Err(BackendError::NotFound(instance_key.clone())) };
        self.factory.destroy(instance_key, &slot.handle, graceful).await
    }

    fn get_instance(&self, instance_key: &InstanceKey) -> Option<Arc<dyn AgentContract>> {
        let state = self.state.lock();
        let idx = *state.key_to_slot.get(instance_key)?;
        state.slots[idx].as_ref().map(|s| s.handle.clone())
    }

    fn list_instances(&self) -> Vec<InstanceKey> {
        self.state.lock().key_to_slot.keys().cloned().collect()
    }

    async fn execute(
        &self,
        instance_key: &InstanceKey,
        conversation_id: &str,
        message: &str,
        context: Value,
    ) -> BackendResult<Vec<pool_wire::agent::AgentEvent>> {
        let handle = {
            let mut state = self.state.lock();
            let idx = *state.key_to_slot.get(instance_key).ok_or_else(|| BackendError::NotFound(instance_key.clone()))?;
            let Some(slot) = state.slots[idx].as_mut() else {
                return Err(BackendError::NotFound(instance_key.clone()));
            };
            slot.last_used_at = self.clock.now();
            slot.request_count += 1;
            slot.handle.clone()
        };
        Ok(handle.stream(conversation_id, message, context).await?)
    }

    async fn health_check(&self, instance_key: &InstanceKey) -> BackendResult<HealthCheckResult> {
        let instance =
            self.get_instance(instance_key).ok_or_else(|| BackendError::NotFound(instance_key.clone()))?;
        let health = instance.health().await?;
        let mut result = if health.status == "healthy" {
            HealthCheckResult::healthy()
        } else {
            HealthCheckResult::unhealthy(health.status)
        };
        result.last_check_at_ms = self.clock.epoch_ms();
        Ok(result)
    }

    fn stats(&self) -> BackendStats {
        let state = self.state.lock();
        BackendStats {
            live_instances: state.key_to_slot.len(),
            capacity: self.config.pool_size,
        }
    }
}

#[cfg(test)]
#[path = "shared_pool_tests.rs"]
mod tests;
