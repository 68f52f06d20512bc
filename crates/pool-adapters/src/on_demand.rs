// SPDX-License-Identifier: MIT

//! Cold-tier backend (§4.6.1): one instance created per request, up to
//! `max_instances` live at a time, evicted on idle timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use pool_core::clock::{Clock, SystemClock};
use pool_core::health::HealthCheckResult;
use pool_core::key::InstanceKey;
use pool_wire::agent::AgentContract;

use crate::backend::{
    Backend, BackendError, BackendResult, BackendStats, InstanceConfig, InstanceFactory,
};

struct Entry {
    handle: Arc<dyn AgentContract>,
    last_used_at: Instant,
}

#[derive(Debug, Clone)]
pub struct OnDemandConfig {
    pub max_instances: u32,
    pub idle_timeout: Duration,
    pub creation_timeout: Duration,
}

impl Default for OnDemandConfig {
    fn default() -> Self {
        Self {
            max_instances: 1,
            idle_timeout: Duration::from_secs(300),
            creation_timeout: Duration::from_secs(60),
        }
    }
}

/// One mutex guards the whole instance map (matching the rest of the
/// pool's "single lock over the ledger" convention), plus a per-backend
/// creation lock so two concurrent creations never both observe room for
/// the last slot.
pub struct OnDemandBackend<C: Clock = SystemClock> {
    config: OnDemandConfig,
    factory: Arc<dyn InstanceFactory>,
    clock: C,
    instances: Mutex<HashMap<InstanceKey, Entry>>,
    creation_lock: tokio::sync::Mutex<()>,
}

impl OnDemandBackend<SystemClock> {
    pub fn new(config: OnDemandConfig, factory: Arc<dyn InstanceFactory>) -> Self {
        Self::with_clock(config, factory, SystemClock)
    }
}

impl<C: Clock> OnDemandBackend<C> {
    pub fn with_clock(config: OnDemandConfig, factory: Arc<dyn InstanceFactory>, clock: C) -> Self {
        Self {
            config,
            factory,
            clock,
            instances: Mutex::new(HashMap::new()),
            creation_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Evicts every instance idle past `idle_timeout`, returning how many
    /// were evicted. Run periodically by the orchestrator's background
    /// loop (every 60s per §4.6.1); exposed directly so tests can drive it
    /// without a real timer.
    pub async fn evict_idle(&self) -> usize {
        let expired: Vec<InstanceKey> = {
            let instances = self.instances.lock();
            let now = self.clock.now();
            instances
                .iter()
                .filter(|(_, e)| now.duration_since(e.last_used_at) > self.config.idle_timeout)
                .map(|(k, _)| k.clone())
                .collect()
        };
        for key in &expired {
            let _ = self.destroy_instance(key, true).await;
        }
        expired.len()
    }

    fn evict_one_idle(&self) -> Option<InstanceKey> {
        let mut instances = self.instances.lock();
        let now = self.clock.now();
        let oldest = instances
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_used_at) > self.config.idle_timeout)
            .min_by_key(|(_, e)| e.last_used_at)
            .map(|(k, _)| k.clone());
        if let Some(key) = &oldest {
            instances.remove(key);
        }
        oldest
    }
}

#[async_trait]
impl<C: Clock> Backend for OnDemandBackend<C> {
    async fn start(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn stop(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn create_instance(&self, config: InstanceConfig) -> BackendResult<Arc<dyn AgentContract>> {
        let _creation_guard = self.creation_lock.lock().await;

        if self.instances.lock().len() as u32 >= self.config.max_instances
            && self.evict_one_idle().is_none()
        {
            return Err(BackendError::MaxInstances { max: self.config.max_instances });
        }

        let instance_key = config.instance_key.clone();
        let handle = tokio::time::timeout(self.config.creation_timeout, self.factory.create(&config))
            .await
            .map_err(|_| BackendError::CreationTimeout {
                instance_key: instance_key.clone(),
                timeout_seconds: self.config.creation_timeout.as_secs(),
            })??;

        self.instances
            .lock()
            .insert(instance_key, Entry { handle: handle.clone(), last_used_at: self.clock.now() });
        Ok(handle)
    }

    async fn destroy_instance(&self, instance_key: &InstanceKey, graceful: bool) -> BackendResult<()> {
        let entry = self.instances.lock().remove(instance_key);
        let Some(entry) = entry else { return Err(BackendError::NotFound(instance_key.clone())) };
        self.factory.destroy(instance_key, &entry.handle, graceful).await
    }

    fn get_instance(&self, instance_key: &InstanceKey) -> Option<Arc<dyn AgentContract>> {
        let mut instances = self.instances.lock();
        let entry = instances.get_mut(instance_key)?;
        entry.last_used_at = self.clock.now();
        Some(entry.handle.clone())
    }

    fn list_instances(&self) -> Vec<InstanceKey> {
        self.instances.lock().keys().cloned().collect()
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
        let instances = self.instances.lock();
        BackendStats { live_instances: instances.len(), capacity: self.config.max_instances as usize }
    }
}

#[cfg(test)]
#[path = "on_demand_tests.rs"]
mod tests;
