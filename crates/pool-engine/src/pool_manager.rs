// SPDX-License-Identifier: MIT

//! Pool manager (§4.13): owns every live [`AgentInstance`] by key, routes
//! creation through the right tier's backend, and wires resource
//! accounting, tier classification, prewarming, and health monitoring
//! around it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pool_adapters::backend::{Backend, BackendError, InstanceConfig};
use pool_core::clock::{Clock, SystemClock};
use pool_core::config::PoolConfig;
use pool_core::error::PoolError;
use pool_core::flags::FeatureFlagGate;
use pool_core::key::InstanceKey;
use pool_core::lifecycle::InstanceStatus;
use pool_core::quota::ResourceQuota;
use pool_core::tier::{ProjectMetrics, ProjectTier};
use pool_core::ResourceAccountant;
use tokio::task::JoinHandle;

use crate::classification::TierClassifier;
use crate::error::{EngineError, EngineResult};
use crate::failure_recovery::RecoveryExecutor;
use crate::health_monitor::HealthMonitor;
use crate::instance::AgentInstance;
use crate::prewarm::PrewarmPool;
use crate::state_recovery::InstanceSource;

/// Supplies the usage telemetry [`TierClassifier`] needs. The pool manager
/// treats this as opaque — whatever backs daily request counts,
/// subscription tier, and SLA requirement per project is the caller's
/// concern (a billing service, a metrics store, whatever).
pub trait ProjectMetricsSource: Send + Sync {
    fn project_metrics(&self, tenant: &str, project: &str) -> ProjectMetrics;
}

type CreatedCallback<C> = Arc<dyn Fn(Arc<AgentInstance<C>>) + Send + Sync>;
type TerminatedCallback = Arc<dyn Fn(InstanceKey) + Send + Sync>;

/// Everything `get_or_create_instance` recorded about a live instance that
/// isn't already on [`AgentInstance`] itself, needed later to release its
/// allocation and to pick its idle-eviction window.
#[derive(Clone, Copy)]
struct InstanceRecord {
    tier: ProjectTier,
    quota: ResourceQuota,
}

pub struct PoolManager<C: Clock = SystemClock> {
    config: PoolConfig,
    clock: C,
    accountant: Arc<ResourceAccountant>,
    classifier: Arc<TierClassifier<C>>,
    metrics_source: Arc<dyn ProjectMetricsSource>,
    backends: HashMap<ProjectTier, Arc<dyn Backend>>,
    prewarm: Arc<PrewarmPool<C>>,
    health_monitor: Arc<HealthMonitor<C>>,
    instances: Mutex<HashMap<InstanceKey, Arc<AgentInstance<C>>>>,
    records: Mutex<HashMap<InstanceKey, InstanceRecord>>,
    tier_overrides: Mutex<HashMap<(String, String), ProjectTier>>,
    creation_lock: tokio::sync::Mutex<()>,
    on_created: Mutex<Vec<CreatedCallback<C>>>,
    on_terminated: Mutex<Vec<TerminatedCallback>>,
    cleanup_handle: Mutex<Option<JoinHandle<()>>>,
    flags: Arc<FeatureFlagGate>,
}

impl<C: Clock + 'static> PoolManager<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PoolConfig,
        clock: C,
        accountant: Arc<ResourceAccountant>,
        classifier: Arc<TierClassifier<C>>,
        metrics_source: Arc<dyn ProjectMetricsSource>,
        backends: HashMap<ProjectTier, Arc<dyn Backend>>,
        prewarm: Arc<PrewarmPool<C>>,
        health_monitor: Arc<HealthMonitor<C>>,
        flags: Arc<FeatureFlagGate>,
    ) -> Self {
        Self {
            config,
            clock,
            accountant,
            classifier,
            metrics_source,
            backends,
            prewarm,
            health_monitor,
            instances: Mutex::new(HashMap::new()),
            records: Mutex::new(HashMap::new()),
            tier_overrides: Mutex::new(HashMap::new()),
            creation_lock: tokio::sync::Mutex::new(()),
            on_created: Mutex::new(Vec::new()),
            on_terminated: Mutex::new(Vec::new()),
            cleanup_handle: Mutex::new(None),
            flags,
        }
    }

    pub fn on_instance_created<F>(&self, callback: F)
    where
        F: Fn(Arc<AgentInstance<C>>) + Send + Sync + 'static,
    {
        self.on_created.lock().push(Arc::new(callback));
    }

    pub fn on_instance_terminated<F>(&self, callback: F)
    where
        F: Fn(InstanceKey) + Send + Sync + 'static,
    {
        self.on_terminated.lock().push(Arc::new(callback));
    }

    pub fn get_instance(&self, key: &InstanceKey) -> Option<Arc<AgentInstance<C>>> {
        self.instances.lock().get(key).cloned()
    }

    pub fn list_instances(&self) -> Vec<InstanceKey> {
        self.instances.lock().keys().cloned().collect()
    }

    pub fn global_usage(&self) -> pool_core::quota::ResourceUsage {
        self.accountant.global_usage()
    }

    fn backend_for(&self, tier: ProjectTier) -> EngineResult<Arc<dyn Backend>> {
        self.backends
            .get(&tier)
            .cloned()
            .ok_or_else(|| EngineError::Backend(BackendError::Other(format!("no backend configured for tier {tier}"))))
    }

    fn tier_flag(tier: ProjectTier) -> &'static str {
        match tier {
            ProjectTier::Hot => "agent_pool_hot_tier",
            ProjectTier::Warm => "agent_pool_warm_tier",
            ProjectTier::Cold => "agent_pool_cold_tier",
        }
    }

    fn resolve_tier(&self, tenant: &str, project: &str, explicit: Option<ProjectTier>) -> ProjectTier {
        if let Some(tier) = explicit {
            return tier;
        }
        if let Some(tier) = self.tier_overrides.lock().get(&(tenant.to_string(), project.to_string())).copied() {
            return tier;
        }
        let metrics = self.metrics_source.project_metrics(tenant, project);
        self.classifier.tier_for(&metrics)
    }

    /// §4.13 `get_or_create_instance`, steps 1-8.
    pub async fn get_or_create_instance(
        &self,
        tenant: &str,
        project: &str,
        mode: &str,
        config_override: Option<ProjectTier>,
    ) -> EngineResult<Arc<AgentInstance<C>>> {
        let key = InstanceKey::new(tenant, project, mode);

        if let Some(instance) = self.take_if_active(&key) {
            return Ok(instance);
        }

        let _creation_guard = self.creation_lock.lock().await;

        // Another task may have created it, or evicted the stale entry,
        // while we waited for the creation lock.
        if let Some(instance) = self.take_if_active(&key) {
            return Ok(instance);
        }

        let tier = self.resolve_tier(tenant, project, config_override);
        if !self.flags.is_enabled(Self::tier_flag(tier), Some(tenant), Some(project), self.clock.epoch_ms()) {
            return Err(EngineError::Pool(PoolError::QuotaExceeded {
                scope: format!("{tenant}:{project}"),
                message: format!("{tier} tier is disabled"),
            }));
        }
        let tier_config = self.config.tier_config(tier);
        let quota = tier_config.default_quota;

        self.accountant.allocate(tenant, project, quota)?;
        let acquired = self.accountant.acquire_instance(tenant, project, quota.memory_request_mb, quota.cpu_request_cores)?;
        if !acquired {
            return Err(EngineError::Pool(PoolError::QuotaExceeded {
                scope: format!("{tenant}:{project}"),
                message: "instance or global capacity exhausted".into(),
            }));
        }

        let backend = match self.backend_for(tier) {
            Ok(backend) => backend,
            Err(err) => {
                self.release(tenant, project, quota);
                return Err(err);
            }
        };

        let agent = match self.prewarm.get_prewarmed(tier) {
            Some((_, agent)) => agent,
            None => {
                let instance_config = InstanceConfig { instance_key: key.clone(), tier, quota };
                match backend.create_instance(instance_config).await {
                    Ok(agent) => agent,
                    Err(err) => {
                        self.release(tenant, project, quota);
                        return Err(err.into());
                    }
                }
            }
        };

        let instance = Arc::new(AgentInstance::new(
            key.clone(),
            agent,
            Arc::clone(&backend),
            quota.max_concurrent_requests,
            self.config.breaker.clone(),
            self.clock.clone(),
        ));

        if let Err(err) = instance.mark_ready() {
            self.release(tenant, project, quota);
            return Err(err);
        }

        self.instances.lock().insert(key.clone(), Arc::clone(&instance));
        self.records.lock().insert(key.clone(), InstanceRecord { tier, quota });
        if self.flags.is_enabled("agent_pool_health_monitor", Some(tenant), Some(project), self.clock.epoch_ms()) {
            self.health_monitor.start_monitoring(Arc::clone(&instance), self.config.health.check_interval);
        }

        for callback in self.on_created.lock().iter() {
            callback(Arc::clone(&instance));
        }

        Ok(instance)
    }

    /// Returns the instance for `key` if present and active; evicts it from
    /// the map (without releasing its allocation — the caller does that as
    /// part of the subsequent recreate) if present but inactive.
    fn take_if_active(&self, key: &InstanceKey) -> Option<Arc<AgentInstance<C>>> {
        let mut instances = self.instances.lock();
        match instances.get(key) {
            Some(instance) if instance.lifecycle().status().is_active() => Some(Arc::clone(instance)),
            Some(_) => {
                instances.remove(key);
                None
            }
            None => None,
        }
    }

    fn release(&self, tenant: &str, project: &str, quota: ResourceQuota) {
        self.accountant.release_instance(tenant, project, quota.memory_request_mb, quota.cpu_request_cores);
    }

    /// §4.13 `terminate_instance`. Idempotent: terminating an unknown key
    /// is not an error.
    pub async fn terminate_instance(&self, tenant: &str, project: &str, mode: &str, graceful: bool) -> EngineResult<()> {
        let key = InstanceKey::new(tenant, project, mode);
        let instance = self.instances.lock().remove(&key);
        let Some(instance) = instance else { return Ok(()) };

        self.health_monitor.stop_monitoring(&key);
        instance.stop(graceful, self.config.health.check_timeout).await?;

        if let Some(record) = self.records.lock().remove(&key) {
            self.release(tenant, project, record.quota);
            if let Ok(backend) = self.backend_for(record.tier) {
                if let Err(err) = backend.destroy_instance(&key, graceful).await {
                    tracing::warn!(%key, error = %err, "backend teardown failed after instance stop");
                }
            }
        }

        for callback in self.on_terminated.lock().iter() {
            callback(key.clone());
        }

        Ok(())
    }

    /// §4.13 `set_project_tier`: records the override; the next
    /// `get_or_create_instance` for this project picks it up. Live
    /// instances are left running.
    pub fn set_project_tier(&self, tenant: &str, project: &str, tier: ProjectTier, _mode: &str) {
        self.tier_overrides.lock().insert((tenant.to_string(), project.to_string()), tier);
    }

    /// Evicts idle-expired `Ready` instances and any instance that reached
    /// a terminal lifecycle state by some path other than
    /// `terminate_instance` (e.g. a health-driven force-terminate).
    pub async fn run_cleanup(&self) {
        let keys: Vec<InstanceKey> = self.instances.lock().keys().cloned().collect();
        for key in keys {
            let Some(instance) = self.instances.lock().get(&key).cloned() else { continue };
            let status = instance.lifecycle().status();

            if status.is_terminal() {
                self.instances.lock().remove(&key);
                if let Some(record) = self.records.lock().remove(&key) {
                    self.release(key.tenant(), key.project(), record.quota);
                }
                continue;
            }

            if status != InstanceStatus::Ready {
                continue;
            }

            let Some(record) = self.records.lock().get(&key).copied() else { continue };
            let idle_ms = self.config.tier_config(record.tier).eviction_idle.as_millis() as u64;
            let idle_for = self.clock.epoch_ms().saturating_sub(instance.last_activity_ms());
            if idle_for > idle_ms {
                let (tenant, project) = key.project_scope();
                if let Err(err) = self.terminate_instance(&tenant, &project, key.mode(), true).await {
                    tracing::warn!(%key, error = %err, "idle eviction failed");
                }
            }
        }
    }

    pub fn start_cleanup_loop(self: &Arc<Self>, interval: Duration) {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                manager.run_cleanup().await;
            }
        });
        if let Some(previous) = self.cleanup_handle.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_cleanup_loop(&self) {
        if let Some(handle) = self.cleanup_handle.lock().take() {
            handle.abort();
        }
    }
}

/// Implements the seam `failure_recovery` drives failures through, so a
/// `FailureRecoveryService` can be wired directly to this pool manager
/// without the two modules depending on each other's concrete types.
#[async_trait]
impl<C: Clock + 'static> RecoveryExecutor for PoolManager<C> {
    async fn restart_instance(&self, key: &InstanceKey) -> EngineResult<()> {
        self.terminate_instance(key.tenant(), key.project(), key.mode(), false).await
    }

    /// Per-failure state recovery is a no-op here: checkpoint replay runs
    /// once, at startup, via the state-recovery service. The `recover`
    /// strategy's subsequent restart is what actually re-creates a clean
    /// instance.
    async fn recover_instance_state(&self, _key: &InstanceKey) -> EngineResult<()> {
        Ok(())
    }

    async fn downgrade_tier(&self, key: &InstanceKey) -> EngineResult<()> {
        let current = self.records.lock().get(key).map(|r| r.tier);
        let target = match current.unwrap_or(ProjectTier::Warm) {
            ProjectTier::Hot => ProjectTier::Warm,
            ProjectTier::Warm | ProjectTier::Cold => ProjectTier::Cold,
        };
        self.set_project_tier(key.tenant(), key.project(), target, key.mode());
        Ok(())
    }
}

/// Lets the state-recovery service snapshot every live instance without
/// depending on `PoolManager`'s concrete type.
impl<C: Clock + 'static> InstanceSource<C> for PoolManager<C> {
    fn active_instances(&self) -> Vec<Arc<AgentInstance<C>>> {
        self.instances.lock().values().filter(|instance| instance.lifecycle().status().is_active()).cloned().collect()
    }
}

#[cfg(test)]
#[path = "pool_manager_tests.rs"]
mod tests;
