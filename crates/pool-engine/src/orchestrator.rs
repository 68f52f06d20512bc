// SPDX-License-Identifier: MIT

//! Orchestrator (§4.14): wires every other `§4.x` service into one
//! lifecycle, in the dependency order the spec lays out — metrics,
//! state-recovery, pool manager, checkpoint replay, health monitor,
//! failure-recovery, auto-scaler, then the background loops — and tears
//! them down in reverse, with a final checkpoint pass before the pool
//! manager goes away.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use pool_adapters::backend::Backend;
use pool_core::clock::{Clock, SystemClock};
use pool_core::config::PoolConfig;
use pool_core::flags::FeatureFlagGate;
use pool_core::health::HealthCheckResult;
use pool_core::key::InstanceKey;
use pool_core::lifecycle::{InstanceStatus, Trigger};
use pool_core::quota::ResourceUsage;
use pool_core::tier::ProjectTier;
use pool_core::ResourceAccountant;
use pool_wire::alert::{Alert, AlertSendError, AlertSink};
use pool_wire::metrics_export::{InstanceSnapshot, MetricsExporter};

use crate::autoscaler::AutoScaler;
use crate::classification::TierClassifier;
use crate::error::{EngineError, EngineResult};
use crate::failure_recovery::{FailureRecoveryConfig, FailureRecoveryService, FailureType};
use crate::health_monitor::HealthMonitor;
use crate::instance::AgentInstance;
use crate::pool_manager::{PoolManager, ProjectMetricsSource};
use crate::prewarm::PrewarmPool;
use crate::state_recovery::{InstanceSource, StateRecoveryService};

/// Lets the orchestrator hot-swap where escalation alerts go (`set_alert_service`)
/// without reaching into `FailureRecoveryService`, whose `alert_sink` is fixed
/// at construction.
struct SwappableAlertSink {
    inner: RwLock<Arc<dyn AlertSink>>,
}

impl SwappableAlertSink {
    fn new(initial: Arc<dyn AlertSink>) -> Self {
        Self { inner: RwLock::new(initial) }
    }

    fn swap(&self, next: Arc<dyn AlertSink>) {
        *self.inner.write() = next;
    }
}

#[async_trait]
impl AlertSink for SwappableAlertSink {
    async fn send_alert(&self, alert: &Alert) -> Result<(), AlertSendError> {
        let sink = self.inner.read().clone();
        sink.send_alert(alert).await
    }
}

/// One instance's status as reported by [`Orchestrator::get_status`].
#[derive(Debug, Clone)]
pub struct InstanceStatusSnapshot {
    pub instance_key: InstanceKey,
    pub status: InstanceStatus,
    pub active_requests: u32,
    pub last_activity_ms: u64,
}

/// §4.14 `get_status`: a point-in-time view of every live instance plus
/// global resource usage.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub instances: Vec<InstanceStatusSnapshot>,
    pub global_usage: ResourceUsage,
    pub scale_up_events: u64,
    pub scale_down_events: u64,
}

/// Everything the orchestrator needs to build its services that isn't
/// already expressed by `PoolConfig` — the pieces only the caller can
/// supply (tenancy-aware usage data, per-tier backends, where alerts go).
pub struct OrchestratorDeps<C: Clock> {
    pub config: PoolConfig,
    pub clock: C,
    pub metrics_source: Arc<dyn ProjectMetricsSource>,
    pub backends: HashMap<ProjectTier, Arc<dyn Backend>>,
    pub alert_sink: Arc<dyn AlertSink>,
}

/// §4.14: owns the full set of pool services and their background loops.
pub struct Orchestrator<C: Clock + 'static = SystemClock> {
    config: PoolConfig,
    pool_manager: Arc<PoolManager<C>>,
    health_monitor: Arc<HealthMonitor<C>>,
    failure_recovery: Arc<FailureRecoveryService<C>>,
    autoscaler: Arc<AutoScaler<C>>,
    state_recovery: Arc<StateRecoveryService>,
    prewarm: Arc<PrewarmPool<C>>,
    flags: Arc<FeatureFlagGate>,
    metrics: MetricsExporter,
    alert_sink: Arc<SwappableAlertSink>,
    scale_up_events: Arc<AtomicU64>,
    scale_down_events: Arc<AtomicU64>,
    prewarm_loop: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<C: Clock + 'static> Orchestrator<C> {
    /// Wires services in the order §4.14 describes: classifier and
    /// accountant come from `deps`/`config`; prewarm, state-recovery, and
    /// health monitor are built next since the pool manager depends on
    /// them; the pool manager itself is built, then failure-recovery (which
    /// depends on the pool manager as its [`crate::failure_recovery::RecoveryExecutor`]),
    /// then the auto-scaler. Nothing is started yet — call [`Self::start`].
    pub fn new(
        deps: OrchestratorDeps<C>,
        accountant: Arc<ResourceAccountant>,
        classifier: Arc<TierClassifier<C>>,
        checkpoint_store: Arc<dyn pool_storage::checkpoint::CheckpointStore>,
        flags: Arc<FeatureFlagGate>,
    ) -> Arc<Self> {
        let OrchestratorDeps { config, clock, metrics_source, backends, alert_sink } = deps;

        let prewarm = Arc::new(PrewarmPool::new(config.prewarm_pool_size, clock.clone()));
        let state_recovery = Arc::new(StateRecoveryService::new(checkpoint_store));
        let health_monitor = Arc::new(HealthMonitor::new(config.health.clone(), clock.clone()));

        let pool_manager = Arc::new(PoolManager::new(
            config.clone(),
            clock.clone(),
            accountant,
            classifier,
            metrics_source,
            backends,
            Arc::clone(&prewarm),
            Arc::clone(&health_monitor),
            Arc::clone(&flags),
        ));

        let swappable_sink = Arc::new(SwappableAlertSink::new(alert_sink));
        let failure_recovery = Arc::new(FailureRecoveryService::new(
            FailureRecoveryConfig::default(),
            clock.clone(),
            Arc::clone(&pool_manager) as Arc<dyn crate::failure_recovery::RecoveryExecutor>,
            Arc::clone(&swappable_sink) as Arc<dyn AlertSink>,
        ));

        health_monitor.on_unhealthy({
            let failure_recovery = Arc::clone(&failure_recovery);
            let flags = Arc::clone(&flags);
            move |key, result: HealthCheckResult| {
                if !flags.is_enabled("agent_pool_failure_recovery", Some(key.tenant()), Some(key.project()), 0) {
                    return;
                }
                failure_recovery.report_failure(
                    key,
                    FailureType::HealthCheckFailed,
                    result.error_message.clone(),
                    serde_json::json!({ "error_rate": result.error_rate }),
                    true,
                );
            }
        });

        let autoscaler = Arc::new(AutoScaler::new(config.scaling.clone(), clock.clone()));

        let scale_up_events = Arc::new(AtomicU64::new(0));
        let scale_down_events = Arc::new(AtomicU64::new(0));
        autoscaler.on_event({
            let scale_up_events = Arc::clone(&scale_up_events);
            let scale_down_events = Arc::clone(&scale_down_events);
            move |event| match event.direction {
                crate::autoscaler::ScalingDirection::Up => {
                    scale_up_events.fetch_add(1, Ordering::Relaxed);
                }
                crate::autoscaler::ScalingDirection::Down => {
                    scale_down_events.fetch_add(1, Ordering::Relaxed);
                }
                crate::autoscaler::ScalingDirection::None => {}
            }
        });

        Arc::new(Self {
            metrics: MetricsExporter::new(config.metrics_namespace.clone()),
            config,
            pool_manager,
            health_monitor,
            failure_recovery,
            autoscaler,
            state_recovery,
            prewarm,
            flags,
            alert_sink: swappable_sink,
            scale_up_events,
            scale_down_events,
            prewarm_loop: parking_lot::Mutex::new(None),
        })
    }

    /// §4.14 startup sequence: replay checkpoints (logged, not yet
    /// attached to any instance — that happens lazily on next access), then
    /// start the pool manager's cleanup loop, the state-recovery checkpoint
    /// loop, the auto-scaler evaluation loop, and prewarm maintenance.
    pub async fn start(self: &Arc<Self>) -> EngineResult<()> {
        let state_recovery_enabled = self.flags.is_enabled("agent_pool_state_recovery", None, None, 0);
        if state_recovery_enabled {
            match self.state_recovery.recover_all().await {
                Ok(results) => tracing::info!(recovered = results.len(), "checkpoint replay complete"),
                Err(err) => tracing::warn!(error = %err, "checkpoint replay failed"),
            }
        }

        self.pool_manager.start_cleanup_loop(self.config.cleanup_interval);
        if state_recovery_enabled {
            self.state_recovery.start_background_loop(
                Arc::clone(&self.pool_manager) as Arc<dyn InstanceSource<C>>,
                self.config.checkpoint_interval,
            );
        }
        if self.flags.is_enabled("agent_pool_auto_scaling", None, None, 0) {
            self.autoscaler.start_background_loop(self.config.scaling_evaluation_interval);
        }

        let prewarm = Arc::clone(&self.prewarm);
        let interval = self.config.prewarm_interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                prewarm.evict_expired();
            }
        });
        if let Some(previous) = self.prewarm_loop.lock().replace(handle) {
            previous.abort();
        }

        Ok(())
    }

    /// §4.14 shutdown sequence: stop every background loop first so nothing
    /// schedules new work, checkpoint every still-active instance, then
    /// gracefully terminate them, then release the health monitor's tasks.
    pub async fn stop(self: &Arc<Self>) {
        if let Some(handle) = self.prewarm_loop.lock().take() {
            handle.abort();
        }
        self.autoscaler.stop_background_loop();
        self.state_recovery.stop_background_loop();
        self.pool_manager.stop_cleanup_loop();

        self.state_recovery.checkpoint_final(self.pool_manager.as_ref() as &dyn InstanceSource<C>).await;

        for key in self.pool_manager.list_instances() {
            let (tenant, project) = key.project_scope();
            if let Err(err) = self.pool_manager.terminate_instance(&tenant, &project, key.mode(), true).await {
                tracing::warn!(%key, error = %err, "graceful shutdown failed to terminate instance");
            }
        }

        self.health_monitor.stop_all();
    }

    /// §4.13 `get_or_create_instance`, gated by the `agent_pool_enabled`
    /// feature flag (§7): disabled tenants fall straight to an error rather
    /// than reaching the pool manager at all.
    pub async fn get_instance(
        &self,
        tenant: &str,
        project: &str,
        mode: &str,
        now_ms: u64,
    ) -> EngineResult<Arc<AgentInstance<C>>> {
        if !self.flags.is_enabled("agent_pool_enabled", Some(tenant), Some(project), now_ms) {
            return Err(EngineError::ClassificationUnavailable { tenant: tenant.to_string(), project: project.to_string() });
        }
        self.pool_manager.get_or_create_instance(tenant, project, mode, None).await
    }

    /// §4.14 `terminate_instance`: a final checkpoint of this one instance,
    /// then the usual pool-manager teardown.
    pub async fn terminate_instance(&self, tenant: &str, project: &str, mode: &str, graceful: bool) -> EngineResult<()> {
        let key = InstanceKey::new(tenant, project, mode);
        if let Some(instance) = self.pool_manager.get_instance(&key) {
            if let Err(err) = self.state_recovery.checkpoint_instance(&instance).await {
                tracing::warn!(%key, error = %err, "pre-terminate checkpoint failed");
            }
        }
        self.pool_manager.terminate_instance(tenant, project, mode, graceful).await
    }

    /// Drives the instance's lifecycle directly into `Paused`, skipping
    /// admission of new requests without tearing the instance down.
    pub fn pause_instance(&self, tenant: &str, project: &str, mode: &str) -> EngineResult<()> {
        let key = InstanceKey::new(tenant, project, mode);
        let instance = self.pool_manager.get_instance(&key).ok_or_else(|| EngineError::InstanceNotActive(key))?;
        instance.lifecycle().transition(Trigger::Pause, Some("paused by operator".into()), None)?;
        Ok(())
    }

    pub fn resume_instance(&self, tenant: &str, project: &str, mode: &str) -> EngineResult<()> {
        let key = InstanceKey::new(tenant, project, mode);
        let instance = self.pool_manager.get_instance(&key).ok_or_else(|| EngineError::InstanceNotActive(key))?;
        instance.lifecycle().transition(Trigger::Resume, None, None)?;
        Ok(())
    }

    pub fn set_project_tier(&self, tenant: &str, project: &str, tier: ProjectTier, mode: &str) {
        self.pool_manager.set_project_tier(tenant, project, tier, mode);
    }

    /// §4.14 `set_alert_service`: redirects where `failure_recovery`'s
    /// escalation alerts land, without touching the service itself.
    pub fn set_alert_service(&self, sink: Arc<dyn AlertSink>) {
        self.alert_sink.swap(sink);
    }

    pub fn failure_events_for(&self, tenant: &str, project: &str, mode: &str) -> Vec<crate::failure_recovery::FailureEvent> {
        self.failure_recovery.events_for(&InstanceKey::new(tenant, project, mode))
    }

    /// §4.14 `get_status`: lifecycle snapshot per live instance plus global
    /// resource usage and cumulative scaling counts.
    pub fn get_status(&self) -> PoolStatus {
        let instances = self
            .pool_manager
            .list_instances()
            .into_iter()
            .filter_map(|key| self.pool_manager.get_instance(&key))
            .map(|instance| InstanceStatusSnapshot {
                instance_key: instance.instance_key.clone(),
                status: instance.lifecycle().status(),
                active_requests: instance.active_requests(),
                last_activity_ms: instance.last_activity_ms(),
            })
            .collect();

        PoolStatus {
            instances,
            global_usage: self.accountant_usage(),
            scale_up_events: self.scale_up_events.load(Ordering::Relaxed),
            scale_down_events: self.scale_down_events.load(Ordering::Relaxed),
        }
    }

    fn accountant_usage(&self) -> ResourceUsage {
        self.pool_manager.global_usage()
    }

    /// Renders the full Prometheus text exposition: per-instance families
    /// plus the orchestrator's own scaling-event counters.
    pub fn render_metrics(&self, snapshots: &[InstanceSnapshot]) -> String {
        let mut out = self.metrics.render(snapshots);
        out.push_str(&self.metrics.render_global_counter(
            "scale_up_events_total",
            "Cumulative auto-scaler scale-up decisions",
            self.scale_up_events.load(Ordering::Relaxed),
        ));
        out.push_str(&self.metrics.render_global_counter(
            "scale_down_events_total",
            "Cumulative auto-scaler scale-down decisions",
            self.scale_down_events.load(Ordering::Relaxed),
        ));
        out.push_str(&self.metrics.render_global_histogram(
            "state_recovery_duration_ms",
            "Wall-clock duration of the most recent checkpoint-recovery attempt",
            self.state_recovery.last_recovery_time_ms(),
        ));
        out
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
