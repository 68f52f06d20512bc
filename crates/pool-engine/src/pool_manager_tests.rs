use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pool_adapters::backend::Backend;
use pool_adapters::fake::FakeInstanceFactory;
use pool_adapters::on_demand::{OnDemandBackend, OnDemandConfig};
use pool_adapters::shared_pool::{SharedPoolBackend, SharedPoolConfig};
use pool_core::accountant::GlobalLimits;
use pool_core::clock::FakeClock;
use pool_core::config::{default_tier_configs, PoolConfig};
use pool_core::flags::FeatureFlagGate;
use pool_core::health::HealthMonitorConfig;
use pool_core::tier::ProjectClassifier;
use pool_core::ResourceAccountant;

use super::*;

struct FixedMetricsSource {
    metrics: ProjectMetrics,
}

impl ProjectMetricsSource for FixedMetricsSource {
    fn project_metrics(&self, tenant: &str, project: &str) -> ProjectMetrics {
        ProjectMetrics { tenant_id: tenant.into(), project_id: project.into(), ..self.metrics.clone() }
    }
}

fn cold_metrics() -> ProjectMetrics {
    ProjectMetrics {
        tenant_id: String::new(),
        project_id: String::new(),
        daily_requests: 5,
        subscription_tier: "free".into(),
        sla_requirement: 0.9,
        max_concurrent: 1,
    }
}

fn hot_metrics() -> ProjectMetrics {
    ProjectMetrics {
        tenant_id: String::new(),
        project_id: String::new(),
        daily_requests: 5000,
        subscription_tier: "enterprise".into(),
        sla_requirement: 0.9995,
        max_concurrent: 20,
    }
}

fn backends() -> HashMap<ProjectTier, Arc<dyn Backend>> {
    let mut map: HashMap<ProjectTier, Arc<dyn Backend>> = HashMap::new();
    for tier in [ProjectTier::Hot, ProjectTier::Warm, ProjectTier::Cold] {
        let factory = Arc::new(FakeInstanceFactory::default());
        let backend = OnDemandBackend::with_clock(OnDemandConfig::default(), factory, FakeClock::new());
        map.insert(tier, Arc::new(backend));
    }
    map
}

fn manager_with(config: PoolConfig, metrics: ProjectMetrics, clock: FakeClock) -> PoolManager<FakeClock> {
    manager_with_backends(config, metrics, clock, backends())
}

fn manager_with_backends(
    config: PoolConfig,
    metrics: ProjectMetrics,
    clock: FakeClock,
    backends: HashMap<ProjectTier, Arc<dyn Backend>>,
) -> PoolManager<FakeClock> {
    let accountant = Arc::new(ResourceAccountant::new(config.global_limits));
    let classifier = Arc::new(TierClassifier::new(
        ProjectClassifier::default(),
        Duration::from_secs(7 * 86_400),
        Duration::from_secs(7 * 86_400),
        clock.clone(),
    ));
    let prewarm = Arc::new(PrewarmPool::new(2, clock.clone()));
    let health = Arc::new(HealthMonitor::new(HealthMonitorConfig::default(), clock.clone()));
    PoolManager::new(
        config,
        clock,
        accountant,
        classifier,
        Arc::new(FixedMetricsSource { metrics }),
        backends,
        prewarm,
        health,
        Arc::new(FeatureFlagGate::new()),
    )
}

fn default_manager(clock: FakeClock) -> PoolManager<FakeClock> {
    manager_with(PoolConfig::default(), cold_metrics(), clock)
}

#[tokio::test]
async fn creates_instance_and_reuses_active() {
    let manager = default_manager(FakeClock::new());
    let first = manager.get_or_create_instance("acme", "bot", "prod", None).await.unwrap();
    let second = manager.get_or_create_instance("acme", "bot", "prod", None).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(manager.list_instances().len(), 1);
}

#[tokio::test]
async fn config_override_bypasses_classification() {
    let manager = default_manager(FakeClock::new());
    manager.get_or_create_instance("acme", "bot", "prod", Some(ProjectTier::Hot)).await.unwrap();
    let key = InstanceKey::new("acme", "bot", "prod");
    assert_eq!(manager.records.lock().get(&key).map(|r| r.tier), Some(ProjectTier::Hot));
}

#[tokio::test]
async fn classification_picks_tier_from_metrics() {
    let manager = manager_with(PoolConfig::default(), hot_metrics(), FakeClock::new());
    manager.get_or_create_instance("acme", "bot", "prod", None).await.unwrap();
    let key = InstanceKey::new("acme", "bot", "prod");
    assert_eq!(manager.records.lock().get(&key).map(|r| r.tier), Some(ProjectTier::Hot));
}

#[tokio::test]
async fn terminate_instance_releases_allocation_and_allows_recreate() {
    let manager = default_manager(FakeClock::new());
    manager.get_or_create_instance("acme", "bot", "prod", None).await.unwrap();
    manager.terminate_instance("acme", "bot", "prod", false).await.unwrap();
    assert!(manager.list_instances().is_empty());

    let usage = manager.accountant.usage("acme", "bot").unwrap();
    assert_eq!(usage.active_instances, 0);

    // recreate succeeds now that the allocation was released
    manager.get_or_create_instance("acme", "bot", "prod", None).await.unwrap();
    assert_eq!(manager.list_instances().len(), 1);
}

#[tokio::test]
async fn terminate_unknown_instance_is_a_no_op() {
    let manager = default_manager(FakeClock::new());
    manager.terminate_instance("acme", "ghost", "prod", true).await.unwrap();
}

#[tokio::test]
async fn quota_exhaustion_is_propagated() {
    let mut config = PoolConfig::default();
    config.global_limits = GlobalLimits { max_total_instances: 0, max_total_memory_mb: 32_768, max_total_cpu_cores: 16.0 };
    let manager = manager_with(config, cold_metrics(), FakeClock::new());
    let err = manager.get_or_create_instance("acme", "bot", "prod", None).await.unwrap_err();
    assert!(matches!(err, EngineError::Pool(pool_core::error::PoolError::QuotaExceeded { .. })));
}

#[tokio::test]
async fn restart_instance_terminates_for_next_recreate() {
    let manager = default_manager(FakeClock::new());
    manager.get_or_create_instance("acme", "bot", "prod", None).await.unwrap();
    let key = InstanceKey::new("acme", "bot", "prod");

    manager.restart_instance(&key).await.unwrap();
    assert!(manager.list_instances().is_empty());

    manager.get_or_create_instance("acme", "bot", "prod", None).await.unwrap();
    assert_eq!(manager.list_instances().len(), 1);
}

#[tokio::test]
async fn downgrade_tier_records_override_one_level_down() {
    let manager = default_manager(FakeClock::new());
    manager.get_or_create_instance("acme", "bot", "prod", Some(ProjectTier::Hot)).await.unwrap();
    let key = InstanceKey::new("acme", "bot", "prod");

    manager.downgrade_tier(&key).await.unwrap();
    manager.terminate_instance("acme", "bot", "prod", false).await.unwrap();
    manager.get_or_create_instance("acme", "bot", "prod", None).await.unwrap();

    assert_eq!(manager.records.lock().get(&key).map(|r| r.tier), Some(ProjectTier::Warm));
}

#[tokio::test]
async fn run_cleanup_evicts_instances_idle_past_tier_window() {
    let mut tier_configs = default_tier_configs();
    if let Some(cold) = tier_configs.get_mut(&ProjectTier::Cold) {
        cold.eviction_idle = Duration::from_secs(10);
    }
    let mut config = PoolConfig::default();
    config.tier_configs = tier_configs;

    let clock = FakeClock::new();
    let manager = manager_with(config, cold_metrics(), clock.clone());
    manager.get_or_create_instance("acme", "bot", "prod", None).await.unwrap();
    assert_eq!(manager.list_instances().len(), 1);

    clock.advance(Duration::from_secs(11));
    manager.run_cleanup().await;
    assert!(manager.list_instances().is_empty());
}

/// `execute` must route through the owning `Backend`, not straight to the
/// agent handle, or `SharedPoolBackend`'s LRU bookkeeping never sees real
/// traffic and evicts whichever instance merely happens to be oldest.
#[tokio::test]
async fn shared_pool_eviction_favors_the_instance_that_actually_received_traffic() {
    let clock = FakeClock::new();
    let shared = Arc::new(SharedPoolBackend::with_clock(
        SharedPoolConfig { pool_size: 2, eviction_policy: pool_core::config::EvictionPolicy::Lru },
        Arc::new(FakeInstanceFactory::default()),
        clock.clone(),
    ));

    let mut map: HashMap<ProjectTier, Arc<dyn Backend>> = HashMap::new();
    map.insert(ProjectTier::Warm, Arc::clone(&shared) as Arc<dyn Backend>);
    map.insert(ProjectTier::Hot, Arc::new(OnDemandBackend::with_clock(
        OnDemandConfig::default(),
        Arc::new(FakeInstanceFactory::default()),
        clock.clone(),
    )));
    map.insert(ProjectTier::Cold, Arc::new(OnDemandBackend::with_clock(
        OnDemandConfig::default(),
        Arc::new(FakeInstanceFactory::default()),
        clock.clone(),
    )));

    let manager = manager_with_backends(PoolConfig::default(), cold_metrics(), clock.clone(), map);

    let older = manager.get_or_create_instance("acme", "older", "prod", Some(ProjectTier::Warm)).await.unwrap();
    clock.advance(Duration::from_secs(1));
    let busy = manager.get_or_create_instance("acme", "busy", "prod", Some(ProjectTier::Warm)).await.unwrap();

    // Exercise real traffic on `busy` so its backend slot's `last_used_at`
    // moves ahead of `older`'s, which only ever saw creation.
    clock.advance(Duration::from_secs(1));
    busy.execute("conv", "hi", serde_json::json!({})).await.unwrap();

    clock.advance(Duration::from_secs(1));
    manager.get_or_create_instance("acme", "third", "prod", Some(ProjectTier::Warm)).await.unwrap();

    let live = shared.list_instances();
    assert!(live.contains(&InstanceKey::new("acme", "busy", "prod")), "busy instance should survive eviction");
    assert!(!live.contains(&InstanceKey::new("acme", "older", "prod")), "older, unused instance should be evicted");
    let _ = older;
}
