// SPDX-License-Identifier: MIT

//! `poold`: the process that owns one node's [`Orchestrator`]. Builds the
//! tier backends, the checkpoint store, and the feature-flag gate from the
//! environment, starts the orchestrator's background loops, and blocks
//! until SIGINT/SIGTERM, then drains.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pool_adapters::backend::Backend;
use pool_adapters::container::{ContainerBackend, ContainerConfig};
use pool_adapters::on_demand::{OnDemandBackend, OnDemandConfig};
use pool_adapters::shared_pool::{SharedPoolBackend, SharedPoolConfig};
use pool_core::clock::SystemClock;
use pool_core::config::PoolConfig;
use pool_core::flags::{FeatureFlag, FeatureFlagGate, RolloutStrategy};
use pool_core::tier::{ProjectClassifier, ProjectTier};
use pool_core::ResourceAccountant;
use pool_engine::classification::TierClassifier;
use pool_engine::orchestrator::{Orchestrator, OrchestratorDeps};
use pool_storage::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use pool_storage::redis_store::RedisCheckpointStore;

use pool_daemon::agent_factory::HttpInstanceFactory;
use pool_daemon::alert_log::TracingAlertSink;
use pool_daemon::metrics_source::StaticMetricsSource;
use pool_daemon::{env, logging};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let state_dir = env::state_dir();
    let _log_guard = logging::init(&state_dir, &env::log_filter())?;

    let config = PoolConfig::default();
    let accountant = Arc::new(ResourceAccountant::new(config.global_limits));
    let classifier = Arc::new(TierClassifier::new(
        ProjectClassifier::default(),
        Duration::from_secs(u64::from(config.tier_downgrade_threshold_days) * 86_400),
        Duration::from_secs(u64::from(config.tier_migration_cooldown_days) * 86_400),
        SystemClock,
    ));

    let checkpoint_store: Arc<dyn CheckpointStore> = match env::redis_url() {
        Some(url) => {
            let client = redis::Client::open(url)?;
            Arc::new(RedisCheckpointStore::new(
                client,
                config.redis_key_prefix.clone(),
                config.max_checkpoints_per_instance,
                config.state_ttl.as_secs(),
            ))
        }
        None => Arc::new(InMemoryCheckpointStore::new(config.max_checkpoints_per_instance, config.state_ttl)),
    };

    let flags = Arc::new(FeatureFlagGate::new());
    flags.register(FeatureFlag::new("agent_pool_enabled").enabled(true).strategy(RolloutStrategy::All));

    let backends = build_backends().await?;

    let deps = OrchestratorDeps {
        config,
        clock: SystemClock,
        metrics_source: Arc::new(StaticMetricsSource),
        backends,
        alert_sink: Arc::new(TracingAlertSink),
    };

    let orchestrator = Orchestrator::new(deps, accountant, classifier, checkpoint_store, flags);
    orchestrator.start().await?;
    tracing::info!("agent pool orchestrator started");

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining");

    orchestrator.stop().await;
    tracing::info!("agent pool orchestrator stopped");
    Ok(())
}

async fn build_backends() -> Result<HashMap<ProjectTier, Arc<dyn Backend>>, Box<dyn std::error::Error>> {
    let mut backends: HashMap<ProjectTier, Arc<dyn Backend>> = HashMap::new();

    let kube_client = kube::Client::try_default().await?;
    let runtime = Arc::new(pool_adapters::container::KubeContainerRuntime::new(kube_client, "agent-pool"));
    let container_backend = ContainerBackend::new(ContainerConfig::default(), runtime);
    container_backend.start().await?;
    backends.insert(ProjectTier::Hot, Arc::new(container_backend));

    let factory = Arc::new(HttpInstanceFactory::new(env::agent_addresses()));
    let shared_backend = SharedPoolBackend::new(SharedPoolConfig::default(), factory.clone());
    shared_backend.start().await?;
    backends.insert(ProjectTier::Warm, Arc::new(shared_backend));

    let on_demand_backend = OnDemandBackend::new(OnDemandConfig::default(), factory);
    on_demand_backend.start().await?;
    backends.insert(ProjectTier::Cold, Arc::new(on_demand_backend));

    Ok(backends)
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
