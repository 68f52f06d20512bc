// SPDX-License-Identifier: MIT

//! Aggregate pool configuration (§6). There is deliberately no file/env
//! loader here — `PoolConfig` is built programmatically by the embedding
//! binary (`pool-daemon`), the same way `oj-daemon` built its runtime
//! config from CLI flags rather than a format this crate would need to
//! parse.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::accountant::GlobalLimits;
use crate::breaker::CircuitBreakerConfig;
use crate::health::HealthMonitorConfig;
use crate::quota::ResourceQuota;
use crate::tier::{ClassificationConfig, ProjectTier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    Lru,
    Lfu,
    Fifo,
}

crate::simple_display! {
    EvictionPolicy {
        Lru => "lru",
        Lfu => "lfu",
        Fifo => "fifo",
    }
}

#[derive(Debug, Clone)]
pub struct TierConfig {
    pub tier: ProjectTier,
    pub default_quota: ResourceQuota,
    pub min_instances: u32,
    pub max_instances: u32,
    pub eviction_policy: EvictionPolicy,
    pub eviction_idle: Duration,
}

pub fn default_tier_configs() -> HashMap<ProjectTier, TierConfig> {
    let mut map = HashMap::new();
    map.insert(
        ProjectTier::Hot,
        TierConfig {
            tier: ProjectTier::Hot,
            default_quota: ResourceQuota::default()
                .memory_limit_mb(2048)
                .memory_request_mb(1024)
                .cpu_limit_cores(2.0)
                .cpu_request_cores(1.0)
                .max_instances(4)
                .max_concurrent_requests(50),
            min_instances: 1,
            max_instances: 4,
            eviction_policy: EvictionPolicy::Lru,
            eviction_idle: Duration::from_secs(7200),
        },
    );
    map.insert(
        ProjectTier::Warm,
        TierConfig {
            tier: ProjectTier::Warm,
            default_quota: ResourceQuota::default()
                .memory_limit_mb(512)
                .memory_request_mb(256)
                .cpu_limit_cores(0.5)
                .cpu_request_cores(0.25)
                .max_instances(2)
                .max_concurrent_requests(10),
            min_instances: 0,
            max_instances: 2,
            eviction_policy: EvictionPolicy::Lru,
            eviction_idle: Duration::from_secs(1800),
        },
    );
    map.insert(
        ProjectTier::Cold,
        TierConfig {
            tier: ProjectTier::Cold,
            default_quota: ResourceQuota::default()
                .memory_limit_mb(256)
                .memory_request_mb(128)
                .cpu_limit_cores(0.25)
                .cpu_request_cores(0.1)
                .max_instances(1)
                .max_concurrent_requests(3),
            min_instances: 0,
            max_instances: 1,
            eviction_policy: EvictionPolicy::Lru,
            eviction_idle: Duration::from_secs(300),
        },
    );
    map
}

/// Per-instance auto-scaling thresholds (§4.11).
#[derive(Debug, Clone)]
pub struct ScalingPolicy {
    pub cpu_up: f64,
    pub cpu_down: f64,
    pub memory_up: f64,
    pub memory_down: f64,
    pub queue_up: f64,
    pub queue_down: f64,
    pub latency_up_ms: f64,
    pub latency_down_ms: f64,
    pub scale_up_cooldown: Duration,
    pub scale_down_cooldown: Duration,
    pub evaluation_periods: usize,
    pub min_instances: u32,
    pub max_instances: u32,
    pub scale_up_increment: u32,
    pub scale_down_increment: u32,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            cpu_up: 0.8,
            cpu_down: 0.3,
            memory_up: 0.85,
            memory_down: 0.4,
            queue_up: 100.0,
            queue_down: 10.0,
            latency_up_ms: 5000.0,
            latency_down_ms: 500.0,
            scale_up_cooldown: Duration::from_secs(60),
            scale_down_cooldown: Duration::from_secs(300),
            evaluation_periods: 3,
            min_instances: 0,
            max_instances: 10,
            scale_up_increment: 1,
            scale_down_increment: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub tier_configs: HashMap<ProjectTier, TierConfig>,
    pub global_limits: GlobalLimits,
    pub classification: ClassificationConfig,
    pub health: HealthMonitorConfig,
    pub breaker: CircuitBreakerConfig,
    pub scaling: ScalingPolicy,
    pub scaling_evaluation_interval: Duration,

    pub prewarm_pool_size: usize,
    pub prewarm_interval: Duration,

    pub tier_upgrade_threshold_days: u32,
    pub tier_downgrade_threshold_days: u32,
    pub tier_migration_cooldown_days: u32,

    pub cleanup_interval: Duration,
    pub terminated_instance_retention: Duration,

    pub redis_key_prefix: String,
    pub state_ttl: Duration,
    pub max_checkpoints_per_instance: usize,
    pub checkpoint_interval: Duration,

    pub metrics_namespace: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            tier_configs: default_tier_configs(),
            global_limits: GlobalLimits::default(),
            classification: ClassificationConfig::default(),
            health: HealthMonitorConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            scaling: ScalingPolicy::default(),
            scaling_evaluation_interval: Duration::from_secs(30),
            prewarm_pool_size: 5,
            prewarm_interval: Duration::from_secs(60),
            tier_upgrade_threshold_days: 3,
            tier_downgrade_threshold_days: 7,
            tier_migration_cooldown_days: 7,
            cleanup_interval: Duration::from_secs(300),
            terminated_instance_retention: Duration::from_secs(3600),
            redis_key_prefix: "agent_pool:".into(),
            state_ttl: Duration::from_secs(86_400),
            max_checkpoints_per_instance: 10,
            checkpoint_interval: Duration::from_secs(60),
            metrics_namespace: "memstack_agent_pool".into(),
        }
    }
}

impl PoolConfig {
    /// Falls back to the warm tier's config, and finally to a hardcoded
    /// warm default, if the caller's `tier_configs` map was built without
    /// an entry for `tier` (or for warm itself).
    pub fn tier_config(&self, tier: ProjectTier) -> TierConfig {
        self.tier_configs
            .get(&tier)
            .or_else(|| self.tier_configs.get(&ProjectTier::Warm))
            .cloned()
            .unwrap_or_else(|| {
                default_tier_configs().remove(&ProjectTier::Warm).unwrap_or(TierConfig {
                    tier: ProjectTier::Warm,
                    default_quota: ResourceQuota::default(),
                    min_instances: 0,
                    max_instances: 2,
                    eviction_policy: EvictionPolicy::Lru,
                    eviction_idle: Duration::from_secs(1800),
                })
            })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
