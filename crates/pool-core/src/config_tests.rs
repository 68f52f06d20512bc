use super::*;

#[test]
fn default_tier_configs_cover_all_three_tiers() {
    let tiers = default_tier_configs();
    assert!(tiers.contains_key(&ProjectTier::Hot));
    assert!(tiers.contains_key(&ProjectTier::Warm));
    assert!(tiers.contains_key(&ProjectTier::Cold));
}

#[test]
fn hot_tier_has_richer_quota_than_cold() {
    let tiers = default_tier_configs();
    let hot = &tiers[&ProjectTier::Hot];
    let cold = &tiers[&ProjectTier::Cold];
    assert!(hot.default_quota.memory_limit_mb > cold.default_quota.memory_limit_mb);
    assert!(hot.default_quota.max_concurrent_requests > cold.default_quota.max_concurrent_requests);
}

#[test]
fn hot_tier_keeps_at_least_one_warm_instance() {
    let tiers = default_tier_configs();
    assert_eq!(tiers[&ProjectTier::Hot].min_instances, 1);
    assert_eq!(tiers[&ProjectTier::Cold].min_instances, 0);
}

#[test]
fn pool_config_default_tier_lookup_returns_matching_tier() {
    let config = PoolConfig::default();
    assert_eq!(config.tier_config(ProjectTier::Hot).tier, ProjectTier::Hot);
    assert_eq!(config.tier_config(ProjectTier::Cold).tier, ProjectTier::Cold);
}

#[test]
fn pool_config_tier_lookup_falls_back_to_warm_when_missing() {
    let mut config = PoolConfig::default();
    config.tier_configs.remove(&ProjectTier::Hot);
    assert_eq!(config.tier_config(ProjectTier::Hot).tier, ProjectTier::Warm);
}

#[test]
fn scaling_policy_defaults_match_spec_thresholds() {
    let policy = ScalingPolicy::default();
    assert_eq!(policy.cpu_up, 0.8);
    assert_eq!(policy.cpu_down, 0.3);
    assert_eq!(policy.evaluation_periods, 3);
}
