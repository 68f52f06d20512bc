use std::sync::Arc;
use std::time::Duration;

use pool_adapters::fake::FakeAgent;
use pool_core::clock::FakeClock;

use super::*;

fn pool(capacity: usize) -> PrewarmPool<FakeClock> {
    PrewarmPool::new(capacity, FakeClock::new())
}

fn agent() -> Arc<dyn AgentContract> {
    Arc::new(FakeAgent::default())
}

#[test]
fn returns_none_when_empty() {
    let pool = pool(2);
    assert!(pool.get_prewarmed(ProjectTier::Hot).is_none());
    assert_eq!(pool.stats().misses, 1);
}

#[test]
fn prefers_l1_over_l2_and_l3() {
    let pool = pool(2);
    pool.return_instance(ProjectTier::Hot, PrewarmLevel::L3, agent());
    pool.return_instance(ProjectTier::Hot, PrewarmLevel::L2, agent());
    pool.return_instance(ProjectTier::Hot, PrewarmLevel::L1, agent());

    let (level, _) = pool.get_prewarmed(ProjectTier::Hot).unwrap();
    assert_eq!(level, PrewarmLevel::L1);
    assert_eq!(pool.stats().l1_hits, 1);
}

#[test]
fn falls_back_to_l2_then_l3() {
    let pool = pool(2);
    pool.return_instance(ProjectTier::Warm, PrewarmLevel::L2, agent());
    let (level, _) = pool.get_prewarmed(ProjectTier::Warm).unwrap();
    assert_eq!(level, PrewarmLevel::L2);

    pool.return_instance(ProjectTier::Warm, PrewarmLevel::L3, agent());
    let (level, _) = pool.get_prewarmed(ProjectTier::Warm).unwrap();
    assert_eq!(level, PrewarmLevel::L3);
}

#[test]
fn respects_capacity_per_tier() {
    let pool = pool(1);
    assert!(pool.return_instance(ProjectTier::Cold, PrewarmLevel::L1, agent()));
    assert!(!pool.return_instance(ProjectTier::Cold, PrewarmLevel::L1, agent()));
}

#[test]
fn expired_entries_are_skipped_and_counted() {
    let clock = FakeClock::new();
    let pool = PrewarmPool::new(4, clock.clone());
    pool.return_instance(ProjectTier::Hot, PrewarmLevel::L1, agent());
    clock.advance(Duration::from_secs(3601));

    assert!(pool.get_prewarmed(ProjectTier::Hot).is_none());
    assert_eq!(pool.stats().expirations, 1);
}

#[test]
fn evict_expired_sweeps_all_levels() {
    let clock = FakeClock::new();
    let pool = PrewarmPool::new(4, clock.clone());
    pool.return_instance(ProjectTier::Hot, PrewarmLevel::L1, agent());
    pool.return_instance(ProjectTier::Hot, PrewarmLevel::L2, agent());
    clock.advance(Duration::from_secs(7201));

    let evicted = pool.evict_expired();
    assert_eq!(evicted, 2);
}

#[test]
fn tiers_are_isolated() {
    let pool = pool(2);
    pool.return_instance(ProjectTier::Hot, PrewarmLevel::L1, agent());
    assert!(pool.get_prewarmed(ProjectTier::Cold).is_none());
    assert!(pool.get_prewarmed(ProjectTier::Hot).is_some());
}
