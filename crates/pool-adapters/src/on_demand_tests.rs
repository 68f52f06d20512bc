use std::sync::Arc;
use std::time::Duration;

use pool_core::clock::FakeClock;
use pool_core::tier::ProjectTier;

use super::*;
use crate::fake::FakeInstanceFactory;

fn config(key: &str) -> InstanceConfig {
    InstanceConfig {
        instance_key: InstanceKey::parse(key).unwrap(),
        tier: ProjectTier::Cold,
        quota: pool_core::quota::ResourceQuota::default(),
    }
}

#[tokio::test]
async fn creates_and_retrieves_an_instance() {
    let backend = OnDemandBackend::new(OnDemandConfig::default(), Arc::new(FakeInstanceFactory::default()));
    backend.create_instance(config("acme:bot:prod")).await.unwrap();

    let key = InstanceKey::parse("acme:bot:prod").unwrap();
    assert!(backend.get_instance(&key).is_some());
    assert_eq!(backend.list_instances().len(), 1);
}

#[tokio::test]
async fn rejects_beyond_max_instances_with_no_idle_to_evict() {
    let cfg = OnDemandConfig { max_instances: 1, ..OnDemandConfig::default() };
    let backend = OnDemandBackend::new(cfg, Arc::new(FakeInstanceFactory::default()));
    backend.create_instance(config("acme:bot:a")).await.unwrap();

    let err = backend.create_instance(config("acme:bot:b")).await.unwrap_err();
    assert!(matches!(err, BackendError::MaxInstances { max: 1 }));
}

#[tokio::test]
async fn evicts_idle_instance_to_make_room() {
    let clock = FakeClock::new();
    let cfg = OnDemandConfig {
        max_instances: 1,
        idle_timeout: Duration::from_secs(10),
        ..OnDemandConfig::default()
    };
    let backend =
        OnDemandBackend::with_clock(cfg, Arc::new(FakeInstanceFactory::default()), clock.clone());
    backend.create_instance(config("acme:bot:a")).await.unwrap();

    clock.advance(Duration::from_secs(20));
    backend.create_instance(config("acme:bot:b")).await.unwrap();

    assert_eq!(backend.list_instances().len(), 1);
    assert!(backend.get_instance(&InstanceKey::parse("acme:bot:b").unwrap()).is_some());
}

#[tokio::test]
async fn evict_idle_removes_all_expired() {
    let clock = FakeClock::new();
    let cfg = OnDemandConfig {
        max_instances: 5,
        idle_timeout: Duration::from_secs(10),
        ..OnDemandConfig::default()
    };
    let backend =
        OnDemandBackend::with_clock(cfg, Arc::new(FakeInstanceFactory::default()), clock.clone());
    backend.create_instance(config("acme:bot:a")).await.unwrap();
    backend.create_instance(config("acme:bot:b")).await.unwrap();

    clock.advance(Duration::from_secs(20));
    let evicted = backend.evict_idle().await;
    assert_eq!(evicted, 2);
    assert!(backend.list_instances().is_empty());
}

#[tokio::test]
async fn creation_failure_surfaces_as_backend_error() {
    let backend = OnDemandBackend::new(OnDemandConfig::default(), Arc::new(FakeInstanceFactory::always_fail()));
    let err = backend.create_instance(config("acme:bot:prod")).await.unwrap_err();
    assert!(matches!(err, BackendError::Other(_)));
}

#[tokio::test]
async fn destroy_instance_removes_it_from_the_map() {
    let backend = OnDemandBackend::new(OnDemandConfig::default(), Arc::new(FakeInstanceFactory::default()));
    let key = InstanceKey::parse("acme:bot:prod").unwrap();
    backend.create_instance(config("acme:bot:prod")).await.unwrap();

    backend.destroy_instance(&key, true).await.unwrap();
    assert!(backend.get_instance(&key).is_none());
}
