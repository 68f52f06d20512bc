use super::*;
use pool_core::clock::FakeClock;
use serde_json::json;

fn key() -> InstanceKey {
    InstanceKey::new("acme", "bot", "prod")
}

#[tokio::test]
async fn create_then_recover_round_trips() {
    let store = InMemoryCheckpointStore::new(10, Duration::from_secs(3600));
    let created = store
        .create_checkpoint(&key(), CheckpointType::Lifecycle, json!({"state": "ready"}), json!({}))
        .await
        .unwrap();

    let recovered = store.recover_instance(&key(), Some(CheckpointType::Lifecycle)).await.unwrap();
    assert_eq!(recovered.unwrap().checkpoint_id, created.checkpoint_id);
}

#[tokio::test]
async fn recover_instance_without_type_picks_newest_across_types() {
    let clock = FakeClock::new();
    let store = InMemoryCheckpointStore::with_clock(clock.clone(), 10, Duration::from_secs(3600));

    store.create_checkpoint(&key(), CheckpointType::Lifecycle, json!({}), json!({})).await.unwrap();
    clock.advance(Duration::from_secs(1));
    let newest =
        store.create_checkpoint(&key(), CheckpointType::Full, json!({}), json!({})).await.unwrap();

    let recovered = store.recover_instance(&key(), None).await.unwrap().unwrap();
    assert_eq!(recovered.checkpoint_id, newest.checkpoint_id);
}

#[tokio::test]
async fn oldest_evicted_past_max_per_instance() {
    let store = InMemoryCheckpointStore::new(2, Duration::from_secs(3600));
    let first = store
        .create_checkpoint(&key(), CheckpointType::Execution, json!({"n": 1}), json!({}))
        .await
        .unwrap();
    store.create_checkpoint(&key(), CheckpointType::Execution, json!({"n": 2}), json!({})).await.unwrap();
    store.create_checkpoint(&key(), CheckpointType::Execution, json!({"n": 3}), json!({})).await.unwrap();

    let stats = store.get_checkpoint_stats().await.unwrap();
    assert_eq!(stats.total_checkpoints, 2);

    let recovered = store.recover_instance(&key(), Some(CheckpointType::Execution)).await.unwrap();
    assert_ne!(recovered.unwrap().checkpoint_id, first.checkpoint_id);
}

#[tokio::test]
async fn expired_checkpoints_are_purged() {
    let clock = FakeClock::new();
    let store = InMemoryCheckpointStore::with_clock(clock.clone(), 10, Duration::from_secs(5));
    store.create_checkpoint(&key(), CheckpointType::Resource, json!({}), json!({})).await.unwrap();
    clock.advance(Duration::from_secs(10));

    let recovered = store.recover_instance(&key(), Some(CheckpointType::Resource)).await.unwrap();
    assert!(recovered.is_none());
}

#[tokio::test]
async fn delete_checkpoints_purges_all_types_for_instance() {
    let store = InMemoryCheckpointStore::new(10, Duration::from_secs(3600));
    store.create_checkpoint(&key(), CheckpointType::Lifecycle, json!({}), json!({})).await.unwrap();
    store.create_checkpoint(&key(), CheckpointType::Full, json!({}), json!({})).await.unwrap();

    store.delete_checkpoints(&key()).await.unwrap();

    let stats = store.get_checkpoint_stats().await.unwrap();
    assert_eq!(stats.total_checkpoints, 0);
}

#[tokio::test]
async fn recover_all_instances_returns_newest_per_instance() {
    let store = InMemoryCheckpointStore::new(10, Duration::from_secs(3600));
    let other = InstanceKey::new("acme", "other", "prod");
    store.create_checkpoint(&key(), CheckpointType::Lifecycle, json!({}), json!({})).await.unwrap();
    store.create_checkpoint(&other, CheckpointType::Lifecycle, json!({}), json!({})).await.unwrap();

    let results = store.recover_all_instances().await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.checkpoint.is_some()));
}
