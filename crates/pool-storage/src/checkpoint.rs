// SPDX-License-Identifier: MIT

//! Checkpoint persistence (§4.9 "State-recovery service"). Checkpoints are
//! stored as a newest-first list per `checkpoint:{instance_key}:{type}` key,
//! capped at `max_checkpoints_per_instance` and subject to a TTL. Redis is
//! the primary store when configured ([`redis_store`], behind the
//! `redis-backend` feature); [`InMemoryCheckpointStore`] implements the same
//! semantics as an in-process fallback.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pool_core::clock::{Clock, SystemClock};
use pool_core::define_id;
use pool_core::key::InstanceKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

define_id! {
    /// Identifies one stored checkpoint.
    pub struct CheckpointId("chk-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointType {
    Lifecycle,
    Conversation,
    Execution,
    Resource,
    Full,
}

pool_core::simple_display! {
    CheckpointType {
        Lifecycle => "lifecycle",
        Conversation => "conversation",
        Execution => "execution",
        Resource => "resource",
        Full => "full",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: CheckpointId,
    pub instance_key: InstanceKey,
    #[serde(rename = "type")]
    pub checkpoint_type: CheckpointType,
    pub timestamp_ms: u64,
    pub state_data: Value,
    pub metadata: Value,
}

#[derive(Debug, Clone)]
pub struct RecoveryResult {
    pub instance_key: InstanceKey,
    pub checkpoint: Option<Checkpoint>,
    /// Wall-clock duration of the recovery attempt that produced this
    /// result, filled in by the caller (the store itself has no sense of
    /// "attempt" boundaries, only individual reads).
    pub recovery_time_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointStats {
    pub total_checkpoints: usize,
    pub instances_tracked: usize,
}

#[derive(Debug, Error)]
pub enum CheckpointStoreError {
    #[error("checkpoint store backend error: {0}")]
    Backend(String),
}

pub type CheckpointResult<T> = Result<T, CheckpointStoreError>;

/// What the state-recovery service speaks to, independent of whether
/// checkpoints actually live in Redis or in-process.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn create_checkpoint(
        &self,
        instance_key: &InstanceKey,
        checkpoint_type: CheckpointType,
        state_data: Value,
        metadata: Value,
    ) -> CheckpointResult<Checkpoint>;

    /// Newest checkpoint of `checkpoint_type`, or across all types by
    /// timestamp when `checkpoint_type` is `None`.
    async fn recover_instance(
        &self,
        instance_key: &InstanceKey,
        checkpoint_type: Option<CheckpointType>,
    ) -> CheckpointResult<Option<Checkpoint>>;

    async fn recover_all_instances(&self) -> CheckpointResult<Vec<RecoveryResult>>;

    async fn delete_checkpoints(&self, instance_key: &InstanceKey) -> CheckpointResult<()>;

    async fn get_checkpoint_stats(&self) -> CheckpointResult<CheckpointStats>;
}

struct StoredEntry {
    checkpoint: Checkpoint,
    expires_at_ms: u64,
}

/// In-process fallback checkpoint store, keyed `(instance_key, type)` →
/// newest-first `Vec<StoredEntry>`, guarded by a single mutex in keeping
/// with the rest of this crate's "one lock over the whole ledger" style.
pub struct InMemoryCheckpointStore<C: Clock = SystemClock> {
    clock: C,
    max_per_instance: usize,
    ttl: Duration,
    lists: Mutex<HashMap<(InstanceKey, CheckpointType), Vec<StoredEntry>>>,
}

impl InMemoryCheckpointStore<SystemClock> {
    pub fn new(max_per_instance: usize, ttl: Duration) -> Self {
        Self::with_clock(SystemClock, max_per_instance, ttl)
    }
}

impl<C: Clock> InMemoryCheckpointStore<C> {
    pub fn with_clock(clock: C, max_per_instance: usize, ttl: Duration) -> Self {
        Self { clock, max_per_instance, ttl, lists: Mutex::new(HashMap::new()) }
    }

    fn purge_expired(&self, lists: &mut HashMap<(InstanceKey, CheckpointType), Vec<StoredEntry>>) {
        let now = self.clock.epoch_ms();
        for entries in lists.values_mut() {
            entries.retain(|e| e.expires_at_ms > now);
        }
    }
}

#[async_trait]
impl<C: Clock> CheckpointStore for InMemoryCheckpointStore<C> {
    async fn create_checkpoint(
        &self,
        instance_key: &InstanceKey,
        checkpoint_type: CheckpointType,
        state_data: Value,
        metadata: Value,
    ) -> CheckpointResult<Checkpoint> {
        let now = self.clock.epoch_ms();
        let checkpoint = Checkpoint {
            checkpoint_id: CheckpointId::new(),
            instance_key: instance_key.clone(),
            checkpoint_type,
            timestamp_ms: now,
            state_data,
            metadata,
        };

        let mut lists = self.lists.lock();
        self.purge_expired(&mut lists);
        let entries = lists.entry((instance_key.clone(), checkpoint_type)).or_default();
        entries.insert(0, StoredEntry {
            checkpoint: checkpoint.clone(),
            expires_at_ms: now + self.ttl.as_millis() as u64,
        });
        entries.truncate(self.max_per_instance);
        Ok(checkpoint)
    }

    async fn recover_instance(
        &self,
        instance_key: &InstanceKey,
        checkpoint_type: Option<CheckpointType>,
    ) -> CheckpointResult<Option<Checkpoint>> {
        let mut lists = self.lists.lock();
        self.purge_expired(&mut lists);

        let newest = match checkpoint_type {
            Some(t) => lists.get(&(instance_key.clone(), t)).and_then(|v| v.first()).cloned(),
            None => {
                let types = [
                    CheckpointType::Lifecycle,
                    CheckpointType::Conversation,
                    CheckpointType::Execution,
                    CheckpointType::Resource,
                    CheckpointType::Full,
                ];
                types
                    .into_iter()
                    .filter_map(|t| lists.get(&(instance_key.clone(), t)).and_then(|v| v.first()))
                    .max_by_key(|e| e.timestamp_ms)
                    .cloned()
            }
        };
        Ok(newest.map(|e| e.checkpoint))
    }

    async fn recover_all_instances(&self) -> CheckpointResult<Vec<RecoveryResult>> {
        let mut lists = self.lists.lock();
        self.purge_expired(&mut lists);

        let mut by_instance: HashMap<InstanceKey, &StoredEntry> = HashMap::new();
        for ((key, _), entries) in lists.iter() {
            if let Some(newest) = entries.first() {
                by_instance
                    .entry(key.clone())
                    .and_modify(|current| {
                        if newest.timestamp_ms > current.timestamp_ms {
                            *current = newest;
                        }
                    })
                    .or_insert(newest);
            }
        }

        Ok(by_instance
            .into_iter()
            .map(|(instance_key, entry)| RecoveryResult {
                instance_key,
                checkpoint: Some(entry.checkpoint.clone()),
                recovery_time_ms: 0,
            })
            .collect())
    }

    async fn delete_checkpoints(&self, instance_key: &InstanceKey) -> CheckpointResult<()> {
        let mut lists = self.lists.lock();
        lists.retain(|(key, _), _| key != instance_key);
        Ok(())
    }

    async fn get_checkpoint_stats(&self) -> CheckpointResult<CheckpointStats> {
        let mut lists = self.lists.lock();
        self.purge_expired(&mut lists);
        let instances: std::collections::HashSet<_> = lists.keys().map(|(k, _)| k.clone()).collect();
        Ok(CheckpointStats {
            total_checkpoints: lists.values().map(|v| v.len()).sum(),
            instances_tracked: instances.len(),
        })
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
