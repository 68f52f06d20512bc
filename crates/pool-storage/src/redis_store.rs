// SPDX-License-Identifier: MIT

//! Redis-backed [`CheckpointStore`] (§6 "Checkpoint store"). Each
//! `(instance_key, type)` pair is a Redis list under
//! `{prefix}checkpoint:{instance_key}:{type}`, newest-first, maintained with
//! `LPUSH` + `LTRIM` and expired with `EXPIRE`. Recovery reads with
//! `LRANGE`/`LINDEX`; `recover_all_instances` enumerates via `KEYS`.

use async_trait::async_trait;
use pool_core::key::InstanceKey;
use redis::AsyncCommands;
use serde_json::Value;

use crate::checkpoint::{
    Checkpoint, CheckpointId, CheckpointResult, CheckpointStats, CheckpointStore,
    CheckpointStoreError, CheckpointType, RecoveryResult,
};

pub struct RedisCheckpointStore {
    client: redis::Client,
    key_prefix: String,
    max_per_instance: usize,
    ttl_seconds: u64,
}

impl RedisCheckpointStore {
    pub fn new(client: redis::Client, key_prefix: impl Into<String>, max_per_instance: usize, ttl_seconds: u64) -> Self {
        Self { client, key_prefix: key_prefix.into(), max_per_instance, ttl_seconds }
    }

    fn list_key(&self, instance_key: &InstanceKey, checkpoint_type: CheckpointType) -> String {
        format!("{}checkpoint:{}:{}", self.key_prefix, instance_key.as_str(), checkpoint_type)
    }

    fn key_pattern(&self) -> String {
        format!("{}checkpoint:*", self.key_prefix)
    }

    async fn connection(&self) -> CheckpointResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CheckpointStoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl CheckpointStore for RedisCheckpointStore {
    async fn create_checkpoint(
        &self,
        instance_key: &InstanceKey,
        checkpoint_type: CheckpointType,
        state_data: Value,
        metadata: Value,
    ) -> CheckpointResult<Checkpoint> {
        let checkpoint = Checkpoint {
            checkpoint_id: CheckpointId::new(),
            instance_key: instance_key.clone(),
            checkpoint_type,
            timestamp_ms: chrono::Utc::now().timestamp_millis() as u64,
            state_data,
            metadata,
        };
        let serialized =
            serde_json::to_string(&checkpoint).map_err(|e| CheckpointStoreError::Backend(e.to_string()))?;

        let key = self.list_key(instance_key, checkpoint_type);
        let mut conn = self.connection().await?;
        let _: () = conn.lpush(&key, serialized).await.map_err(|e| CheckpointStoreError::Backend(e.to_string()))?;
        let _: () = conn
            .ltrim(&key, 0, self.max_per_instance as isize - 1)
            .await
            .map_err(|e| CheckpointStoreError::Backend(e.to_string()))?;
        let _: () =
            conn.expire(&key, self.ttl_seconds as i64).await.map_err(|e| CheckpointStoreError::Backend(e.to_string()))?;

        Ok(checkpoint)
    }

    async fn recover_instance(
        &self,
        instance_key: &InstanceKey,
        checkpoint_type: Option<CheckpointType>,
    ) -> CheckpointResult<Option<Checkpoint>> {
        let mut conn = self.connection().await?;
        let types = match checkpoint_type {
            Some(t) => vec![t],
            None => vec![
                CheckpointType::Lifecycle,
                CheckpointType::Conversation,
                CheckpointType::Execution,
                CheckpointType::Resource,
                CheckpointType::Full,
            ],
        };

        let mut newest: Option<Checkpoint> = None;
        for t in types {
            let key = self.list_key(instance_key, t);
            let raw: Option<String> =
                conn.lindex(&key, 0).await.map_err(|e| CheckpointStoreError::Backend(e.to_string()))?;
            let Some(raw) = raw else { continue };
            let candidate: Checkpoint =
                serde_json::from_str(&raw).map_err(|e| CheckpointStoreError::Backend(e.to_string()))?;
            if newest.as_ref().map(|c| candidate.timestamp_ms > c.timestamp_ms).unwrap_or(true) {
                newest = Some(candidate);
            }
        }
        Ok(newest)
    }

    async fn recover_all_instances(&self) -> CheckpointResult<Vec<RecoveryResult>> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> =
            conn.keys(self.key_pattern()).await.map_err(|e| CheckpointStoreError::Backend(e.to_string()))?;

        let mut by_instance: std::collections::HashMap<InstanceKey, Checkpoint> = std::collections::HashMap::new();
        for key in keys {
            let raw: Option<String> =
                conn.lindex(&key, 0).await.map_err(|e| CheckpointStoreError::Backend(e.to_string()))?;
            let Some(raw) = raw else { continue };
            let checkpoint: Checkpoint =
                serde_json::from_str(&raw).map_err(|e| CheckpointStoreError::Backend(e.to_string()))?;
            by_instance
                .entry(checkpoint.instance_key.clone())
                .and_modify(|current| {
                    if checkpoint.timestamp_ms > current.timestamp_ms {
                        *current = checkpoint.clone();
                    }
                })
                .or_insert(checkpoint);
        }

        Ok(by_instance
            .into_iter()
            .map(|(instance_key, checkpoint)| RecoveryResult {
                instance_key,
                checkpoint: Some(checkpoint),
                recovery_time_ms: 0,
            })
            .collect())
    }

    async fn delete_checkpoints(&self, instance_key: &InstanceKey) -> CheckpointResult<()> {
        let mut conn = self.connection().await?;
        let types = [
            CheckpointType::Lifecycle,
            CheckpointType::Conversation,
            CheckpointType::Execution,
            CheckpointType::Resource,
            CheckpointType::Full,
        ];
        for t in types {
            let key = self.list_key(instance_key, t);
            let _: () = conn.del(&key).await.map_err(|e| CheckpointStoreError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    async fn get_checkpoint_stats(&self) -> CheckpointResult<CheckpointStats> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> =
            conn.keys(self.key_pattern()).await.map_err(|e| CheckpointStoreError::Backend(e.to_string()))?;

        let mut total = 0usize;
        let mut instances = std::collections::HashSet::new();
        for key in &keys {
            let len: usize = conn.llen(key).await.map_err(|e| CheckpointStoreError::Backend(e.to_string()))?;
            total += len;
            if let Some(instance) = key.rsplit_once(':').map(|(rest, _)| rest) {
                instances.insert(instance.to_string());
            }
        }

        Ok(CheckpointStats { total_checkpoints: total, instances_tracked: instances.len() })
    }
}
