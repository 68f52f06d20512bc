// SPDX-License-Identifier: MIT

//! The backend strategy contract (§4.6). Each tier's hosting strategy
//! (on-demand, shared-pool, container) implements this the same way;
//! `pool-engine`'s pool manager is the only caller.

use std::sync::Arc;

use async_trait::async_trait;
use pool_core::health::HealthCheckResult;
use pool_core::key::InstanceKey;
use pool_core::quota::ResourceQuota;
use pool_core::tier::ProjectTier;
use pool_wire::agent::{AgentContract, AgentContractError, AgentEvent};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("instance ceiling reached (max {max})")]
    MaxInstances { max: u32 },
    #[error("creation of {instance_key} timed out after {timeout_seconds}s")]
    CreationTimeout { instance_key: InstanceKey, timeout_seconds: u64 },
    #[error("no instance for key {0}")]
    NotFound(InstanceKey),
    #[error(transparent)]
    Agent(#[from] AgentContractError),
    #[error("backend error: {0}")]
    Other(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Everything a backend needs to host one new instance.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub instance_key: InstanceKey,
    pub tier: ProjectTier,
    pub quota: ResourceQuota,
}

#[derive(Debug, Clone, Default)]
pub struct BackendStats {
    pub live_instances: usize,
    pub capacity: usize,
}

/// Constructs and tears down the actual hosted object a backend wraps.
/// Backends delegate to this rather than hardcoding how an instance comes
/// into being, so the same slot/eviction/timeout logic works whether the
/// underlying thing is an in-process object, a shared-pool slot, or a
/// container.
#[async_trait]
pub trait InstanceFactory: Send + Sync {
    async fn create(&self, config: &InstanceConfig) -> BackendResult<Arc<dyn AgentContract>>;
    async fn destroy(
        &self,
        instance_key: &InstanceKey,
        handle: &Arc<dyn AgentContract>,
        graceful: bool,
    ) -> BackendResult<()>;
}

/// A tier-specific hosting strategy (§4.6: "A backend is a strategy
/// object...").
#[async_trait]
pub trait Backend: Send + Sync {
    async fn start(&self) -> BackendResult<()>;
    async fn stop(&self) -> BackendResult<()>;

    async fn create_instance(&self, config: InstanceConfig) -> BackendResult<Arc<dyn AgentContract>>;
    async fn destroy_instance(&self, instance_key: &InstanceKey, graceful: bool) -> BackendResult<()>;

    fn get_instance(&self, instance_key: &InstanceKey) -> Option<Arc<dyn AgentContract>>;
    fn list_instances(&self) -> Vec<InstanceKey>;

    async fn execute(
        &self,
        instance_key: &InstanceKey,
        conversation_id: &str,
        message: &str,
        context: Value,
    ) -> BackendResult<Vec<AgentEvent>> {
        let instance = self.get_instance(instance_key).ok_or_else(|| BackendError::NotFound(instance_key.clone()))?;
        Ok(instance.stream(conversation_id, message, context).await?)
    }

    async fn health_check(&self, instance_key: &InstanceKey) -> BackendResult<HealthCheckResult>;

    fn stats(&self) -> BackendStats;
}
