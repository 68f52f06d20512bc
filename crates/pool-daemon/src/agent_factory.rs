// SPDX-License-Identifier: MIT

//! [`InstanceFactory`] for the shared-pool and on-demand backends: round
//! robins a fixed set of already-running agent-worker addresses and wraps
//! each one in the same HTTP/JSON handle the container backend uses. The
//! workers themselves (what runs at those addresses) are out of scope here
//! — this just speaks the wire protocol to whatever is listening.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pool_adapters::backend::{BackendError, BackendResult, InstanceConfig, InstanceFactory};
use pool_adapters::container::ContainerAgentHandle;
use pool_core::key::InstanceKey;
use pool_wire::agent::AgentContract;

pub struct HttpInstanceFactory {
    addresses: Vec<String>,
    next: AtomicUsize,
}

impl HttpInstanceFactory {
    pub fn new(addresses: Vec<String>) -> Self {
        Self { addresses, next: AtomicUsize::new(0) }
    }

    fn next_address(&self) -> BackendResult<&str> {
        if self.addresses.is_empty() {
            return Err(BackendError::Other("no agent worker addresses configured".into()));
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.addresses.len();
        Ok(&self.addresses[idx])
    }
}

#[async_trait]
impl InstanceFactory for HttpInstanceFactory {
    async fn create(&self, config: &InstanceConfig) -> BackendResult<Arc<dyn AgentContract>> {
        let addr = self.next_address()?;
        let handle = ContainerAgentHandle::new(addr);
        handle.poll_health().await.map_err(BackendError::Agent)?;
        let _ = &config.instance_key;
        Ok(Arc::new(handle))
    }

    async fn destroy(
        &self,
        _instance_key: &InstanceKey,
        handle: &Arc<dyn AgentContract>,
        graceful: bool,
    ) -> BackendResult<()> {
        handle.shutdown(graceful, 10).await.map_err(BackendError::Agent)
    }
}
