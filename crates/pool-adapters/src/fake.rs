// SPDX-License-Identifier: MIT

//! Test-support fakes for the backend/agent contracts, exported under the
//! `test-support` feature for other crates' test suites (§ "Agent
//! contract" — the core treats agents as opaque, so a fake need only
//! satisfy the trait).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pool_core::health::HealthCheckResult;
use pool_core::key::InstanceKey;
use pool_wire::agent::{AgentContract, AgentContractError, AgentEvent, AgentHealth};
use serde_json::Value;

use crate::backend::{Backend, BackendError, BackendResult, BackendStats, InstanceConfig, InstanceFactory};

/// An in-memory stand-in for a hosted agent. Records every message it was
/// asked to stream, and can be told to fail the next call of any kind.
pub struct FakeAgent {
    pub received: Mutex<Vec<String>>,
    pub healthy: AtomicBool,
    pub fail_next_stream: AtomicBool,
    pub shutdown_called: AtomicBool,
}

impl Default for FakeAgent {
    fn default() -> Self {
        Self {
            received: Mutex::new(Vec::new()),
            healthy: AtomicBool::new(true),
            fail_next_stream: AtomicBool::new(false),
            shutdown_called: AtomicBool::new(false),
        }
    }
}

impl FakeAgent {
    pub fn set_unhealthy(&self) {
        self.healthy.store(false, Ordering::SeqCst);
    }

    pub fn fail_next(&self) {
        self.fail_next_stream.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgentContract for FakeAgent {
    async fn stream(
        &self,
        _conversation_id: &str,
        user_message: &str,
        _context: Value,
    ) -> Result<Vec<AgentEvent>, AgentContractError> {
        if self.fail_next_stream.swap(false, Ordering::SeqCst) {
            return Err(AgentContractError::Stream("fake failure".into()));
        }
        self.received.lock().push(user_message.to_string());
        Ok(vec![AgentEvent {
            event_type: "message".into(),
            payload: serde_json::json!({ "text": user_message }),
        }])
    }

    async fn health(&self) -> Result<AgentHealth, AgentContractError> {
        let status = if self.healthy.load(Ordering::SeqCst) { "healthy" } else { "unhealthy" };
        Ok(AgentHealth { status: status.into(), details: None })
    }

    async fn shutdown(&self, _graceful: bool, _timeout_seconds: u64) -> Result<(), AgentContractError> {
        self.shutdown_called.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out fresh [`FakeAgent`]s, optionally failing every `create` call
/// (to exercise a backend's `CreationTimeout`/rollback paths).
pub struct FakeInstanceFactory {
    pub fail_creation: AtomicBool,
}

impl Default for FakeInstanceFactory {
    fn default() -> Self {
        Self { fail_creation: AtomicBool::new(false) }
    }
}

impl FakeInstanceFactory {
    pub fn always_fail() -> Self {
        Self { fail_creation: AtomicBool::new(true) }
    }
}

#[async_trait]
impl InstanceFactory for FakeInstanceFactory {
    async fn create(&self, _config: &InstanceConfig) -> BackendResult<Arc<dyn AgentContract>> {
        if self.fail_creation.load(Ordering::SeqCst) {
            return Err(BackendError::Other("fake creation failure".into()));
        }
        Ok(Arc::new(FakeAgent::default()))
    }

    async fn destroy(
        &self,
        _instance_key: &InstanceKey,
        _handle: &Arc<dyn AgentContract>,
        _graceful: bool,
    ) -> BackendResult<()> {
        Ok(())
    }
}

/// Serves one fixed agent handle for every instance key, regardless of what
/// it's asked for. Lets engine-level tests exercise `AgentInstance::execute`
/// routing through a `Backend` without pulling in a real hosting strategy.
pub struct FakeBackend {
    handle: Arc<dyn AgentContract>,
}

impl FakeBackend {
    pub fn new(handle: Arc<dyn AgentContract>) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn start(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn stop(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn create_instance(&self, _config: InstanceConfig) -> BackendResult<Arc<dyn AgentContract>> {
        Ok(self.handle.clone())
    }

    async fn destroy_instance(&self, _instance_key: &InstanceKey, _graceful: bool) -> BackendResult<()> {
        Ok(())
    }

    fn get_instance(&self, _instance_key: &InstanceKey) -> Option<Arc<dyn AgentContract>> {
        Some(self.handle.clone())
    }

    fn list_instances(&self) -> Vec<InstanceKey> {
        Vec::new()
    }

    async fn health_check(&self, _instance_key: &InstanceKey) -> BackendResult<HealthCheckResult> {
        let health = self.handle.health().await?;
        Ok(if health.status == "healthy" {
            HealthCheckResult::healthy()
        } else {
            HealthCheckResult::unhealthy(health.status)
        })
    }

    fn stats(&self) -> BackendStats {
        BackendStats { live_instances: 1, capacity: 1 }
    }
}
