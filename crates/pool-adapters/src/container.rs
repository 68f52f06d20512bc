// SPDX-License-Identifier: MIT

//! Hot-tier backend (§4.6.3): each instance runs in its own container,
//! reached over the HTTP/JSON fallback protocol in
//! [`pool_wire::container_protocol`]. Container lifecycle (start/stop) is
//! delegated to a [`ContainerRuntime`] so the orchestration logic here
//! doesn't care whether that's Kubernetes, Docker, or a test fake.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pool_core::clock::{Clock, SystemClock};
use pool_core::health::HealthCheckResult;
use pool_core::key::InstanceKey;
use pool_wire::agent::{AgentContract, AgentContractError, AgentEvent, AgentHealth};
use pool_wire::container_protocol::{
    parse_ndjson_events, ContainerExecuteRequest, ContainerHealthResponse, ContainerShutdownRequest,
};
use serde_json::Value;
use thiserror::Error;

use crate::backend::{
    Backend, BackendError, BackendResult, BackendStats, InstanceConfig, InstanceFactory,
};

#[derive(Debug, Error)]
pub enum ContainerRuntimeError {
    #[error("container runtime error: {0}")]
    Other(String),
}

/// Everything needed to stand up one instance's container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub memory_limit_mb: u32,
    pub cpu_limit_cores: f64,
    pub grpc_port: u16,
    pub health_port: u16,
    pub tenant: String,
    pub project: String,
}

/// Starts/stops the actual container. Implemented against Kubernetes in
/// production; tests supply a fake that never touches a real cluster.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn ensure_network(&self) -> Result<(), ContainerRuntimeError>;
    async fn start(&self, spec: &ContainerSpec) -> Result<String, ContainerRuntimeError>;
    async fn stop(&self, container_addr: &str) -> Result<(), ContainerRuntimeError>;
}

/// Two monotonically increasing port pools (§4.6.3: "Ports are allocated
/// from two monotonically increasing pools").
pub struct PortAllocator {
    next_grpc: AtomicU16,
    next_health: AtomicU16,
}

impl PortAllocator {
    pub fn new(grpc_base: u16, health_base: u16) -> Self {
        Self { next_grpc: AtomicU16::new(grpc_base), next_health: AtomicU16::new(health_base) }
    }

    pub fn allocate(&self) -> (u16, u16) {
        (self.next_grpc.fetch_add(1, Ordering::SeqCst), self.next_health.fetch_add(1, Ordering::SeqCst))
    }
}

/// A client for the container's HTTP/JSON protocol. Wraps an already-running
/// container reached at `addr` and implements [`AgentContract`] over it.
pub struct ContainerAgentHandle {
    addr: String,
    client: reqwest::Client,
}

impl ContainerAgentHandle {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into(), client: reqwest::Client::new() }
    }

    pub async fn poll_health(&self) -> Result<ContainerHealthResponse, AgentContractError> {
        self.client
            .get(format!("http://{}/health", self.addr))
            .send()
            .await
            .map_err(|e| AgentContractError::Health(e.to_string()))?
            .json()
            .await
            .map_err(|e| AgentContractError::Health(e.to_string()))
    }
}

#[async_trait]
impl AgentContract for ContainerAgentHandle {
    async fn stream(
        &self,
        conversation_id: &str,
        user_message: &str,
        context: Value,
    ) -> Result<Vec<AgentEvent>, AgentContractError> {
        let request = ContainerExecuteRequest {
            conversation_id: conversation_id.to_string(),
            message: user_message.to_string(),
            context,
        };
        let body = self
            .client
            .post(format!("http://{}/execute", self.addr))
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentContractError::Stream(e.to_string()))?
            .text()
            .await
            .map_err(|e| AgentContractError::Stream(e.to_string()))?;

        let events =
            parse_ndjson_events(&body).map_err(|e| AgentContractError::Stream(e.to_string()))?;
        Ok(events.into_iter().map(|e| AgentEvent { event_type: e.event_type, payload: e.payload }).collect())
    }

    async fn health(&self) -> Result<AgentHealth, AgentContractError> {
        let resp = self.poll_health().await?;
        Ok(AgentHealth { status: resp.status, details: Some(serde_json::json!({ "lifecycle_state": resp.lifecycle_state })) })
    }

    async fn shutdown(&self, graceful: bool, timeout_seconds: u64) -> Result<(), AgentContractError> {
        let request = ContainerShutdownRequest { graceful, timeout_seconds };
        self.client
            .post(format!("http://{}/shutdown", self.addr))
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentContractError::Shutdown(e.to_string()))?;
        Ok(())
    }
}

struct LiveInstance {
    container_addr: String,
    handle: Arc<dyn AgentContract>,
}

#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub image: String,
    pub grpc_port_base: u16,
    pub health_port_base: u16,
    pub ready_timeout: Duration,
    pub shutdown_rpc_timeout: Duration,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: "memstack/agent-worker:latest".into(),
            grpc_port_base: 30000,
            health_port_base: 31000,
            ready_timeout: Duration::from_secs(60),
            shutdown_rpc_timeout: Duration::from_secs(10),
        }
    }
}

pub struct ContainerBackend<C: Clock = SystemClock> {
    config: ContainerConfig,
    runtime: Arc<dyn ContainerRuntime>,
    ports: PortAllocator,
    clock: C,
    instances: Mutex<std::collections::HashMap<InstanceKey, LiveInstance>>,
}

impl ContainerBackend<SystemClock> {
    pub fn new(config: ContainerConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self::with_clock(config, runtime, SystemClock)
    }
}

impl<C: Clock> ContainerBackend<C> {
    pub fn with_clock(config: ContainerConfig, runtime: Arc<dyn ContainerRuntime>, clock: C) -> Self {
        let ports = PortAllocator::new(config.grpc_port_base, config.health_port_base);
        Self { config, runtime, ports, clock, instances: Mutex::new(std::collections::HashMap::new()) }
    }

    async fn wait_until_ready(&self, handle: &ContainerAgentHandle) -> BackendResult<()> {
        let deadline = tokio::time::Instant::now() + self.config.ready_timeout;
        loop {
            if let Ok(resp) = handle.poll_health().await {
                if resp.lifecycle_state == "ready" {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BackendError::Other("container never reported ready".into()));
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

#[async_trait]
impl<C: Clock> Backend for ContainerBackend<C> {
    async fn start(&self) -> BackendResult<()> {
        self.runtime.ensure_network().await.map_err(|e| BackendError::Other(e.to_string()))
    }

    async fn stop(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn create_instance(&self, config: InstanceConfig) -> BackendResult<Arc<dyn AgentContract>> {
        let (grpc_port, health_port) = self.ports.allocate();
        let spec = ContainerSpec {
            name: config.instance_key.as_str().replace(':', "-"),
            image: self.config.image.clone(),
            memory_limit_mb: config.quota.memory_limit_mb,
            cpu_limit_cores: config.quota.cpu_limit_cores,
            grpc_port,
            health_port,
            tenant: config.instance_key.tenant().to_string(),
            project: config.instance_key.project().to_string(),
        };

        let container_addr = match self.runtime.start(&spec).await {
            Ok(addr) => addr,
            Err(e) => return Err(BackendError::Other(e.to_string())),
        };

        let agent_handle = ContainerAgentHandle::new(container_addr.clone());
        if self.wait_until_ready(&agent_handle).await.is_err() {
            let _ = self.runtime.stop(&container_addr).await;
            return Err(BackendError::CreationTimeout {
                instance_key: config.instance_key.clone(),
                timeout_seconds: self.config.ready_timeout.as_secs(),
            });
        }

        let handle: Arc<dyn AgentContract> = Arc::new(agent_handle);
        self.instances
            .lock()
            .insert(config.instance_key, LiveInstance { container_addr, handle: handle.clone() });
        Ok(handle)
    }

    async fn destroy_instance(&self, instance_key: &InstanceKey, graceful: bool) -> BackendResult<()> {
        let instance = self.instances.lock().remove(instance_key);
        let Some(instance) = instance else { return Err(BackendError::NotFound(instance_key.clone())) };

        if graceful {
            let shutdown = tokio::time::timeout(
                self.config.shutdown_rpc_timeout,
                instance.handle.shutdown(true, self.config.shutdown_rpc_timeout.as_secs()),
            )
            .await;
            if shutdown.is_err() || shutdown.map(|r| r.is_err()).unwrap_or(true) {
                tracing::warn!(%instance_key, "graceful shutdown RPC failed, forcing stop");
            }
        }

        self.runtime.stop(&instance.container_addr).await.map_err(|e| BackendError::Other(e.to_string()))
    }

    fn get_instance(&self, instance_key: &InstanceKey) -> Option<Arc<dyn AgentContract>> {
        self.instances.lock().get(instance_key).map(|i| i.handle.clone())
    }

    fn list_instances(&self) -> Vec<InstanceKey> {
        self.instances.lock().keys().cloned().collect()
    }

    async fn health_check(&self, instance_key: &InstanceKey) -> BackendResult<HealthCheckResult> {
        let instance =
            self.get_instance(instance_key).ok_or_else(|| BackendError::NotFound(instance_key.clone()))?;
        let health = instance.health().await?;
        let mut result = if health.status == "healthy" {
            HealthCheckResult::healthy()
        } else {
            HealthCheckResult::unhealthy(health.status)
        };
        result.last_check_at_ms = self.clock.epoch_ms();
        Ok(result)
    }

    fn stats(&self) -> BackendStats {
        let instances = self.instances.lock();
        BackendStats { live_instances: instances.len(), capacity: usize::MAX }
    }
}

#[cfg(not(any(test, feature = "test-support")))]
mod kube_runtime {
    //! Production [`super::ContainerRuntime`] backed by Kubernetes Pods.
    //! Excluded from test builds since it needs a real API server.

    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
    use kube::Client;
    use std::collections::BTreeMap;

    use super::{ContainerRuntime, ContainerRuntimeError, ContainerSpec};

    pub struct KubeContainerRuntime {
        client: Client,
        namespace: String,
    }

    impl KubeContainerRuntime {
        pub fn new(client: Client, namespace: impl Into<String>) -> Self {
            Self { client, namespace: namespace.into() }
        }

        fn pods(&self) -> Api<Pod> {
            Api::namespaced(self.client.clone(), &self.namespace)
        }
    }

    #[async_trait]
    impl ContainerRuntime for KubeContainerRuntime {
        async fn ensure_network(&self) -> Result<(), ContainerRuntimeError> {
            // The pool's pods all land in one namespace with default
            // in-cluster DNS; no dedicated network object to create.
            Ok(())
        }

        async fn start(&self, spec: &ContainerSpec) -> Result<String, ContainerRuntimeError> {
            let mut labels = BTreeMap::new();
            labels.insert("tenant".to_string(), spec.tenant.clone());
            labels.insert("project".to_string(), spec.project.clone());

            let mut limits = BTreeMap::new();
            limits.insert("memory".to_string(), Quantity(format!("{}Mi", spec.memory_limit_mb)));
            limits.insert("cpu".to_string(), Quantity(format!("{}", spec.cpu_limit_cores)));

            let pod = Pod {
                metadata: ObjectMeta {
                    name: Some(spec.name.clone()),
                    labels: Some(labels),
                    ..Default::default()
                },
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "agent-worker".into(),
                        image: Some(spec.image.clone()),
                        ports: Some(vec![
                            k8s_openapi::api::core::v1::ContainerPort {
                                container_port: i32::from(spec.grpc_port),
                                ..Default::default()
                            },
                            k8s_openapi::api::core::v1::ContainerPort {
                                container_port: i32::from(spec.health_port),
                                ..Default::default()
                            },
                        ]),
                        resources: Some(ResourceRequirements {
                            limits: Some(limits),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
                ..Default::default()
            };

            self.pods()
                .create(&PostParams::default(), &pod)
                .await
                .map_err(|e| ContainerRuntimeError::Other(e.to_string()))?;

            Ok(format!("{}.{}.pod.cluster.local:{}", spec.name, self.namespace, spec.health_port))
        }

        async fn stop(&self, container_addr: &str) -> Result<(), ContainerRuntimeError> {
            let name = container_addr.split('.').next().unwrap_or(container_addr);
            self.pods()
                .delete(name, &DeleteParams::default())
                .await
                .map_err(|e| ContainerRuntimeError::Other(e.to_string()))?;
            Ok(())
        }
    }
}

#[cfg(not(any(test, feature = "test-support")))]
pub use kube_runtime::KubeContainerRuntime;

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
