use std::sync::Arc;

use async_trait::async_trait;
use pool_core::tier::ProjectTier;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::*;
use crate::backend::InstanceConfig;

/// A minimal HTTP/1.1 server speaking just enough of the container
/// protocol for the backend's create/execute/destroy paths: `/health`
/// always reports ready, `/execute` echoes one NDJSON event, `/shutdown`
/// acknowledges.
async fn spawn_fake_container() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let Ok(n) = stream.read(&mut buf).await else { return };
                let request = String::from_utf8_lossy(&buf[..n]);
                let body = if request.starts_with("GET /health") {
                    "{\"status\":\"healthy\",\"lifecycle_state\":\"ready\"}".to_string()
                } else if request.starts_with("POST /execute") {
                    "{\"event_type\":\"message\",\"text\":\"ack\"}\n".to_string()
                } else {
                    "{\"acknowledged\":true}".to_string()
                };
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });

    addr
}

struct FakeContainerRuntime {
    addr: String,
}

#[async_trait]
impl ContainerRuntime for FakeContainerRuntime {
    async fn ensure_network(&self) -> Result<(), ContainerRuntimeError> {
        Ok(())
    }

    async fn start(&self, _spec: &ContainerSpec) -> Result<String, ContainerRuntimeError> {
        Ok(self.addr.clone())
    }

    async fn stop(&self, _container_addr: &str) -> Result<(), ContainerRuntimeError> {
        Ok(())
    }
}

fn instance_config(key: &str) -> InstanceConfig {
    InstanceConfig {
        instance_key: InstanceKey::parse(key).unwrap(),
        tier: ProjectTier::Hot,
        quota: pool_core::quota::ResourceQuota::default().memory_limit_mb(1024),
    }
}

#[test]
fn port_allocator_never_repeats() {
    let allocator = PortAllocator::new(30000, 31000);
    let (g1, h1) = allocator.allocate();
    let (g2, h2) = allocator.allocate();
    assert_eq!((g1, h1), (30000, 31000));
    assert_eq!((g2, h2), (30001, 31001));
}

#[tokio::test]
async fn create_execute_and_destroy_round_trip() {
    let addr = spawn_fake_container().await;
    let runtime = Arc::new(FakeContainerRuntime { addr });
    let backend = ContainerBackend::new(ContainerConfig::default(), runtime);

    let key = InstanceKey::parse("acme:bot:prod").unwrap();
    backend.create_instance(instance_config("acme:bot:prod")).await.unwrap();
    assert!(backend.get_instance(&key).is_some());

    let events = backend.execute(&key, "conv-1", "hi", serde_json::json!({})).await.unwrap();
    assert_eq!(events[0].event_type, "message");

    let health = backend.health_check(&key).await.unwrap();
    assert!(health.is_healthy());

    backend.destroy_instance(&key, true).await.unwrap();
    assert!(backend.get_instance(&key).is_none());
}
