use std::sync::Arc;
use std::time::Duration;

use pool_adapters::fake::{FakeAgent, FakeBackend};
use pool_core::breaker::CircuitBreakerConfig;
use pool_core::clock::FakeClock;

use super::*;

fn instance(agent: Arc<FakeAgent>) -> AgentInstance<FakeClock> {
    let clock = FakeClock::new();
    let key = InstanceKey::new("acme", "bot", "prod");
    let backend = Arc::new(FakeBackend::new(agent.clone()));
    AgentInstance::new(key, agent, backend, 2, CircuitBreakerConfig::default(), clock)
}

#[tokio::test]
async fn execute_rejected_before_ready() {
    let agent = Arc::new(FakeAgent::default());
    let instance = instance(agent);
    let err = instance.execute("conv", "hi", serde_json::json!({})).await.unwrap_err();
    assert!(matches!(err, EngineError::InstanceNotActive(_)));
}

#[tokio::test]
async fn execute_succeeds_once_ready_and_records_metrics() {
    let agent = Arc::new(FakeAgent::default());
    let instance = instance(agent);
    instance.mark_ready().unwrap();

    let events = instance.execute("conv", "hi", serde_json::json!({})).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(instance.metrics().successful_requests, 1);
    assert_eq!(instance.lifecycle().status(), InstanceStatus::Ready);
}

#[tokio::test]
async fn execute_failure_is_recorded_and_propagated() {
    let agent = Arc::new(FakeAgent::default());
    agent.fail_next();
    let instance = instance(agent);
    instance.mark_ready().unwrap();

    let err = instance.execute("conv", "hi", serde_json::json!({})).await;
    assert!(err.is_err());
    assert_eq!(instance.metrics().failed_requests, 1);
}

#[tokio::test]
async fn health_check_degrades_then_goes_unhealthy_with_error_rate() {
    let agent = Arc::new(FakeAgent::default());
    let instance = instance(agent.clone());
    instance.mark_ready().unwrap();

    for _ in 0..1 {
        instance.execute("conv", "ok", serde_json::json!({})).await.unwrap();
    }
    agent.fail_next();
    let _ = instance.execute("conv", "fail", serde_json::json!({})).await;

    let health = instance.health_check().await;
    assert_eq!(health.status, HealthStatus::Degraded);
}

#[tokio::test]
async fn stop_graceful_drains_then_terminates() {
    let agent = Arc::new(FakeAgent::default());
    let instance = instance(agent);
    instance.mark_ready().unwrap();

    instance.stop(true, Duration::from_millis(200)).await.unwrap();
    assert_eq!(instance.lifecycle().status(), InstanceStatus::Terminated);
}

#[tokio::test]
async fn health_check_on_terminal_instance_is_unhealthy() {
    let agent = Arc::new(FakeAgent::default());
    let instance = instance(agent);
    instance.mark_ready().unwrap();
    instance.stop(false, Duration::from_millis(10)).await.unwrap();

    let health = instance.health_check().await;
    assert_eq!(health.status, HealthStatus::Unhealthy);
}
