use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pool_adapters::fake::{FakeAgent, FakeBackend};
use pool_core::breaker::CircuitBreakerConfig;
use pool_core::clock::FakeClock;
use pool_core::key::InstanceKey;

use super::*;

fn monitor() -> HealthMonitor<FakeClock> {
    HealthMonitor::new(HealthMonitorConfig::default(), FakeClock::new())
}

fn ready_instance(agent: Arc<FakeAgent>) -> AgentInstance<FakeClock> {
    let key = InstanceKey::new("acme", "bot", "prod");
    let backend = Arc::new(FakeBackend::new(agent.clone()));
    let instance = AgentInstance::new(key, agent, backend, 4, CircuitBreakerConfig::default(), FakeClock::new());
    instance.mark_ready().unwrap();
    instance
}

#[tokio::test]
async fn check_instance_records_healthy_result() {
    let monitor = monitor();
    let instance = ready_instance(Arc::new(FakeAgent::default()));

    let result = monitor.check_instance(&instance).await;
    assert!(result.is_healthy());

    let state = monitor.state_of(&instance.instance_key).unwrap();
    assert_eq!(state.consecutive_successes, 0);
}

#[tokio::test]
async fn crossing_unhealthy_threshold_fires_callback() {
    let config = HealthMonitorConfig { unhealthy_threshold: 2, ..HealthMonitorConfig::default() };
    let monitor = HealthMonitor::new(config, FakeClock::new());
    let agent = Arc::new(FakeAgent::default());
    agent.set_unhealthy();
    let instance = ready_instance(agent);

    let fired = Arc::new(AtomicU32::new(0));
    let fired_clone = Arc::clone(&fired);
    monitor.on_unhealthy(move |_key, _result| {
        fired_clone.fetch_add(1, Ordering::SeqCst);
    });

    monitor.check_instance(&instance).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    monitor.check_instance(&instance).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    // A third consecutive failure must not re-fire.
    monitor.check_instance(&instance).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn recovery_fires_on_recovered_callback() {
    let config = HealthMonitorConfig {
        unhealthy_threshold: 1,
        healthy_threshold: 1,
        ..HealthMonitorConfig::default()
    };
    let monitor = HealthMonitor::new(config, FakeClock::new());
    let agent = Arc::new(FakeAgent::default());
    agent.set_unhealthy();
    let instance = ready_instance(agent.clone());

    let recovered = Arc::new(Mutex::new(false));
    let recovered_clone = Arc::clone(&recovered);
    monitor.on_recovered(move |_key| {
        *recovered_clone.lock() = true;
    });

    monitor.check_instance(&instance).await;
    assert!(!*recovered.lock());

    // flip the agent healthy, then the next check should cross recovery.
    agent.healthy.store(true, Ordering::SeqCst);
    monitor.check_instance(&instance).await;
    assert!(*recovered.lock());
}

#[test]
fn recovery_action_restarts_on_connection_errors() {
    let monitor = monitor();
    let result = pool_core::health::HealthCheckResult::unhealthy("connection refused");
    let key = InstanceKey::new("acme", "bot", "prod");
    let action = monitor.recovery_action(&key, &result);
    assert_eq!(action, RecoveryAction::Restart);
}

#[tokio::test]
async fn stop_monitoring_clears_state() {
    let monitor = monitor();
    let instance = ready_instance(Arc::new(FakeAgent::default()));
    monitor.check_instance(&instance).await;
    assert!(monitor.state_of(&instance.instance_key).is_some());

    monitor.stop_monitoring(&instance.instance_key);
    assert!(monitor.state_of(&instance.instance_key).is_none());
}

#[tokio::test]
async fn start_monitoring_stops_once_terminal() {
    let monitor = Arc::new(monitor());
    let instance = Arc::new(ready_instance(Arc::new(FakeAgent::default())));
    monitor.start_monitoring(Arc::clone(&instance), Duration::from_millis(5));

    instance.stop(false, Duration::from_millis(10)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // no panic / hang means the polling task observed the terminal state and exited.
}
