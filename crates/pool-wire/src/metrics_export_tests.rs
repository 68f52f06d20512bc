use super::*;

fn snapshot(key: &str) -> InstanceSnapshot {
    let mut metrics = InstanceMetrics::new();
    metrics.record_success(10.0);
    metrics.record_failure(20.0, 1_000);
    InstanceSnapshot {
        instance_key: key.into(),
        tier: "hot".into(),
        metrics,
        health: HealthStatus::Healthy,
        breaker_state: CircuitState::Closed,
        active_requests: 2,
        memory_used_mb: 512.0,
        cpu_used_cores: 1.0,
    }
}

#[test]
fn render_includes_all_metric_families() {
    let exporter = MetricsExporter::new("memstack_agent_pool");
    let text = exporter.render(&[snapshot("acme:bot:prod")]);

    assert!(text.contains("memstack_agent_pool_requests_total{instance_key=\"acme:bot:prod\",tier=\"hot\"} 2"));
    assert!(text.contains("memstack_agent_pool_requests_successful_total"));
    assert!(text.contains("memstack_agent_pool_requests_failed_total"));
    assert!(text.contains("memstack_agent_pool_active_requests{instance_key=\"acme:bot:prod\",tier=\"hot\"} 2"));
    assert!(text.contains("memstack_agent_pool_request_latency_ms"));
    assert!(text.contains("quantile=\"0.5\""));
    assert!(text.contains("memstack_agent_pool_instance_healthy{instance_key=\"acme:bot:prod\",tier=\"hot\"} 1"));
    assert!(text.contains("memstack_agent_pool_circuit_breaker_state{instance_key=\"acme:bot:prod\",tier=\"hot\"} 0"));
}

#[test]
fn unhealthy_instance_reports_zero() {
    let mut snap = snapshot("acme:bot:prod");
    snap.health = HealthStatus::Unhealthy;
    snap.breaker_state = CircuitState::Open;
    let exporter = MetricsExporter::new("memstack_agent_pool");
    let text = exporter.render(&[snap]);

    assert!(text.contains("memstack_agent_pool_instance_healthy{instance_key=\"acme:bot:prod\",tier=\"hot\"} 0"));
    assert!(text.contains("memstack_agent_pool_circuit_breaker_state{instance_key=\"acme:bot:prod\",tier=\"hot\"} 2"));
}

#[test]
fn empty_snapshot_set_still_emits_help_and_type_lines() {
    let exporter = MetricsExporter::new("memstack_agent_pool");
    let text = exporter.render(&[]);
    assert!(text.contains("# TYPE memstack_agent_pool_requests_total counter"));
}
