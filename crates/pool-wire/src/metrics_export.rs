// SPDX-License-Identifier: MIT

//! Prometheus-compatible text exporter (§6 "Metrics export"). The pool
//! reports a fixed set of per-instance and global series under a single
//! namespace; this module only formats already-computed snapshots, it
//! doesn't own any state of its own.

use std::fmt::Write as _;

use pool_core::breaker::CircuitState;
use pool_core::health::HealthStatus;
use pool_core::metrics::InstanceMetrics;

/// One instance's worth of data to render as metric samples.
pub struct InstanceSnapshot {
    pub instance_key: String,
    pub tier: String,
    pub metrics: InstanceMetrics,
    pub health: HealthStatus,
    pub breaker_state: CircuitState,
    pub active_requests: u32,
    pub memory_used_mb: f64,
    pub cpu_used_cores: f64,
}

/// Renders a set of instance snapshots into the Prometheus text exposition
/// format, namespaced per [`pool_core::config::PoolConfig::metrics_namespace`].
/// Global counters outside the per-instance families (e.g. auto-scaler
/// events) can be appended with [`MetricsExporter::render_global_counter`].
pub struct MetricsExporter {
    namespace: String,
}

impl MetricsExporter {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into() }
    }

    fn metric(&self, name: &str) -> String {
        format!("{}_{}", self.namespace, name)
    }

    pub fn render(&self, instances: &[InstanceSnapshot]) -> String {
        let mut out = String::new();
        self.write_counter_family(&mut out, "requests_total", "Total requests handled", instances, |s| {
            s.metrics.total_requests as f64
        });
        self.write_counter_family(
            &mut out,
            "requests_successful_total",
            "Successful requests",
            instances,
            |s| s.metrics.successful_requests as f64,
        );
        self.write_counter_family(&mut out, "requests_failed_total", "Failed requests", instances, |s| {
            s.metrics.failed_requests as f64
        });
        self.write_gauge_family(&mut out, "active_requests", "In-flight requests", instances, |s| {
            f64::from(s.active_requests)
        });
        self.write_gauge_family(&mut out, "memory_used_mb", "Memory currently allocated", instances, |s| {
            s.memory_used_mb
        });
        self.write_gauge_family(&mut out, "cpu_used_cores", "CPU cores currently allocated", instances, |s| {
            s.cpu_used_cores
        });
        self.write_gauge_family(&mut out, "error_rate", "Rolling error rate", instances, |s| {
            s.metrics.error_rate()
        });
        self.write_histogram(&mut out, instances);
        self.write_health_gauge(&mut out, instances);
        self.write_breaker_gauge(&mut out, instances);
        out
    }

    /// Renders a single namespaced counter with no labels. Intended for
    /// process-wide totals the per-instance snapshot shape doesn't carry,
    /// such as cumulative auto-scaler scale-up/scale-down counts.
    pub fn render_global_counter(&self, name: &str, help: &str, value: u64) -> String {
        let metric = self.metric(name);
        format!("# HELP {metric} {help}\n# TYPE {metric} counter\n{metric} {value}\n")
    }

    /// Renders a single-observation namespaced histogram with no labels.
    /// Intended for one-shot durations the per-instance snapshot shape
    /// doesn't carry, such as the most recent checkpoint-recovery attempt.
    pub fn render_global_histogram(&self, name: &str, help: &str, value_ms: u64) -> String {
        let metric = self.metric(name);
        format!(
            "# HELP {metric} {help}\n# TYPE {metric} histogram\n{metric}_sum {value_ms}\n{metric}_count 1\n"
        )
    }

    fn write_counter_family(
        &self,
        out: &mut String,
        name: &str,
        help: &str,
        instances: &[InstanceSnapshot],
        value: impl Fn(&InstanceSnapshot) -> f64,
    ) {
        let metric = self.metric(name);
        let _ = writeln!(out, "# HELP {metric} {help}");
        let _ = writeln!(out, "# TYPE {metric} counter");
        for snap in instances {
            let _ = writeln!(
                out,
                "{metric}{{instance_key=\"{}\",tier=\"{}\"}} {}",
                snap.instance_key,
                snap.tier,
                value(snap)
            );
        }
    }

    fn write_gauge_family(
        &self,
        out: &mut String,
        name: &str,
        help: &str,
        instances: &[InstanceSnapshot],
        value: impl Fn(&InstanceSnapshot) -> f64,
    ) {
        let metric = self.metric(name);
        let _ = writeln!(out, "# HELP {metric} {help}");
        let _ = writeln!(out, "# TYPE {metric} gauge");
        for snap in instances {
            let _ = writeln!(
                out,
                "{metric}{{instance_key=\"{}\",tier=\"{}\"}} {}",
                snap.instance_key,
                snap.tier,
                value(snap)
            );
        }
    }

    fn write_histogram(&self, out: &mut String, instances: &[InstanceSnapshot]) {
        let metric = self.metric("request_latency_ms");
        let _ = writeln!(out, "# HELP {metric} Rolling request latency percentiles");
        let _ = writeln!(out, "# TYPE {metric} summary");
        for snap in instances {
            let pct = snap.metrics.percentiles();
            for (quantile, value) in [("0.5", pct.p50), ("0.95", pct.p95), ("0.99", pct.p99)] {
                let _ = writeln!(
                    out,
                    "{metric}{{instance_key=\"{}\",tier=\"{}\",quantile=\"{quantile}\"}} {value}",
                    snap.instance_key, snap.tier,
                );
            }
        }
    }

    fn write_health_gauge(&self, out: &mut String, instances: &[InstanceSnapshot]) {
        let metric = self.metric("instance_healthy");
        let _ = writeln!(out, "# HELP {metric} 1 if the instance's last health check was healthy");
        let _ = writeln!(out, "# TYPE {metric} gauge");
        for snap in instances {
            let healthy = if matches!(snap.health, HealthStatus::Healthy) { 1 } else { 0 };
            let _ = writeln!(
                out,
                "{metric}{{instance_key=\"{}\",tier=\"{}\"}} {healthy}",
                snap.instance_key, snap.tier
            );
        }
    }

    fn write_breaker_gauge(&self, out: &mut String, instances: &[InstanceSnapshot]) {
        let metric = self.metric("circuit_breaker_state");
        let _ = writeln!(out, "# HELP {metric} Circuit breaker state (0=closed, 1=half_open, 2=open)");
        let _ = writeln!(out, "# TYPE {metric} gauge");
        for snap in instances {
            let state = match snap.breaker_state {
                CircuitState::Closed => 0,
                CircuitState::HalfOpen => 1,
                CircuitState::Open => 2,
            };
            let _ = writeln!(
                out,
                "{metric}{{instance_key=\"{}\",tier=\"{}\"}} {state}",
                snap.instance_key, snap.tier
            );
        }
    }
}

#[cfg(test)]
#[path = "metrics_export_tests.rs"]
mod tests;
