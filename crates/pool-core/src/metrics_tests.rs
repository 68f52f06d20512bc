use super::*;

#[test]
fn empty_metrics_have_zero_percentiles_and_error_rate() {
    let metrics = InstanceMetrics::new();
    assert_eq!(metrics.percentiles(), LatencyPercentiles::default());
    assert_eq!(metrics.error_rate(), 0.0);
}

#[test]
fn record_success_increments_totals() {
    let mut metrics = InstanceMetrics::new();
    metrics.record_success(10.0);
    metrics.record_success(20.0);
    assert_eq!(metrics.total_requests, 2);
    assert_eq!(metrics.successful_requests, 2);
    assert_eq!(metrics.failed_requests, 0);
}

#[test]
fn record_failure_sets_last_error_timestamp() {
    let mut metrics = InstanceMetrics::new();
    metrics.record_failure(5.0, 1_000);
    assert_eq!(metrics.failed_requests, 1);
    assert_eq!(metrics.last_error_at_ms, Some(1_000));
}

#[test]
fn consecutive_failures_resets_on_success() {
    let mut metrics = InstanceMetrics::new();
    metrics.record_failure(1.0, 0);
    metrics.record_failure(1.0, 0);
    assert_eq!(metrics.consecutive_failures, 2);
    metrics.record_success(1.0);
    assert_eq!(metrics.consecutive_failures, 0);
    metrics.record_failure(1.0, 0);
    assert_eq!(metrics.consecutive_failures, 1);
}

#[test]
fn error_rate_divides_failures_by_total() {
    let mut metrics = InstanceMetrics::new();
    metrics.record_success(1.0);
    metrics.record_success(1.0);
    metrics.record_success(1.0);
    metrics.record_failure(1.0, 0);
    assert_eq!(metrics.error_rate(), 0.25);
}

#[test]
fn latency_window_caps_at_100_and_drops_oldest() {
    let mut metrics = InstanceMetrics::new();
    for i in 0..150 {
        metrics.record_success(i as f64);
    }
    assert_eq!(metrics.window_len(), 100);
    // Oldest 50 entries (0..50) were evicted; p50 sits within the remaining [50, 149] range.
    let pct = metrics.percentiles();
    assert!(pct.p50 >= 50.0);
}

#[test]
fn percentiles_on_uniform_distribution() {
    let mut metrics = InstanceMetrics::new();
    for i in 1..=100 {
        metrics.record_success(i as f64);
    }
    let pct = metrics.percentiles();
    assert_eq!(pct.p50, 50.0);
    assert_eq!(pct.p95, 95.0);
    assert_eq!(pct.p99, 99.0);
}

#[test]
fn single_sample_is_every_percentile() {
    let mut metrics = InstanceMetrics::new();
    metrics.record_success(42.0);
    let pct = metrics.percentiles();
    assert_eq!(pct.p50, 42.0);
    assert_eq!(pct.p95, 42.0);
    assert_eq!(pct.p99, 42.0);
}
