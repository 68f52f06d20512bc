// SPDX-License-Identifier: MIT

//! Per-instance request metrics: monotonic counters plus a rolling
//! percentile window over the last 100 latencies (§3, §8 "Instance
//! metrics").

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

const LATENCY_WINDOW: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub last_error_at_ms: Option<u64>,
    /// Failures since the last success, reset to 0 on `record_success`.
    /// Drives failure-recovery escalation (§4.5 step 6).
    pub consecutive_failures: u32,
    #[serde(skip)]
    latencies: VecDeque<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl InstanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, latency_ms: f64) {
        self.total_requests += 1;
        self.successful_requests += 1;
        self.consecutive_failures = 0;
        self.push_latency(latency_ms);
    }

    pub fn record_failure(&mut self, latency_ms: f64, at_ms: u64) {
        self.total_requests += 1;
        self.failed_requests += 1;
        self.last_error_at_ms = Some(at_ms);
        self.consecutive_failures += 1;
        self.push_latency(latency_ms);
    }

    fn push_latency(&mut self, latency_ms: f64) {
        self.latencies.push_back(latency_ms);
        if self.latencies.len() > LATENCY_WINDOW {
            self.latencies.pop_front();
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failed_requests as f64 / self.total_requests as f64
        }
    }

    /// Nearest-rank percentiles over the current latency window. Empty
    /// window yields all-zero percentiles.
    pub fn percentiles(&self) -> LatencyPercentiles {
        if self.latencies.is_empty() {
            return LatencyPercentiles::default();
        }
        let mut sorted: Vec<f64> = self.latencies.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let pick = |pct: f64| -> f64 {
            let rank = ((pct * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
            sorted[rank - 1]
        };

        LatencyPercentiles { p50: pick(0.50), p95: pick(0.95), p99: pick(0.99) }
    }

    pub fn window_len(&self) -> usize {
        self.latencies.len()
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
