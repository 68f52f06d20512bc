// SPDX-License-Identifier: MIT

//! Default [`ProjectMetricsSource`]: a fixed free-tier baseline for every
//! project. The real per-project usage and subscription data lives in the
//! embedder's own billing/analytics store, not in this crate — `main`
//! wires this one in as a placeholder until that integration exists.

use pool_core::tier::ProjectMetrics;
use pool_engine::ProjectMetricsSource;

pub struct StaticMetricsSource;

impl ProjectMetricsSource for StaticMetricsSource {
    fn project_metrics(&self, tenant: &str, project: &str) -> ProjectMetrics {
        ProjectMetrics {
            tenant_id: tenant.to_string(),
            project_id: project.to_string(),
            daily_requests: 0,
            subscription_tier: "free".into(),
            sla_requirement: 0.0,
            max_concurrent: 1,
        }
    }
}
