// SPDX-License-Identifier: MIT

//! Resource quotas and per-project allocation ledgers.

use serde::{Deserialize, Serialize};

/// Resource limits for a single instance (or, via [`TierConfig`], a tier
/// default applied to every instance created for that tier).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuota {
    pub memory_limit_mb: u32,
    pub memory_request_mb: u32,
    pub cpu_limit_cores: f64,
    pub cpu_request_cores: f64,
    pub max_concurrent_requests: u32,
    pub max_instances: u32,
}

impl Default for ResourceQuota {
    fn default() -> Self {
        Self {
            memory_limit_mb: 512,
            memory_request_mb: 256,
            cpu_limit_cores: 1.0,
            cpu_request_cores: 0.25,
            max_concurrent_requests: 10,
            max_instances: 1,
        }
    }
}

impl ResourceQuota {
    crate::setters! {
        set { memory_limit_mb: u32, memory_request_mb: u32, cpu_limit_cores: f64, cpu_request_cores: f64,
              max_concurrent_requests: u32, max_instances: u32 }
    }

    /// Validate internal consistency, returning every violation found (not
    /// just the first) so callers can report them all at once.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.memory_limit_mb < self.memory_request_mb {
            errors.push("memory_limit_mb must be >= memory_request_mb".to_string());
        }
        if self.cpu_limit_cores < self.cpu_request_cores {
            errors.push("cpu_limit_cores must be >= cpu_request_cores".to_string());
        }
        if self.max_concurrent_requests < 1 {
            errors.push("max_concurrent_requests must be >= 1".to_string());
        }
        if self.max_instances < 1 {
            errors.push("max_instances must be >= 1".to_string());
        }
        errors
    }
}

/// Live resource usage, either for one project or aggregated globally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub memory_used_mb: u32,
    pub cpu_used_cores: f64,
    pub active_instances: u32,
    pub active_requests: u32,
}

/// Ledger entry for a `(tenant, project)` pair: its quota plus live counters.
///
/// Invariants (see spec §3, §8): `active_instances <= quota.max_instances`;
/// `active_requests <= max_instances * max_concurrent_requests`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectAllocation {
    pub tenant: String,
    pub project: String,
    pub quota: ResourceQuota,
    pub usage: ResourceUsage,
}

impl ProjectAllocation {
    pub fn new(tenant: impl Into<String>, project: impl Into<String>, quota: ResourceQuota) -> Self {
        Self { tenant: tenant.into(), project: project.into(), quota, usage: ResourceUsage::default() }
    }

    pub fn request_cap(&self) -> u32 {
        self.quota.max_instances.saturating_mul(self.quota.max_concurrent_requests)
    }
}
