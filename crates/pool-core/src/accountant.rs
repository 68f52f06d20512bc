// SPDX-License-Identifier: MIT

//! The resource accountant: per-project and global quotas for memory, CPU,
//! instance count, and concurrent requests.
//!
//! All mutations are guarded by a single mutex (§5: "Resource accountant:
//! one mutex"). Every `acquire_*` is expected to be paired with exactly one
//! `release_*` over an instance's lifetime (§8 invariant 5); callers that
//! leak an acquire permanently inflate the project's counters.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{PoolError, PoolResult};
use crate::quota::{ProjectAllocation, ResourceQuota, ResourceUsage};

/// Global ceilings enforced across every project's allocation.
#[derive(Debug, Clone, Copy)]
pub struct GlobalLimits {
    pub max_total_instances: u32,
    pub max_total_memory_mb: u32,
    pub max_total_cpu_cores: f64,
}

impl Default for GlobalLimits {
    fn default() -> Self {
        Self { max_total_instances: 100, max_total_memory_mb: 32_768, max_total_cpu_cores: 16.0 }
    }
}

struct Ledger {
    allocations: HashMap<(String, String), ProjectAllocation>,
    limits: GlobalLimits,
}

impl Ledger {
    fn global_usage(&self) -> ResourceUsage {
        self.allocations.values().fold(ResourceUsage::default(), |mut acc, a| {
            acc.memory_used_mb += a.usage.memory_used_mb;
            acc.cpu_used_cores += a.usage.cpu_used_cores;
            acc.active_instances += a.usage.active_instances;
            acc.active_requests += a.usage.active_requests;
            acc
        })
    }
}

/// Per-project and global resource quota tracker.
///
/// A single [`parking_lot::Mutex`] guards the whole ledger — matching the
/// spec's "Resource accountant: one mutex" rule (§5) rather than one lock
/// per project, since acquire/release of global ceilings must be checked
/// atomically against every project's usage.
pub struct ResourceAccountant {
    ledger: Mutex<Ledger>,
}

impl ResourceAccountant {
    pub fn new(limits: GlobalLimits) -> Self {
        Self { ledger: Mutex::new(Ledger { allocations: HashMap::new(), limits }) }
    }

    /// Create (or return the existing) allocation for `(tenant, project)`,
    /// rejecting it if committing the quota would breach global ceilings.
    pub fn allocate(
        &self,
        tenant: &str,
        project: &str,
        quota: ResourceQuota,
    ) -> PoolResult<ProjectAllocation> {
        let errors = quota.validate();
        if !errors.is_empty() {
            return Err(PoolError::QuotaExceeded {
                scope: format!("{tenant}:{project}"),
                message: errors.join("; "),
            });
        }

        let mut ledger = self.ledger.lock();
        let key = (tenant.to_string(), project.to_string());
        if let Some(existing) = ledger.allocations.get(&key) {
            return Ok(existing.clone());
        }

        let allocation = ProjectAllocation::new(tenant, project, quota);
        ledger.allocations.insert(key, allocation.clone());
        Ok(allocation)
    }

    /// Release the `(tenant, project)` allocation. Fails if any instance is
    /// still live under it.
    pub fn release(&self, tenant: &str, project: &str) -> bool {
        let mut ledger = self.ledger.lock();
        let key = (tenant.to_string(), project.to_string());
        match ledger.allocations.get(&key) {
            Some(a) if a.usage.active_instances == 0 => {
                ledger.allocations.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Atomically reserve capacity for one more instance of `(tenant, project)`.
    pub fn acquire_instance(
        &self,
        tenant: &str,
        project: &str,
        memory_mb: u32,
        cpu_cores: f64,
    ) -> PoolResult<bool> {
        let mut ledger = self.ledger.lock();
        let global = ledger.global_usage();
        if global.active_instances + 1 > ledger.limits.max_total_instances
            || global.memory_used_mb + memory_mb > ledger.limits.max_total_memory_mb
            || global.cpu_used_cores + cpu_cores > ledger.limits.max_total_cpu_cores
        {
            return Ok(false);
        }

        let key = (tenant.to_string(), project.to_string());
        let Some(allocation) = ledger.allocations.get_mut(&key) else {
            return Err(PoolError::NotFound(crate::key::InstanceKey::new(tenant, project, "*")));
        };
        if allocation.usage.active_instances + 1 > allocation.quota.max_instances {
            return Ok(false);
        }
        allocation.usage.active_instances += 1;
        allocation.usage.memory_used_mb += memory_mb;
        allocation.usage.cpu_used_cores += cpu_cores;
        Ok(true)
    }

    pub fn release_instance(
        &self,
        tenant: &str,
        project: &str,
        memory_mb: u32,
        cpu_cores: f64,
    ) -> bool {
        let mut ledger = self.ledger.lock();
        let key = (tenant.to_string(), project.to_string());
        let Some(allocation) = ledger.allocations.get_mut(&key) else { return false };
        if allocation.usage.active_instances == 0 {
            return false;
        }
        allocation.usage.active_instances -= 1;
        allocation.usage.memory_used_mb = allocation.usage.memory_used_mb.saturating_sub(memory_mb);
        allocation.usage.cpu_used_cores = (allocation.usage.cpu_used_cores - cpu_cores).max(0.0);
        true
    }

    /// Atomically reserve one concurrent request slot, rejecting once the
    /// project's `max_instances * max_concurrent_requests` cap is reached.
    pub fn acquire_request(&self, tenant: &str, project: &str) -> bool {
        let mut ledger = self.ledger.lock();
        let key = (tenant.to_string(), project.to_string());
        let Some(allocation) = ledger.allocations.get_mut(&key) else { return false };
        if allocation.usage.active_requests + 1 > allocation.request_cap() {
            return false;
        }
        allocation.usage.active_requests += 1;
        true
    }

    pub fn release_request(&self, tenant: &str, project: &str) -> bool {
        let mut ledger = self.ledger.lock();
        let key = (tenant.to_string(), project.to_string());
        let Some(allocation) = ledger.allocations.get_mut(&key) else { return false };
        if allocation.usage.active_requests == 0 {
            return false;
        }
        allocation.usage.active_requests -= 1;
        true
    }

    pub fn usage(&self, tenant: &str, project: &str) -> Option<ResourceUsage> {
        let ledger = self.ledger.lock();
        ledger.allocations.get(&(tenant.to_string(), project.to_string())).map(|a| a.usage)
    }

    pub fn global_usage(&self) -> ResourceUsage {
        self.ledger.lock().global_usage()
    }

    /// Update a project's quota. Rejected if it would leave the project
    /// over-subscribed relative to its currently active instances.
    pub fn update_quota(&self, tenant: &str, project: &str, new_quota: ResourceQuota) -> bool {
        let mut ledger = self.ledger.lock();
        let key = (tenant.to_string(), project.to_string());
        let Some(allocation) = ledger.allocations.get_mut(&key) else { return false };
        if allocation.usage.active_instances > new_quota.max_instances {
            return false;
        }
        allocation.quota = new_quota;
        true
    }
}

impl Default for ResourceAccountant {
    fn default() -> Self {
        Self::new(GlobalLimits::default())
    }
}

#[cfg(test)]
#[path = "accountant_tests.rs"]
mod tests;
