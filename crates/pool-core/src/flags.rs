// SPDX-License-Identifier: MIT

//! Feature-flag gate governing per-tenant/per-project rollout.
//!
//! `is_enabled` is a pure function of `(flag snapshot, tenant, project, now)`
//! (§8 invariant 8) — callers pass `now_ms` explicitly rather than the gate
//! reaching for a clock itself, so evaluation is trivially deterministic and
//! replayable in tests.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutStrategy {
    All,
    None,
    Percentage,
    Allowlist,
    Denylist,
    Gradual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub name: String,
    pub enabled: bool,
    pub strategy: RolloutStrategy,
    pub percentage: f64,
    pub tenant_allowlist: HashSet<String>,
    pub tenant_denylist: HashSet<String>,
    pub project_allowlist: HashSet<String>,
    pub project_denylist: HashSet<String>,
    /// Gradual rollout window, as epoch milliseconds.
    pub start_date_ms: Option<u64>,
    pub end_date_ms: Option<u64>,
    pub start_percentage: f64,
    pub end_percentage: f64,
}

impl FeatureFlag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: false,
            strategy: RolloutStrategy::None,
            percentage: 0.0,
            tenant_allowlist: HashSet::new(),
            tenant_denylist: HashSet::new(),
            project_allowlist: HashSet::new(),
            project_denylist: HashSet::new(),
            start_date_ms: None,
            end_date_ms: None,
            start_percentage: 0.0,
            end_percentage: 100.0,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn strategy(mut self, strategy: RolloutStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn percentage(mut self, pct: f64) -> Self {
        self.percentage = pct.clamp(0.0, 100.0);
        self
    }

    pub fn gradual(mut self, start_date_ms: u64, end_date_ms: u64, start_pct: f64, end_pct: f64) -> Self {
        self.strategy = RolloutStrategy::Gradual;
        self.start_date_ms = Some(start_date_ms);
        self.end_date_ms = Some(end_date_ms);
        self.start_percentage = start_pct.clamp(0.0, 100.0);
        self.end_percentage = end_pct.clamp(0.0, 100.0);
        self
    }

    fn gradual_percentage_at(&self, now_ms: u64) -> f64 {
        let (Some(start), Some(end)) = (self.start_date_ms, self.end_date_ms) else {
            return self.percentage;
        };
        if now_ms <= start {
            return self.start_percentage;
        }
        if now_ms >= end || end <= start {
            return self.end_percentage;
        }
        let progress = (now_ms - start) as f64 / (end - start) as f64;
        self.start_percentage + (self.end_percentage - self.start_percentage) * progress
    }

    /// Deterministic `[0, 100)` bucket for `(name, tenant, project)`, via
    /// an md5 digest the same way the Python original does (matching its
    /// wire-compatible rollout semantics exactly, since flags may be shared
    /// across nodes via the same identity string).
    fn bucket(&self, tenant: &str, project: &str) -> u32 {
        let digest = md5::compute(format!("{}:{}:{}", self.name, tenant, project));
        let mut acc: u64 = 0;
        for byte in digest.0 {
            acc = acc.wrapping_mul(256).wrapping_add(byte as u64);
        }
        (acc % 100) as u32
    }

    fn matches_percentage(&self, tenant: &str, project: &str, pct: f64) -> bool {
        (self.bucket(tenant, project) as f64) < pct
    }

    pub fn is_enabled(&self, tenant: Option<&str>, project: Option<&str>, now_ms: u64) -> bool {
        if !self.enabled {
            return false;
        }

        match self.strategy {
            RolloutStrategy::All => true,
            RolloutStrategy::None => false,
            RolloutStrategy::Allowlist => {
                if let (Some(t), Some(p)) = (tenant, project) {
                    let scoped = format!("{t}:{p}");
                    if self.project_allowlist.contains(&scoped) {
                        return true;
                    }
                }
                tenant.map(|t| self.tenant_allowlist.contains(t)).unwrap_or(false)
            }
            RolloutStrategy::Denylist => {
                if let (Some(t), Some(p)) = (tenant, project) {
                    let scoped = format!("{t}:{p}");
                    if self.project_denylist.contains(&scoped) {
                        return false;
                    }
                }
                if tenant.map(|t| self.tenant_denylist.contains(t)).unwrap_or(false) {
                    return false;
                }
                true
            }
            RolloutStrategy::Percentage => {
                let (Some(t), Some(p)) = (tenant, project) else { return false };
                self.matches_percentage(t, p, self.percentage)
            }
            RolloutStrategy::Gradual => {
                let (Some(t), Some(p)) = (tenant, project) else { return false };
                let pct = self.gradual_percentage_at(now_ms);
                self.matches_percentage(t, p, pct)
            }
        }
    }
}

/// Pool-internal flags gating a background subsystem's own loop rather
/// than an outward-facing feature. Pre-registered (enabled, `All`) at
/// gate construction so a subsystem can be switched off per tenant/project
/// with `set_percentage`/`enable_for_tenant` without a code change.
pub const DEFAULT_FLAGS: &[&str] = &[
    "agent_pool_hot_tier",
    "agent_pool_warm_tier",
    "agent_pool_cold_tier",
    "agent_pool_health_monitor",
    "agent_pool_failure_recovery",
    "agent_pool_auto_scaling",
    "agent_pool_state_recovery",
];

/// Process-wide feature-flag sidecar. Injected into the orchestrator
/// explicitly (§9: "Do not embed it into other singletons"); `reset` exists
/// only for test isolation.
#[derive(Default)]
pub struct FeatureFlagGate {
    flags: RwLock<HashMap<String, FeatureFlag>>,
}

impl FeatureFlagGate {
    pub fn new() -> Self {
        let gate = Self::default();
        gate.register_defaults();
        gate
    }

    /// (Re-)registers [`DEFAULT_FLAGS`] as enabled for everyone. Called by
    /// `new`; exposed separately so `reset` callers can restore them.
    pub fn register_defaults(&self) {
        for name in DEFAULT_FLAGS {
            self.register(FeatureFlag::new(*name).enabled(true).strategy(RolloutStrategy::All));
        }
    }

    pub fn register(&self, flag: FeatureFlag) {
        self.flags.write().insert(flag.name.clone(), flag);
    }

    pub fn is_enabled(&self, name: &str, tenant: Option<&str>, project: Option<&str>, now_ms: u64) -> bool {
        self.flags.read().get(name).map(|f| f.is_enabled(tenant, project, now_ms)).unwrap_or(false)
    }

    pub fn set_percentage(&self, name: &str, pct: f64) -> bool {
        let mut flags = self.flags.write();
        let Some(flag) = flags.get_mut(name) else { return false };
        flag.percentage = pct.clamp(0.0, 100.0);
        true
    }

    pub fn enable_for_tenant(&self, name: &str, tenant: impl Into<String>) -> bool {
        let mut flags = self.flags.write();
        let Some(flag) = flags.get_mut(name) else { return false };
        flag.tenant_allowlist.insert(tenant.into());
        true
    }

    pub fn start_gradual_rollout(
        &self,
        name: &str,
        start_date_ms: u64,
        end_date_ms: u64,
        start_pct: f64,
        end_pct: f64,
    ) -> bool {
        let mut flags = self.flags.write();
        let Some(flag) = flags.get_mut(name) else { return false };
        *flag = std::mem::replace(flag, FeatureFlag::new(name))
            .gradual(start_date_ms, end_date_ms, start_pct, end_pct);
        flag.enabled = true;
        true
    }

    /// Test-only: clear every registered flag.
    pub fn reset(&self) {
        self.flags.write().clear();
    }
}

#[cfg(test)]
#[path = "flags_tests.rs"]
mod tests;
