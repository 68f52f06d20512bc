// SPDX-License-Identifier: MIT

//! Tier classification hysteresis (§4.4, §3): `ProjectClassifier` in
//! `pool-core` is pure and stateless; this module owns the per-project
//! history its doc comments leave to the caller — sustained-window
//! demotion and a post-migration cooldown.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pool_core::clock::{Clock, SystemClock};
use pool_core::tier::{ProjectClassifier, ProjectMetrics, ProjectTier};

struct ProjectHistory {
    current_tier: ProjectTier,
    pending_downgrade: Option<(ProjectTier, Instant)>,
    last_migration_at: Option<Instant>,
}

/// Wraps [`ProjectClassifier`] with the promotion-immediate /
/// demotion-requires-sustained-window / cooldown-after-migration rules
/// from §4.4: "Promotions follow score immediately; demotions require a
/// sustained window."
pub struct TierClassifier<C: Clock = SystemClock> {
    classifier: ProjectClassifier,
    clock: C,
    downgrade_sustain: Duration,
    migration_cooldown: Duration,
    history: Mutex<HashMap<(String, String), ProjectHistory>>,
}

impl<C: Clock> TierClassifier<C> {
    pub fn new(classifier: ProjectClassifier, downgrade_sustain: Duration, migration_cooldown: Duration, clock: C) -> Self {
        Self {
            classifier,
            clock,
            downgrade_sustain,
            migration_cooldown,
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn current_tier(&self, tenant: &str, project: &str) -> Option<ProjectTier> {
        self.history.lock().get(&(tenant.to_string(), project.to_string())).map(|h| h.current_tier)
    }

    /// Runs [`Self::evaluate`] and returns the tracked tier afterward,
    /// regardless of whether a migration happened on this call. Seeds the
    /// history from a fresh classification on first use.
    pub fn tier_for(&self, metrics: &ProjectMetrics) -> ProjectTier {
        self.evaluate(metrics);
        self.current_tier(&metrics.tenant_id, &metrics.project_id)
            .unwrap_or_else(|| self.classifier.classify(metrics).tier)
    }

    /// Seeds a project's tracked tier without going through a migration
    /// (e.g. when a fresh instance is created and its tier is the initial
    /// classification result, not a change from some prior tier).
    pub fn seed(&self, tenant: &str, project: &str, tier: ProjectTier) {
        self.history.lock().insert(
            (tenant.to_string(), project.to_string()),
            ProjectHistory { current_tier: tier, pending_downgrade: None, last_migration_at: None },
        );
    }

    /// Evaluates fresh metrics against the tracked tier. Returns `Some(tier)`
    /// only when a migration should actually happen now.
    pub fn evaluate(&self, metrics: &ProjectMetrics) -> Option<ProjectTier> {
        let key = (metrics.tenant_id.clone(), metrics.project_id.clone());
        let mut history = self.history.lock();
        let now = self.clock.now();

        let current = history
            .entry(key)
            .or_insert_with(|| ProjectHistory {
                current_tier: self.classifier.classify(metrics).tier,
                pending_downgrade: None,
                last_migration_at: None,
            });

        if let Some(last) = current.last_migration_at {
            if now.saturating_duration_since(last) < self.migration_cooldown {
                return None;
            }
        }

        if let Some(target) = self.classifier.should_upgrade(current.current_tier, metrics) {
            current.current_tier = target;
            current.pending_downgrade = None;
            current.last_migration_at = Some(now);
            return Some(target);
        }

        if let Some(target) = self.classifier.should_downgrade(current.current_tier, metrics) {
            match current.pending_downgrade {
                Some((pending_target, since)) if pending_target == target => {
                    if now.saturating_duration_since(since) >= self.downgrade_sustain {
                        current.current_tier = target;
                        current.pending_downgrade = None;
                        current.last_migration_at = Some(now);
                        return Some(target);
                    }
                }
                _ => {
                    current.pending_downgrade = Some((target, now));
                }
            }
            return None;
        }

        current.pending_downgrade = None;
        None
    }
}

#[cfg(test)]
#[path = "classification_tests.rs"]
mod tests;
