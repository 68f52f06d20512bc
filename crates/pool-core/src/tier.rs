// SPDX-License-Identifier: MIT

//! Project tier classification.
//!
//! `ProjectClassifier::classify` is a pure function of the metrics it is
//! given (§4.4: "Classifier is pure w.r.t. the provided metrics; the history
//! lives in the caller"). Promotion/demotion hysteresis and cooldown
//! tracking is the caller's (`pool-engine`) responsibility.

use serde::{Deserialize, Serialize};

/// Hosting strategy class. Ordered `Cold < Warm < Hot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectTier {
    Cold,
    Warm,
    Hot,
}

crate::simple_display! {
    ProjectTier {
        Cold => "cold",
        Warm => "warm",
        Hot => "hot",
    }
}

/// Inputs to the classifier, gathered by the caller from whatever usage
/// telemetry backs a project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectMetrics {
    pub tenant_id: String,
    pub project_id: String,
    pub daily_requests: u64,
    pub subscription_tier: String,
    pub sla_requirement: f64,
    pub max_concurrent: u32,
}

/// Tunable thresholds and weights for [`ProjectClassifier`], carrying the
/// concrete defaults recovered from the Python original's
/// `ClassificationConfig` (not named as constants in spec.md §4.4, which
/// only specifies the four weights and the two tier thresholds).
#[derive(Debug, Clone)]
pub struct ClassificationConfig {
    pub request_weight: f64,
    pub hot_request_threshold: u64,
    pub warm_request_threshold: u64,

    pub subscription_weight: f64,
    pub enterprise_score: i64,
    pub professional_score: i64,
    pub basic_score: i64,
    pub free_score: i64,

    pub sla_weight: f64,
    pub high_sla_threshold: f64,
    pub medium_sla_threshold: f64,

    pub concurrent_weight: f64,
    pub high_concurrent_threshold: u32,
    pub medium_concurrent_threshold: u32,

    pub hot_score_threshold: i64,
    pub warm_score_threshold: i64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            request_weight: 0.4,
            hot_request_threshold: 1000,
            warm_request_threshold: 100,
            subscription_weight: 0.3,
            enterprise_score: 100,
            professional_score: 70,
            basic_score: 40,
            free_score: 10,
            sla_weight: 0.2,
            high_sla_threshold: 0.999,
            medium_sla_threshold: 0.995,
            concurrent_weight: 0.1,
            high_concurrent_threshold: 10,
            medium_concurrent_threshold: 3,
            hot_score_threshold: 80,
            warm_score_threshold: 50,
        }
    }
}

/// Per-dimension breakdown and final tier for one classification call.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub tenant_id: String,
    pub project_id: String,
    pub tier: ProjectTier,
    pub score: i64,
    pub request_score: i64,
    pub subscription_score: i64,
    pub sla_score: i64,
    pub concurrent_score: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectClassifier {
    config: ClassificationConfig,
}

impl ProjectClassifier {
    pub fn new(config: ClassificationConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, metrics: &ProjectMetrics) -> ClassificationResult {
        let c = &self.config;

        let request_score = if metrics.daily_requests > c.hot_request_threshold {
            100
        } else if metrics.daily_requests > c.warm_request_threshold {
            60
        } else {
            25
        };

        let subscription_score = match metrics.subscription_tier.to_lowercase().as_str() {
            "enterprise" => c.enterprise_score,
            "professional" => c.professional_score,
            "basic" => c.basic_score,
            _ => c.free_score,
        };

        let sla_score = if metrics.sla_requirement >= c.high_sla_threshold {
            100
        } else if metrics.sla_requirement >= c.medium_sla_threshold {
            70
        } else {
            30
        };

        let concurrent_score = if metrics.max_concurrent > c.high_concurrent_threshold {
            100
        } else if metrics.max_concurrent > c.medium_concurrent_threshold {
            60
        } else {
            30
        };

        let score = (request_score as f64 * c.request_weight) as i64
            + (subscription_score as f64 * c.subscription_weight) as i64
            + (sla_score as f64 * c.sla_weight) as i64
            + (concurrent_score as f64 * c.concurrent_weight) as i64;

        let tier = if score >= c.hot_score_threshold {
            ProjectTier::Hot
        } else if score >= c.warm_score_threshold {
            ProjectTier::Warm
        } else {
            ProjectTier::Cold
        };

        ClassificationResult {
            tenant_id: metrics.tenant_id.clone(),
            project_id: metrics.project_id.clone(),
            tier,
            score,
            request_score,
            subscription_score,
            sla_score,
            concurrent_score,
        }
    }

    /// Returns the target tier if a fresh classification ranks strictly
    /// above `current_tier` (promotions follow score immediately, §4.4).
    pub fn should_upgrade(
        &self,
        current_tier: ProjectTier,
        metrics: &ProjectMetrics,
    ) -> Option<ProjectTier> {
        let result = self.classify(metrics);
        (result.tier > current_tier).then_some(result.tier)
    }

    /// Returns the target tier if a fresh classification ranks strictly
    /// below `current_tier`. Callers must additionally require this to
    /// persist for `tier_downgrade_threshold_days` consecutive evaluations
    /// before actually demoting (§4.4, §8 invariant 9) — that hysteresis
    /// is tracked by the caller, not here.
    pub fn should_downgrade(
        &self,
        current_tier: ProjectTier,
        metrics: &ProjectMetrics,
    ) -> Option<ProjectTier> {
        let result = self.classify(metrics);
        (result.tier < current_tier).then_some(result.tier)
    }
}

#[cfg(test)]
#[path = "tier_tests.rs"]
mod tests;
