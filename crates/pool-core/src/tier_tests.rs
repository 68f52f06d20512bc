use super::*;

fn metrics(daily_requests: u64, subscription: &str, sla: f64, concurrent: u32) -> ProjectMetrics {
    ProjectMetrics {
        tenant_id: "acme".into(),
        project_id: "proj".into(),
        daily_requests,
        subscription_tier: subscription.into(),
        sla_requirement: sla,
        max_concurrent: concurrent,
    }
}

#[yare::parameterized(
    enterprise_hot = { metrics(5000, "enterprise", 0.9995, 20), ProjectTier::Hot },
    free_low_usage = { metrics(10, "free", 0.9, 1), ProjectTier::Cold },
    professional_mid = { metrics(500, "professional", 0.996, 5), ProjectTier::Warm },
)]
fn classify_matches_expected_tier(metrics: ProjectMetrics, expected: ProjectTier) {
    let classifier = ProjectClassifier::default();
    assert_eq!(classifier.classify(&metrics).tier, expected);
}

#[test]
fn should_upgrade_only_ever_promotes() {
    let classifier = ProjectClassifier::default();
    let hot_metrics = metrics(5000, "enterprise", 0.9995, 20);
    assert_eq!(classifier.should_upgrade(ProjectTier::Cold, &hot_metrics), Some(ProjectTier::Hot));
    assert_eq!(classifier.should_upgrade(ProjectTier::Hot, &hot_metrics), None);
}

#[test]
fn should_downgrade_only_ever_demotes() {
    let classifier = ProjectClassifier::default();
    let cold_metrics = metrics(10, "free", 0.9, 1);
    assert_eq!(classifier.should_downgrade(ProjectTier::Hot, &cold_metrics), Some(ProjectTier::Cold));
    assert_eq!(classifier.should_downgrade(ProjectTier::Cold, &cold_metrics), None);
}

#[test]
fn tier_ordering_is_cold_warm_hot() {
    assert!(ProjectTier::Cold < ProjectTier::Warm);
    assert!(ProjectTier::Warm < ProjectTier::Hot);
}

#[test]
fn unknown_subscription_tier_scores_as_free() {
    let classifier = ProjectClassifier::default();
    let result = classifier.classify(&metrics(10, "nonexistent", 0.9, 1));
    assert_eq!(result.subscription_score, 10);
}
