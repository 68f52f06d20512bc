use super::*;

#[yare::parameterized(
    quota_exceeded = { PoolError::QuotaExceeded { scope: "acme".into(), message: "memory".into() }, "quota exceeded (acme): memory" },
    max_instances = { PoolError::MaxInstances { tier: "cold" }, "instance ceiling reached for tier cold" },
)]
fn display_matches(err: PoolError, expected: &str) {
    assert_eq!(err.to_string(), expected);
}

#[test]
fn not_found_displays_key() {
    let key = InstanceKey::new("acme", "proj", "default");
    let err = PoolError::NotFound(key.clone());
    assert!(err.to_string().contains(key.as_str()));
}
