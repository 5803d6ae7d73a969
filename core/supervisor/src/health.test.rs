use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::health::RestartPolicy;

#[test]
fn delays_double_up_to_the_cap() {
    let policy = RestartPolicy::default();
    let delays: Vec<u64> = (1..=7).map(|n| policy.delay_for(n).as_millis() as u64).collect();
    assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
}

#[test]
fn delays_are_strictly_increasing_below_the_cap() {
    let policy = RestartPolicy::default();
    let mut prev = Duration::ZERO;
    for n in 1..=5 {
        let delay = policy.delay_for(n);
        assert!(delay > prev, "attempt {n}: {delay:?} <= {prev:?}");
        prev = delay;
    }
}

#[test]
fn budget_is_exhausted_strictly_beyond_max_restarts() {
    let policy = RestartPolicy::default();
    assert!(!policy.exhausted(5));
    assert!(policy.exhausted(6));
}

#[test]
fn large_attempt_numbers_do_not_overflow() {
    let policy = RestartPolicy {
        max_restarts: 3,
        base_delay_ms: 1_000,
        cap_delay_ms: 30_000,
    };
    assert_eq!(policy.delay_for(500), Duration::from_millis(30_000));
}

#[test]
fn deserializes_with_defaults() {
    let policy: RestartPolicy = serde_json::from_str("{}").unwrap();
    assert_eq!(policy, RestartPolicy::default());

    let policy: RestartPolicy = serde_json::from_str(r#"{"max_restarts": 2}"#).unwrap();
    assert_eq!(policy.max_restarts, 2);
    assert_eq!(policy.base_delay_ms, 1_000);
}
