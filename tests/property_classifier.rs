//! Property-based tests for health classification
//!
//! Tests the following properties:
//! 1. Monotonicity: an older credential is never in a better state
//! 2. Boundaries: each threshold belongs to the higher state
//! 3. Skew: issuance up to five minutes ahead counts as age zero, beyond is UNKNOWN
//! 4. Federated bindings are only ever reviewed

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use keywarden::domain::models::{
    Assessment, Credential, CredentialKind, ProviderId, ReviewState, RiskState, RotationPolicy,
};
use keywarden::services::classifier::{classify, credential_age, risk_for_age, MAX_CLOCK_SKEW};

const DAY: u64 = 24 * 60 * 60;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// Policies with `0 < warning < critical < max`.
fn policy_strategy() -> impl Strategy<Value = RotationPolicy> {
    (1u64..200, 1u64..200, 1u64..200, 1u64..400).prop_map(|(w, c, m, review)| RotationPolicy {
        warning_threshold: Duration::from_secs(w * DAY),
        critical_threshold: Duration::from_secs((w + c) * DAY),
        max_age: Duration::from_secs((w + c + m) * DAY),
        grace_window: Duration::from_secs(DAY),
        review_period: Duration::from_secs(review * DAY),
        auto_rotate: false,
        auto_cleanup: false,
    })
}

fn credential(kind: CredentialKind, issued_at: Option<DateTime<Utc>>) -> Credential {
    Credential {
        id: "k1".to_string(),
        principal: "svc".to_string(),
        provider: ProviderId::new("mem"),
        project: "proj".to_string(),
        kind,
        issued_at,
    }
}

proptest! {
    #[test]
    fn proptest_risk_is_monotonic_in_age(
        policy in policy_strategy(),
        a in 0u64..1_000 * DAY,
        b in 0u64..1_000 * DAY,
    ) {
        let (younger, older) = if a <= b { (a, b) } else { (b, a) };
        let r1 = risk_for_age(Duration::from_secs(younger), &policy);
        let r2 = risk_for_age(Duration::from_secs(older), &policy);
        prop_assert!(r1.rank() <= r2.rank());
    }

    #[test]
    fn proptest_thresholds_are_inclusive(policy in policy_strategy()) {
        let just_below = |d: Duration| d - Duration::from_secs(1);

        prop_assert_eq!(risk_for_age(just_below(policy.warning_threshold), &policy), RiskState::Ok);
        prop_assert_eq!(risk_for_age(policy.warning_threshold, &policy), RiskState::Warning);
        prop_assert_eq!(risk_for_age(just_below(policy.critical_threshold), &policy), RiskState::Warning);
        prop_assert_eq!(risk_for_age(policy.critical_threshold, &policy), RiskState::Critical);
        prop_assert_eq!(risk_for_age(just_below(policy.max_age), &policy), RiskState::Critical);
        prop_assert_eq!(risk_for_age(policy.max_age, &policy), RiskState::Expired);
    }

    #[test]
    fn proptest_small_future_skew_clamps_to_zero(ahead in 0i64..=300) {
        let issued = now() + chrono::Duration::seconds(ahead);
        prop_assert_eq!(credential_age(Some(issued), now()), Some(Duration::ZERO));
    }

    #[test]
    fn proptest_large_future_skew_is_unknown(
        policy in policy_strategy(),
        ahead in (MAX_CLOCK_SKEW.as_secs() as i64 + 1)..(365 * DAY as i64),
    ) {
        let issued = now() + chrono::Duration::seconds(ahead);
        let c = classify(&credential(CredentialKind::LongLivedKey, Some(issued)), &policy, now());
        prop_assert_eq!(c.assessment, Assessment::Rotation(RiskState::Unknown));
        prop_assert!(c.age.is_none());
    }

    #[test]
    fn proptest_federated_bindings_are_never_on_rotation_track(
        policy in policy_strategy(),
        age_days in proptest::option::of(0i64..2_000),
    ) {
        let issued = age_days.map(|d| now() - chrono::Duration::days(d));
        let c = classify(&credential(CredentialKind::FederatedTokenBinding, issued), &policy, now());
        prop_assert!(matches!(c.assessment, Assessment::Review(_)));
        prop_assert!(!c.eligible_for_rotation());
    }
}

#[test]
fn test_missing_issuance_is_unknown_on_both_tracks() {
    let policy = RotationPolicy {
        max_age: Duration::from_secs(90 * DAY),
        warning_threshold: Duration::from_secs(75 * DAY),
        critical_threshold: Duration::from_secs(85 * DAY),
        grace_window: Duration::from_secs(DAY),
        review_period: Duration::from_secs(180 * DAY),
        auto_rotate: false,
        auto_cleanup: false,
    };

    let key = classify(&credential(CredentialKind::LongLivedKey, None), &policy, now());
    let binding = classify(&credential(CredentialKind::FederatedTokenBinding, None), &policy, now());

    assert_eq!(key.assessment, Assessment::Rotation(RiskState::Unknown));
    assert_eq!(binding.assessment, Assessment::Review(ReviewState::Unknown));
}
