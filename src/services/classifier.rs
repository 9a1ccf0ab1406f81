//! Health classification of credentials against rotation policy.
//!
//! [`classify`] is a pure function of `(credential, policy, now)`. The
//! [`HealthClassifier`] wraps it with a hot-swappable [`PolicySet`] so a policy
//! reload never blocks readers.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use crate::domain::models::{
    Assessment, Classification, Credential, PolicySet, ReviewState, RiskState, RotationPolicy,
};
use crate::services::inventory::InventoryItem;

/// Issuance times further in the future than this are not trusted.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(5 * 60);

/// Age of a credential at `now`.
///
/// `None` when the issuance time is missing or lies beyond the tolerated clock
/// skew. Smaller skews clamp to zero.
pub fn credential_age(issued_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<Duration> {
    let issued_at = issued_at?;
    match (now - issued_at).to_std() {
        Ok(age) => Some(age),
        Err(_) => {
            let ahead = (issued_at - now).to_std().ok()?;
            (ahead <= MAX_CLOCK_SKEW).then_some(Duration::ZERO)
        }
    }
}

/// Map an age onto the rotation track. Thresholds are inclusive on the
/// higher state.
pub fn risk_for_age(age: Duration, policy: &RotationPolicy) -> RiskState {
    if age >= policy.max_age {
        RiskState::Expired
    } else if age >= policy.critical_threshold {
        RiskState::Critical
    } else if age >= policy.warning_threshold {
        RiskState::Warning
    } else {
        RiskState::Ok
    }
}

/// Classify one credential.
pub fn classify(credential: &Credential, policy: &RotationPolicy, now: DateTime<Utc>) -> Classification {
    let age = credential_age(credential.issued_at, now);

    let assessment = if credential.kind.is_rotatable() {
        Assessment::Rotation(age.map_or(RiskState::Unknown, |a| risk_for_age(a, policy)))
    } else {
        Assessment::Review(match age {
            None => ReviewState::Unknown,
            Some(a) if a >= policy.review_period => ReviewState::Due,
            Some(_) => ReviewState::Current,
        })
    };

    Classification {
        credential: credential.clone(),
        assessment,
        age,
        stale: false,
    }
}

/// Classifier bound to the currently active policy set.
pub struct HealthClassifier {
    policies: ArcSwap<PolicySet>,
}

impl HealthClassifier {
    /// Classifier starting with `policies`.
    pub fn new(policies: PolicySet) -> Self {
        Self {
            policies: ArcSwap::from_pointee(policies),
        }
    }

    /// Atomically install a new, already validated policy set.
    pub fn reload_policy(&self, policies: PolicySet) {
        self.policies.store(Arc::new(policies));
    }

    /// Snapshot of the active policy set.
    pub fn policies(&self) -> Arc<PolicySet> {
        self.policies.load_full()
    }

    /// Policy that applies to `credential`.
    pub fn policy_for(&self, credential: &Credential) -> RotationPolicy {
        self.policies
            .load()
            .resolve(&credential.provider, &credential.principal)
            .clone()
    }

    /// Classify one credential under the active policy.
    pub fn classify(&self, credential: &Credential, now: DateTime<Utc>) -> Classification {
        let policies = self.policies.load();
        classify(
            credential,
            policies.resolve(&credential.provider, &credential.principal),
            now,
        )
    }

    /// Classify inventory items, carrying their freshness into the result.
    pub fn classify_all(&self, items: &[InventoryItem], now: DateTime<Utc>) -> Vec<Classification> {
        let policies = self.policies.load();
        items
            .iter()
            .map(|item| {
                let policy = policies.resolve(&item.credential.provider, &item.credential.principal);
                let mut classification = classify(&item.credential, policy, now);
                classification.stale = item.stale;
                classification
            })
            .collect()
    }
}
