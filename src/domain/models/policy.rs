//! Rotation policy and per-principal policy resolution.

use std::time::Duration;

use humantime_serde::re::humantime::format_duration;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::credential::ProviderId;

const DAY: u64 = 24 * 60 * 60;

/// Age thresholds and automation switches for one class of credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationPolicy {
    /// Age at which a key is expired.
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,

    /// Age at which a key enters WARNING.
    #[serde(with = "humantime_serde")]
    pub warning_threshold: Duration,

    /// Age at which a key enters CRITICAL.
    #[serde(with = "humantime_serde")]
    pub critical_threshold: Duration,

    /// Minimum coexistence of a new credential and its predecessor.
    #[serde(with = "humantime_serde")]
    pub grace_window: Duration,

    /// How often federated bindings must be reviewed.
    #[serde(with = "humantime_serde")]
    pub review_period: Duration,

    /// Scheduler may rotate WARNING or worse keys.
    pub auto_rotate: bool,

    /// Scheduler may revoke predecessors after the grace window.
    pub auto_cleanup: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(90 * DAY),
            warning_threshold: Duration::from_secs(75 * DAY),
            critical_threshold: Duration::from_secs(85 * DAY),
            grace_window: Duration::from_secs(DAY),
            review_period: Duration::from_secs(180 * DAY),
            auto_rotate: false,
            auto_cleanup: false,
        }
    }
}

impl RotationPolicy {
    /// Check the ordering invariant `warning < critical < max_age`.
    pub fn validate(&self) -> DomainResult<()> {
        if self.warning_threshold >= self.critical_threshold {
            return Err(DomainError::PolicyConfiguration(format!(
                "warning_threshold ({}) must be less than critical_threshold ({})",
                format_duration(self.warning_threshold),
                format_duration(self.critical_threshold),
            )));
        }
        if self.critical_threshold >= self.max_age {
            return Err(DomainError::PolicyConfiguration(format!(
                "critical_threshold ({}) must be less than max_age ({})",
                format_duration(self.critical_threshold),
                format_duration(self.max_age),
            )));
        }
        if self.review_period.is_zero() {
            return Err(DomainError::PolicyConfiguration(
                "review_period must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Names a class of principals by regex.
#[derive(Debug, Clone)]
pub struct PrincipalClass {
    /// Name referenced by overrides.
    pub name: String,
    /// Matched against the principal name.
    pub pattern: Regex,
}

/// A policy that applies to a provider, a principal class, or both.
#[derive(Debug, Clone)]
pub struct PolicyOverride {
    /// Provider the override is limited to.
    pub provider: Option<ProviderId>,
    /// Class the override is limited to.
    pub principal_class: Option<String>,
    /// Policy applied on a match.
    pub policy: RotationPolicy,
}

impl PolicyOverride {
    /// Higher wins: provider+class > class > provider.
    const fn specificity(&self) -> u8 {
        match (&self.provider, &self.principal_class) {
            (Some(_), Some(_)) => 3,
            (None, Some(_)) => 2,
            (Some(_), None) => 1,
            (None, None) => 0,
        }
    }
}

/// A validated set of policies. Only constructible through [`PolicySet::new`],
/// so holding one proves the ordering invariant was checked at load time.
#[derive(Debug, Clone)]
pub struct PolicySet {
    default: RotationPolicy,
    classes: Vec<PrincipalClass>,
    overrides: Vec<PolicyOverride>,
}

impl PolicySet {
    /// Validate every policy and override reference.
    pub fn new(
        default: RotationPolicy,
        classes: Vec<PrincipalClass>,
        overrides: Vec<PolicyOverride>,
    ) -> DomainResult<Self> {
        default.validate()?;

        for ov in &overrides {
            if ov.provider.is_none() && ov.principal_class.is_none() {
                return Err(DomainError::PolicyConfiguration(
                    "override must name a provider, a principal_class, or both".to_string(),
                ));
            }
            if let Some(class) = &ov.principal_class {
                if !classes.iter().any(|c| &c.name == class) {
                    return Err(DomainError::PolicyConfiguration(format!(
                        "override references unknown principal_class '{class}'"
                    )));
                }
            }
            ov.policy.validate().map_err(|e| match e {
                DomainError::PolicyConfiguration(msg) => DomainError::PolicyConfiguration(format!(
                    "override for provider={} class={}: {msg}",
                    ov.provider.as_ref().map_or("*", ProviderId::as_str),
                    ov.principal_class.as_deref().unwrap_or("*"),
                )),
                other => other,
            })?;
        }

        Ok(Self {
            default,
            classes,
            overrides,
        })
    }

    /// A set holding only the given default policy.
    pub fn uniform(policy: RotationPolicy) -> DomainResult<Self> {
        Self::new(policy, Vec::new(), Vec::new())
    }

    /// Policy used when no override matches.
    pub const fn default_policy(&self) -> &RotationPolicy {
        &self.default
    }

    /// First class whose pattern matches the principal.
    pub fn class_of(&self, principal: &str) -> Option<&str> {
        self.classes
            .iter()
            .find(|c| c.pattern.is_match(principal))
            .map(|c| c.name.as_str())
    }

    /// Most specific policy for a principal of a provider.
    pub fn resolve(&self, provider: &ProviderId, principal: &str) -> &RotationPolicy {
        let class = self.class_of(principal);

        self.overrides
            .iter()
            .filter(|ov| ov.provider.as_ref().is_none_or(|p| p == provider))
            .filter(|ov| {
                ov.principal_class
                    .as_deref()
                    .is_none_or(|c| Some(c) == class)
            })
            .max_by_key(|ov| ov.specificity())
            .map_or(&self.default, |ov| &ov.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(n: u64) -> Duration {
        Duration::from_secs(n * DAY)
    }

    fn policy(warning: u64, critical: u64, max: u64) -> RotationPolicy {
        RotationPolicy {
            warning_threshold: days(warning),
            critical_threshold: days(critical),
            max_age: days(max),
            ..RotationPolicy::default()
        }
    }

    #[test]
    fn test_default_policy_is_valid() {
        RotationPolicy::default().validate().expect("default must validate");
    }

    #[test]
    fn test_rejects_unordered_thresholds() {
        assert!(matches!(
            policy(85, 75, 90).validate(),
            Err(DomainError::PolicyConfiguration(_))
        ));
        assert!(matches!(
            policy(75, 90, 90).validate(),
            Err(DomainError::PolicyConfiguration(_))
        ));
        assert!(matches!(
            policy(80, 80, 90).validate(),
            Err(DomainError::PolicyConfiguration(_))
        ));
    }

    #[test]
    fn test_set_rejects_invalid_override() {
        let result = PolicySet::new(
            RotationPolicy::default(),
            vec![],
            vec![PolicyOverride {
                provider: Some(ProviderId::new("gcp:prod")),
                principal_class: None,
                policy: policy(30, 20, 40),
            }],
        );
        assert!(matches!(result, Err(DomainError::PolicyConfiguration(_))));
    }

    #[test]
    fn test_set_rejects_unknown_class() {
        let result = PolicySet::new(
            RotationPolicy::default(),
            vec![],
            vec![PolicyOverride {
                provider: None,
                principal_class: Some("ci".to_string()),
                policy: policy(10, 20, 30),
            }],
        );
        assert!(matches!(result, Err(DomainError::PolicyConfiguration(_))));
    }

    #[test]
    fn test_resolution_precedence() {
        let gcp = ProviderId::new("gcp:prod");
        let azure = ProviderId::new("azure:corp");
        let set = PolicySet::new(
            policy(75, 85, 90),
            vec![PrincipalClass {
                name: "ci".to_string(),
                pattern: Regex::new(r"^ci-").unwrap(),
            }],
            vec![
                PolicyOverride {
                    provider: Some(gcp.clone()),
                    principal_class: None,
                    policy: policy(50, 60, 70),
                },
                PolicyOverride {
                    provider: None,
                    principal_class: Some("ci".to_string()),
                    policy: policy(20, 25, 30),
                },
                PolicyOverride {
                    provider: Some(gcp.clone()),
                    principal_class: Some("ci".to_string()),
                    policy: policy(5, 6, 7),
                },
            ],
        )
        .unwrap();

        assert_eq!(set.resolve(&gcp, "ci-deployer").max_age, days(7));
        assert_eq!(set.resolve(&azure, "ci-deployer").max_age, days(30));
        assert_eq!(set.resolve(&gcp, "web").max_age, days(70));
        assert_eq!(set.resolve(&azure, "web").max_age, days(90));
    }

    #[test]
    fn test_humantime_serialization() {
        let yaml = r"
max_age: 90d
warning_threshold: 75d
critical_threshold: 85d
grace_window: 24h
review_period: 180d
auto_rotate: true
auto_cleanup: false
";
        let parsed: RotationPolicy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.max_age, days(90));
        assert_eq!(parsed.grace_window, Duration::from_secs(DAY));
        assert!(parsed.auto_rotate);
        parsed.validate().unwrap();
    }
}
