//! Classifier output types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::models::credential::Credential;

/// How overdue a rotatable credential is.
///
/// Variant order is the escalation order `Ok < Warning < Critical < Expired`.
/// `Unknown` sits outside that ordering and is never auto-rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskState {
    /// Younger than the warning threshold.
    Ok,
    /// At or past the warning threshold.
    Warning,
    /// At or past the critical threshold.
    Critical,
    /// At or past the maximum age.
    Expired,
    /// Issuance time missing or implausibly far in the future.
    Unknown,
}

impl RiskState {
    /// Label shown to operators.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Expired => "EXPIRED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Position in the escalation order; `None` for `Unknown`.
    pub const fn rank(&self) -> Option<u8> {
        match self {
            Self::Ok => Some(0),
            Self::Warning => Some(1),
            Self::Critical => Some(2),
            Self::Expired => Some(3),
            Self::Unknown => None,
        }
    }

    /// Severity used for exit codes and alerts.
    pub const fn severity(&self) -> Severity {
        match self {
            Self::Ok => Severity::Ok,
            Self::Warning | Self::Unknown => Severity::Warning,
            Self::Critical | Self::Expired => Severity::Critical,
        }
    }

    /// WARNING or worse, with a known age.
    pub const fn warrants_rotation(&self) -> bool {
        matches!(self, Self::Warning | Self::Critical | Self::Expired)
    }
}

impl fmt::Display for RiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review status of a federated binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    /// Reviewed within the review period.
    Current,
    /// Review period has elapsed.
    Due,
    /// No creation time reported.
    Unknown,
}

impl ReviewState {
    /// Label shown to operators.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "REVIEW_CURRENT",
            Self::Due => "REVIEW_DUE",
            Self::Unknown => "REVIEW_UNKNOWN",
        }
    }

    /// Severity used for exit codes and alerts.
    pub const fn severity(&self) -> Severity {
        match self {
            Self::Current => Severity::Ok,
            Self::Due | Self::Unknown => Severity::Warning,
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alerting severity, used for exit codes and notification routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Nothing to do.
    Ok,
    /// Needs attention soon.
    Warning,
    /// Needs attention now.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Critical => "critical",
        })
    }
}

/// Which track a credential was classified on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "track", content = "state", rename_all = "snake_case")]
pub enum Assessment {
    /// Long-lived key, rated by age against the policy.
    Rotation(RiskState),
    /// Federated binding, rated by review period.
    Review(ReviewState),
}

impl Assessment {
    /// Severity of the underlying state.
    pub const fn severity(&self) -> Severity {
        match self {
            Self::Rotation(r) => r.severity(),
            Self::Review(r) => r.severity(),
        }
    }

    /// Label of the underlying state.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Rotation(r) => r.as_str(),
            Self::Review(r) => r.as_str(),
        }
    }

    /// Risk state on the rotation track, `None` for reviews.
    pub const fn risk(&self) -> Option<RiskState> {
        match self {
            Self::Rotation(r) => Some(*r),
            Self::Review(_) => None,
        }
    }
}

/// One credential's classification, tagged with inventory freshness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// The classified credential.
    pub credential: Credential,
    /// Track and state.
    pub assessment: Assessment,
    /// Age at classification time; `None` when unknown.
    #[serde(with = "humantime_serde")]
    pub age: Option<Duration>,
    /// Inventory slice was stale when classified.
    pub stale: bool,
}

impl Classification {
    /// Severity of the assessment.
    pub const fn severity(&self) -> Severity {
        self.assessment.severity()
    }

    /// WARNING or worse on the rotation track.
    pub fn eligible_for_rotation(&self) -> bool {
        self.assessment
            .risk()
            .is_some_and(|r| r.warrants_rotation())
    }

    /// True when `self` is strictly worse than `previous` on the same track.
    pub fn escalated_from(&self, previous: &Assessment) -> bool {
        match (previous, &self.assessment) {
            (Assessment::Rotation(prev), Assessment::Rotation(cur)) => {
                match (prev.rank(), cur.rank()) {
                    (Some(p), Some(c)) => c > p,
                    (Some(_), None) => true,
                    _ => false,
                }
            }
            (Assessment::Review(prev), Assessment::Review(cur)) => {
                cur.severity() > prev.severity()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(RiskState::Ok.severity(), Severity::Ok);
        assert_eq!(RiskState::Warning.severity(), Severity::Warning);
        assert_eq!(RiskState::Unknown.severity(), Severity::Warning);
        assert_eq!(RiskState::Critical.severity(), Severity::Critical);
        assert_eq!(RiskState::Expired.severity(), Severity::Critical);
        assert_eq!(ReviewState::Due.severity(), Severity::Warning);
    }

    #[test]
    fn test_unknown_is_not_rotated() {
        assert!(!RiskState::Unknown.warrants_rotation());
        assert!(!RiskState::Ok.warrants_rotation());
        assert!(RiskState::Warning.warrants_rotation());
        assert!(RiskState::Expired.warrants_rotation());
    }

    #[test]
    fn test_assessment_serialization() {
        let json = serde_json::to_value(Assessment::Rotation(RiskState::Critical)).unwrap();
        assert_eq!(json, serde_json::json!({"track": "rotation", "state": "CRITICAL"}));
    }
}
