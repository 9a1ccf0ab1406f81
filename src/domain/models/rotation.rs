//! Rotation workflow states and the append-only rotation record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::credential::{PrincipalKey, ProviderId};

/// Per-credential rotation state machine.
///
/// `Idle -> Creating -> Validating -> CutoverWindow -> CleanupPending -> Done`,
/// with `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationState {
    /// Not started.
    Idle,
    /// Asking the control plane for a new credential.
    Creating,
    /// Proving the new credential authenticates.
    Validating,
    /// Both credentials live; consumers move over during the grace window.
    CutoverWindow,
    /// Revoking the predecessor.
    CleanupPending,
    /// Predecessor revoked.
    Done,
    /// Stopped; the predecessor is untouched.
    Failed,
}

impl RotationState {
    /// Wire and display name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Creating => "creating",
            Self::Validating => "validating",
            Self::CutoverWindow => "cutover_window",
            Self::CleanupPending => "cleanup_pending",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// `Done` and `Failed` accept no further transition.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// True if `next` is a legal successor of this state.
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Idle, Self::Creating)
            | (Self::Creating, Self::Validating)
            | (Self::Validating, Self::CutoverWindow)
            | (Self::CutoverWindow, Self::CleanupPending)
            | (Self::CleanupPending, Self::Done) => true,
            (from, Self::Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Cancellation is honored only before a new credential has been validated.
    pub const fn accepts_cancellation(&self) -> bool {
        matches!(self, Self::Idle | Self::Creating | Self::Validating)
    }
}

impl fmt::Display for RotationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded on a rotation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationOutcome {
    /// Predecessor revoked.
    Success,
    /// Stopped before cleanup.
    Failed,
    /// Replacement validated; predecessor awaits cleanup.
    PendingCleanup,
}

impl RotationOutcome {
    /// Wire and display name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::PendingCleanup => "pending-cleanup",
        }
    }
}

impl fmt::Display for RotationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RotationOutcome {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "pending-cleanup" => Ok(Self::PendingCleanup),
            other => Err(DomainError::Serialization(format!(
                "unknown rotation outcome: {other}"
            ))),
        }
    }
}

/// Who started an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Initiator {
    /// The scheduler.
    Scheduled,
    /// A named operator.
    Operator(String),
}

impl Initiator {
    /// Operator initiator.
    pub fn operator(name: impl Into<String>) -> Self {
        Self::Operator(name.into())
    }
}

impl fmt::Display for Initiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => f.write_str("scheduled"),
            Self::Operator(name) => f.write_str(name),
        }
    }
}

impl From<String> for Initiator {
    fn from(s: String) -> Self {
        if s == "scheduled" {
            Self::Scheduled
        } else {
            Self::Operator(s)
        }
    }
}

impl From<Initiator> for String {
    fn from(i: Initiator) -> Self {
        i.to_string()
    }
}

/// Append-only fact of one rotation attempt.
///
/// Settles to exactly one outcome. A parked rotation that is later cleaned up
/// produces a new record whose `supersedes` points at the parked one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationRecord {
    /// Record id.
    pub id: Uuid,
    /// Provider of the rotated principal.
    pub provider: ProviderId,
    /// Rotated principal.
    pub principal: String,
    /// The predecessor credential.
    pub credential_id: String,
    /// Replacement credential, once created.
    pub new_credential_id: Option<String>,
    /// When the rotation (or cleanup) started.
    pub started_at: DateTime<Utc>,
    /// When the record settled.
    pub completed_at: Option<DateTime<Utc>>,
    /// `None` while in flight.
    pub outcome: Option<RotationOutcome>,
    /// Who started it.
    pub initiator: Initiator,
    /// Parked record this one completes.
    pub supersedes: Option<Uuid>,
    /// Failure reason, if any.
    pub detail: Option<String>,
}

impl RotationRecord {
    /// Open a record for rotating `credential_id`.
    pub fn start(
        key: &PrincipalKey,
        credential_id: impl Into<String>,
        initiator: Initiator,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: key.provider.clone(),
            principal: key.principal.clone(),
            credential_id: credential_id.into(),
            new_credential_id: None,
            started_at: now,
            completed_at: None,
            outcome: None,
            initiator,
            supersedes: None,
            detail: None,
        }
    }

    /// Start a follow-up record for completing a parked rotation.
    pub fn follow_up(&self, initiator: Initiator, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: self.provider.clone(),
            principal: self.principal.clone(),
            credential_id: self.credential_id.clone(),
            new_credential_id: self.new_credential_id.clone(),
            started_at: now,
            completed_at: None,
            outcome: None,
            initiator,
            supersedes: Some(self.id),
            detail: None,
        }
    }

    /// Lock key of the rotated principal.
    pub fn principal_key(&self) -> PrincipalKey {
        PrincipalKey::new(self.provider.clone(), self.principal.clone())
    }

    /// True once an outcome is recorded.
    pub const fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }

    /// Set the one and only outcome of this record.
    pub fn settle(
        &mut self,
        outcome: RotationOutcome,
        now: DateTime<Utc>,
        detail: Option<String>,
    ) -> DomainResult<()> {
        if let Some(existing) = self.outcome {
            return Err(DomainError::InvalidStateTransition {
                from: existing.to_string(),
                to: outcome.to_string(),
            });
        }
        self.outcome = Some(outcome);
        self.completed_at = Some(now);
        self.detail = detail;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use RotationState::*;
        let path = [Idle, Creating, Validating, CutoverWindow, CleanupPending, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_no_skipping_validation() {
        assert!(!RotationState::Creating.can_transition_to(RotationState::CutoverWindow));
        assert!(!RotationState::Creating.can_transition_to(RotationState::CleanupPending));
        assert!(!RotationState::Validating.can_transition_to(RotationState::Done));
    }

    #[test]
    fn test_failed_is_absorbing() {
        assert!(RotationState::CutoverWindow.can_transition_to(RotationState::Failed));
        assert!(!RotationState::Failed.can_transition_to(RotationState::Creating));
        assert!(!RotationState::Done.can_transition_to(RotationState::Failed));
    }

    #[test]
    fn test_cancellation_window() {
        assert!(RotationState::Creating.accepts_cancellation());
        assert!(!RotationState::CutoverWindow.accepts_cancellation());
        assert!(!RotationState::CleanupPending.accepts_cancellation());
    }

    #[test]
    fn test_record_settles_once() {
        let key = PrincipalKey::new(ProviderId::new("local"), "svc");
        let mut record = RotationRecord::start(&key, "k1", Initiator::Scheduled, Utc::now());
        record.settle(RotationOutcome::PendingCleanup, Utc::now(), None).unwrap();
        let err = record.settle(RotationOutcome::Success, Utc::now(), None);
        assert!(matches!(err, Err(DomainError::InvalidStateTransition { .. })));
        assert_eq!(record.outcome, Some(RotationOutcome::PendingCleanup));
    }

    #[test]
    fn test_follow_up_references_original() {
        let key = PrincipalKey::new(ProviderId::new("local"), "svc");
        let mut record = RotationRecord::start(&key, "k1", Initiator::Scheduled, Utc::now());
        record.new_credential_id = Some("k2".to_string());
        let next = record.follow_up(Initiator::operator("alice"), Utc::now());
        assert_eq!(next.supersedes, Some(record.id));
        assert_eq!(next.new_credential_id.as_deref(), Some("k2"));
        assert!(next.outcome.is_none());
    }

    #[test]
    fn test_initiator_serializes_as_string() {
        assert_eq!(serde_json::to_string(&Initiator::Scheduled).unwrap(), "\"scheduled\"");
        let op: Initiator = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(op, Initiator::operator("alice"));
    }
}
