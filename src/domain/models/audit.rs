//! Audit log entry: `{timestamp, operation, actor, target, outcome, detail}`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// State-changing operations that are audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    /// A rotation was accepted and its record opened.
    RotationStarted,
    /// A rotation moved to its next state.
    RotationTransition,
    /// A validated rotation is waiting for cleanup.
    RotationParked,
    /// The predecessor was revoked.
    RotationCompleted,
    /// A rotation stopped before cleanup.
    RotationFailed,
    /// A credential was left in place for operator review.
    CredentialFlagged,
    /// Cleanup of a parked rotation began.
    CleanupStarted,
    /// An emergency revocation passed confirmation.
    RevocationStarted,
    /// One revoke attempt of an emergency batch.
    CredentialRevoked,
    /// An emergency batch finished.
    RevocationCompleted,
    /// A credential crossed into a worse state.
    ClassifierEscalation,
}

impl AuditOperation {
    /// Name written to the audit log.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RotationStarted => "rotation_started",
            Self::RotationTransition => "rotation_transition",
            Self::RotationParked => "rotation_parked",
            Self::RotationCompleted => "rotation_completed",
            Self::RotationFailed => "rotation_failed",
            Self::CredentialFlagged => "credential_flagged",
            Self::CleanupStarted => "cleanup_started",
            Self::RevocationStarted => "revocation_started",
            Self::CredentialRevoked => "credential_revoked",
            Self::RevocationCompleted => "revocation_completed",
            Self::ClassifierEscalation => "classifier_escalation",
        }
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Done.
    Success,
    /// Not done.
    Failure,
    /// Some parts done.
    PartialSuccess,
    /// Started; a later entry settles it.
    Pending,
}

/// One immutable line of the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the operation happened.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub operation: AuditOperation,
    /// Operator name or `scheduled`.
    pub actor: String,
    /// `provider/principal`, credential id or project.
    pub target: String,
    /// How it ended.
    pub outcome: AuditOutcome,
    /// Operation-specific fields. Never contains secret material.
    #[serde(default)]
    pub detail: Value,
}

impl AuditEntry {
    /// Entry with no detail.
    pub fn new(
        operation: AuditOperation,
        actor: impl Into<String>,
        target: impl Into<String>,
        outcome: AuditOutcome,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            operation,
            actor: actor.into(),
            target: target.into(),
            outcome,
            detail: Value::Null,
        }
    }

    /// Attach operation-specific fields.
    #[must_use]
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}
