//! Emergency revocation requests and records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::rotation::Initiator;

/// Token every emergency revocation must carry.
pub const CONFIRMATION_TOKEN: &str = "REVOKE-CREDENTIALS";

/// Second phrase required for project-wide revocation.
pub fn project_confirmation_phrase(project: &str) -> String {
    format!("revoke-all:{project}")
}

/// Blast radius of an emergency revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevocationScope {
    /// One credential, by id.
    SingleCredential,
    /// Every credential a principal holds.
    AllCredentialsForPrincipal,
    /// Every credential in a project or tenant.
    AllCredentialsInProject,
}

impl RevocationScope {
    /// Wire and display name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SingleCredential => "single-credential",
            Self::AllCredentialsForPrincipal => "all-credentials-for-principal",
            Self::AllCredentialsInProject => "all-credentials-in-project",
        }
    }
}

impl fmt::Display for RevocationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevocationScope {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single-credential" => Ok(Self::SingleCredential),
            "all-credentials-for-principal" => Ok(Self::AllCredentialsForPrincipal),
            "all-credentials-in-project" => Ok(Self::AllCredentialsInProject),
            other => Err(DomainError::InvalidRequest(format!(
                "unknown revocation scope '{other}'"
            ))),
        }
    }
}

/// Operator input to the emergency revocation controller.
#[derive(Debug, Clone)]
pub struct RevocationRequest {
    /// How much to revoke.
    pub scope: RevocationScope,
    /// Credential id, principal, or project depending on `scope`.
    pub target: String,
    /// Why. Must not be blank; recorded verbatim.
    pub justification: String,
    /// Must equal [`CONFIRMATION_TOKEN`].
    pub confirmation_token: String,
    /// Required for project scope; see [`project_confirmation_phrase`].
    pub project_confirmation: Option<String>,
    /// Who asked.
    pub initiator: Initiator,
}

/// Aggregate result of a revocation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevocationOutcome {
    /// Every target revoked.
    Success,
    /// Some targets revoked, some not.
    PartialFailure,
    /// No target revoked and at least one failure.
    Failed,
    /// Nothing matched the target.
    NothingToRevoke,
}

impl RevocationOutcome {
    /// Wire and display name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialFailure => "partial-failure",
            Self::Failed => "failed",
            Self::NothingToRevoke => "nothing-to-revoke",
        }
    }

    /// Outcome for a batch with these success and failure counts.
    pub const fn from_counts(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (0, 0) => Self::NothingToRevoke,
            (_, 0) => Self::Success,
            (0, _) => Self::Failed,
            _ => Self::PartialFailure,
        }
    }
}

impl fmt::Display for RevocationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevocationOutcome {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "partial-failure" => Ok(Self::PartialFailure),
            "failed" => Ok(Self::Failed),
            "nothing-to-revoke" => Ok(Self::NothingToRevoke),
            other => Err(DomainError::Serialization(format!(
                "unknown revocation outcome: {other}"
            ))),
        }
    }
}

/// A credential the controller failed to revoke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationFailure {
    /// Credential that survived, or `<provider>/*` for a provider that could not be listed.
    pub credential_id: String,
    /// Principal holding it.
    pub principal: String,
    /// Classified provider error.
    pub error: String,
}

/// Append-only fact of an emergency revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationRecord {
    /// Revocation id, also carried in every audit entry of the batch.
    pub id: Uuid,
    /// Scope requested.
    pub scope: RevocationScope,
    /// Target requested.
    pub target: String,
    /// Operator justification.
    pub justification: String,
    /// Who asked.
    pub initiator: Initiator,
    /// When `revocation_started` was audited.
    pub started_at: DateTime<Utc>,
    /// When the batch finished.
    pub completed_at: DateTime<Utc>,
    /// Aggregate result.
    pub outcome: RevocationOutcome,
    /// Credential ids a revoke was attempted for.
    pub attempted: Vec<String>,
    /// Credential ids that are gone.
    pub succeeded: Vec<String>,
    /// Targets that are still live or could not be resolved.
    pub failed: Vec<RevocationFailure>,
}

impl RevocationRecord {
    /// Number of revoked credentials.
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    /// Number of failures, unresolved providers included.
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}
