//! Process exit codes.
//!
//! `check`: 0 OK, 1 WARNING, 2 CRITICAL or EXPIRED.
//! Actions: 0 done (incl. parked), 3 nothing to do, 4 partial failure,
//! 5 failed. 64 for a rejected request, 70 for anything fatal.

use crate::domain::errors::DomainError;
use crate::domain::models::{RevocationOutcome, Severity};
use crate::infrastructure::config::ConfigError;
use crate::services::RotationReport;

/// Healthy, or the action finished.
pub const OK: u8 = 0;
/// Worst credential is in WARNING.
pub const WARNING: u8 = 1;
/// Worst credential is CRITICAL or EXPIRED.
pub const CRITICAL: u8 = 2;
/// No action was needed.
pub const NOTHING_TO_DO: u8 = 3;
/// Some of a batch failed.
pub const PARTIAL_FAILURE: u8 = 4;
/// The action failed.
pub const FAILED: u8 = 5;
/// The request was rejected before anything ran.
pub const USAGE: u8 = 64;
/// Audit log, record store or configuration unavailable.
pub const FATAL: u8 = 70;

/// Exit code for `check`.
pub const fn for_severity(severity: Severity) -> u8 {
    match severity {
        Severity::Ok => OK,
        Severity::Warning => WARNING,
        Severity::Critical => CRITICAL,
    }
}

/// Exit code for a single rotation or cleanup.
pub const fn for_rotation(report: &RotationReport) -> u8 {
    match report {
        RotationReport::Completed { .. } | RotationReport::Parked { .. } => OK,
        RotationReport::DuplicateSuppressed { .. } | RotationReport::NothingToDo { .. } => NOTHING_TO_DO,
        RotationReport::Failed { .. } | RotationReport::Cancelled { .. } => FAILED,
    }
}

/// Aggregate over a batch: any success plus any failure is partial.
pub fn for_rotations(reports: &[RotationReport]) -> u8 {
    let acted = reports.iter().filter(|r| !r.is_noop()).count();
    let failed = reports.iter().filter(|r| for_rotation(r) == FAILED).count();
    match (acted, failed) {
        (0, _) => NOTHING_TO_DO,
        (_, 0) => OK,
        (a, f) if f == a => FAILED,
        _ => PARTIAL_FAILURE,
    }
}

/// Exit code for an emergency revocation.
pub const fn for_revocation(outcome: RevocationOutcome) -> u8 {
    match outcome {
        RevocationOutcome::Success => OK,
        RevocationOutcome::NothingToRevoke => NOTHING_TO_DO,
        RevocationOutcome::PartialFailure => PARTIAL_FAILURE,
        RevocationOutcome::Failed => FAILED,
    }
}

/// Map an error that escaped a command.
pub fn for_error(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ConfigError>().is_some() {
        return FATAL;
    }
    match err.downcast_ref::<DomainError>() {
        Some(e) if e.is_fatal() => FATAL,
        Some(DomainError::Provider(_)) => FAILED,
        Some(DomainError::ConcurrencyConflict { .. }) => NOTHING_TO_DO,
        Some(
            DomainError::InvalidRequest(_)
            | DomainError::ConfirmationRejected(_)
            | DomainError::UnknownProvider(_)
            | DomainError::CredentialNotFound(_)
            | DomainError::RotationRecordNotFound(_)
            | DomainError::InvalidStateTransition { .. },
        ) => USAGE,
        _ => FATAL,
    }
}
