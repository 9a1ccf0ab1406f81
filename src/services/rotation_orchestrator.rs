//! Create-before-revoke rotation workflow.
//!
//! ```text
//! Idle -> Creating -> Validating -> CutoverWindow -> CleanupPending -> Done
//!            \____________\______________\________________\-> Failed
//! ```
//!
//! The predecessor credential is only ever revoked from `CleanupPending`, which
//! is only reachable after the replacement passed validation. When the grace
//! window has not elapsed or the policy does not allow unattended cleanup, the
//! workflow parks in `CutoverWindow` and hands back a manual cleanup
//! instruction.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult, ProviderError};
use crate::domain::models::{
    AuditEntry, AuditOperation, AuditOutcome, Credential, CredentialKind, Initiator,
    IssuedCredential, PrincipalFilter, PrincipalKey, RotationOutcome, RotationPolicy,
    RotationRecord, RotationState, SecretMaterial, Severity,
};
use crate::domain::ports::{Clock, Notification, ProviderAdapter, RecordStore};
use crate::services::audit_log::AuditTrail;
use crate::services::classifier::{HealthClassifier, MAX_CLOCK_SKEW};
use crate::services::locks::{RotationLease, RotationLocks};
use crate::services::notifier::Notifier;
use crate::services::provider_registry::ProviderRegistry;
use crate::services::retry::RetryPolicy;

/// How long an in-flight rotation may hold its store claim before another
/// process is allowed to take the principal over.
pub const IN_FLIGHT_CLAIM: std::time::Duration = std::time::Duration::from_secs(60 * 60);

fn claim_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    ChronoDuration::from_std(IN_FLIGHT_CLAIM)
        .ok()
        .and_then(|lease| now.checked_add_signed(lease))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// What an operator has to run to finish a parked rotation.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupInstruction {
    /// Parked rotation.
    pub record_id: Uuid,
    /// Credential that will be revoked.
    pub predecessor_id: String,
    /// Credential that replaced it.
    pub new_credential_id: String,
    /// End of the grace window.
    pub eligible_at: DateTime<Utc>,
    /// CLI invocation that runs the cleanup.
    pub command: String,
}

impl CleanupInstruction {
    pub(crate) fn for_record(record: &RotationRecord, grace_window: std::time::Duration) -> Self {
        let settled_at = record.completed_at.unwrap_or(record.started_at);
        Self {
            record_id: record.id,
            predecessor_id: record.credential_id.clone(),
            new_credential_id: record.new_credential_id.clone().unwrap_or_default(),
            eligible_at: ChronoDuration::from_std(grace_window)
                .ok()
                .and_then(|grace| settled_at.checked_add_signed(grace))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            command: format!("keywarden cleanup {}", record.id),
        }
    }
}

/// Terminal report of one rotation request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RotationReport {
    /// Predecessor revoked; the principal holds only the new credential.
    Completed {
        /// Settled record.
        record: RotationRecord,
        /// Secret of the new credential when this run created it.
        #[serde(skip)]
        secret: Option<SecretMaterial>,
    },
    /// New credential validated; predecessor awaits manual or timed cleanup.
    Parked {
        /// Record settled as pending cleanup.
        record: RotationRecord,
        /// How to finish the rotation.
        instruction: CleanupInstruction,
        /// Secret of the new credential.
        #[serde(skip)]
        secret: Option<SecretMaterial>,
    },
    /// The rotation stopped; the predecessor is untouched.
    Failed {
        /// Settled record.
        record: RotationRecord,
        /// State in which the failure happened.
        state: RotationState,
        /// Scrubbed error message.
        error: String,
    },
    /// Cancellation was observed at a state boundary.
    Cancelled {
        /// Record, if one had been opened.
        record: Option<RotationRecord>,
    },
    /// Another rotation holds the principal (in flight or parked).
    DuplicateSuppressed {
        /// Contested principal.
        key: PrincipalKey,
        /// Parked rotation holding the principal, if that is the holder.
        parked_record: Option<Uuid>,
    },
    /// No eligible credential or nothing left to clean up.
    NothingToDo {
        /// Principal that was looked at.
        key: PrincipalKey,
        /// Why nothing happened.
        reason: String,
    },
}

impl RotationReport {
    /// True for [`RotationReport::Failed`].
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// True when nothing was attempted.
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::DuplicateSuppressed { .. } | Self::NothingToDo { .. })
    }

    /// Rotation record, when one was opened.
    pub const fn record(&self) -> Option<&RotationRecord> {
        match self {
            Self::Completed { record, .. }
            | Self::Parked { record, .. }
            | Self::Failed { record, .. } => Some(record),
            Self::Cancelled { record } => record.as_ref(),
            Self::DuplicateSuppressed { .. } | Self::NothingToDo { .. } => None,
        }
    }

    /// One-time secret of the new credential, if this run created one.
    pub const fn secret(&self) -> Option<&SecretMaterial> {
        match self {
            Self::Completed { secret, .. } | Self::Parked { secret, .. } => secret.as_ref(),
            _ => None,
        }
    }
}

/// In-flight workflow bookkeeping.
struct Workflow<'a> {
    adapter: &'a dyn ProviderAdapter,
    record: RotationRecord,
    state: RotationState,
    actor: String,
    target: String,
    _lease: RotationLease,
}

/// Drives rotations and parked cleanups for every provider.
pub struct RotationOrchestrator {
    providers: ProviderRegistry,
    classifier: Arc<HealthClassifier>,
    records: Arc<dyn RecordStore>,
    audit: AuditTrail,
    notifier: Notifier,
    locks: RotationLocks,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl RotationOrchestrator {
    /// Orchestrator over shared engine parts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        providers: ProviderRegistry,
        classifier: Arc<HealthClassifier>,
        records: Arc<dyn RecordStore>,
        audit: AuditTrail,
        notifier: Notifier,
        locks: RotationLocks,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            providers,
            classifier,
            records,
            audit,
            notifier,
            locks,
            retry,
            clock,
        }
    }

    /// In-process principal locks.
    pub const fn locks(&self) -> &RotationLocks {
        &self.locks
    }

    /// Rotate the oldest long-lived key of a principal.
    #[instrument(skip(self, key, cancel), fields(key = %key), err)]
    pub async fn rotate_principal(
        &self,
        key: &PrincipalKey,
        initiator: Initiator,
        cancel: &CancellationToken,
    ) -> DomainResult<RotationReport> {
        let adapter = self.providers.get(&key.provider)?;

        let info = self
            .retry
            .execute("describe", || adapter.describe(&key.principal))
            .await?;
        if info.disabled {
            return Ok(RotationReport::NothingToDo {
                key: key.clone(),
                reason: "principal is disabled".to_string(),
            });
        }

        let filter = PrincipalFilter::single(key.principal.clone());
        let credentials = self
            .retry
            .execute("discover", || adapter.discover(&filter))
            .await?;

        let Some(predecessor) = oldest_key(credentials.iter().filter(|c| c.principal == key.principal)) else {
            return Ok(RotationReport::NothingToDo {
                key: key.clone(),
                reason: "principal has no long-lived key".to_string(),
            });
        };

        self.rotate_credential(&predecessor, initiator, cancel).await
    }

    /// Rotate a specific credential.
    #[instrument(skip(self, credential, cancel), fields(key = %credential.principal_key(), credential_id = %credential.id), err)]
    pub async fn rotate_credential(
        &self,
        credential: &Credential,
        initiator: Initiator,
        cancel: &CancellationToken,
    ) -> DomainResult<RotationReport> {
        let key = credential.principal_key();

        if !credential.kind.is_rotatable() {
            return Ok(RotationReport::NothingToDo {
                key,
                reason: format!("{} credentials are reviewed, not rotated", credential.kind),
            });
        }

        let adapter = self.providers.get(&key.provider)?;

        let Some(lease) = self.locks.try_acquire(&key) else {
            info!(key = %key, "duplicate-suppressed: rotation already in flight");
            return Ok(RotationReport::DuplicateSuppressed {
                key,
                parked_record: None,
            });
        };

        if let Some(parked) = self.records.pending_cleanup_for(&key).await? {
            info!(key = %key, parked_record = %parked.id, "duplicate-suppressed: rotation parked awaiting cleanup");
            return Ok(RotationReport::DuplicateSuppressed {
                key,
                parked_record: Some(parked.id),
            });
        }

        if cancel.is_cancelled() {
            info!(key = %key, "rotation cancelled before start");
            return Ok(RotationReport::Cancelled { record: None });
        }

        let policy = self.classifier.policy_for(credential);
        let now = self.clock.now();
        let record = RotationRecord::start(&key, credential.id.clone(), initiator.clone(), now);

        if !self
            .records
            .claim_principal(&key, record.id, now, Some(claim_expiry(now)))
            .await?
        {
            info!(key = %key, "duplicate-suppressed: principal claimed by another process");
            return Ok(RotationReport::DuplicateSuppressed {
                key,
                parked_record: None,
            });
        }

        let started = self
            .audit
            .record(
                AuditEntry::new(
                    AuditOperation::RotationStarted,
                    initiator.to_string(),
                    key.to_string(),
                    AuditOutcome::Pending,
                    now,
                )
                .with_detail(json!({
                    "record_id": record.id,
                    "predecessor_id": credential.id,
                })),
            )
            .await;
        if let Err(err) = match started {
            Ok(()) => self.records.insert_rotation(&record).await,
            Err(err) => Err(err),
        } {
            self.release_claim(&key, record.id).await;
            return Err(err);
        }

        let mut flow = Workflow {
            adapter: adapter.as_ref(),
            record,
            state: RotationState::Idle,
            actor: initiator.to_string(),
            target: key.to_string(),
            _lease: lease,
        };

        self.drive(&mut flow, &policy, cancel).await
    }

    async fn drive(
        &self,
        flow: &mut Workflow<'_>,
        policy: &RotationPolicy,
        cancel: &CancellationToken,
    ) -> DomainResult<RotationReport> {
        self.transition(flow, RotationState::Creating).await?;
        let issued = match self
            .retry
            .execute_non_idempotent("create_credential", || {
                flow.adapter.create_credential(&flow.record.principal)
            })
            .await
        {
            Ok(issued) => issued,
            Err(err) if err.is_ambiguous() => return self.fail_ambiguous_create(flow, err).await,
            Err(err) => return self.fail(flow, err.to_string(), &[]).await,
        };
        flow.record.new_credential_id = Some(issued.credential.id.clone());

        if cancel.is_cancelled() {
            return self.cancel_after_create(flow, &issued).await;
        }

        self.transition(flow, RotationState::Validating).await?;
        if let Err(err) = self
            .retry
            .execute("validate_credential", || flow.adapter.validate_credential(&issued))
            .await
        {
            return self.fail(flow, err.to_string(), std::slice::from_ref(&issued.credential)).await;
        }

        if cancel.is_cancelled() {
            warn!(target = %flow.target, "cancellation rejected: replacement credential already validated");
        }

        self.transition(flow, RotationState::CutoverWindow).await?;

        let secret = Some(issued.secret);
        if policy.auto_cleanup && policy.grace_window.is_zero() {
            return self.cleanup_in_flight(flow, secret).await;
        }
        self.park(flow, policy, secret).await
    }

    async fn transition(&self, flow: &mut Workflow<'_>, next: RotationState) -> DomainResult<()> {
        if !flow.state.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: flow.state.to_string(),
                to: next.to_string(),
            });
        }

        let entry = AuditEntry::new(
            AuditOperation::RotationTransition,
            flow.actor.clone(),
            flow.target.clone(),
            AuditOutcome::Success,
            self.clock.now(),
        )
        .with_detail(json!({
            "record_id": flow.record.id,
            "from": flow.state,
            "to": next,
            "new_credential_id": flow.record.new_credential_id,
        }));
        self.audit_or_abort(flow, entry).await?;

        info!(target = %flow.target, from = %flow.state, to = %next, "rotation transition");
        flow.state = next;
        Ok(())
    }

    /// Audit, settling the record as failed if the audit log is unavailable.
    async fn audit_or_abort(&self, flow: &mut Workflow<'_>, entry: AuditEntry) -> DomainResult<()> {
        if let Err(err) = self.audit.record(entry).await {
            if !flow.record.is_settled() {
                let detail = format!("aborted in {}: {err}", flow.state);
                if let Err(store_err) = self.settle(flow, RotationOutcome::Failed, Some(detail)).await {
                    warn!(error = %store_err, "could not settle record after audit failure");
                }
            }
            flow.state = RotationState::Failed;
            return Err(err);
        }
        Ok(())
    }

    async fn settle(
        &self,
        flow: &mut Workflow<'_>,
        outcome: RotationOutcome,
        detail: Option<String>,
    ) -> DomainResult<()> {
        let now = self.clock.now();
        self.records
            .settle_rotation(
                flow.record.id,
                outcome,
                flow.record.new_credential_id.as_deref(),
                detail.as_deref(),
                now,
            )
            .await?;
        self.update_claim(&flow.record, outcome, now).await;
        flow.record.settle(outcome, now, detail)
    }

    /// Keep the store claim in step with a settled record: a parked rotation
    /// holds the principal until cleanup, a failed cleanup hands it back to the
    /// parked record, anything else lets it go.
    async fn update_claim(&self, record: &RotationRecord, outcome: RotationOutcome, now: DateTime<Utc>) {
        let key = record.principal_key();
        let result = match (outcome, record.supersedes) {
            (RotationOutcome::PendingCleanup, _) => self
                .records
                .transfer_claim(&key, record.id, record.id, now, None)
                .await
                .map(drop),
            (RotationOutcome::Failed, Some(parked)) => self
                .records
                .transfer_claim(&key, record.id, parked, now, None)
                .await
                .map(drop),
            _ => self.records.release_claim(&key, record.id).await,
        };
        if let Err(err) = result {
            warn!(key = %key, record_id = %record.id, error = %err, "could not update rotation claim");
        }
    }

    async fn release_claim(&self, key: &PrincipalKey, record_id: Uuid) {
        if let Err(err) = self.records.release_claim(key, record_id).await {
            warn!(key = %key, record_id = %record_id, error = %err, "could not release rotation claim");
        }
    }

    /// Move to `Failed`. The predecessor is left untouched; a replacement
    /// that was already created is flagged for operator review.
    async fn fail(
        &self,
        flow: &mut Workflow<'_>,
        error: String,
        created: &[Credential],
    ) -> DomainResult<RotationReport> {
        let failed_in = flow.state;
        warn!(target = %flow.target, state = %failed_in, error = %error, "rotation failed");

        self.settle(flow, RotationOutcome::Failed, Some(format!("failed in {failed_in}: {error}")))
            .await?;
        flow.state = RotationState::Failed;

        for surplus in created {
            self.flag_surplus(flow, surplus, &error).await?;
        }

        self.audit
            .record(
                AuditEntry::new(
                    AuditOperation::RotationFailed,
                    flow.actor.clone(),
                    flow.target.clone(),
                    AuditOutcome::Failure,
                    self.clock.now(),
                )
                .with_detail(json!({
                    "record_id": flow.record.id,
                    "state": failed_in,
                    "error": error,
                    "predecessor_id": flow.record.credential_id,
                    "new_credential_id": flow.record.new_credential_id,
                })),
            )
            .await?;

        self.notifier
            .notify(
                Notification::new(
                    Severity::Critical,
                    format!("Rotation failed for {}", flow.target),
                    format!(
                        "Rotation {} failed in {failed_in}: {error}. Predecessor {} is still active.",
                        flow.record.id, flow.record.credential_id
                    ),
                )
                .with_target(flow.target.clone()),
            )
            .await;

        Ok(RotationReport::Failed {
            record: flow.record.clone(),
            state: failed_in,
            error,
        })
    }

    /// A create that timed out may still have minted a key. Fail the rotation
    /// and flag any key issued since it started so nothing goes untracked.
    async fn fail_ambiguous_create(
        &self,
        flow: &mut Workflow<'_>,
        err: ProviderError,
    ) -> DomainResult<RotationReport> {
        let filter = PrincipalFilter::single(flow.record.principal.clone());
        let since = flow.record.started_at
            - ChronoDuration::from_std(MAX_CLOCK_SKEW).unwrap_or_else(|_| ChronoDuration::zero());
        let orphans: Vec<Credential> = match self
            .retry
            .execute("discover", || flow.adapter.discover(&filter))
            .await
        {
            Ok(found) => found
                .into_iter()
                .filter(|c| {
                    c.principal == flow.record.principal
                        && c.kind.is_rotatable()
                        && c.id != flow.record.credential_id
                        && c.issued_at.is_some_and(|issued| issued >= since)
                })
                .collect(),
            Err(discover_err) => {
                warn!(
                    target = %flow.target,
                    error = %discover_err,
                    "could not look for a key minted by the timed-out create"
                );
                Vec::new()
            }
        };
        self.fail(flow, err.to_string(), &orphans).await
    }

    async fn flag_surplus(&self, flow: &mut Workflow<'_>, created: &Credential, reason: &str) -> DomainResult<()> {
        warn!(target = %flow.target, credential = %created.id, "replacement credential left in place for review");
        let entry = AuditEntry::new(
            AuditOperation::CredentialFlagged,
            flow.actor.clone(),
            flow.target.clone(),
            AuditOutcome::Pending,
            self.clock.now(),
        )
        .with_detail(json!({
            "record_id": flow.record.id,
            "credential_id": created.id,
            "reason": reason,
        }));
        self.audit.record(entry).await
    }

    async fn cancel_after_create(
        &self,
        flow: &mut Workflow<'_>,
        issued: &IssuedCredential,
    ) -> DomainResult<RotationReport> {
        info!(target = %flow.target, "rotation cancelled after create");
        self.settle(flow, RotationOutcome::Failed, Some("cancelled before validation".to_string()))
            .await?;
        flow.state = RotationState::Failed;
        self.flag_surplus(flow, &issued.credential, "rotation cancelled before validation")
            .await?;

        self.audit
            .record(
                AuditEntry::new(
                    AuditOperation::RotationFailed,
                    flow.actor.clone(),
                    flow.target.clone(),
                    AuditOutcome::Failure,
                    self.clock.now(),
                )
                .with_detail(json!({
                    "record_id": flow.record.id,
                    "reason": "cancelled",
                })),
            )
            .await?;

        Ok(RotationReport::Cancelled {
            record: Some(flow.record.clone()),
        })
    }

    async fn park(
        &self,
        flow: &mut Workflow<'_>,
        policy: &RotationPolicy,
        secret: Option<SecretMaterial>,
    ) -> DomainResult<RotationReport> {
        self.settle(flow, RotationOutcome::PendingCleanup, None).await?;
        let instruction = CleanupInstruction::for_record(&flow.record, policy.grace_window);

        self.audit
            .record(
                AuditEntry::new(
                    AuditOperation::RotationParked,
                    flow.actor.clone(),
                    flow.target.clone(),
                    AuditOutcome::Pending,
                    self.clock.now(),
                )
                .with_detail(json!({
                    "record_id": flow.record.id,
                    "predecessor_id": instruction.predecessor_id,
                    "new_credential_id": instruction.new_credential_id,
                    "eligible_at": instruction.eligible_at,
                    "auto_cleanup": policy.auto_cleanup,
                    "command": instruction.command,
                })),
            )
            .await?;

        info!(
            target = %flow.target,
            predecessor = %instruction.predecessor_id,
            command = %instruction.command,
            "rotation parked awaiting cleanup"
        );

        self.notifier
            .notify(
                Notification::new(
                    Severity::Warning,
                    format!("Manual cleanup required for {}", flow.target),
                    format!(
                        "New credential {} is validated. Revoke predecessor {} after {} with: {}",
                        instruction.new_credential_id,
                        instruction.predecessor_id,
                        instruction.eligible_at.to_rfc3339(),
                        instruction.command
                    ),
                )
                .with_target(flow.target.clone()),
            )
            .await;

        Ok(RotationReport::Parked {
            record: flow.record.clone(),
            instruction,
            secret,
        })
    }

    /// Finish a rotation whose grace window is already over.
    async fn cleanup_in_flight(
        &self,
        flow: &mut Workflow<'_>,
        secret: Option<SecretMaterial>,
    ) -> DomainResult<RotationReport> {
        self.transition(flow, RotationState::CleanupPending).await?;
        if let Err(err) = self.revoke_predecessor(flow).await {
            return self.fail(flow, err.to_string(), &[]).await;
        }
        self.transition(flow, RotationState::Done).await?;
        self.complete(flow).await?;
        Ok(RotationReport::Completed {
            record: flow.record.clone(),
            secret,
        })
    }

    async fn revoke_predecessor(&self, flow: &Workflow<'_>) -> Result<(), ProviderError> {
        let new_id = flow
            .record
            .new_credential_id
            .as_deref()
            .ok_or_else(|| ProviderError::invalid_argument("no validated replacement credential"))?;

        // The replacement must still be visible before its predecessor goes.
        let filter = PrincipalFilter::single(flow.record.principal.clone());
        let current = self
            .retry
            .execute("discover", || flow.adapter.discover(&filter))
            .await?;
        if !current.iter().any(|c| c.id == new_id) {
            return Err(ProviderError::not_found(format!(
                "replacement credential {new_id} is no longer present"
            )));
        }

        let predecessor = Credential {
            id: flow.record.credential_id.clone(),
            principal: flow.record.principal.clone(),
            provider: flow.record.provider.clone(),
            project: flow.adapter.project().to_string(),
            kind: CredentialKind::LongLivedKey,
            issued_at: None,
        };
        match self
            .retry
            .execute("revoke_credential", || flow.adapter.revoke_credential(&predecessor))
            .await
        {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }

    async fn complete(&self, flow: &mut Workflow<'_>) -> DomainResult<()> {
        self.settle(flow, RotationOutcome::Success, None).await?;
        self.audit
            .record(
                AuditEntry::new(
                    AuditOperation::RotationCompleted,
                    flow.actor.clone(),
                    flow.target.clone(),
                    AuditOutcome::Success,
                    self.clock.now(),
                )
                .with_detail(json!({
                    "record_id": flow.record.id,
                    "supersedes": flow.record.supersedes,
                    "revoked": flow.record.credential_id,
                    "new_credential_id": flow.record.new_credential_id,
                })),
            )
            .await?;

        info!(target = %flow.target, revoked = %flow.record.credential_id, "rotation completed");
        self.notifier
            .notify(
                Notification::new(
                    Severity::Ok,
                    format!("Rotation completed for {}", flow.target),
                    format!("Predecessor {} revoked.", flow.record.credential_id),
                )
                .with_target(flow.target.clone()),
            )
            .await;
        Ok(())
    }

    /// Operator-confirmed completion of a parked rotation. Requires the grace
    /// window to have elapsed; ignores `auto_cleanup`.
    #[instrument(skip(self), err)]
    pub async fn cleanup(&self, record_id: Uuid, initiator: Initiator) -> DomainResult<RotationReport> {
        let parked = self
            .records
            .get_rotation(record_id)
            .await?
            .ok_or(DomainError::RotationRecordNotFound(record_id))?;

        let key = parked.principal_key();
        let still_parked = self
            .records
            .pending_cleanup_for(&key)
            .await?
            .is_some_and(|r| r.id == record_id);
        if !still_parked {
            return Err(DomainError::InvalidRequest(format!(
                "rotation {record_id} is not awaiting cleanup (outcome: {})",
                parked.outcome.map_or_else(|| "in progress".to_string(), |o| o.to_string())
            )));
        }

        let policy = self.classifier.policies().resolve(&key.provider, &key.principal).clone();
        let instruction = CleanupInstruction::for_record(&parked, policy.grace_window);
        if self.clock.now() < instruction.eligible_at {
            return Err(DomainError::InvalidRequest(format!(
                "grace window for rotation {record_id} ends at {}",
                instruction.eligible_at.to_rfc3339()
            )));
        }

        let Some(lease) = self.locks.try_acquire(&key) else {
            info!(key = %key, "duplicate-suppressed: cleanup already in flight");
            return Ok(RotationReport::DuplicateSuppressed {
                key,
                parked_record: Some(record_id),
            });
        };

        self.complete_parked(&parked, initiator, lease).await
    }

    /// Complete parked rotations whose grace window elapsed and whose policy
    /// allows unattended cleanup.
    pub async fn advance_pending(&self) -> DomainResult<Vec<RotationReport>> {
        let now = self.clock.now();
        let mut reports = Vec::new();

        for parked in self.records.pending_cleanups().await? {
            let key = parked.principal_key();
            let policy = self.classifier.policies().resolve(&key.provider, &key.principal).clone();
            if !policy.auto_cleanup {
                continue;
            }
            if now < CleanupInstruction::for_record(&parked, policy.grace_window).eligible_at {
                continue;
            }
            let Some(lease) = self.locks.try_acquire(&key) else {
                info!(key = %key, "duplicate-suppressed: skipping parked rotation in flight");
                continue;
            };
            reports.push(self.complete_parked(&parked, Initiator::Scheduled, lease).await?);
        }

        Ok(reports)
    }

    async fn complete_parked(
        &self,
        parked: &RotationRecord,
        initiator: Initiator,
        lease: RotationLease,
    ) -> DomainResult<RotationReport> {
        let adapter = self.providers.get(&parked.provider)?;
        let now = self.clock.now();
        let follow_up = parked.follow_up(initiator.clone(), now);
        let key = parked.principal_key();

        let expires_at = Some(claim_expiry(now));
        let claimed = self
            .records
            .transfer_claim(&key, parked.id, follow_up.id, now, expires_at)
            .await?
            || self.records.claim_principal(&key, follow_up.id, now, expires_at).await?;
        if !claimed {
            info!(key = %key, parked_record = %parked.id, "duplicate-suppressed: cleanup claimed by another process");
            return Ok(RotationReport::DuplicateSuppressed {
                key,
                parked_record: Some(parked.id),
            });
        }

        let started = self
            .audit
            .record(
                AuditEntry::new(
                    AuditOperation::CleanupStarted,
                    initiator.to_string(),
                    key.to_string(),
                    AuditOutcome::Pending,
                    now,
                )
                .with_detail(json!({
                    "record_id": follow_up.id,
                    "supersedes": parked.id,
                    "predecessor_id": parked.credential_id,
                })),
            )
            .await;
        if let Err(err) = match started {
            Ok(()) => self.records.insert_rotation(&follow_up).await,
            Err(err) => Err(err),
        } {
            if let Err(store_err) = self
                .records
                .transfer_claim(&key, follow_up.id, parked.id, now, None)
                .await
            {
                warn!(key = %key, error = %store_err, "could not return claim to parked rotation");
            }
            return Err(err);
        }

        let mut flow = Workflow {
            adapter: adapter.as_ref(),
            record: follow_up,
            state: RotationState::CutoverWindow,
            actor: initiator.to_string(),
            target: key.to_string(),
            _lease: lease,
        };
        self.cleanup_in_flight(&mut flow, None).await
    }
}

/// Oldest long-lived key; keys without an issuance time sort first.
fn oldest_key<'a>(credentials: impl Iterator<Item = &'a Credential>) -> Option<Credential> {
    credentials
        .filter(|c| c.kind.is_rotatable())
        .min_by_key(|c| c.issued_at)
        .cloned()
}
