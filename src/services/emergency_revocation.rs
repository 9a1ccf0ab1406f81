//! Confirmation-gated emergency revocation.
//!
//! Bypasses the rotation workflow and its grace windows. Every matching
//! credential is attempted; one failure never stops the batch. The only thing
//! that does stop it is the audit log becoming unwritable.
//!
//! A provider in scope that cannot be listed counts as a failed target, so an
//! outage never reads as "nothing to revoke".

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    project_confirmation_phrase, AuditEntry, AuditOperation, AuditOutcome, Credential,
    RevocationFailure, RevocationOutcome, RevocationRecord, RevocationRequest, RevocationScope,
    Severity, CONFIRMATION_TOKEN,
};
use crate::domain::ports::{Clock, Notification, ProviderAdapter, RecordStore};
use crate::services::audit_log::AuditTrail;
use crate::services::inventory::{CredentialQuery, InventoryStore};
use crate::services::notifier::Notifier;
use crate::services::provider_registry::ProviderRegistry;
use crate::services::retry::RetryPolicy;

/// Credentials selected for revocation, plus the providers that could not be
/// listed while selecting them.
struct Resolution {
    targets: Vec<Credential>,
    unresolved: Vec<RevocationFailure>,
}

/// Revokes credentials immediately, outside the rotation workflow.
pub struct EmergencyRevocationController {
    providers: ProviderRegistry,
    inventory: Arc<InventoryStore>,
    records: Arc<dyn RecordStore>,
    audit: AuditTrail,
    notifier: Notifier,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl EmergencyRevocationController {
    /// Wire the controller over the shared inventory and record store.
    pub fn new(
        providers: ProviderRegistry,
        inventory: Arc<InventoryStore>,
        records: Arc<dyn RecordStore>,
        audit: AuditTrail,
        notifier: Notifier,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            providers,
            inventory,
            records,
            audit,
            notifier,
            retry,
            clock,
        }
    }

    /// Check justification and confirmation before anything is touched.
    pub fn validate(request: &RevocationRequest) -> DomainResult<()> {
        if request.target.trim().is_empty() {
            return Err(DomainError::InvalidRequest("target must not be empty".to_string()));
        }
        if request.justification.trim().is_empty() {
            return Err(DomainError::InvalidRequest(
                "justification must not be empty".to_string(),
            ));
        }
        if request.confirmation_token != CONFIRMATION_TOKEN {
            return Err(DomainError::ConfirmationRejected(format!(
                "confirmation token must be '{CONFIRMATION_TOKEN}'"
            )));
        }
        if request.scope == RevocationScope::AllCredentialsInProject {
            let expected = project_confirmation_phrase(&request.target);
            if request.project_confirmation.as_deref() != Some(expected.as_str()) {
                return Err(DomainError::ConfirmationRejected(format!(
                    "project-wide revocation also requires the phrase '{expected}'"
                )));
            }
        }
        Ok(())
    }

    /// Validate, then revoke every credential the request selects.
    ///
    /// Once `revocation_started` is audited a record is always persisted,
    /// even when target resolution is refused.
    #[instrument(skip(self, request), fields(scope = %request.scope, target = %request.target), err)]
    pub async fn revoke(&self, request: RevocationRequest) -> DomainResult<RevocationRecord> {
        Self::validate(&request)?;

        let id = Uuid::new_v4();
        let started_at = self.clock.now();
        let actor = request.initiator.to_string();

        self.audit
            .record(
                AuditEntry::new(
                    AuditOperation::RevocationStarted,
                    actor.clone(),
                    request.target.clone(),
                    AuditOutcome::Pending,
                    started_at,
                )
                .with_detail(json!({
                    "revocation_id": id,
                    "scope": request.scope,
                    "justification": request.justification,
                })),
            )
            .await?;

        let (targets, unresolved, rejection) = match self.resolve_targets(&request).await {
            Ok(resolution) => (resolution.targets, resolution.unresolved, None),
            Err(err) => {
                let failure = RevocationFailure {
                    credential_id: request.target.clone(),
                    principal: request.target.clone(),
                    error: err.to_string(),
                };
                (Vec::new(), vec![failure], Some(err))
            }
        };
        info!(
            count = targets.len(),
            unresolved = unresolved.len(),
            "emergency revocation targets resolved"
        );

        let mut record = RevocationRecord {
            id,
            scope: request.scope,
            target: request.target.clone(),
            justification: request.justification.clone(),
            initiator: request.initiator.clone(),
            started_at,
            completed_at: started_at,
            outcome: RevocationOutcome::NothingToRevoke,
            attempted: Vec::with_capacity(targets.len()),
            succeeded: Vec::new(),
            failed: unresolved,
        };

        for credential in &targets {
            record.attempted.push(credential.id.clone());
            let result = self.revoke_one(credential).await;

            let (outcome, detail) = match &result {
                Ok(()) => {
                    record.succeeded.push(credential.id.clone());
                    (AuditOutcome::Success, json!({"revocation_id": id, "credential_id": credential.id}))
                }
                Err(err) => {
                    warn!(credential = %credential.id, error = %err, "revocation failed");
                    record.failed.push(RevocationFailure {
                        credential_id: credential.id.clone(),
                        principal: credential.principal.clone(),
                        error: err.to_string(),
                    });
                    (
                        AuditOutcome::Failure,
                        json!({"revocation_id": id, "credential_id": credential.id, "error": err.to_string()}),
                    )
                }
            };

            let entry = AuditEntry::new(
                AuditOperation::CredentialRevoked,
                actor.clone(),
                credential.principal_key().to_string(),
                outcome,
                self.clock.now(),
            )
            .with_detail(detail);

            if let Err(err) = self.audit.record(entry).await {
                error!(error = %err, "audit log unavailable, aborting revocation batch");
                self.finish(&mut record).await;
                if let Err(store_err) = self.records.insert_revocation(&record).await {
                    error!(error = %store_err, "could not persist partial revocation record");
                }
                return Err(err);
            }
        }

        self.finish(&mut record).await;
        self.records.insert_revocation(&record).await?;

        self.audit
            .record(
                AuditEntry::new(
                    AuditOperation::RevocationCompleted,
                    actor,
                    request.target.clone(),
                    match record.outcome {
                        RevocationOutcome::Success | RevocationOutcome::NothingToRevoke => AuditOutcome::Success,
                        RevocationOutcome::PartialFailure => AuditOutcome::PartialSuccess,
                        RevocationOutcome::Failed => AuditOutcome::Failure,
                    },
                    record.completed_at,
                )
                .with_detail(json!({
                    "revocation_id": id,
                    "scope": record.scope,
                    "attempted": record.attempted.len(),
                    "succeeded": record.succeeded_count(),
                    "failed": record.failed_count(),
                })),
            )
            .await?;

        match rejection {
            Some(err) => Err(err),
            None => Ok(record),
        }
    }

    async fn finish(&self, record: &mut RevocationRecord) {
        record.completed_at = self.clock.now();
        record.outcome = RevocationOutcome::from_counts(record.succeeded_count(), record.failed_count());

        info!(
            outcome = %record.outcome,
            succeeded = record.succeeded_count(),
            failed = record.failed_count(),
            "emergency revocation finished"
        );

        let mut body = format!(
            "Emergency revocation ({}) of {} by {}: {} succeeded, {} failed. Justification: {}",
            record.scope,
            record.target,
            record.initiator,
            record.succeeded_count(),
            record.failed_count(),
            record.justification,
        );
        for failure in &record.failed {
            body.push_str(&format!("\n  {} ({}): {}", failure.credential_id, failure.principal, failure.error));
        }

        self.notifier
            .notify(
                Notification::new(
                    Severity::Critical,
                    format!("Emergency revocation {}", record.outcome),
                    body,
                )
                .with_target(record.target.clone()),
            )
            .await;
    }

    async fn revoke_one(&self, credential: &Credential) -> DomainResult<()> {
        let adapter = self.providers.get(&credential.provider)?;
        match self
            .retry
            .execute("revoke_credential", || adapter.revoke_credential(credential))
            .await
        {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Refresh the providers in scope and select the matching credentials.
    async fn resolve_targets(&self, request: &RevocationRequest) -> DomainResult<Resolution> {
        let adapters: Vec<&Arc<dyn ProviderAdapter>> = match request.scope {
            RevocationScope::AllCredentialsInProject => {
                self.providers.for_project(&request.target).collect()
            }
            _ => self.providers.adapters().collect(),
        };

        let mut unresolved = Vec::new();
        for adapter in adapters {
            if let Err(err) = self
                .inventory
                .refresh(adapter.as_ref(), &self.retry, self.clock.now())
                .await
            {
                warn!(provider = %adapter.id(), error = %err, "refresh failed, using last known inventory");
                unresolved.push(RevocationFailure {
                    credential_id: format!("{}/*", adapter.id()),
                    principal: request.target.clone(),
                    error: format!("could not list credentials: {err}"),
                });
            }
        }

        let query = match request.scope {
            RevocationScope::SingleCredential => CredentialQuery {
                credential_id: Some(request.target.clone()),
                ..CredentialQuery::default()
            },
            RevocationScope::AllCredentialsForPrincipal => CredentialQuery {
                principal: Some(request.target.clone()),
                ..CredentialQuery::default()
            },
            RevocationScope::AllCredentialsInProject => CredentialQuery {
                project: Some(request.target.clone()),
                ..CredentialQuery::default()
            },
        };

        let targets: Vec<Credential> = self
            .inventory
            .query(&query, self.clock.now())
            .into_iter()
            .map(|item| item.credential)
            .collect();

        if request.scope == RevocationScope::SingleCredential && targets.len() > 1 {
            return Err(DomainError::InvalidRequest(format!(
                "credential id '{}' matches {} credentials across providers; refusing to widen the revocation",
                request.target,
                targets.len()
            )));
        }

        Ok(Resolution { targets, unresolved })
    }
}
