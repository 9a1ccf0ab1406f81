//! Facade wiring inventory, classification, rotation and revocation together.
//!
//! Each public method backs one operator command; [`CredentialEngine::run_cycle`]
//! is one tick of the scheduler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Assessment, AuditEntry, AuditOperation, AuditOutcome, Classification, Credential, Initiator,
    PolicySet, PrincipalKey, ProviderId, ReviewState, RevocationRecord, RevocationRequest,
    RiskState, RotationRecord, Severity,
};
use crate::domain::ports::{AuditSink, Clock, Notification, NotificationSink, RecordStore};
use crate::services::audit_log::AuditTrail;
use crate::services::classifier::HealthClassifier;
use crate::services::emergency_revocation::EmergencyRevocationController;
use crate::services::inventory::{CredentialQuery, InventoryItem, InventoryStore, SliceFreshness};
use crate::services::locks::RotationLocks;
use crate::services::notifier::Notifier;
use crate::services::provider_registry::ProviderRegistry;
use crate::services::retry::RetryPolicy;
use crate::services::rotation_orchestrator::{CleanupInstruction, RotationOrchestrator, RotationReport};

/// Everything the engine needs from the outside world.
pub struct EngineDeps {
    /// Control planes to operate on, keyed by provider id.
    pub providers: ProviderRegistry,
    /// Durable rotation and revocation records.
    pub records: Arc<dyn RecordStore>,
    /// Append-only audit destination. A failed write aborts the operation.
    pub audit_sink: Arc<dyn AuditSink>,
    /// Best-effort alert channels.
    pub notification_sinks: Vec<Arc<dyn NotificationSink>>,
    /// Rotation policy per provider and principal class.
    pub policies: PolicySet,
    /// Age after which an inventory slice is reported stale.
    pub inventory_ttl: Duration,
    /// Retry budget for every provider call.
    pub retry: RetryPolicy,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

/// A provider whose `discover` failed during a refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshFailure {
    /// Provider that failed.
    pub provider: ProviderId,
    /// Classified provider error.
    pub error: String,
}

/// Outcome of refreshing one or more providers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshSummary {
    /// Providers refreshed, with the number of credentials each reported.
    pub refreshed: Vec<(ProviderId, usize)>,
    /// Providers whose previous slice was kept.
    pub failed: Vec<RefreshFailure>,
}

/// Result of `discover`.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    /// Providers refreshed before answering.
    pub refresh: RefreshSummary,
    /// Everything the inventory now holds for the requested providers.
    pub credentials: Vec<InventoryItem>,
}

/// Result of `check`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    /// Providers refreshed before answering.
    pub refresh: RefreshSummary,
    /// One classification per matching credential.
    pub classifications: Vec<Classification>,
}

impl CheckReport {
    /// Worst severity across all credentials. A provider that could not be
    /// discovered counts as a warning.
    pub fn worst_severity(&self) -> Severity {
        let floor = if self.refresh.failed.is_empty() {
            Severity::Ok
        } else {
            Severity::Warning
        };
        self.classifications
            .iter()
            .map(Classification::severity)
            .fold(floor, Severity::max)
    }
}

/// Result of `status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Providers refreshed before answering.
    pub refresh: RefreshSummary,
    /// Age of each inventory slice.
    pub freshness: Vec<SliceFreshness>,
    /// Rotations waiting for cleanup, with the command that finishes each.
    pub parked: Vec<CleanupInstruction>,
    /// Newest rotation records first.
    pub recent_rotations: Vec<RotationRecord>,
    /// Newest revocation records first.
    pub recent_revocations: Vec<RevocationRecord>,
}

/// A credential whose assessment got worse since the previous cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Escalation {
    /// The credential as last discovered.
    pub credential: Credential,
    /// Assessment from the previous cycle, if the credential was seen before.
    pub previous: Option<Assessment>,
    /// Assessment this cycle.
    pub current: Assessment,
}

/// Everything one scheduler tick did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// Providers refreshed before answering.
    pub refresh: RefreshSummary,
    /// Number of credentials classified.
    pub classified: usize,
    /// Credentials whose assessment got worse.
    pub escalations: Vec<Escalation>,
    /// Rotations started because the policy allows auto-rotation.
    pub rotations: Vec<RotationReport>,
    /// Parked rotations completed after their grace window.
    pub cleanups: Vec<RotationReport>,
}

type AssessmentKey = (ProviderId, String, String);

/// Entry point for every operator command and scheduler tick.
pub struct CredentialEngine {
    providers: ProviderRegistry,
    inventory: Arc<InventoryStore>,
    classifier: Arc<HealthClassifier>,
    orchestrator: RotationOrchestrator,
    revocation: EmergencyRevocationController,
    records: Arc<dyn RecordStore>,
    audit: AuditTrail,
    notifier: Notifier,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    last_assessments: Mutex<HashMap<AssessmentKey, Assessment>>,
}

impl CredentialEngine {
    /// Wire the services over `deps`. No provider is contacted.
    pub fn new(deps: EngineDeps) -> Self {
        let inventory = Arc::new(InventoryStore::new(deps.inventory_ttl));
        let classifier = Arc::new(HealthClassifier::new(deps.policies));
        let audit = AuditTrail::new(deps.audit_sink);
        let notifier = Notifier::new(deps.notification_sinks);

        let orchestrator = RotationOrchestrator::new(
            deps.providers.clone(),
            classifier.clone(),
            deps.records.clone(),
            audit.clone(),
            notifier.clone(),
            RotationLocks::new(),
            deps.retry.clone(),
            deps.clock.clone(),
        );
        let revocation = EmergencyRevocationController::new(
            deps.providers.clone(),
            inventory.clone(),
            deps.records.clone(),
            audit.clone(),
            notifier.clone(),
            deps.retry.clone(),
            deps.clock.clone(),
        );

        Self {
            providers: deps.providers,
            inventory,
            classifier,
            orchestrator,
            revocation,
            records: deps.records,
            audit,
            notifier,
            retry: deps.retry,
            clock: deps.clock,
            last_assessments: Mutex::new(HashMap::new()),
        }
    }

    /// Last known credentials, per provider.
    pub fn inventory(&self) -> &InventoryStore {
        &self.inventory
    }

    /// Classifier holding the active policy set.
    pub fn classifier(&self) -> &HealthClassifier {
        &self.classifier
    }

    /// Rotation workflow shared by every command.
    pub const fn orchestrator(&self) -> &RotationOrchestrator {
        &self.orchestrator
    }

    /// Swap the active policy set. Rotations already running keep the policy they started with.
    pub fn reload_policy(&self, policies: PolicySet) {
        self.classifier.reload_policy(policies);
        info!("rotation policy reloaded");
    }

    /// Refresh every provider concurrently. Failures keep the previous slice.
    pub async fn refresh_all(&self) -> RefreshSummary {
        let now = self.clock.now();
        let results = join_all(
            self.providers
                .adapters()
                .map(|adapter| async move {
                    let result = self.inventory.refresh(adapter.as_ref(), &self.retry, now).await;
                    (adapter.id().clone(), result)
                }),
        )
        .await;

        let mut summary = RefreshSummary::default();
        for (provider, result) in results {
            match result {
                Ok(count) => summary.refreshed.push((provider, count)),
                Err(err) => summary.failed.push(RefreshFailure {
                    provider,
                    error: err.to_string(),
                }),
            }
        }
        summary
    }

    /// Refresh one provider, or all of them, and list what is known.
    #[instrument(skip(self))]
    pub async fn discover(&self, provider: Option<ProviderId>) -> DomainResult<DiscoveryReport> {
        let refresh = match &provider {
            Some(id) => {
                let adapter = self.providers.get(id)?;
                let mut summary = RefreshSummary::default();
                match self
                    .inventory
                    .refresh(adapter.as_ref(), &self.retry, self.clock.now())
                    .await
                {
                    Ok(count) => summary.refreshed.push((id.clone(), count)),
                    Err(err) => summary.failed.push(RefreshFailure {
                        provider: id.clone(),
                        error: err.to_string(),
                    }),
                }
                summary
            }
            None => self.refresh_all().await,
        };

        let query = provider.map_or_else(CredentialQuery::all, CredentialQuery::for_provider);
        Ok(DiscoveryReport {
            refresh,
            credentials: self.inventory.query(&query, self.clock.now()),
        })
    }

    /// Refresh and classify. Never fails on a single credential.
    #[instrument(skip(self))]
    pub async fn check(&self, query: CredentialQuery) -> CheckReport {
        let refresh = self.refresh_all().await;
        let now = self.clock.now();
        let items = self.inventory.query(&query, now);
        CheckReport {
            refresh,
            classifications: self.classifier.classify_all(&items, now),
        }
    }

    /// Refresh, then report inventory freshness, parked rotations and the
    /// `limit` most recent rotation and revocation records.
    pub async fn status(&self, limit: usize) -> DomainResult<StatusReport> {
        let refresh = self.refresh_all().await;
        let policies = self.classifier.policies();

        let parked = self
            .records
            .pending_cleanups()
            .await?
            .into_iter()
            .map(|record| {
                let grace = policies.resolve(&record.provider, &record.principal).grace_window;
                CleanupInstruction::for_record(&record, grace)
            })
            .collect();

        Ok(StatusReport {
            refresh,
            freshness: self.inventory.freshness(self.clock.now()),
            parked,
            recent_rotations: self.records.recent_rotations(limit).await?,
            recent_revocations: self.records.recent_revocations(limit).await?,
        })
    }

    /// Rotate the oldest long-lived key of one principal.
    pub async fn rotate(
        &self,
        key: &PrincipalKey,
        initiator: Initiator,
        cancel: &CancellationToken,
    ) -> DomainResult<RotationReport> {
        self.orchestrator.rotate_principal(key, initiator, cancel).await
    }

    /// Rotate every credential at WARNING or worse, one per principal,
    /// regardless of `auto_rotate`.
    #[instrument(skip(self, cancel))]
    pub async fn rotate_all(
        &self,
        initiator: Initiator,
        cancel: &CancellationToken,
    ) -> DomainResult<Vec<RotationReport>> {
        let report = self.check(CredentialQuery::all()).await;
        let mut reports = Vec::new();

        for classification in worst_per_principal(report.classifications) {
            if cancel.is_cancelled() {
                info!("rotate-all cancelled, remaining principals skipped");
                break;
            }
            reports.push(
                self.orchestrator
                    .rotate_credential(&classification.credential, initiator.clone(), cancel)
                    .await?,
            );
        }
        Ok(reports)
    }

    /// Revoke immediately, bypassing grace windows. See
    /// [`EmergencyRevocationController::revoke`].
    pub async fn emergency_revoke(&self, request: RevocationRequest) -> DomainResult<RevocationRecord> {
        self.revocation.revoke(request).await
    }

    /// Finish a parked rotation once its grace window is over.
    pub async fn cleanup(&self, record_id: Uuid, initiator: Initiator) -> DomainResult<RotationReport> {
        self.orchestrator.cleanup(record_id, initiator).await
    }

    /// One scheduler tick: refresh, classify, report escalations, auto-rotate,
    /// and advance parked rotations.
    #[instrument(skip(self, cancel))]
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> DomainResult<CycleReport> {
        let mut report = CycleReport {
            refresh: self.refresh_all().await,
            ..CycleReport::default()
        };

        let now = self.clock.now();
        let items = self.inventory.query(&CredentialQuery::all(), now);
        let classifications = self.classifier.classify_all(&items, now);
        report.classified = classifications.len();

        report.escalations = self.record_escalations(&classifications).await?;

        let policies = self.classifier.policies();
        let auto: Vec<Classification> = worst_per_principal(classifications)
            .into_iter()
            .filter(|c| {
                policies
                    .resolve(&c.credential.provider, &c.credential.principal)
                    .auto_rotate
            })
            .collect();

        for classification in auto {
            if cancel.is_cancelled() {
                break;
            }
            match self
                .orchestrator
                .rotate_credential(&classification.credential, Initiator::Scheduled, cancel)
                .await
            {
                Ok(rotation) => report.rotations.push(rotation),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => warn!(
                    credential = %classification.credential.id,
                    error = %err,
                    "scheduled rotation could not start"
                ),
            }
        }

        if !cancel.is_cancelled() {
            report.cleanups = self.orchestrator.advance_pending().await?;
        }

        info!(
            classified = report.classified,
            escalations = report.escalations.len(),
            rotations = report.rotations.len(),
            cleanups = report.cleanups.len(),
            "scheduler cycle complete"
        );
        Ok(report)
    }

    async fn record_escalations(&self, classifications: &[Classification]) -> DomainResult<Vec<Escalation>> {
        let mut last = self.last_assessments.lock().await;
        let mut escalations = Vec::new();

        for classification in classifications {
            let c = &classification.credential;
            let key = (c.provider.clone(), c.principal.clone(), c.id.clone());
            let previous = last.get(&key).copied();
            let baseline = previous.unwrap_or(match classification.assessment {
                Assessment::Rotation(_) => Assessment::Rotation(RiskState::Ok),
                Assessment::Review(_) => Assessment::Review(ReviewState::Current),
            });

            if classification.escalated_from(&baseline) {
                escalations.push(Escalation {
                    credential: c.clone(),
                    previous,
                    current: classification.assessment,
                });
            }
            last.insert(key, classification.assessment);
        }
        drop(last);

        for escalation in &escalations {
            let c = &escalation.credential;
            self.audit
                .record(
                    AuditEntry::new(
                        AuditOperation::ClassifierEscalation,
                        "classifier",
                        c.principal_key().to_string(),
                        AuditOutcome::Success,
                        self.clock.now(),
                    )
                    .with_detail(json!({
                        "credential_id": c.id,
                        "from": escalation.previous.map(|a| a.label()),
                        "to": escalation.current.label(),
                    })),
                )
                .await?;

            self.notifier
                .notify(
                    Notification::new(
                        escalation.current.severity(),
                        format!("{} is {}", c.principal_key(), escalation.current.label()),
                        format!(
                            "Credential {} of {} ({}) is now {}.",
                            c.id,
                            c.principal,
                            c.provider,
                            escalation.current.label()
                        ),
                    )
                    .with_target(c.principal_key().to_string()),
                )
                .await;
        }

        Ok(escalations)
    }
}

/// Rotation candidates, keeping the most overdue key of each principal.
fn worst_per_principal(classifications: Vec<Classification>) -> Vec<Classification> {
    let mut by_principal: HashMap<PrincipalKey, Classification> = HashMap::new();
    for classification in classifications.into_iter().filter(Classification::eligible_for_rotation) {
        let key = classification.credential.principal_key();
        match by_principal.get(&key) {
            Some(current) if current.age >= classification.age => {}
            _ => {
                by_principal.insert(key, classification);
            }
        }
    }
    let mut candidates: Vec<_> = by_principal.into_values().collect();
    candidates.sort_by(|a, b| a.credential.principal_key().cmp(&b.credential.principal_key()));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CredentialKind;

    fn classification(principal: &str, id: &str, risk: RiskState, days: u64) -> Classification {
        Classification {
            credential: Credential {
                id: id.to_string(),
                principal: principal.to_string(),
                provider: ProviderId::new("p"),
                project: "proj".to_string(),
                kind: CredentialKind::LongLivedKey,
                issued_at: None,
            },
            assessment: Assessment::Rotation(risk),
            age: Some(Duration::from_secs(days * 86_400)),
            stale: false,
        }
    }

    #[test]
    fn test_worst_per_principal_picks_oldest_eligible() {
        let picked = worst_per_principal(vec![
            classification("a", "a1", RiskState::Warning, 80),
            classification("a", "a2", RiskState::Expired, 100),
            classification("b", "b1", RiskState::Ok, 10),
            classification("c", "c1", RiskState::Unknown, 0),
        ]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].credential.id, "a2");
    }

    #[test]
    fn test_worst_severity_counts_unreachable_providers() {
        let report = CheckReport {
            refresh: RefreshSummary {
                refreshed: vec![],
                failed: vec![RefreshFailure {
                    provider: ProviderId::new("p"),
                    error: "boom".to_string(),
                }],
            },
            classifications: vec![],
        };
        assert_eq!(report.worst_severity(), Severity::Warning);
    }
}
