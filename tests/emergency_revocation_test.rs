//! Emergency revocation: confirmation gating, scopes and audit ordering.

mod common;

use std::sync::Arc;
use std::time::Duration;

use keywarden::adapters::audit::InMemoryAuditSink;
use keywarden::adapters::clock::ManualClock;
use keywarden::adapters::providers::{InMemoryProvider, ProviderOp};
use keywarden::adapters::sqlite::{create_migrated_test_pool, SqliteRecordStore};
use keywarden::cli::exit;
use keywarden::domain::errors::{DomainError, ProviderError};
use keywarden::domain::models::{
    project_confirmation_phrase, AuditOperation, Initiator, RevocationOutcome, RevocationRequest,
    RevocationScope, CONFIRMATION_TOKEN,
};

use keywarden::services::{CredentialEngine, EngineDeps, ProviderRegistry, RetryPolicy};

use common::{days_ago, epoch, harness, standard_policy};

fn request(scope: RevocationScope, target: &str) -> RevocationRequest {
    RevocationRequest {
        scope,
        target: target.to_string(),
        justification: "credential found in a public repository".to_string(),
        confirmation_token: CONFIRMATION_TOKEN.to_string(),
        project_confirmation: None,
        initiator: Initiator::operator("oncall"),
    }
}

#[tokio::test]
async fn test_wrong_token_is_rejected_before_anything_happens() {
    let h = harness().await;
    h.provider.add_key("leaky", Some(days_ago(h.now(), 10)));

    let mut req = request(RevocationScope::AllCredentialsForPrincipal, "leaky");
    req.confirmation_token = "yes".to_string();
    let err = h.engine.emergency_revoke(req).await.unwrap_err();

    assert!(matches!(err, DomainError::ConfirmationRejected(_)));
    assert_eq!(h.provider.calls(ProviderOp::Revoke), 0);
    assert!(h.audit.is_empty());
}

#[tokio::test]
async fn test_blank_justification_is_rejected() {
    let h = harness().await;
    h.provider.add_key("leaky", Some(days_ago(h.now(), 10)));

    let mut req = request(RevocationScope::AllCredentialsForPrincipal, "leaky");
    req.justification = "   ".to_string();
    let err = h.engine.emergency_revoke(req).await.unwrap_err();

    assert!(matches!(err, DomainError::InvalidRequest(_)));
    assert_eq!(h.provider.calls(ProviderOp::Revoke), 0);
    assert!(h.audit.is_empty());
}

#[tokio::test]
async fn test_project_scope_requires_second_phrase() {
    let h = harness().await;
    h.provider.add_key("a", Some(days_ago(h.now(), 10)));

    let err = h
        .engine
        .emergency_revoke(request(RevocationScope::AllCredentialsInProject, "proj"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ConfirmationRejected(_)));

    let mut req = request(RevocationScope::AllCredentialsInProject, "proj");
    req.project_confirmation = Some(project_confirmation_phrase("other"));
    assert!(h.engine.emergency_revoke(req).await.is_err());

    assert_eq!(h.provider.calls(ProviderOp::Revoke), 0);
}

#[tokio::test]
async fn test_project_scope_revokes_every_principal() {
    let h = harness().await;
    h.provider.add_key("a", Some(days_ago(h.now(), 10)));
    h.provider.add_key("b", Some(days_ago(h.now(), 20)));
    h.provider.add_binding("ci", Some(days_ago(h.now(), 30)));

    let mut req = request(RevocationScope::AllCredentialsInProject, "proj");
    req.project_confirmation = Some(project_confirmation_phrase("proj"));
    let record = h.engine.emergency_revoke(req).await.unwrap();

    assert_eq!(record.outcome, RevocationOutcome::Success);
    assert_eq!(record.succeeded.len(), 3);
    assert!(h.provider.credentials().is_empty());
    assert_eq!(exit::for_revocation(record.outcome), exit::OK);
}

#[tokio::test]
async fn test_single_credential_scope_leaves_siblings() {
    let h = harness().await;
    let target = h.provider.add_key("svc", Some(days_ago(h.now(), 10)));
    let sibling = h.provider.add_key("svc", Some(days_ago(h.now(), 40)));

    let record = h
        .engine
        .emergency_revoke(request(RevocationScope::SingleCredential, &target.id))
        .await
        .unwrap();

    assert_eq!(record.succeeded, vec![target.id.clone()]);
    assert_eq!(h.provider.credential_ids("svc"), vec![sibling.id]);
}

#[tokio::test]
async fn test_unmatched_target_is_nothing_to_revoke() {
    let h = harness().await;
    h.provider.add_key("svc", Some(days_ago(h.now(), 10)));

    let record = h
        .engine
        .emergency_revoke(request(RevocationScope::AllCredentialsForPrincipal, "ghost"))
        .await
        .unwrap();

    assert_eq!(record.outcome, RevocationOutcome::NothingToRevoke);
    assert!(record.attempted.is_empty());
    assert_eq!(h.audit.count(AuditOperation::RevocationStarted), 1);
    assert_eq!(h.audit.count(AuditOperation::RevocationCompleted), 1);
}

#[tokio::test]
async fn test_already_deleted_credential_counts_as_revoked() {
    let h = harness().await;
    let gone = h.provider.add_key("svc", Some(days_ago(h.now(), 10)));
    h.provider
        .fail_revoke_of(&gone.id, ProviderError::not_found("key already deleted"));

    let record = h
        .engine
        .emergency_revoke(request(RevocationScope::AllCredentialsForPrincipal, "svc"))
        .await
        .unwrap();

    assert_eq!(record.outcome, RevocationOutcome::Success);
    assert!(record.failed.is_empty());
}

#[tokio::test]
async fn test_audit_unavailable_aborts_before_any_revocation() {
    let h = harness().await;
    h.provider.add_key("leaky", Some(days_ago(h.now(), 10)));
    h.audit.set_failing(true);

    let err = h
        .engine
        .emergency_revoke(request(RevocationScope::AllCredentialsForPrincipal, "leaky"))
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::AuditWrite(_)));
    assert_eq!(h.provider.calls(ProviderOp::Revoke), 0);
    assert_eq!(h.provider.credential_ids("leaky").len(), 1);
    assert!(h.engine.status(5).await.unwrap().recent_revocations.is_empty());
}

#[tokio::test]
async fn test_audit_started_entry_precedes_provider_calls() {
    let h = harness().await;
    h.provider.add_key("leaky", Some(days_ago(h.now(), 10)));

    h.engine
        .emergency_revoke(request(RevocationScope::AllCredentialsForPrincipal, "leaky"))
        .await
        .unwrap();

    let ops: Vec<AuditOperation> = h.audit.entries().iter().map(|e| e.operation).collect();
    assert_eq!(
        ops,
        vec![
            AuditOperation::RevocationStarted,
            AuditOperation::CredentialRevoked,
            AuditOperation::RevocationCompleted,
        ]
    );
}

#[tokio::test]
async fn test_unlistable_provider_fails_the_batch_and_keeps_the_key() {
    let h = harness().await;
    let leaked = h.provider.add_key("leaky", Some(days_ago(h.now(), 10)));
    h.provider.fail_always(
        ProviderOp::Discover,
        ProviderError::permission_denied("caller lacks iam.serviceAccountKeys.list"),
    );

    let record = h
        .engine
        .emergency_revoke(request(RevocationScope::AllCredentialsForPrincipal, "leaky"))
        .await
        .unwrap();

    assert_eq!(record.outcome, RevocationOutcome::Failed);
    assert_eq!(exit::for_revocation(record.outcome), exit::FAILED);
    assert_eq!(record.failed.len(), 1);
    assert_eq!(record.failed[0].credential_id, "mem/*");
    assert!(record.failed[0].error.contains("permission-denied"));

    // Nothing was revoked and the operator is told so.
    assert_eq!(h.provider.calls(ProviderOp::Revoke), 0);
    assert_eq!(h.provider.credential_ids("leaky"), vec![leaked.id]);
    assert_eq!(h.engine.status(5).await.unwrap().recent_revocations.len(), 1);
    assert_eq!(h.audit.count(AuditOperation::RevocationCompleted), 1);
}

#[tokio::test]
async fn test_stale_inventory_is_still_revoked_but_reported_partial() {
    let h = harness().await;
    h.provider.add_key("leaky", Some(days_ago(h.now(), 10)));
    h.engine.discover(None).await.unwrap();
    h.provider
        .fail_always(ProviderOp::Discover, ProviderError::unavailable("503 from control plane"));

    let record = h
        .engine
        .emergency_revoke(request(RevocationScope::AllCredentialsForPrincipal, "leaky"))
        .await
        .unwrap();

    assert_eq!(record.outcome, RevocationOutcome::PartialFailure);
    assert_eq!(record.succeeded.len(), 1);
    assert!(h.provider.credential_ids("leaky").is_empty());
    assert_eq!(exit::for_revocation(record.outcome), exit::PARTIAL_FAILURE);
}

#[tokio::test]
async fn test_ambiguous_credential_id_is_refused_but_recorded() {
    let clock = Arc::new(ManualClock::new(epoch()));
    let east = Arc::new(InMemoryProvider::new("east", "proj").with_clock(clock.clone()));
    let west = Arc::new(InMemoryProvider::new("west", "proj").with_clock(clock.clone()));
    let shared = east.add_key("svc", Some(days_ago(epoch(), 10)));
    let twin = west.add_key("svc", Some(days_ago(epoch(), 10)));
    assert_eq!(shared.id, twin.id);

    let audit = Arc::new(InMemoryAuditSink::new());
    let records = Arc::new(SqliteRecordStore::new(create_migrated_test_pool().await.unwrap()));
    let engine = CredentialEngine::new(EngineDeps {
        providers: ProviderRegistry::new().with(east.clone()).with(west.clone()),
        records,
        audit_sink: audit.clone(),
        notification_sinks: Vec::new(),
        policies: keywarden::domain::models::PolicySet::uniform(standard_policy()).unwrap(),
        inventory_ttl: Duration::from_secs(15 * 60),
        retry: RetryPolicy::immediate(1),
        clock,
    });

    let err = engine
        .emergency_revoke(request(RevocationScope::SingleCredential, &shared.id))
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::InvalidRequest(_)));
    assert_eq!(east.calls(ProviderOp::Revoke) + west.calls(ProviderOp::Revoke), 0);
    let recent = engine.status(5).await.unwrap().recent_revocations;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].outcome, RevocationOutcome::Failed);
    assert_eq!(audit.count(AuditOperation::RevocationCompleted), 1);
}
