//! End-to-end scenarios through the engine facade.

mod common;

use chrono::Duration as ChronoDuration;
use tokio_util::sync::CancellationToken;

use keywarden::cli::exit;
use keywarden::domain::models::{
    Assessment, AuditOperation, Initiator, PrincipalKey, ProviderId, RevocationOutcome,
    RevocationRequest, RevocationScope, RiskState, RotationOutcome, CONFIRMATION_TOKEN,
};
use keywarden::domain::errors::{DomainError, ProviderError};
use keywarden::services::{CredentialQuery, RotationReport};

use common::{days_ago, harness};

fn key(principal: &str) -> PrincipalKey {
    PrincipalKey::new(ProviderId::new("mem"), principal)
}

#[tokio::test]
async fn test_eighty_day_old_key_is_warning_and_check_exits_one() {
    let h = harness().await;
    let now = h.now();
    h.provider.add_key("deploy", Some(days_ago(now, 80)));

    let report = h.engine.check(CredentialQuery::all()).await;

    assert_eq!(report.classifications.len(), 1);
    assert_eq!(
        report.classifications[0].assessment,
        Assessment::Rotation(RiskState::Warning)
    );
    assert_eq!(exit::for_severity(report.worst_severity()), 1);
}

#[tokio::test]
async fn test_ninety_five_day_old_key_is_expired_and_check_exits_two() {
    let h = harness().await;
    let now = h.now();
    h.provider.add_key("deploy", Some(days_ago(now, 95)));

    let report = h.engine.check(CredentialQuery::all()).await;

    assert_eq!(
        report.classifications[0].assessment,
        Assessment::Rotation(RiskState::Expired)
    );
    assert_eq!(exit::for_severity(report.worst_severity()), 2);
}

#[tokio::test]
async fn test_manual_cleanup_rotation_parks_with_predecessor_still_valid() {
    let h = harness().await;
    let now = h.now();
    let old = h.provider.add_key("deploy", Some(days_ago(now, 86)));

    let report = h
        .engine
        .rotate(&key("deploy"), Initiator::operator("alice"), &CancellationToken::new())
        .await
        .unwrap();

    let RotationReport::Parked {
        record,
        instruction,
        secret,
    } = &report
    else {
        panic!("expected parked rotation, got {report:?}");
    };
    assert_eq!(record.outcome, Some(RotationOutcome::PendingCleanup));
    assert_eq!(instruction.predecessor_id, old.id);
    assert!(instruction.command.contains(&record.id.to_string()));
    assert!(secret.is_some());
    assert_eq!(exit::for_rotation(&report), exit::OK);

    // Predecessor is still discoverable and nothing was revoked.
    let ids = h.provider.credential_ids("deploy");
    assert!(ids.contains(&old.id));
    assert!(ids.contains(&instruction.new_credential_id));
    assert!(h.provider.revoked().is_empty());

    let discovered = h.engine.discover(None).await.unwrap();
    assert!(discovered.credentials.iter().any(|i| i.credential.id == old.id));

    let status = h.engine.status(10).await.unwrap();
    assert_eq!(status.parked.len(), 1);
    assert_eq!(status.parked[0].record_id, record.id);

    assert_eq!(h.audit.count(AuditOperation::RotationParked), 1);
    assert_eq!(h.audit.count(AuditOperation::RotationCompleted), 0);
}

#[tokio::test]
async fn test_parked_rotation_blocks_new_rotation_until_cleanup() {
    let h = harness().await;
    let now = h.now();
    let old = h.provider.add_key("deploy", Some(days_ago(now, 86)));
    let cancel = CancellationToken::new();

    let first = h
        .engine
        .rotate(&key("deploy"), Initiator::Scheduled, &cancel)
        .await
        .unwrap();
    let parked_id = first.record().unwrap().id;

    let second = h
        .engine
        .rotate(&key("deploy"), Initiator::operator("bob"), &cancel)
        .await
        .unwrap();
    match second {
        RotationReport::DuplicateSuppressed { parked_record, .. } => {
            assert_eq!(parked_record, Some(parked_id));
        }
        other => panic!("expected duplicate suppression, got {other:?}"),
    }
    assert_eq!(h.provider.created().len(), 1);

    // Grace window (one day) has not elapsed yet.
    let early = h.engine.cleanup(parked_id, Initiator::operator("bob")).await;
    assert!(matches!(early, Err(DomainError::InvalidRequest(_))));
    assert!(h.provider.revoked().is_empty());

    h.clock.advance(ChronoDuration::days(1) + ChronoDuration::minutes(1));
    let done = h
        .engine
        .cleanup(parked_id, Initiator::operator("bob"))
        .await
        .unwrap();

    let RotationReport::Completed { record, .. } = &done else {
        panic!("expected completed cleanup, got {done:?}");
    };
    assert_eq!(record.supersedes, Some(parked_id));
    assert_eq!(record.outcome, Some(RotationOutcome::Success));
    assert_eq!(h.provider.revoked(), vec![old.id.clone()]);

    // The parked record itself is untouched; a new record tells the story.
    let parked = h.rotation_record(parked_id).await;
    assert_eq!(parked.outcome, Some(RotationOutcome::PendingCleanup));
    assert!(h.engine.status(10).await.unwrap().parked.is_empty());

    // Cleaning up twice is rejected.
    let again = h.engine.cleanup(parked_id, Initiator::operator("bob")).await;
    assert!(matches!(again, Err(DomainError::InvalidRequest(_))));
}

#[tokio::test]
async fn test_emergency_revoke_principal_reports_partial_failure() {
    let h = harness().await;
    let now = h.now();
    let a = h.provider.add_key("leaky", Some(days_ago(now, 10)));
    let b = h.provider.add_key("leaky", Some(days_ago(now, 20)));
    let c = h.provider.add_key("leaky", Some(days_ago(now, 30)));
    h.provider.add_key("bystander", Some(days_ago(now, 5)));
    h.provider
        .fail_revoke_of(&b.id, ProviderError::permission_denied("org policy forbids deletion"));

    let record = h
        .engine
        .emergency_revoke(RevocationRequest {
            scope: RevocationScope::AllCredentialsForPrincipal,
            target: "leaky".to_string(),
            justification: "key pasted into a public gist".to_string(),
            confirmation_token: CONFIRMATION_TOKEN.to_string(),
            project_confirmation: None,
            initiator: Initiator::operator("oncall"),
        })
        .await
        .unwrap();

    assert_eq!(record.attempted.len(), 3);
    assert_eq!(record.succeeded.len(), 2);
    assert_eq!(record.failed.len(), 1);
    assert_eq!(record.failed[0].credential_id, b.id);
    assert_eq!(record.outcome, RevocationOutcome::PartialFailure);
    assert_eq!(exit::for_revocation(record.outcome), exit::PARTIAL_FAILURE);

    let mut revoked = h.provider.revoked();
    revoked.sort();
    let mut expected = vec![a.id.clone(), c.id.clone()];
    expected.sort();
    assert_eq!(revoked, expected);
    assert_eq!(h.provider.credential_ids("bystander").len(), 1);

    let stored = h.engine.status(5).await.unwrap().recent_revocations;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, record.id);

    assert_eq!(h.audit.count(AuditOperation::RevocationStarted), 1);
    assert_eq!(h.audit.count(AuditOperation::CredentialRevoked), 3);
    assert_eq!(h.audit.count(AuditOperation::RevocationCompleted), 1);
}
