//! Scheduler cycles: escalation reporting, auto-rotation and parked cleanup.

mod common;

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio_util::sync::CancellationToken;

use keywarden::adapters::providers::ProviderOp;
use keywarden::domain::models::{
    Assessment, AuditOperation, PolicySet, RiskState, RotationOutcome,
};
use keywarden::services::{RotationReport, Scheduler};

use common::{days_ago, harness, standard_policy, HarnessBuilder};

#[tokio::test]
async fn test_cycle_reports_each_escalation_once() {
    let h = harness().await;
    h.provider.add_key("deploy", Some(days_ago(h.now(), 80)));
    let cancel = CancellationToken::new();

    let first = h.engine.run_cycle(&cancel).await.unwrap();
    assert_eq!(first.classified, 1);
    assert_eq!(first.escalations.len(), 1);
    assert_eq!(first.escalations[0].current, Assessment::Rotation(RiskState::Warning));
    assert!(first.rotations.is_empty());

    let second = h.engine.run_cycle(&cancel).await.unwrap();
    assert!(second.escalations.is_empty());

    // Crossing the critical threshold is a new escalation.
    h.clock.advance(ChronoDuration::days(6));
    let third = h.engine.run_cycle(&cancel).await.unwrap();
    assert_eq!(third.escalations.len(), 1);
    assert_eq!(third.escalations[0].previous, Some(Assessment::Rotation(RiskState::Warning)));

    assert_eq!(h.audit.count(AuditOperation::ClassifierEscalation), 2);
}

#[tokio::test]
async fn test_cycle_auto_rotates_only_when_policy_allows() {
    let h = harness().await;
    h.provider.add_key("deploy", Some(days_ago(h.now(), 88)));

    let report = h.engine.run_cycle(&CancellationToken::new()).await.unwrap();
    assert!(report.rotations.is_empty());
    assert_eq!(h.provider.calls(ProviderOp::Create), 0);

    let mut policy = standard_policy();
    policy.auto_rotate = true;
    h.engine.reload_policy(PolicySet::uniform(policy).unwrap());

    let report = h.engine.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.rotations.len(), 1);
    assert!(matches!(report.rotations[0], RotationReport::Parked { .. }));
}

#[tokio::test]
async fn test_cycle_advances_parked_rotation_after_grace() {
    let mut policy = standard_policy();
    policy.auto_rotate = true;
    policy.auto_cleanup = true;
    let h = HarnessBuilder::default().policy(policy).build().await;
    let old = h.provider.add_key("deploy", Some(days_ago(h.now(), 88)));
    let cancel = CancellationToken::new();

    let first = h.engine.run_cycle(&cancel).await.unwrap();
    assert!(matches!(first.rotations[..], [RotationReport::Parked { .. }]));
    assert!(first.cleanups.is_empty());

    h.clock.advance(ChronoDuration::days(1) + ChronoDuration::minutes(1));
    let second = h.engine.run_cycle(&cancel).await.unwrap();

    // The parked rotation still holds the principal when the auto-rotate pass runs.
    assert!(matches!(
        second.rotations[..],
        [RotationReport::DuplicateSuppressed { .. }]
    ));
    assert_eq!(h.provider.created().len(), 1);
    assert_eq!(second.cleanups.len(), 1);
    let RotationReport::Completed { record, .. } = &second.cleanups[0] else {
        panic!("expected completed cleanup, got {:?}", second.cleanups[0]);
    };
    assert_eq!(record.outcome, Some(RotationOutcome::Success));
    assert_eq!(h.provider.revoked(), vec![old.id]);
}

#[tokio::test]
async fn test_scheduler_stops_on_cancel_and_keeps_policy_on_bad_reload() {
    let h = harness().await;
    h.provider.add_key("deploy", Some(days_ago(h.now(), 10)));
    let cancel = CancellationToken::new();

    let scheduler = Scheduler::new(h.engine.clone(), Duration::from_secs(3600))
        .with_policy_source(Box::new(|| {
            let mut broken = standard_policy();
            broken.warning_threshold = broken.max_age;
            PolicySet::uniform(broken)
        }));

    let stopper = cancel.clone();
    let handle = tokio::spawn(async move { scheduler.run(stopper).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let stats = handle.await.unwrap().unwrap();
    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.rejected_reloads, 1);
    assert_eq!(stats.failed_cycles, 0);
}
