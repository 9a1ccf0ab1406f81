//! SQLite implementation of the RecordStore.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_optional_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Initiator, PrincipalKey, ProviderId, RevocationOutcome, RevocationRecord, RevocationScope,
    RotationOutcome, RotationRecord,
};
use crate::domain::ports::RecordStore;

const PENDING_WITHOUT_FOLLOW_UP: &str = "outcome = 'pending-cleanup' AND NOT EXISTS (
    SELECT 1 FROM rotation_records f WHERE f.supersedes = rotation_records.id AND f.outcome = 'success'
)";

fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Record store over a SQLite pool.
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Store over an already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert_rotation(&self, record: &RotationRecord) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO rotation_records (id, provider, principal, credential_id, new_credential_id, started_at, completed_at, outcome, initiator, supersedes, detail)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(record.provider.as_str())
        .bind(&record.principal)
        .bind(&record.credential_id)
        .bind(&record.new_credential_id)
        .bind(timestamp(record.started_at))
        .bind(record.completed_at.map(timestamp))
        .bind(record.outcome.map(|o| o.as_str()))
        .bind(record.initiator.to_string())
        .bind(record.supersedes.map(|id| id.to_string()))
        .bind(&record.detail)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn settle_rotation(
        &self,
        record_id: Uuid,
        outcome: RotationOutcome,
        new_credential_id: Option<&str>,
        detail: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE rotation_records
               SET outcome = ?, new_credential_id = COALESCE(?, new_credential_id), detail = ?, completed_at = ?
               WHERE id = ? AND outcome IS NULL"#,
        )
        .bind(outcome.as_str())
        .bind(new_credential_id)
        .bind(detail)
        .bind(timestamp(completed_at))
        .bind(record_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.get_rotation(record_id).await? {
            Some(existing) => Err(DomainError::InvalidStateTransition {
                from: existing.outcome.map_or_else(|| "unsettled".to_string(), |o| o.to_string()),
                to: outcome.to_string(),
            }),
            None => Err(DomainError::RotationRecordNotFound(record_id)),
        }
    }

    async fn get_rotation(&self, record_id: Uuid) -> DomainResult<Option<RotationRecord>> {
        let row: Option<RotationRow> = sqlx::query_as("SELECT * FROM rotation_records WHERE id = ?")
            .bind(record_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn pending_cleanups(&self) -> DomainResult<Vec<RotationRecord>> {
        let rows: Vec<RotationRow> = sqlx::query_as(&format!(
            "SELECT * FROM rotation_records WHERE {PENDING_WITHOUT_FOLLOW_UP} ORDER BY started_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn pending_cleanup_for(&self, key: &PrincipalKey) -> DomainResult<Option<RotationRecord>> {
        let row: Option<RotationRow> = sqlx::query_as(&format!(
            "SELECT * FROM rotation_records WHERE provider = ? AND principal = ? AND {PENDING_WITHOUT_FOLLOW_UP}
             ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(key.provider.as_str())
        .bind(&key.principal)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn recent_rotations(&self, limit: usize) -> DomainResult<Vec<RotationRecord>> {
        let rows: Vec<RotationRow> =
            sqlx::query_as("SELECT * FROM rotation_records ORDER BY started_at DESC LIMIT ?")
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn claim_principal(
        &self,
        key: &PrincipalKey,
        record_id: Uuid,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> DomainResult<bool> {
        // An existing claim is only taken over once it has expired.
        let result = sqlx::query(
            r#"INSERT INTO rotation_claims (provider, principal, record_id, claimed_at, expires_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (provider, principal) DO UPDATE
               SET record_id = excluded.record_id, claimed_at = excluded.claimed_at, expires_at = excluded.expires_at
               WHERE rotation_claims.expires_at IS NOT NULL AND rotation_claims.expires_at <= excluded.claimed_at"#,
        )
        .bind(key.provider.as_str())
        .bind(&key.principal)
        .bind(record_id.to_string())
        .bind(timestamp(now))
        .bind(expires_at.map(timestamp))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn transfer_claim(
        &self,
        key: &PrincipalKey,
        from: Uuid,
        to: Uuid,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"UPDATE rotation_claims SET record_id = ?, claimed_at = ?, expires_at = ?
               WHERE provider = ? AND principal = ? AND record_id = ?"#,
        )
        .bind(to.to_string())
        .bind(timestamp(now))
        .bind(expires_at.map(timestamp))
        .bind(key.provider.as_str())
        .bind(&key.principal)
        .bind(from.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(&self, key: &PrincipalKey, record_id: Uuid) -> DomainResult<()> {
        sqlx::query("DELETE FROM rotation_claims WHERE provider = ? AND principal = ? AND record_id = ?")
            .bind(key.provider.as_str())
            .bind(&key.principal)
            .bind(record_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_revocation(&self, record: &RevocationRecord) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO revocation_records (id, scope, target, justification, initiator, started_at, completed_at, outcome, attempted, succeeded, failed)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(record.scope.as_str())
        .bind(&record.target)
        .bind(&record.justification)
        .bind(record.initiator.to_string())
        .bind(timestamp(record.started_at))
        .bind(timestamp(record.completed_at))
        .bind(record.outcome.as_str())
        .bind(serde_json::to_string(&record.attempted)?)
        .bind(serde_json::to_string(&record.succeeded)?)
        .bind(serde_json::to_string(&record.failed)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_revocations(&self, limit: usize) -> DomainResult<Vec<RevocationRecord>> {
        let rows: Vec<RevocationRow> =
            sqlx::query_as("SELECT * FROM revocation_records ORDER BY started_at DESC LIMIT ?")
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct RotationRow {
    id: String,
    provider: String,
    principal: String,
    credential_id: String,
    new_credential_id: Option<String>,
    started_at: String,
    completed_at: Option<String>,
    outcome: Option<String>,
    initiator: String,
    supersedes: Option<String>,
    detail: Option<String>,
}

impl TryFrom<RotationRow> for RotationRecord {
    type Error = DomainError;

    fn try_from(row: RotationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            provider: ProviderId::new(row.provider),
            principal: row.principal,
            credential_id: row.credential_id,
            new_credential_id: row.new_credential_id,
            started_at: parse_datetime(&row.started_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            outcome: row.outcome.map(|o| o.parse()).transpose()?,
            initiator: Initiator::from(row.initiator),
            supersedes: parse_optional_uuid(row.supersedes)?,
            detail: row.detail,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RevocationRow {
    id: String,
    scope: String,
    target: String,
    justification: String,
    initiator: String,
    started_at: String,
    completed_at: String,
    outcome: String,
    attempted: String,
    succeeded: String,
    failed: String,
}

impl TryFrom<RevocationRow> for RevocationRecord {
    type Error = DomainError;

    fn try_from(row: RevocationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            scope: row.scope.parse::<RevocationScope>()?,
            target: row.target,
            justification: row.justification,
            initiator: Initiator::from(row.initiator),
            started_at: parse_datetime(&row.started_at)?,
            completed_at: parse_datetime(&row.completed_at)?,
            outcome: row.outcome.parse::<RevocationOutcome>()?,
            attempted: serde_json::from_str(&row.attempted)?,
            succeeded: serde_json::from_str(&row.succeeded)?,
            failed: serde_json::from_str(&row.failed)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::RevocationFailure;
    use chrono::Duration;

    async fn setup_store() -> SqliteRecordStore {
        SqliteRecordStore::new(create_migrated_test_pool().await.unwrap())
    }

    fn key() -> PrincipalKey {
        PrincipalKey::new(ProviderId::new("gcp:prod"), "deploy@prod.iam.gserviceaccount.com")
    }

    #[tokio::test]
    async fn test_insert_and_get_rotation() {
        let store = setup_store().await;
        let record = RotationRecord::start(&key(), "k1", Initiator::operator("alice"), Utc::now());
        store.insert_rotation(&record).await.unwrap();

        let loaded = store.get_rotation(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.credential_id, "k1");
        assert_eq!(loaded.initiator, Initiator::operator("alice"));
        assert!(loaded.outcome.is_none());
    }

    #[tokio::test]
    async fn test_settle_is_write_once() {
        let store = setup_store().await;
        let record = RotationRecord::start(&key(), "k1", Initiator::Scheduled, Utc::now());
        store.insert_rotation(&record).await.unwrap();

        store
            .settle_rotation(record.id, RotationOutcome::PendingCleanup, Some("k2"), None, Utc::now())
            .await
            .unwrap();

        let err = store
            .settle_rotation(record.id, RotationOutcome::Success, None, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));

        let loaded = store.get_rotation(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.outcome, Some(RotationOutcome::PendingCleanup));
        assert_eq!(loaded.new_credential_id.as_deref(), Some("k2"));
    }

    #[tokio::test]
    async fn test_settle_unknown_record() {
        let store = setup_store().await;
        let err = store
            .settle_rotation(Uuid::new_v4(), RotationOutcome::Failed, None, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::RotationRecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_pending_cleanup_cleared_by_successful_follow_up() {
        let store = setup_store().await;
        let now = Utc::now();

        let mut parked = RotationRecord::start(&key(), "k1", Initiator::Scheduled, now - Duration::days(2));
        store.insert_rotation(&parked).await.unwrap();
        store
            .settle_rotation(parked.id, RotationOutcome::PendingCleanup, Some("k2"), None, now - Duration::days(2))
            .await
            .unwrap();
        parked = store.get_rotation(parked.id).await.unwrap().unwrap();

        assert_eq!(store.pending_cleanups().await.unwrap().len(), 1);
        assert_eq!(store.pending_cleanup_for(&key()).await.unwrap().unwrap().id, parked.id);

        // A failed follow-up leaves the rotation parked.
        let failed = parked.follow_up(Initiator::Scheduled, now);
        store.insert_rotation(&failed).await.unwrap();
        store
            .settle_rotation(failed.id, RotationOutcome::Failed, None, Some("revoke denied"), now)
            .await
            .unwrap();
        assert!(store.pending_cleanup_for(&key()).await.unwrap().is_some());

        let done = parked.follow_up(Initiator::operator("bob"), now);
        store.insert_rotation(&done).await.unwrap();
        store
            .settle_rotation(done.id, RotationOutcome::Success, None, None, now)
            .await
            .unwrap();

        assert!(store.pending_cleanups().await.unwrap().is_empty());
        assert!(store.pending_cleanup_for(&key()).await.unwrap().is_none());

        let recent = store.recent_rotations(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].supersedes, Some(parked.id));
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_until_released() {
        let store = setup_store().await;
        let now = Utc::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let lease = Some(now + Duration::hours(1));

        assert!(store.claim_principal(&key(), a, now, lease).await.unwrap());
        assert!(!store.claim_principal(&key(), b, now, lease).await.unwrap());

        // Releasing with the wrong holder is a no-op.
        store.release_claim(&key(), b).await.unwrap();
        assert!(!store.claim_principal(&key(), b, now, lease).await.unwrap());

        store.release_claim(&key(), a).await.unwrap();
        assert!(store.claim_principal(&key(), b, now, lease).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_claim_can_be_taken_over() {
        let store = setup_store().await;
        let now = Utc::now();
        let (stale, fresh) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(store
            .claim_principal(&key(), stale, now - Duration::hours(2), Some(now - Duration::hours(1)))
            .await
            .unwrap());
        assert!(store
            .claim_principal(&key(), fresh, now, Some(now + Duration::hours(1)))
            .await
            .unwrap());

        // The stale holder lost the claim and cannot hand it on.
        assert!(!store
            .transfer_claim(&key(), stale, Uuid::new_v4(), now, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_parked_claim_never_expires() {
        let store = setup_store().await;
        let now = Utc::now();
        let (parked, follow_up, intruder) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        assert!(store.claim_principal(&key(), parked, now, None).await.unwrap());
        let much_later = now + Duration::days(365);
        assert!(!store
            .claim_principal(&key(), intruder, much_later, Some(much_later + Duration::hours(1)))
            .await
            .unwrap());

        assert!(store
            .transfer_claim(&key(), parked, follow_up, much_later, Some(much_later + Duration::hours(1)))
            .await
            .unwrap());
        // Only one of two concurrent cleanups can take the hand-off.
        assert!(!store
            .transfer_claim(&key(), parked, intruder, much_later, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_revocation_round_trip() {
        let store = setup_store().await;
        let now = Utc::now();
        let record = RevocationRecord {
            id: Uuid::new_v4(),
            scope: RevocationScope::AllCredentialsForPrincipal,
            target: "ci@proj.iam".to_string(),
            justification: "leaked".to_string(),
            initiator: Initiator::operator("alice"),
            started_at: now,
            completed_at: now,
            outcome: RevocationOutcome::PartialFailure,
            attempted: vec!["a".into(), "b".into()],
            succeeded: vec!["a".into()],
            failed: vec![RevocationFailure {
                credential_id: "b".into(),
                principal: "ci@proj.iam".into(),
                error: "permission denied".into(),
            }],
        };
        store.insert_revocation(&record).await.unwrap();

        let loaded = store.recent_revocations(5).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].outcome, RevocationOutcome::PartialFailure);
        assert_eq!(loaded[0].failed[0].credential_id, "b");
    }
}
