//! Rotation and revocation record persistence port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{PrincipalKey, RevocationRecord, RotationOutcome, RotationRecord};

/// Append-only store for rotation and revocation facts.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a freshly started rotation record.
    async fn insert_rotation(&self, record: &RotationRecord) -> DomainResult<()>;

    /// Set the outcome of an unsettled record. Fails with
    /// `InvalidStateTransition` if the record already has an outcome.
    async fn settle_rotation(
        &self,
        record_id: Uuid,
        outcome: RotationOutcome,
        new_credential_id: Option<&str>,
        detail: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> DomainResult<()>;

    /// Record by id.
    async fn get_rotation(&self, record_id: Uuid) -> DomainResult<Option<RotationRecord>>;

    /// Parked rotations with no successful follow-up, oldest first.
    async fn pending_cleanups(&self) -> DomainResult<Vec<RotationRecord>>;

    /// Parked rotation for one principal, if any.
    async fn pending_cleanup_for(&self, key: &PrincipalKey) -> DomainResult<Option<RotationRecord>>;

    /// Most recent rotation records, newest first.
    async fn recent_rotations(&self, limit: usize) -> DomainResult<Vec<RotationRecord>>;

    /// Claim `key` for `record_id`. Returns `false` when another rotation
    /// holds an unexpired claim. `expires_at: None` never expires.
    ///
    /// Must be atomic across every process sharing the store.
    async fn claim_principal(
        &self,
        key: &PrincipalKey,
        record_id: Uuid,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> DomainResult<bool>;

    /// Hand the claim on `key` from `from` to `to`. Returns `false` if `from`
    /// no longer holds it.
    async fn transfer_claim(
        &self,
        key: &PrincipalKey,
        from: Uuid,
        to: Uuid,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> DomainResult<bool>;

    /// Drop the claim on `key` if `record_id` holds it.
    async fn release_claim(&self, key: &PrincipalKey, record_id: Uuid) -> DomainResult<()>;

    /// Insert a finished emergency revocation.
    async fn insert_revocation(&self, record: &RevocationRecord) -> DomainResult<()>;

    /// Most recent revocation records, newest first.
    async fn recent_revocations(&self, limit: usize) -> DomainResult<Vec<RevocationRecord>>;
}
