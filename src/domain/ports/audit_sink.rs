//! Audit sink port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::AuditEntry;

/// Durable, append-only destination for audit entries.
///
/// A failed `append` must be reported as [`DomainError::AuditWrite`]; callers
/// treat it as fatal.
///
/// [`DomainError::AuditWrite`]: crate::domain::errors::DomainError::AuditWrite
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Durably append one entry.
    async fn append(&self, entry: &AuditEntry) -> DomainResult<()>;

    /// Most recent entries, oldest first.
    async fn recent(&self, limit: usize) -> DomainResult<Vec<AuditEntry>>;
}
