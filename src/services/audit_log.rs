//! Required, append-only audit trail.
//!
//! Every state-changing operation goes through [`AuditTrail::record`]. A write
//! failure is returned as [`DomainError::AuditWrite`] and the caller must stop:
//! an operation that cannot prove it happened does not proceed.

use std::sync::Arc;

use tracing::{error, info};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::AuditEntry;
use crate::domain::ports::AuditSink;
use crate::infrastructure::logging::SecretScrubber;

/// Scrubs and appends audit entries.
#[derive(Clone)]
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
    scrubber: SecretScrubber,
}

impl AuditTrail {
    /// Trail writing to `sink`.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            scrubber: SecretScrubber::new(),
        }
    }

    /// Scrub `detail` and append. Any failure becomes [`DomainError::AuditWrite`].
    pub async fn record(&self, mut entry: AuditEntry) -> DomainResult<()> {
        entry.detail = self.scrubber.scrub_value(&entry.detail);

        match self.sink.append(&entry).await {
            Ok(()) => {
                info!(
                    operation = %entry.operation,
                    actor = %entry.actor,
                    target = %entry.target,
                    outcome = ?entry.outcome,
                    "audit"
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    operation = %entry.operation,
                    target = %entry.target,
                    error = %err,
                    "audit write failed"
                );
                Err(match err {
                    DomainError::AuditWrite(_) => err,
                    other => DomainError::AuditWrite(other.to_string()),
                })
            }
        }
    }

    /// Most recent entries, oldest first.
    pub async fn recent(&self, limit: usize) -> DomainResult<Vec<AuditEntry>> {
        self.sink.recent(limit).await
    }
}
