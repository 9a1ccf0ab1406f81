//! In-memory audit sink for tests and dry runs.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AuditEntry, AuditOperation};
use crate::domain::ports::AuditSink;

/// Keeps entries in a `Vec`. Can be told to start failing, either at once or
/// after a number of successful appends.
#[derive(Default)]
pub struct InMemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
    failing: AtomicBool,
    fail_after: AtomicUsize,
}

impl InMemoryAuditSink {
    /// Empty sink that accepts every append.
    pub fn new() -> Self {
        Self {
            fail_after: AtomicUsize::new(usize::MAX),
            ..Self::default()
        }
    }

    /// Fail every append while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Accept `n` more appends, then fail every one after.
    pub fn fail_after(&self, n: usize) {
        let current = self.len();
        self.fail_after.store(current.saturating_add(n), Ordering::SeqCst);
    }

    /// Copy of everything appended so far.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True before the first append.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries for one operation.
    pub fn count(&self, operation: AuditOperation) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.operation == operation)
            .count()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, entry: &AuditEntry) -> DomainResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if self.failing.load(Ordering::SeqCst) || entries.len() >= self.fail_after.load(Ordering::SeqCst) {
            return Err(DomainError::AuditWrite("audit sink unavailable".to_string()));
        }
        entries.push(entry.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> DomainResult<Vec<AuditEntry>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }
}
