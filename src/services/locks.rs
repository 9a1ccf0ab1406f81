//! Per-principal mutual exclusion for rotations.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::models::PrincipalKey;

/// Set of principals with a rotation in flight.
///
/// Acquisition never waits: a held key is reported back to the caller, which
/// logs a duplicate-suppressed skip.
#[derive(Debug, Clone, Default)]
pub struct RotationLocks {
    held: Arc<Mutex<HashSet<PrincipalKey>>>,
}

impl RotationLocks {
    /// No principal held.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the key, or `None` if another rotation holds it.
    pub fn try_acquire(&self, key: &PrincipalKey) -> Option<RotationLease> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.insert(key.clone()).then(|| RotationLease {
            key: key.clone(),
            held: Arc::clone(&self.held),
        })
    }

    /// True while a lease for `key` is alive.
    pub fn is_held(&self, key: &PrincipalKey) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

/// Releases its key on drop.
#[derive(Debug)]
pub struct RotationLease {
    key: PrincipalKey,
    held: Arc<Mutex<HashSet<PrincipalKey>>>,
}

impl RotationLease {
    /// Principal this lease holds.
    pub const fn key(&self) -> &PrincipalKey {
        &self.key
    }
}

impl Drop for RotationLease {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ProviderId;

    #[test]
    fn test_second_acquire_is_refused_until_release() {
        let locks = RotationLocks::new();
        let key = PrincipalKey::new(ProviderId::new("gcp:p"), "svc");

        let lease = locks.try_acquire(&key).expect("first acquire");
        assert!(locks.try_acquire(&key).is_none());
        assert!(locks.is_held(&key));

        drop(lease);
        assert!(!locks.is_held(&key));
        assert!(locks.try_acquire(&key).is_some());
    }

    #[test]
    fn test_keys_are_independent() {
        let locks = RotationLocks::new();
        let _a = locks.try_acquire(&PrincipalKey::new(ProviderId::new("p"), "a")).unwrap();
        assert!(locks.try_acquire(&PrincipalKey::new(ProviderId::new("p"), "b")).is_some());
        assert!(locks.try_acquire(&PrincipalKey::new(ProviderId::new("q"), "a")).is_some());
    }
}
