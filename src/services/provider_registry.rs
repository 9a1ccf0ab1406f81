//! Lookup of configured provider adapters by id.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ProviderId;
use crate::domain::ports::ProviderAdapter;

/// Registry of available provider adapters.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an adapter. Two adapters may not share an id.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) -> DomainResult<()> {
        let id = adapter.id().clone();
        if self.providers.contains_key(&id) {
            return Err(DomainError::InvalidRequest(format!(
                "provider '{id}' is configured more than once"
            )));
        }
        self.providers.insert(id, adapter);
        Ok(())
    }

    /// Builder form of [`register`](Self::register). A duplicate id replaces the earlier adapter.
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        let id = adapter.id().clone();
        self.providers.insert(id, adapter);
        self
    }

    /// Adapter registered under `id`.
    pub fn get(&self, id: &ProviderId) -> DomainResult<Arc<dyn ProviderAdapter>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| DomainError::UnknownProvider(id.to_string()))
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &ProviderId> {
        self.providers.keys()
    }

    /// Registered adapters in id order.
    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn ProviderAdapter>> {
        self.providers.values()
    }

    /// Adapters whose scope is `project`.
    pub fn for_project<'a>(&'a self, project: &'a str) -> impl Iterator<Item = &'a Arc<dyn ProviderAdapter>> {
        self.providers.values().filter(move |a| a.project() == project)
    }

    /// Number of adapters.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// True when no adapter is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::providers::InMemoryProvider;

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(Arc::new(InMemoryProvider::new("mem", "proj")))
            .unwrap();
        let err = registry
            .register(Arc::new(InMemoryProvider::new("mem", "other")))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidRequest(_)));
    }

    #[test]
    fn test_lookup() {
        let registry = ProviderRegistry::new()
            .with(Arc::new(InMemoryProvider::new("a", "proj-a")))
            .with(Arc::new(InMemoryProvider::new("b", "proj-b")));

        assert!(registry.get(&ProviderId::new("a")).is_ok());
        assert!(matches!(
            registry.get(&ProviderId::new("zzz")),
            Err(DomainError::UnknownProvider(_))
        ));
        assert_eq!(registry.for_project("proj-b").count(), 1);
    }
}
