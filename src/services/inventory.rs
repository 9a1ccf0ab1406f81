//! Last-known credential snapshot across providers.
//!
//! Readers load an `Arc<Inventory>` and never see a partially refreshed
//! provider: `refresh` builds the replacement slice off to the side and swaps
//! the whole inventory in one `rcu`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::errors::ProviderResult;
use crate::domain::models::{Credential, CredentialKind, PrincipalFilter, ProviderId};
use crate::domain::ports::ProviderAdapter;
use crate::services::classifier::credential_age;
use crate::services::retry::RetryPolicy;

/// One provider's last successful `discover` result.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSlice {
    /// Provider the slice came from.
    pub provider: ProviderId,
    /// Everything `discover` returned, principals included only if they hold credentials.
    pub credentials: Vec<Credential>,
    /// When the `discover` call completed.
    pub refreshed_at: DateTime<Utc>,
}

/// Immutable snapshot of every provider slice.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    slices: BTreeMap<ProviderId, ProviderSlice>,
}

impl Inventory {
    /// Slice of one provider, if it was ever refreshed.
    pub fn slice(&self, provider: &ProviderId) -> Option<&ProviderSlice> {
        self.slices.get(provider)
    }

    /// Slices ordered by provider id.
    pub fn slices(&self) -> impl Iterator<Item = &ProviderSlice> {
        self.slices.values()
    }

    /// Every credential across all slices.
    pub fn credentials(&self) -> impl Iterator<Item = &Credential> {
        self.slices.values().flat_map(|s| s.credentials.iter())
    }

    /// Number of credentials across all slices.
    pub fn len(&self) -> usize {
        self.slices.values().map(|s| s.credentials.len()).sum()
    }

    /// True when no slice holds a credential.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A queried credential together with the freshness of its slice.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryItem {
    /// The credential as last discovered.
    pub credential: Credential,
    /// When its slice was refreshed.
    pub refreshed_at: DateTime<Utc>,
    /// Slice is older than the inventory TTL.
    pub stale: bool,
}

/// Filter for [`InventoryStore::query`]. Every set field must match.
#[derive(Debug, Clone, Default)]
pub struct CredentialQuery {
    /// Only this provider.
    pub provider: Option<ProviderId>,
    /// Only this principal.
    pub principal: Option<String>,
    /// Only this project or tenant.
    pub project: Option<String>,
    /// Only the credential with this id.
    pub credential_id: Option<String>,
    /// Only credentials of this kind.
    pub kind: Option<CredentialKind>,
    /// Only credentials at least this old (known age only).
    pub older_than: Option<Duration>,
}

impl CredentialQuery {
    /// Match everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match everything from one provider.
    pub fn for_provider(provider: ProviderId) -> Self {
        Self {
            provider: Some(provider),
            ..Self::default()
        }
    }

    fn matches(&self, credential: &Credential, now: DateTime<Utc>) -> bool {
        self.provider.as_ref().is_none_or(|p| p == &credential.provider)
            && self.principal.as_deref().is_none_or(|p| p == credential.principal)
            && self.project.as_deref().is_none_or(|p| p == credential.project)
            && self.credential_id.as_deref().is_none_or(|id| id == credential.id)
            && self.kind.is_none_or(|k| k == credential.kind)
            && self.older_than.is_none_or(|min| {
                credential_age(credential.issued_at, now).is_some_and(|age| age >= min)
            })
    }
}

/// Freshness of one provider slice, for `status`.
#[derive(Debug, Clone, Serialize)]
pub struct SliceFreshness {
    /// Provider the slice came from.
    pub provider: ProviderId,
    /// Credentials in the slice.
    pub credentials: usize,
    /// When the slice was refreshed.
    pub refreshed_at: DateTime<Utc>,
    /// Slice is older than the inventory TTL.
    pub stale: bool,
}

/// Lock-free holder of the current [`Inventory`].
pub struct InventoryStore {
    current: ArcSwap<Inventory>,
    ttl: Duration,
}

impl InventoryStore {
    /// Empty store; slices older than `ttl` are reported stale.
    pub fn new(ttl: Duration) -> Self {
        Self {
            current: ArcSwap::from_pointee(Inventory::default()),
            ttl,
        }
    }

    /// Staleness threshold.
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The current inventory. Later refreshes do not change it.
    pub fn snapshot(&self) -> Arc<Inventory> {
        self.current.load_full()
    }

    /// Replace one provider's slice.
    pub fn replace(&self, provider: ProviderId, credentials: Vec<Credential>, refreshed_at: DateTime<Utc>) {
        let slice = ProviderSlice {
            provider: provider.clone(),
            credentials,
            refreshed_at,
        };
        self.current.rcu(|inventory| {
            let mut next = Inventory::clone(inventory);
            next.slices.insert(provider.clone(), slice.clone());
            next
        });
    }

    /// Run `discover` on the adapter and install the result.
    ///
    /// On failure the previous slice stays in place and ages towards stale.
    #[instrument(skip(self, adapter, retry), fields(provider = %adapter.id()))]
    pub async fn refresh(
        &self,
        adapter: &dyn ProviderAdapter,
        retry: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> ProviderResult<usize> {
        let filter = PrincipalFilter::All;
        let credentials = match retry.execute("discover", || adapter.discover(&filter)).await {
            Ok(credentials) => credentials,
            Err(err) => {
                warn!(error = %err, "discover failed, keeping previous inventory slice");
                return Err(err);
            }
        };

        let count = credentials.len();
        self.replace(adapter.id().clone(), credentials, now);
        info!(credentials = count, "inventory slice refreshed");
        Ok(count)
    }

    fn is_stale(&self, refreshed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        (now - refreshed_at)
            .to_std()
            .is_ok_and(|age| age > self.ttl)
    }

    /// Credentials matching `query`, each tagged with its slice freshness.
    pub fn query(&self, query: &CredentialQuery, now: DateTime<Utc>) -> Vec<InventoryItem> {
        let inventory = self.current.load();
        inventory
            .slices()
            .filter(|slice| query.provider.as_ref().is_none_or(|p| p == &slice.provider))
            .flat_map(|slice| {
                let stale = self.is_stale(slice.refreshed_at, now);
                slice
                    .credentials
                    .iter()
                    .filter(move |c| query.matches(c, now))
                    .map(move |c| InventoryItem {
                        credential: c.clone(),
                        refreshed_at: slice.refreshed_at,
                        stale,
                    })
            })
            .collect()
    }

    /// Freshness of every slice, ordered by provider id.
    pub fn freshness(&self, now: DateTime<Utc>) -> Vec<SliceFreshness> {
        self.current
            .load()
            .slices()
            .map(|slice| SliceFreshness {
                provider: slice.provider.clone(),
                credentials: slice.credentials.len(),
                refreshed_at: slice.refreshed_at,
                stale: self.is_stale(slice.refreshed_at, now),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn credential(provider: &str, principal: &str, id: &str, days_old: i64) -> Credential {
        Credential {
            id: id.to_string(),
            principal: principal.to_string(),
            provider: ProviderId::new(provider),
            project: "proj".to_string(),
            kind: CredentialKind::LongLivedKey,
            issued_at: Some(Utc::now() - ChronoDuration::days(days_old)),
        }
    }

    #[test]
    fn test_replace_only_touches_one_provider() {
        let store = InventoryStore::new(Duration::from_secs(300));
        let now = Utc::now();
        store.replace(ProviderId::new("a"), vec![credential("a", "svc", "1", 1)], now);
        store.replace(ProviderId::new("b"), vec![credential("b", "svc", "2", 1)], now);

        let before = store.snapshot();
        store.replace(ProviderId::new("a"), vec![], now);

        assert_eq!(before.len(), 2, "earlier snapshot is unaffected");
        assert_eq!(store.snapshot().len(), 1);
        assert!(store.snapshot().slice(&ProviderId::new("b")).is_some());
    }

    #[test]
    fn test_stale_after_ttl() {
        let store = InventoryStore::new(Duration::from_secs(300));
        let refreshed = Utc::now() - ChronoDuration::minutes(10);
        store.replace(ProviderId::new("a"), vec![credential("a", "svc", "1", 1)], refreshed);

        let items = store.query(&CredentialQuery::all(), Utc::now());
        assert_eq!(items.len(), 1);
        assert!(items[0].stale);

        let items = store.query(&CredentialQuery::all(), refreshed + ChronoDuration::minutes(1));
        assert!(!items[0].stale);
    }

    #[test]
    fn test_query_filters() {
        let store = InventoryStore::new(Duration::from_secs(300));
        let now = Utc::now();
        store.replace(
            ProviderId::new("a"),
            vec![
                credential("a", "svc", "1", 100),
                credential("a", "svc", "2", 5),
                credential("a", "other", "3", 100),
            ],
            now,
        );

        let old_svc = store.query(
            &CredentialQuery {
                principal: Some("svc".to_string()),
                older_than: Some(Duration::from_secs(30 * 86_400)),
                ..CredentialQuery::default()
            },
            now,
        );
        assert_eq!(old_svc.len(), 1);
        assert_eq!(old_svc[0].credential.id, "1");

        let by_id = store.query(
            &CredentialQuery {
                credential_id: Some("3".to_string()),
                ..CredentialQuery::default()
            },
            now,
        );
        assert_eq!(by_id[0].credential.principal, "other");
    }
}
