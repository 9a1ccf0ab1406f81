//! In-process control plane.
//!
//! Used by the test suite and for dry runs. Supports fault injection per
//! operation, per-credential revoke faults, artificial latency and call
//! counting.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::adapters::clock::SystemClock;
use crate::domain::errors::{ProviderError, ProviderResult};
use crate::domain::models::{
    Credential, CredentialKind, IssuedCredential, PrincipalFilter, PrincipalInfo, ProviderId,
    SecretMaterial,
};
use crate::domain::ports::{Clock, ProviderAdapter};

/// Provider operations that can be counted or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOp {
    /// `discover_credentials`.
    Discover,
    /// `describe_principal`.
    Describe,
    /// `create_credential`.
    Create,
    /// `validate_credential`.
    Validate,
    /// `revoke_credential`.
    Revoke,
}

impl fmt::Display for ProviderOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Discover => "discover",
            Self::Describe => "describe",
            Self::Create => "create",
            Self::Validate => "validate",
            Self::Revoke => "revoke",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct Principal {
    display_name: Option<String>,
    disabled: bool,
    credentials: Vec<Credential>,
}

#[derive(Debug, Default)]
struct State {
    principals: BTreeMap<String, Principal>,
    sequence: u64,
    queued_faults: HashMap<ProviderOp, VecDeque<ProviderError>>,
    sticky_faults: HashMap<ProviderOp, ProviderError>,
    revoke_faults: HashMap<String, ProviderError>,
    lost_create_responses: usize,
    calls: HashMap<ProviderOp, usize>,
    created: Vec<String>,
    revoked: Vec<String>,
}

impl State {
    fn enter(&mut self, op: ProviderOp) -> ProviderResult<()> {
        *self.calls.entry(op).or_default() += 1;
        if let Some(err) = self.queued_faults.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        if let Some(err) = self.sticky_faults.get(&op) {
            return Err(err.clone());
        }
        Ok(())
    }

    fn find(&self, credential_id: &str) -> Option<&Credential> {
        self.principals
            .values()
            .flat_map(|p| p.credentials.iter())
            .find(|c| c.id == credential_id)
    }
}

/// Scriptable control plane kept in memory.
pub struct InMemoryProvider {
    id: ProviderId,
    project: String,
    latency: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl InMemoryProvider {
    /// Empty control plane with no latency.
    pub fn new(id: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            id: ProviderId::new(id),
            project: project.into(),
            latency: Duration::ZERO,
            clock: Arc::new(SystemClock),
            state: Mutex::new(State::default()),
        }
    }

    /// Sleep this long inside every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Clock used to stamp newly created credentials.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a principal with no credentials. No-op if it exists.
    pub fn add_principal(&self, principal: &str) {
        self.state()
            .principals
            .entry(principal.to_string())
            .or_insert_with(|| Principal {
                display_name: None,
                disabled: false,
                credentials: Vec::new(),
            });
    }

    /// Mark a principal disabled, registering it first if needed.
    pub fn set_disabled(&self, principal: &str, disabled: bool) {
        self.add_principal(principal);
        if let Some(p) = self.state().principals.get_mut(principal) {
            p.disabled = disabled;
        }
    }

    /// Seed a long-lived key. Creates the principal if needed.
    pub fn add_key(&self, principal: &str, issued_at: Option<DateTime<Utc>>) -> Credential {
        self.add_credential(principal, CredentialKind::LongLivedKey, issued_at)
    }

    /// Seed a federated token binding.
    pub fn add_binding(&self, principal: &str, issued_at: Option<DateTime<Utc>>) -> Credential {
        self.add_credential(principal, CredentialKind::FederatedTokenBinding, issued_at)
    }

    fn add_credential(
        &self,
        principal: &str,
        kind: CredentialKind,
        issued_at: Option<DateTime<Utc>>,
    ) -> Credential {
        self.add_principal(principal);
        let mut state = self.state();
        state.sequence += 1;
        let credential = Credential {
            id: format!("{principal}-{}", state.sequence),
            principal: principal.to_string(),
            provider: self.id.clone(),
            project: self.project.clone(),
            kind,
            issued_at,
        };
        if let Some(p) = state.principals.get_mut(principal) {
            p.credentials.push(credential.clone());
        }
        credential
    }

    /// Delete a credential behind the engine's back.
    pub fn remove_credential(&self, credential_id: &str) -> bool {
        let mut state = self.state();
        let mut removed = false;
        for p in state.principals.values_mut() {
            let before = p.credentials.len();
            p.credentials.retain(|c| c.id != credential_id);
            removed |= p.credentials.len() != before;
        }
        removed
    }

    /// Fail the next call of `op` with `err`. Faults queue in order.
    pub fn fail_next(&self, op: ProviderOp, err: ProviderError) {
        self.state().queued_faults.entry(op).or_default().push_back(err);
    }

    /// Fail every call of `op` until [`clear_faults`](Self::clear_faults).
    pub fn fail_always(&self, op: ProviderOp, err: ProviderError) {
        self.state().sticky_faults.insert(op, err);
    }

    /// Fail every revoke of one credential.
    pub fn fail_revoke_of(&self, credential_id: &str, err: ProviderError) {
        self.state().revoke_faults.insert(credential_id.to_string(), err);
    }

    /// The next create takes effect but the caller sees a timeout.
    pub fn lose_next_create_response(&self) {
        self.state().lost_create_responses += 1;
    }

    /// Drop every injected fault.
    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.lost_create_responses = 0;
        state.queued_faults.clear();
        state.sticky_faults.clear();
        state.revoke_faults.clear();
    }

    /// Number of calls made to `op`, including failed ones.
    pub fn calls(&self, op: ProviderOp) -> usize {
        self.state().calls.get(&op).copied().unwrap_or_default()
    }

    /// Ids of credentials created through `create_credential`, in order.
    pub fn created(&self) -> Vec<String> {
        self.state().created.clone()
    }

    /// Ids of credentials removed through `revoke_credential`, in order.
    pub fn revoked(&self) -> Vec<String> {
        self.state().revoked.clone()
    }

    /// Every live credential across principals.
    pub fn credentials(&self) -> Vec<Credential> {
        self.state()
            .principals
            .values()
            .flat_map(|p| p.credentials.iter().cloned())
            .collect()
    }

    /// Ids of the live credentials of one principal.
    pub fn credential_ids(&self, principal: &str) -> Vec<String> {
        self.state()
            .principals
            .get(principal)
            .map(|p| p.credentials.iter().map(|c| c.id.clone()).collect())
            .unwrap_or_default()
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl ProviderAdapter for InMemoryProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn project(&self) -> &str {
        &self.project
    }

    async fn discover(&self, filter: &PrincipalFilter) -> ProviderResult<Vec<Credential>> {
        self.pause().await;
        let mut state = self.state();
        state.enter(ProviderOp::Discover)?;
        Ok(state
            .principals
            .iter()
            .filter(|(name, _)| filter.matches(name))
            .flat_map(|(_, p)| p.credentials.iter().cloned())
            .collect())
    }

    async fn describe(&self, principal: &str) -> ProviderResult<PrincipalInfo> {
        self.pause().await;
        let mut state = self.state();
        state.enter(ProviderOp::Describe)?;
        let p = state
            .principals
            .get(principal)
            .ok_or_else(|| ProviderError::not_found(format!("principal {principal}")))?;
        Ok(PrincipalInfo {
            principal: principal.to_string(),
            provider: self.id.clone(),
            project: self.project.clone(),
            display_name: p.display_name.clone(),
            disabled: p.disabled,
        })
    }

    async fn create_credential(&self, principal: &str) -> ProviderResult<IssuedCredential> {
        self.pause().await;
        let now = self.clock.now();
        let mut state = self.state();
        state.enter(ProviderOp::Create)?;
        if !state.principals.contains_key(principal) {
            return Err(ProviderError::not_found(format!("principal {principal}")));
        }
        state.sequence += 1;
        let credential = Credential {
            id: format!("{principal}-{}", state.sequence),
            principal: principal.to_string(),
            provider: self.id.clone(),
            project: self.project.clone(),
            kind: CredentialKind::LongLivedKey,
            issued_at: Some(now),
        };
        state.created.push(credential.id.clone());
        if let Some(p) = state.principals.get_mut(principal) {
            p.credentials.push(credential.clone());
        }
        if state.lost_create_responses > 0 {
            state.lost_create_responses -= 1;
            return Err(ProviderError::timeout(format!(
                "create for {principal} timed out after the key was issued"
            )));
        }
        let secret = SecretMaterial::new(format!("memory-secret-{}", credential.id));
        Ok(IssuedCredential { credential, secret })
    }

    async fn validate_credential(&self, issued: &IssuedCredential) -> ProviderResult<()> {
        self.pause().await;
        let mut state = self.state();
        state.enter(ProviderOp::Validate)?;
        if state.find(&issued.credential.id).is_none() {
            return Err(ProviderError::not_found(format!(
                "credential {}",
                issued.credential.id
            )));
        }
        Ok(())
    }

    async fn revoke_credential(&self, credential: &Credential) -> ProviderResult<()> {
        self.pause().await;
        let mut state = self.state();
        state.enter(ProviderOp::Revoke)?;
        if let Some(err) = state.revoke_faults.get(&credential.id) {
            return Err(err.clone());
        }
        let Some(principal) = state.principals.get_mut(&credential.principal) else {
            return Ok(());
        };
        let before = principal.credentials.len();
        principal.credentials.retain(|c| c.id != credential.id);
        let removed = principal.credentials.len() != before;
        if removed {
            state.revoked.push(credential.id.clone());
        }
        Ok(())
    }
}
