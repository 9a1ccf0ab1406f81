//! Provider adapter port: the only path to a cloud identity control plane.

use async_trait::async_trait;

use crate::domain::errors::ProviderResult;
use crate::domain::models::{Credential, IssuedCredential, PrincipalFilter, PrincipalInfo, ProviderId};

/// Contract implemented once per identity provider.
///
/// Adapters classify every failure as transient or terminal before returning it.
/// Callers own retries; adapters make exactly one attempt per call.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable id of this adapter instance.
    fn id(&self) -> &ProviderId;

    /// Provider scope (project, tenant, ...) this adapter is bound to.
    fn project(&self) -> &str;

    /// List every credential visible under the current authorization.
    /// Idempotent and side-effect-free.
    async fn discover(&self, filter: &PrincipalFilter) -> ProviderResult<Vec<Credential>>;

    /// Describe a principal.
    async fn describe(&self, principal: &str) -> ProviderResult<PrincipalInfo>;

    /// Issue a new long-lived key. The secret is returned exactly once.
    async fn create_credential(&self, principal: &str) -> ProviderResult<IssuedCredential>;

    /// Confirm a freshly issued credential is usable with an authenticated no-op.
    async fn validate_credential(&self, issued: &IssuedCredential) -> ProviderResult<()>;

    /// Revoke a credential. Revoking an already-revoked credential succeeds.
    async fn revoke_credential(&self, credential: &Credential) -> ProviderResult<()>;
}
