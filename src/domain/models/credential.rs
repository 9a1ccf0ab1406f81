//! Normalized credential model shared by every provider adapter.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier of a provider adapter (e.g. `gcp:prod-project`).
///
/// Core logic compares these for equality only; it never branches on the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Wrap a configured provider id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as configured.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The unit of mutual exclusion for rotations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipalKey {
    /// Adapter that owns the principal.
    pub provider: ProviderId,
    /// Provider-native principal name (service account email, application id).
    pub principal: String,
}

impl PrincipalKey {
    /// Key for `principal` at `provider`.
    pub fn new(provider: ProviderId, principal: impl Into<String>) -> Self {
        Self {
            provider,
            principal: principal.into(),
        }
    }
}

impl fmt::Display for PrincipalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.principal)
    }
}

/// What kind of authentication material a credential is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialKind {
    /// A long-lived key that must be rotated.
    LongLivedKey,
    /// A trust relationship issuing short-lived tokens; reviewed, never rotated.
    FederatedTokenBinding,
}

impl CredentialKind {
    /// Wire and display name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LongLivedKey => "long-lived-key",
            Self::FederatedTokenBinding => "federated-token-binding",
        }
    }

    /// Only long-lived keys go through the rotation workflow.
    pub const fn is_rotatable(&self) -> bool {
        matches!(self, Self::LongLivedKey)
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A principal's authentication material as reported by its control plane.
///
/// `issued_at` is only ever populated from a control-plane response; `None`
/// means the provider did not report a parseable issuance time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Provider-native credential id.
    pub id: String,
    /// Principal holding the credential.
    pub principal: String,
    /// Adapter that reported it.
    pub provider: ProviderId,
    /// Project, tenant or file the principal lives in.
    pub project: String,
    /// Key or federated binding.
    pub kind: CredentialKind,
    /// Issuance time as reported by the control plane.
    pub issued_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Lock key of the principal holding this credential.
    pub fn principal_key(&self) -> PrincipalKey {
        PrincipalKey::new(self.provider.clone(), self.principal.clone())
    }
}

/// Descriptive information about a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalInfo {
    /// Provider-native principal name.
    pub principal: String,
    /// Adapter that described it.
    pub provider: ProviderId,
    /// Project or tenant.
    pub project: String,
    /// Human-readable name, if the provider has one.
    pub display_name: Option<String>,
    /// Disabled principals are never rotated.
    pub disabled: bool,
}

/// One-time secret returned by credential creation.
///
/// Deliberately not `Serialize` and redacted in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretMaterial(String);

impl SecretMaterial {
    /// Take ownership of freshly issued secret text.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The secret text. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretMaterial([REDACTED])")
    }
}

/// Result of `CreateCredential`: the confirmed credential plus its secret.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    /// The new credential as the control plane confirmed it.
    pub credential: Credential,
    /// Returned once; never persisted.
    pub secret: SecretMaterial,
}

/// Which principals a discovery should cover.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PrincipalFilter {
    /// Every principal the adapter can see.
    #[default]
    All,
    /// Only the named principals.
    Only(Vec<String>),
}

impl PrincipalFilter {
    /// Cover exactly one principal.
    pub fn single(principal: impl Into<String>) -> Self {
        Self::Only(vec![principal.into()])
    }

    /// True if `principal` is covered.
    pub fn matches(&self, principal: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.iter().any(|n| n == principal),
        }
    }
}
