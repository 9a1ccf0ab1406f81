//! Domain errors for the keywarden credential engine.
//!
//! Provider errors are classified exactly once, inside the adapter that talked to
//! the control plane. Everything upstream decides retry vs. abort from that
//! classification alone.

use std::fmt;

use thiserror::Error;

/// Why a provider call may succeed if attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// Connection reset, DNS failure or similar.
    Network,
    /// HTTP 429 or a quota error.
    RateLimited,
    /// A new credential is not visible everywhere yet.
    PropagationDelay,
    /// No answer within the call timeout.
    Timeout,
    /// HTTP 5xx from the control plane.
    Unavailable,
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::RateLimited => "rate-limited",
            Self::PropagationDelay => "propagation-delay",
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Why a provider call will keep failing no matter how often it is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    /// The caller lacks the required role.
    PermissionDenied,
    /// The principal or credential does not exist.
    NotFound,
    /// The control plane rejected the request shape.
    InvalidArgument,
}

impl fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PermissionDenied => "permission-denied",
            Self::NotFound => "not-found",
            Self::InvalidArgument => "invalid-argument",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by a provider adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Retryable: network, rate-limit, propagation delay, timeout.
    #[error("transient provider error ({kind}): {message}")]
    Transient {
        /// Failure class.
        kind: TransientKind,
        /// Provider message, scrubbed of secrets.
        message: String,
    },

    /// Not retryable: permission-denied, not-found, invalid-argument.
    #[error("terminal provider error ({kind}): {message}")]
    Terminal {
        /// Failure class.
        kind: TerminalKind,
        /// Provider message, scrubbed of secrets.
        message: String,
    },
}

impl ProviderError {
    /// Connection-level failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Transient { kind: TransientKind::Network, message: message.into() }
    }

    /// Throttled by the control plane.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::Transient { kind: TransientKind::RateLimited, message: message.into() }
    }

    /// Change not visible yet.
    pub fn propagation_delay(message: impl Into<String>) -> Self {
        Self::Transient { kind: TransientKind::PropagationDelay, message: message.into() }
    }

    /// Call did not answer in time.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Transient { kind: TransientKind::Timeout, message: message.into() }
    }

    /// Control plane returned a server error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Transient { kind: TransientKind::Unavailable, message: message.into() }
    }

    /// Caller is not allowed.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::Terminal { kind: TerminalKind::PermissionDenied, message: message.into() }
    }

    /// Target does not exist.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Terminal { kind: TerminalKind::NotFound, message: message.into() }
    }

    /// Request was rejected as malformed.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::Terminal { kind: TerminalKind::InvalidArgument, message: message.into() }
    }

    /// Returns true if this error is transient and the call may be retried.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Returns true if this error must be surfaced immediately.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }

    /// Returns true if the target does not exist (or no longer exists).
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Terminal { kind: TerminalKind::NotFound, .. })
    }

    /// Returns true if the call may have taken effect even though it failed.
    ///
    /// A timed-out create can still mint a key on the control plane.
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Transient { kind: TransientKind::Timeout, .. })
    }
}

/// Result of a provider call.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors raised by the engine itself.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Policy failed validation at load time.
    #[error("Policy configuration rejected: {0}")]
    PolicyConfiguration(String),

    /// Another rotation holds the principal.
    #[error("Rotation already in flight for {provider}/{principal}")]
    ConcurrencyConflict {
        /// Provider of the contested principal.
        provider: String,
        /// Contested principal.
        principal: String,
    },

    /// The audit log could not be written; the operation is aborted.
    #[error("Audit log write failed: {0}")]
    AuditWrite(String),

    /// The record store failed.
    #[error("Record store error: {0}")]
    RecordStore(String),

    /// A rotation record was asked to move backwards or skip a state.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// State the record was in.
        from: String,
        /// State that was requested.
        to: String,
    },

    /// Emergency revocation confirmation did not match.
    #[error("Confirmation rejected: {0}")]
    ConfirmationRejected(String),

    /// Operator input was malformed or ambiguous.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No adapter is registered under the name.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// No credential with the id is known.
    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    /// No rotation record with the id exists.
    #[error("Rotation record not found: {0}")]
    RotationRecordNotFound(uuid::Uuid),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DomainError {
    /// Errors that must abort the triggering operation rather than degrade.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::AuditWrite(_) | Self::RecordStore(_))
    }
}

/// Result of an engine operation.
pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        Self::RecordStore(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
