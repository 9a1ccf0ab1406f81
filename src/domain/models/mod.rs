//! Domain models for the credential engine.

pub mod audit;
/// Configuration file schema.
pub mod config;
pub mod credential;
pub mod policy;
pub mod revocation;
pub mod risk;
pub mod rotation;

pub use audit::{AuditEntry, AuditOperation, AuditOutcome};
pub use config::{
    AuditConfig, Config, DatabaseConfig, InventoryConfig, LogFormat, LogRotation, LoggingConfig,
    NotificationChannelConfig, PolicyConfig, PolicyOverrideConfig, PrincipalClassConfig,
    ProviderConfig, RetryConfig, SchedulerConfig,
};
pub use credential::{
    Credential, CredentialKind, IssuedCredential, PrincipalFilter, PrincipalInfo, PrincipalKey,
    ProviderId, SecretMaterial,
};
pub use policy::{PolicyOverride, PolicySet, PrincipalClass, RotationPolicy};
pub use revocation::{
    project_confirmation_phrase, RevocationFailure, RevocationOutcome, RevocationRecord,
    RevocationRequest, RevocationScope, CONFIRMATION_TOKEN,
};
pub use risk::{Assessment, Classification, ReviewState, RiskState, Severity};
pub use rotation::{Initiator, RotationOutcome, RotationRecord, RotationState};
