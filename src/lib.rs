//! Keywarden - credential lifecycle engine
//!
//! Keywarden discovers the long-lived keys and federated token bindings that
//! service principals hold across cloud control planes, classifies their
//! rotation risk, rotates keys through a create/validate/cutover/cleanup
//! workflow, and performs audited emergency revocation.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the ports adapters implement
//! - **Service Layer** (`services`): inventory, classification, rotation, revocation
//! - **Adapters** (`adapters`): cloud providers, SQLite records, audit log, notifications
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, wiring
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use keywarden::infrastructure::{config::ConfigLoader, setup::build_engine};
//! use keywarden::services::CredentialQuery;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let engine = build_engine(&config).await?;
//!     let report = engine.check(CredentialQuery::all()).await;
//!     println!("worst: {}", report.worst_severity());
//!     Ok(())
//! }
//! ```

/// Provider, storage, audit and notification implementations.
pub mod adapters;
/// Command-line front end.
pub mod cli;
/// Models, errors and ports.
pub mod domain;
/// Configuration loading and logging.
pub mod infrastructure;
/// Engine services.
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Classification, Config, Credential, CredentialKind, PrincipalKey, ProviderId,
    RevocationRecord, RotationRecord, Severity,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{CredentialEngine, CredentialQuery, RotationReport};
