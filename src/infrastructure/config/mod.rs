//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides
//! - Configuration validation

/// Layered file and environment loading.
pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
