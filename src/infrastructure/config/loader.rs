use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::{Config, NotificationChannelConfig, ProviderConfig};

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Unknown log level.
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// `database.path` is blank.
    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    /// `audit.path` is blank.
    #[error("Audit log path cannot be empty")]
    EmptyAuditPath,

    /// Pool must allow at least one connection.
    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    /// Retry must make at least one attempt.
    #[error("Invalid max_attempts: {0}. Must be at least 1")]
    InvalidMaxAttempts(u32),

    /// Initial backoff exceeds the cap.
    #[error("Invalid backoff configuration: initial_backoff ({0:?}) must not exceed max_backoff ({1:?})")]
    InvalidBackoff(std::time::Duration, std::time::Duration),

    /// A duration that must be positive was zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// Policy document failed validation.
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Two providers share an id.
    #[error("Duplicate provider id: {0}")]
    DuplicateProvider(String),

    /// Anything else the loader rejected.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .keywarden/config.yaml (project config, created by init)
    /// 3. .keywarden/local.yaml (local overrides, optional)
    /// 4. Environment variables (KEYWARDEN_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(Path::new("."))
    }

    /// Same as [`load`](Self::load), rooted at `root` instead of the working directory.
    pub fn load_from_dir(root: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(root.join(".keywarden/config.yaml")))
            .merge(Yaml::file(root.join(".keywarden/local.yaml")))
            .merge(Env::prefixed("KEYWARDEN_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise from the working directory.
    pub fn resolve(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load(),
        }
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }
        if config.audit.path.is_empty() {
            return Err(ConfigError::EmptyAuditPath);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }
        if config.retry.initial_backoff > config.retry.max_backoff {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff,
                config.retry.max_backoff,
            ));
        }
        if config.retry.call_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("retry.call_timeout"));
        }
        if config.inventory.ttl.is_zero() {
            return Err(ConfigError::ZeroDuration("inventory.ttl"));
        }
        if config.scheduler.interval.is_zero() {
            return Err(ConfigError::ZeroDuration("scheduler.interval"));
        }

        config
            .policy
            .to_policy_set()
            .map_err(|e| ConfigError::InvalidPolicy(e.to_string()))?;

        let mut seen = HashSet::new();
        for provider in &config.providers {
            let id = provider.provider_id();
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateProvider(id.to_string()));
            }
            let scope = match provider {
                ProviderConfig::Gcp { project, .. } => project,
                ProviderConfig::Azure { tenant, .. } => tenant,
                ProviderConfig::Local { scope, .. } => scope,
            };
            if scope.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "provider '{id}' has an empty project/tenant/scope"
                )));
            }
        }

        for channel in &config.notification_channels {
            if let NotificationChannelConfig::Webhook { url, .. } = channel {
                reqwest::Url::parse(url).map_err(|e| {
                    ConfigError::ValidationFailed(format!("webhook url '{url}' is invalid: {e}"))
                })?;
            }
        }

        Ok(())
    }
}
