//! Project initialization and engine wiring
//!
//! Handles:
//! - State directory and default config file creation
//! - Opening the record store (with migrations) and the audit log
//! - Building provider adapters and notification sinks from config

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::adapters::audit::JsonlAuditLog;
use crate::adapters::clock::SystemClock;
use crate::adapters::notifications::create_sink;
use crate::adapters::providers::create_provider;
use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig, SqliteRecordStore};
use crate::domain::errors::DomainError;
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::services::scheduler::PolicySource;
use crate::services::{CredentialEngine, EngineDeps, ProviderRegistry, RetryPolicy};

/// Default configuration template content
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Keywarden Configuration
# Override settings by editing this file, adding .keywarden/local.yaml, or
# setting environment variables with the KEYWARDEN_ prefix, e.g.
#   export KEYWARDEN_LOGGING__LEVEL=debug
#   export KEYWARDEN_SCHEDULER__INTERVAL=30m

state_dir: ".keywarden"

database:
  path: ".keywarden/keywarden.db"
  max_connections: 5

# Append-only JSON Lines audit log
audit:
  path: ".keywarden/audit.jsonl"

logging:
  # trace, debug, info, warn, error
  level: "info"
  # json or pretty
  format: "pretty"
  # log_dir: ".keywarden/logs"
  rotation: "daily"

# Provider snapshots older than this are reported stale
inventory:
  ttl: 5m

# Interval between scans in `keywarden run`
scheduler:
  interval: 1h

# Retry policy for control-plane calls
retry:
  max_attempts: 3
  initial_backoff: 2s
  max_backoff: 30s
  call_timeout: 30s

policy:
  default:
    max_age: 90d
    warning_threshold: 75d
    critical_threshold: 85d
    grace_window: 24h
    review_period: 180d
    auto_rotate: false
    auto_cleanup: false
  principal_classes: []
  #  - name: ci
  #    pattern: '^ci-'
  overrides: []
  #  - principal_class: ci
  #    auto_rotate: true
  #    auto_cleanup: true

notification_channels:
  - kind: log
    min_severity: warning
  # - kind: webhook
  #   url: https://hooks.example.com/keywarden
  #   min_severity: critical

providers: []
# - kind: gcp
#   project: my-project
#   token_env: GOOGLE_OAUTH_ACCESS_TOKEN
# - kind: azure
#   tenant: 00000000-0000-0000-0000-000000000000
#   token_env: AZURE_GRAPH_ACCESS_TOKEN
# - kind: local
#   path: .keywarden/local-plane.json
#   scope: lab
"#;

/// Write the default config under `root/.keywarden/config.yaml`.
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn init_project(root: &Path, force: bool) -> Result<PathBuf> {
    let dir = root.join(".keywarden");
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = dir.join("config.yaml");
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote default configuration");
    Ok(path)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// Assemble a [`CredentialEngine`] from configuration.
pub async fn build_engine(config: &Config) -> Result<Arc<CredentialEngine>> {
    let db_path = Path::new(&config.database.path);
    ensure_parent(db_path)?;
    let pool = initialize_database(
        &database_url(db_path),
        Some(PoolConfig {
            max_connections: config.database.max_connections,
            ..PoolConfig::default()
        }),
    )
    .await
    .context("Failed to open record store")?;

    let audit = JsonlAuditLog::open(&config.audit.path)
        .await
        .context("Failed to open audit log")?;

    let mut providers = ProviderRegistry::new();
    for provider in &config.providers {
        providers
            .register(create_provider(provider))
            .context("Failed to register provider")?;
    }
    if providers.is_empty() {
        warn!("no providers configured");
    }

    let policies = config
        .policy
        .to_policy_set()
        .context("Failed to compile rotation policy")?;

    let engine = CredentialEngine::new(EngineDeps {
        providers,
        records: Arc::new(SqliteRecordStore::new(pool)),
        audit_sink: Arc::new(audit),
        notification_sinks: config.notification_channels.iter().map(create_sink).collect(),
        policies,
        inventory_ttl: config.inventory.ttl,
        retry: RetryPolicy::from(&config.retry),
        clock: Arc::new(SystemClock),
    });
    Ok(Arc::new(engine))
}

/// Re-read the policy section of the configuration on every call.
pub fn policy_source(config_path: Option<PathBuf>) -> PolicySource {
    Box::new(move || {
        let config = ConfigLoader::resolve(config_path.as_deref())
            .map_err(|e| DomainError::PolicyConfiguration(format!("{e:#}")))?;
        config.policy.to_policy_set()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_template_is_valid_config() {
        let config: Config = serde_yaml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        ConfigLoader::validate(&config).unwrap();
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = init_project(dir.path(), false).unwrap();
        assert!(path.ends_with(".keywarden/config.yaml"));
        assert!(init_project(dir.path(), false).is_err());
        assert!(init_project(dir.path(), true).is_ok());
    }

    #[tokio::test]
    async fn test_build_engine_creates_state_files() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("state/keywarden.db").display().to_string();
        config.audit.path = dir.path().join("state/audit.jsonl").display().to_string();

        let engine = build_engine(&config).await.unwrap();
        let status = engine.status(5).await.unwrap();
        assert!(status.parked.is_empty());
        assert!(dir.path().join("state/keywarden.db").exists());
        assert!(dir.path().join("state/audit.jsonl").exists());
    }
}
