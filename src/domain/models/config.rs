use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::credential::ProviderId;
use crate::domain::models::policy::{PolicyOverride, PolicySet, PrincipalClass, RotationPolicy};
use crate::domain::models::risk::Severity;

/// Main configuration structure for keywarden
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Directory holding the record database and audit log
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Record store configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Audit log configuration
    #[serde(default)]
    pub audit: AuditConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Inventory freshness
    #[serde(default)]
    pub inventory: InventoryConfig,

    /// Periodic scan configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Retry policy for provider calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Rotation policies
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Notification sinks
    #[serde(default)]
    pub notification_channels: Vec<NotificationChannelConfig>,

    /// Identity control planes to manage
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

fn default_state_dir() -> String {
    ".keywarden".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            database: DatabaseConfig::default(),
            audit: AuditConfig::default(),
            logging: LoggingConfig::default(),
            inventory: InventoryConfig::default(),
            scheduler: SchedulerConfig::default(),
            retry: RetryConfig::default(),
            policy: PolicyConfig::default(),
            notification_channels: vec![NotificationChannelConfig::Log {
                min_severity: Severity::Warning,
            }],
            providers: vec![],
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".keywarden/keywarden.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Audit log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditConfig {
    /// Path to the append-only JSONL audit log
    #[serde(default = "default_audit_path")]
    pub path: String,
}

fn default_audit_path() -> String {
    ".keywarden/audit.jsonl".to_string()
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: default_audit_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for rolling log files (stderr only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rolling file rotation
    #[serde(default)]
    pub rotation: LogRotation,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            rotation: LogRotation::default(),
        }
    }
}

/// Log line encoding.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human-readable console output.
    #[default]
    Pretty,
}

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// New file each day.
    #[default]
    Daily,
    /// New file each hour.
    Hourly,
    /// Single file.
    Never,
}

/// Inventory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InventoryConfig {
    /// Age after which a provider snapshot is reported stale
    #[serde(default = "default_inventory_ttl", with = "humantime_serde")]
    pub ttl: Duration,
}

const fn default_inventory_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            ttl: default_inventory_ttl(),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Interval between refresh + classify passes
    #[serde(default = "default_scheduler_interval", with = "humantime_serde")]
    pub interval: Duration,
}

const fn default_scheduler_interval() -> Duration {
    Duration::from_secs(60 * 60)
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: default_scheduler_interval(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Attempts per provider call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the first retry; doubles each attempt
    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Upper bound for a single backoff
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,

    /// Per-call timeout; a timeout counts as a transient failure
    #[serde(default = "default_call_timeout", with = "humantime_serde")]
    pub call_timeout: Duration,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff() -> Duration {
    Duration::from_secs(2)
}

const fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

const fn default_call_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            call_timeout: default_call_timeout(),
        }
    }
}

/// Policy document: a default plus class/provider overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PolicyConfig {
    /// Applies when no override matches.
    #[serde(default)]
    pub default: RotationPolicy,

    /// Named principal patterns, first match wins.
    #[serde(default)]
    pub principal_classes: Vec<PrincipalClassConfig>,

    /// Provider and class specific policies.
    #[serde(default)]
    pub overrides: Vec<PolicyOverrideConfig>,
}

/// A named principal pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalClassConfig {
    /// Referenced by `overrides[].principal_class`.
    pub name: String,
    /// Regular expression matched against the principal name
    pub pattern: String,
}

/// Fields left unset inherit from the default policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyOverrideConfig {
    /// Limit to one provider.
    #[serde(default)]
    pub provider: Option<String>,
    /// Limit to one principal class.
    #[serde(default)]
    pub principal_class: Option<String>,
    /// Overrides `max_age`.
    #[serde(default, with = "humantime_serde")]
    pub max_age: Option<Duration>,
    /// Overrides `warning_threshold`.
    #[serde(default, with = "humantime_serde")]
    pub warning_threshold: Option<Duration>,
    /// Overrides `critical_threshold`.
    #[serde(default, with = "humantime_serde")]
    pub critical_threshold: Option<Duration>,
    /// Overrides `grace_window`.
    #[serde(default, with = "humantime_serde")]
    pub grace_window: Option<Duration>,
    /// Overrides `review_period`.
    #[serde(default, with = "humantime_serde")]
    pub review_period: Option<Duration>,
    /// Overrides `auto_rotate`.
    #[serde(default)]
    pub auto_rotate: Option<bool>,
    /// Overrides `auto_cleanup`.
    #[serde(default)]
    pub auto_cleanup: Option<bool>,
}

impl PolicyOverrideConfig {
    fn apply_to(&self, base: &RotationPolicy) -> RotationPolicy {
        RotationPolicy {
            max_age: self.max_age.unwrap_or(base.max_age),
            warning_threshold: self.warning_threshold.unwrap_or(base.warning_threshold),
            critical_threshold: self.critical_threshold.unwrap_or(base.critical_threshold),
            grace_window: self.grace_window.unwrap_or(base.grace_window),
            review_period: self.review_period.unwrap_or(base.review_period),
            auto_rotate: self.auto_rotate.unwrap_or(base.auto_rotate),
            auto_cleanup: self.auto_cleanup.unwrap_or(base.auto_cleanup),
        }
    }
}

impl PolicyConfig {
    /// Compile and validate into a [`PolicySet`].
    pub fn to_policy_set(&self) -> DomainResult<PolicySet> {
        let classes = self
            .principal_classes
            .iter()
            .map(|c| {
                Regex::new(&c.pattern)
                    .map(|pattern| PrincipalClass {
                        name: c.name.clone(),
                        pattern,
                    })
                    .map_err(|e| {
                        DomainError::PolicyConfiguration(format!(
                            "principal_class '{}' has an invalid pattern: {e}",
                            c.name
                        ))
                    })
            })
            .collect::<DomainResult<Vec<_>>>()?;

        let overrides = self
            .overrides
            .iter()
            .map(|ov| PolicyOverride {
                provider: ov.provider.as_deref().map(ProviderId::new),
                principal_class: ov.principal_class.clone(),
                policy: ov.apply_to(&self.default),
            })
            .collect();

        PolicySet::new(self.default.clone(), classes, overrides)
    }
}

/// A notification sink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationChannelConfig {
    /// POST JSON to a URL.
    Webhook {
        /// Endpoint receiving the payload.
        url: String,
        /// Lowest severity delivered.
        #[serde(default = "default_min_severity")]
        min_severity: Severity,
        /// Per-request timeout.
        #[serde(default = "default_webhook_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
    /// Write to the process log.
    Log {
        /// Lowest severity delivered.
        #[serde(default = "default_min_severity")]
        min_severity: Severity,
    },
}

const fn default_min_severity() -> Severity {
    Severity::Warning
}

const fn default_webhook_timeout() -> Duration {
    Duration::from_secs(10)
}

/// An identity control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Google Cloud IAM service accounts.
    Gcp {
        /// Provider id; defaults to `gcp:<project>`.
        #[serde(default)]
        name: Option<String>,
        /// Project whose service accounts are managed.
        project: String,
        /// Environment variable holding an OAuth access token
        #[serde(default = "default_gcp_token_env")]
        token_env: String,
        /// IAM API root, for tests and private endpoints.
        #[serde(default)]
        base_url: Option<String>,
        /// OAuth token endpoint used when validating new keys.
        #[serde(default)]
        token_url: Option<String>,
    },
    /// Microsoft Entra application registrations.
    Azure {
        /// Provider id; defaults to `azure:<tenant>`.
        #[serde(default)]
        name: Option<String>,
        /// Tenant whose applications are managed.
        tenant: String,
        /// Environment variable holding a Microsoft Graph access token
        #[serde(default = "default_azure_token_env")]
        token_env: String,
        /// Graph API root.
        #[serde(default)]
        graph_base_url: Option<String>,
        /// Login endpoint used when validating new secrets.
        #[serde(default)]
        login_base_url: Option<String>,
    },
    /// JSON file on disk.
    Local {
        /// Provider id; defaults to `local:<scope>`.
        #[serde(default)]
        name: Option<String>,
        /// Document location.
        path: PathBuf,
        /// Scope reported as the project.
        #[serde(default = "default_local_scope")]
        scope: String,
    },
}

fn default_gcp_token_env() -> String {
    "GOOGLE_OAUTH_ACCESS_TOKEN".to_string()
}

fn default_azure_token_env() -> String {
    "AZURE_GRAPH_ACCESS_TOKEN".to_string()
}

fn default_local_scope() -> String {
    "local".to_string()
}

impl ProviderConfig {
    /// Provider id used in inventory, records and audit targets.
    pub fn provider_id(&self) -> ProviderId {
        match self {
            Self::Gcp { name, project, .. } => ProviderId::new(
                name.clone().unwrap_or_else(|| format!("gcp:{project}")),
            ),
            Self::Azure { name, tenant, .. } => ProviderId::new(
                name.clone().unwrap_or_else(|| format!("azure:{tenant}")),
            ),
            Self::Local { name, scope, .. } => ProviderId::new(
                name.clone().unwrap_or_else(|| format!("local:{scope}")),
            ),
        }
    }
}
