//! Common test utilities for integration tests
//!
//! Builds a fully wired engine over an in-memory provider, an in-memory
//! audit sink, a migrated in-memory SQLite record store and a manual clock.
//! A harness built over a database file can open peer engines on the same
//! file, standing in for a second process.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use keywarden::adapters::audit::InMemoryAuditSink;
use keywarden::adapters::clock::ManualClock;
use keywarden::adapters::providers::InMemoryProvider;
use keywarden::adapters::sqlite::{
    create_migrated_test_pool, database_url, initialize_database, SqliteRecordStore,
};
use keywarden::domain::models::{PolicySet, RotationPolicy, RotationRecord, Severity};
use keywarden::domain::ports::{Clock, Notification, NotificationSink, RecordStore};
use keywarden::services::{CredentialEngine, EngineDeps, ProviderRegistry, RetryPolicy};

pub const DAY: u64 = 24 * 60 * 60;

pub fn days(n: u64) -> Duration {
    Duration::from_secs(n * DAY)
}

pub fn days_ago(now: DateTime<Utc>, n: i64) -> DateTime<Utc> {
    now - chrono::Duration::days(n)
}

/// Fixed start time so tests never depend on the wall clock.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// `{warning: 75d, critical: 85d, max: 90d}`, manual cleanup, one-day grace.
pub fn standard_policy() -> RotationPolicy {
    RotationPolicy {
        max_age: days(90),
        warning_threshold: days(75),
        critical_threshold: days(85),
        grace_window: days(1),
        review_period: days(180),
        auto_rotate: false,
        auto_cleanup: false,
    }
}

/// Setup test logging
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Captures every notification it is handed.
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count_at(&self, severity: Severity) -> usize {
        self.delivered().iter().filter(|n| n.severity == severity).count()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn min_severity(&self) -> Severity {
        Severity::Ok
    }

    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
        Ok(())
    }
}

pub struct Harness {
    pub engine: Arc<CredentialEngine>,
    pub provider: Arc<InMemoryProvider>,
    pub audit: Arc<InMemoryAuditSink>,
    pub records: Arc<SqliteRecordStore>,
    pub notifications: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
    policy: RotationPolicy,
    retry: RetryPolicy,
    database: Option<PathBuf>,
}

pub struct HarnessBuilder {
    policy: RotationPolicy,
    latency: Duration,
    retry: RetryPolicy,
    project: String,
    database: Option<PathBuf>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            policy: standard_policy(),
            latency: Duration::ZERO,
            retry: RetryPolicy::immediate(3),
            project: "proj".to_string(),
            database: None,
        }
    }
}

impl HarnessBuilder {
    pub fn policy(mut self, policy: RotationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Keep records in a SQLite file instead of memory.
    pub fn database_file(mut self, path: &Path) -> Self {
        self.database = Some(path.to_path_buf());
        self
    }

    pub async fn build(self) -> Harness {
        let clock = Arc::new(ManualClock::new(epoch()));
        let provider = Arc::new(
            InMemoryProvider::new("mem", self.project)
                .with_latency(self.latency)
                .with_clock(clock.clone()),
        );
        let audit = Arc::new(InMemoryAuditSink::new());
        let records = Arc::new(open_records(self.database.as_deref()).await);
        let notifications = Arc::new(RecordingSink::default());
        let engine = wire_engine(
            &provider,
            records.clone(),
            &audit,
            &notifications,
            &clock,
            &self.policy,
            &self.retry,
        );

        Harness {
            engine,
            provider,
            audit,
            records,
            notifications,
            clock,
            policy: self.policy,
            retry: self.retry,
            database: self.database,
        }
    }
}

fn wire_engine(
    provider: &Arc<InMemoryProvider>,
    records: Arc<SqliteRecordStore>,
    audit: &Arc<InMemoryAuditSink>,
    notifications: &Arc<RecordingSink>,
    clock: &Arc<ManualClock>,
    policy: &RotationPolicy,
    retry: &RetryPolicy,
) -> Arc<CredentialEngine> {
    Arc::new(CredentialEngine::new(EngineDeps {
        providers: ProviderRegistry::new().with(provider.clone()),
        records,
        audit_sink: audit.clone(),
        notification_sinks: vec![notifications.clone()],
        policies: PolicySet::uniform(policy.clone()).expect("valid policy"),
        inventory_ttl: Duration::from_secs(15 * 60),
        retry: retry.clone(),
        clock: clock.clone(),
    }))
}

async fn open_records(database: Option<&Path>) -> SqliteRecordStore {
    let pool = match database {
        Some(path) => initialize_database(&database_url(path), None)
            .await
            .expect("file pool"),
        None => create_migrated_test_pool().await.expect("test pool"),
    };
    SqliteRecordStore::new(pool)
}

impl Harness {
    /// A second engine over the same database file, control plane, audit
    /// sink and clock, with its own connection pool and in-process locks.
    pub async fn peer_engine(&self) -> Arc<CredentialEngine> {
        let path = self
            .database
            .as_deref()
            .expect("peer engines need a database file");
        wire_engine(
            &self.provider,
            Arc::new(open_records(Some(path)).await),
            &self.audit,
            &self.notifications,
            &self.clock,
            &self.policy,
            &self.retry,
        )
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn rotation_record(&self, id: Uuid) -> RotationRecord {
        self.records
            .get_rotation(id)
            .await
            .expect("record store")
            .expect("rotation record exists")
    }
}

pub async fn harness() -> Harness {
    HarnessBuilder::default().build().await
}
