//! SQLite schema migrations, embedded in the binary.

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

/// Errors applying schema migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A migration statement failed; its transaction was rolled back.
    #[error("Failed to execute migration {version}: {source}")]
    ExecutionError {
        /// Migration that failed; 0 for the bookkeeping table.
        version: i64,
        /// Underlying driver error.
        #[source]
        source: sqlx::Error,
    },
    /// The schema version could not be read.
    #[error("Failed to get schema version: {0}")]
    VersionCheckError(#[source] sqlx::Error),
}

/// One versioned schema change.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Applied in ascending order.
    pub version: i64,
    /// Recorded next to the version.
    pub description: String,
    /// Statements run in one transaction.
    pub sql: String,
}

/// Applies embedded migrations to a pool.
pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    /// Migrator for `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply every migration newer than the current schema version.
    pub async fn run_embedded_migrations(&self, migrations: Vec<Migration>) -> Result<usize, MigrationError> {
        self.ensure_migrations_table().await?;
        let current_version = self.get_current_version().await?;
        let pending: Vec<_> = migrations.into_iter().filter(|m| m.version > current_version).collect();

        for migration in &pending {
            self.apply_migration(migration).await?;
            info!(version = migration.version, description = %migration.description, "applied migration");
        }

        Ok(pending.len())
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                description TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MigrationError::ExecutionError { version: 0, source: e })?;
        Ok(())
    }

    /// Highest applied version, 0 for a fresh database.
    pub async fn get_current_version(&self) -> Result<i64, MigrationError> {
        let result: Option<(i64,)> = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_optional(&self.pool)
            .await
            .map_err(MigrationError::VersionCheckError)?;
        Ok(result.map_or(0, |(v,)| v))
    }

    async fn apply_migration(&self, migration: &Migration) -> Result<(), MigrationError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MigrationError::ExecutionError { version: migration.version, source: e })?;

        sqlx::raw_sql(&migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| MigrationError::ExecutionError { version: migration.version, source: e })?;

        sqlx::query("INSERT INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| MigrationError::ExecutionError { version: migration.version, source: e })?;

        tx.commit()
            .await
            .map_err(|e| MigrationError::ExecutionError { version: migration.version, source: e })
    }
}

/// Rotation and revocation record tables.
pub fn credential_records_migration() -> Migration {
    Migration {
        version: 1,
        description: "Rotation and revocation records".to_string(),
        sql: include_str!("../../../migrations/001_credential_records.sql").to_string(),
    }
}

/// Per-principal claims shared between processes.
pub fn rotation_claims_migration() -> Migration {
    Migration {
        version: 2,
        description: "Cross-process rotation claims".to_string(),
        sql: include_str!("../../../migrations/002_rotation_claims.sql").to_string(),
    }
}

/// Every migration, oldest first.
pub fn all_embedded_migrations() -> Vec<Migration> {
    vec![credential_records_migration(), rotation_claims_migration()]
}
