//! Append-only JSON Lines audit log.
//!
//! One `AuditEntry` per line. Each append is written, flushed, and synced
//! before returning. Readers tolerate a trailing partial line left behind by
//! a crash mid-write.

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::AuditEntry;
use crate::domain::ports::AuditSink;

/// Append-only audit log, one JSON object per line.
#[derive(Clone)]
pub struct JsonlAuditLog {
    path: PathBuf,
    log_file: Arc<Mutex<File>>,
}

impl JsonlAuditLog {
    /// Open (or create) the log in append mode.
    ///
    /// Creates parent directories if they don't exist. A dangling partial
    /// line is terminated so the next entry starts on a fresh line.
    pub async fn open(path: impl AsRef<Path>) -> DomainResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::AuditWrite(format!("create {}: {e}", parent.display())))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| DomainError::AuditWrite(format!("open {}: {e}", path.display())))?;

        terminate_partial_line(&mut file)
            .map_err(|e| DomainError::AuditWrite(format!("repair {}: {e}", path.display())))?;

        Ok(Self {
            path,
            log_file: Arc::new(Mutex::new(file)),
        })
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn terminate_partial_line(file: &mut File) -> std::io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0_u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        warn!("audit log ends with a partial line, terminating it");
        file.write_all(b"\n")?;
        file.flush()?;
    }
    Ok(())
}

/// Parse JSONL content, skipping lines that do not decode.
///
/// Returns the entries and how many lines were skipped.
pub fn parse_entries(content: &str) -> (Vec<AuditEntry>, usize) {
    let mut entries = Vec::new();
    let mut skipped = 0;
    let ends_cleanly = content.ends_with('\n');
    let lines: Vec<&str> = content.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                skipped += 1;
                if idx + 1 == lines.len() && !ends_cleanly {
                    debug!("ignoring trailing partial audit line");
                } else {
                    warn!(line = idx + 1, error = %err, "unreadable audit line");
                }
            }
        }
    }

    (entries, skipped)
}

#[async_trait]
impl AuditSink for JsonlAuditLog {
    async fn append(&self, entry: &AuditEntry) -> DomainResult<()> {
        let json = serde_json::to_string(entry)
            .map_err(|e| DomainError::AuditWrite(format!("serialize: {e}")))?;

        let mut file = self
            .log_file
            .lock()
            .map_err(|e| DomainError::AuditWrite(format!("audit log mutex poisoned: {e}")))?;

        writeln!(file, "{json}").map_err(|e| DomainError::AuditWrite(format!("write: {e}")))?;
        file.flush().map_err(|e| DomainError::AuditWrite(format!("flush: {e}")))?;
        file.sync_data().map_err(|e| DomainError::AuditWrite(format!("sync: {e}")))?;

        Ok(())
    }

    async fn recent(&self, limit: usize) -> DomainResult<Vec<AuditEntry>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DomainError::AuditWrite(format!("read {}: {e}", self.path.display()))),
        };

        let (mut entries, _) = parse_entries(&content);
        let start = entries.len().saturating_sub(limit);
        let mut recent = entries.split_off(start);
        recent.reverse();
        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AuditOperation, AuditOutcome};
    use chrono::Utc;
    use tempfile::TempDir;

    fn entry(target: &str) -> AuditEntry {
        AuditEntry::new(
            AuditOperation::CredentialRevoked,
            "alice",
            target,
            AuditOutcome::Success,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_append_writes_one_line_per_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit").join("audit.jsonl");
        let log = JsonlAuditLog::open(&path).await.unwrap();

        log.append(&entry("a")).await.unwrap();
        log.append(&entry("b")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        let first: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(first["operation"], "credential_revoked");
        assert_eq!(first["target"], "a");
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");

        JsonlAuditLog::open(&path).await.unwrap().append(&entry("a")).await.unwrap();
        let log = JsonlAuditLog::open(&path).await.unwrap();
        log.append(&entry("b")).await.unwrap();

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].target, "b", "newest first");
    }

    #[tokio::test]
    async fn test_trailing_partial_line_is_tolerated_and_repaired() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");

        let good = serde_json::to_string(&entry("a")).unwrap();
        std::fs::write(&path, format!("{good}\n{{\"timestamp\":\"2024-01-")).unwrap();

        let (entries, skipped) = parse_entries(&std::fs::read_to_string(&path).unwrap());
        assert_eq!(entries.len(), 1);
        assert_eq!(skipped, 1);

        let log = JsonlAuditLog::open(&path).await.unwrap();
        log.append(&entry("b")).await.unwrap();

        let recent = log.recent(10).await.unwrap();
        let targets: Vec<_> = recent.iter().map(|e| e.target.as_str()).collect();
        assert_eq!(targets, ["b", "a"]);
    }
}
