//! `keywarden rotate` and `keywarden rotate-all`.

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;

use crate::cli::commands::{ctrl_c_token, CommandContext};
use crate::cli::exit;
use crate::cli::output::{format_time, output, table, truncate, CommandOutput};
use crate::domain::models::{PrincipalKey, ProviderId};
use crate::services::RotationReport;

/// Arguments for `rotate`.
#[derive(Args, Debug)]
pub struct RotateArgs {
    /// Principal whose long-lived key should be replaced
    pub principal: String,

    /// Provider id the principal lives in
    #[arg(long)]
    pub provider: String,

    /// Print the new credential's secret (shown once, never stored)
    #[arg(long)]
    pub reveal_secret: bool,
}

/// Arguments for `rotate-all`.
#[derive(Args, Debug)]
pub struct RotateAllArgs {
    /// Print each new credential's secret (shown once, never stored)
    #[arg(long)]
    pub reveal_secret: bool,
}

/// Result of one rotation.
#[derive(Debug, Serialize)]
pub struct RotationOutput {
    /// Terminal report.
    #[serde(flatten)]
    pub report: RotationReport,
    /// New secret, only with `--reveal-secret`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl RotationOutput {
    fn new(report: RotationReport, reveal: bool) -> Self {
        let secret = if reveal {
            report.secret().map(|s| s.expose().to_string())
        } else {
            None
        };
        Self { report, secret }
    }

    fn summary(&self) -> String {
        match &self.report {
            RotationReport::Completed { record, .. } => format!(
                "{}/{}: rotated {} -> {}",
                record.provider,
                record.principal,
                record.credential_id,
                record.new_credential_id.as_deref().unwrap_or("-")
            ),
            RotationReport::Parked {
                record,
                instruction,
                ..
            } => format!(
                "{}/{}: new credential {} is live; {} is still active.\n  After {} run: {}",
                record.provider,
                record.principal,
                instruction.new_credential_id,
                instruction.predecessor_id,
                format_time(Some(instruction.eligible_at)),
                instruction.command
            ),
            RotationReport::Failed {
                record,
                state,
                error,
            } => format!(
                "{}/{}: rotation failed during {state}: {error}",
                record.provider, record.principal
            ),
            RotationReport::Cancelled { record } => match record {
                Some(r) => format!("{}/{}: rotation cancelled", r.provider, r.principal),
                None => "rotation cancelled before it started".to_string(),
            },
            RotationReport::DuplicateSuppressed { key, parked_record } => match parked_record {
                Some(id) => format!("{key}: awaiting cleanup of rotation {id}"),
                None => format!("{key}: another rotation is in progress"),
            },
            RotationReport::NothingToDo { key, reason } => format!("{key}: nothing to do ({reason})"),
        }
    }
}

impl From<RotationReport> for RotationOutput {
    fn from(report: RotationReport) -> Self {
        Self::new(report, false)
    }
}

impl CommandOutput for RotationOutput {
    fn to_human(&self) -> String {
        let mut out = self.summary();
        if let Some(secret) = &self.secret {
            out.push_str("\n\nNew secret (will not be shown again):\n");
            out.push_str(secret);
        }
        out
    }
}

/// Result of `rotate-all`.
#[derive(Debug, Serialize)]
pub struct RotateAllOutput {
    /// One entry per eligible principal.
    pub rotations: Vec<RotationOutput>,
}

impl CommandOutput for RotateAllOutput {
    fn to_human(&self) -> String {
        if self.rotations.is_empty() {
            return "No credentials due for rotation.".to_string();
        }
        let mut t = table(&["Principal", "Status", "Detail"]);
        for r in &self.rotations {
            let (principal, status) = match &r.report {
                RotationReport::Completed { record, .. } => (format!("{}/{}", record.provider, record.principal), "rotated"),
                RotationReport::Parked { record, .. } => (format!("{}/{}", record.provider, record.principal), "parked"),
                RotationReport::Failed { record, .. } => (format!("{}/{}", record.provider, record.principal), "failed"),
                RotationReport::Cancelled { record } => (
                    record.as_ref().map_or_else(|| "-".to_string(), |r| format!("{}/{}", r.provider, r.principal)),
                    "cancelled",
                ),
                RotationReport::DuplicateSuppressed { key, .. } => (key.to_string(), "skipped"),
                RotationReport::NothingToDo { key, .. } => (key.to_string(), "nothing to do"),
            };
            t.add_row(vec![
                Cell::new(truncate(&principal, 56)),
                Cell::new(status),
                Cell::new(truncate(&r.summary(), 80)),
            ]);
        }

        let mut out = t.to_string();
        for r in &self.rotations {
            if let (Some(secret), Some(record)) = (&r.secret, r.report.record()) {
                out.push_str(&format!(
                    "\n\nNew secret for {}/{} (will not be shown again):\n{secret}",
                    record.provider, record.principal
                ));
            }
        }
        out
    }
}

fn warn_hidden_secret(reports: &[RotationReport], reveal: bool, json: bool) {
    if !reveal && !json && reports.iter().any(|r| r.secret().is_some()) {
        eprintln!("note: new secrets were discarded; re-run with --reveal-secret to print them");
    }
}

/// Rotate one principal.
pub async fn execute(args: RotateArgs, ctx: &CommandContext) -> Result<u8> {
    let key = PrincipalKey::new(ProviderId::new(args.provider), args.principal);
    let cancel = ctrl_c_token();

    let report = ctx.engine.rotate(&key, ctx.initiator(), &cancel).await?;
    warn_hidden_secret(std::slice::from_ref(&report), args.reveal_secret, ctx.json);

    let code = exit::for_rotation(&report);
    output(&RotationOutput::new(report, args.reveal_secret), ctx.json);
    Ok(code)
}

/// Rotate every principal with a credential in WARNING or worse.
pub async fn execute_all(args: RotateAllArgs, ctx: &CommandContext) -> Result<u8> {
    let cancel = ctrl_c_token();

    let reports = ctx.engine.rotate_all(ctx.initiator(), &cancel).await?;
    warn_hidden_secret(&reports, args.reveal_secret, ctx.json);

    let code = exit::for_rotations(&reports);
    let rotations = reports
        .into_iter()
        .map(|r| RotationOutput::new(r, args.reveal_secret))
        .collect();
    output(&RotateAllOutput { rotations }, ctx.json);
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Initiator, RotationRecord, SecretMaterial};
    use chrono::Utc;

    fn completed() -> RotationReport {
        let key = PrincipalKey::new(ProviderId::new("mem"), "svc");
        let mut record = RotationRecord::start(&key, "old-1", Initiator::operator("ops"), Utc::now());
        record.new_credential_id = Some("new-2".to_string());
        RotationReport::Completed {
            record,
            secret: Some(SecretMaterial::new("s3cret")),
        }
    }

    #[test]
    fn test_secret_hidden_unless_revealed() {
        let hidden = RotationOutput::new(completed(), false);
        assert!(!hidden.to_human().contains("s3cret"));
        assert!(!hidden.to_json().to_string().contains("s3cret"));

        let shown = RotationOutput::new(completed(), true);
        assert!(shown.to_human().contains("s3cret"));
        assert_eq!(shown.to_json()["secret"], "s3cret");
    }

    #[test]
    fn test_json_carries_status_tag() {
        let out = RotationOutput::new(completed(), false);
        assert_eq!(out.to_json()["status"], "completed");
        assert!(out.to_human().contains("old-1 -> new-2"));
    }
}
