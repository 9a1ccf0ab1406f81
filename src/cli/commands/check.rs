//! `keywarden check`: refresh, classify, report; exit code reflects the worst state.

use std::time::Duration;

use anyhow::Result;
use clap::{Args, ValueEnum};
use comfy_table::Cell;
use serde::Serialize;

use crate::cli::commands::CommandContext;
use crate::cli::exit;
use crate::cli::output::{format_age, output, severity_cell, table, truncate, CommandOutput};
use crate::domain::models::{Classification, CredentialKind, Severity};
use crate::services::{CredentialQuery, RefreshSummary};

/// Credential kind filter
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    /// Long-lived keys
    Key,
    /// Federated token bindings
    Federated,
}

impl From<KindArg> for CredentialKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Key => Self::LongLivedKey,
            KindArg::Federated => Self::FederatedTokenBinding,
        }
    }
}

/// Parse a humantime duration such as `60d`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Arguments for `check`.
#[derive(Args, Debug, Default)]
pub struct CheckArgs {
    /// Only this provider id
    #[arg(long)]
    pub provider: Option<String>,

    /// Only this principal
    #[arg(long)]
    pub principal: Option<String>,

    /// Only this credential kind
    #[arg(long, value_enum)]
    pub kind: Option<KindArg>,

    /// Only credentials at least this old (e.g. 60d)
    #[arg(long, value_parser = parse_duration)]
    pub older_than: Option<Duration>,

    /// Hide credentials in the OK / REVIEW_CURRENT state
    #[arg(long)]
    pub problems_only: bool,
}

impl CheckArgs {
    /// Filter these arguments describe.
    pub fn query(&self) -> CredentialQuery {
        CredentialQuery {
            provider: CommandContext::provider_id(self.provider.clone()),
            principal: self.principal.clone(),
            kind: self.kind.map(Into::into),
            older_than: self.older_than,
            ..CredentialQuery::default()
        }
    }
}

/// Result of `check`.
#[derive(Debug, Serialize)]
pub struct CheckOutput {
    /// Worst severity among the shown credentials.
    pub worst: Severity,
    /// Providers refreshed or served from cache.
    pub refresh: RefreshSummary,
    /// One entry per credential.
    pub classifications: Vec<Classification>,
}

impl CommandOutput for CheckOutput {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        for failure in &self.refresh.failed {
            lines.push(format!("! provider {} unreachable: {}", failure.provider, failure.error));
        }

        if self.classifications.is_empty() {
            lines.push("No credentials matched.".to_string());
        } else {
            let mut t = table(&["Provider", "Principal", "Credential", "Kind", "Age", "State"]);
            for c in &self.classifications {
                let mut state = c.assessment.label().to_string();
                if c.stale {
                    state.push_str(" (stale)");
                }
                t.add_row(vec![
                    Cell::new(c.credential.provider.as_str()),
                    Cell::new(truncate(&c.credential.principal, 48)),
                    Cell::new(truncate(&c.credential.id, 24)),
                    Cell::new(c.credential.kind.as_str()),
                    Cell::new(format_age(c.age)),
                    severity_cell(&state, c.severity()),
                ]);
            }
            lines.push(t.to_string());
        }
        lines.push(format!("Overall: {}", self.worst));
        lines.join("\n")
    }
}

/// Refresh, classify and print. Exit code reflects the worst state.
pub async fn execute(args: CheckArgs, ctx: &CommandContext) -> Result<u8> {
    let report = ctx.engine.check(args.query()).await;
    let worst = report.worst_severity();

    let classifications = if args.problems_only {
        report
            .classifications
            .into_iter()
            .filter(|c| c.severity() > Severity::Ok)
            .collect()
    } else {
        report.classifications
    };

    output(
        &CheckOutput {
            worst,
            refresh: report.refresh,
            classifications,
        },
        ctx.json,
    );
    Ok(exit::for_severity(worst))
}
