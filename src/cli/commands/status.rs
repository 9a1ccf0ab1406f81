//! `keywarden status`: inventory freshness, parked rotations, recent records.

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;

use crate::cli::commands::CommandContext;
use crate::cli::exit;
use crate::cli::output::{format_time, output, table, truncate, CommandOutput};
use crate::services::StatusReport;

/// Arguments for `status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// How many recent records to show
    #[arg(long, short, default_value = "10")]
    pub limit: usize,
}

impl CommandOutput for StatusReport {
    fn to_human(&self) -> String {
        let mut sections = Vec::new();

        let mut fresh = table(&["Provider", "Credentials", "Refreshed", "Stale"]);
        for slice in &self.freshness {
            fresh.add_row(vec![
                Cell::new(slice.provider.as_str()),
                Cell::new(slice.credentials),
                Cell::new(format_time(Some(slice.refreshed_at))),
                Cell::new(if slice.stale { "yes" } else { "no" }),
            ]);
        }
        sections.push(format!("Inventory\n{fresh}"));
        for failure in &self.refresh.failed {
            sections.push(format!("! {} unreachable: {}", failure.provider, failure.error));
        }

        if self.parked.is_empty() {
            sections.push("No rotations awaiting cleanup.".to_string());
        } else {
            let mut parked = table(&["Record", "Predecessor", "Replacement", "Eligible", "Run"]);
            for p in &self.parked {
                parked.add_row(vec![
                    Cell::new(p.record_id),
                    Cell::new(truncate(&p.predecessor_id, 24)),
                    Cell::new(truncate(&p.new_credential_id, 24)),
                    Cell::new(format_time(Some(p.eligible_at))),
                    Cell::new(&p.command),
                ]);
            }
            sections.push(format!("Awaiting cleanup\n{parked}"));
        }

        if !self.recent_rotations.is_empty() {
            let mut rotations = table(&["Started", "Principal", "Credential", "Outcome", "Initiator"]);
            for r in &self.recent_rotations {
                rotations.add_row(vec![
                    Cell::new(format_time(Some(r.started_at))),
                    Cell::new(truncate(&format!("{}/{}", r.provider, r.principal), 48)),
                    Cell::new(truncate(&r.credential_id, 24)),
                    Cell::new(r.outcome.map_or("in-flight", |o| o.as_str())),
                    Cell::new(r.initiator.to_string()),
                ]);
            }
            sections.push(format!("Recent rotations\n{rotations}"));
        }

        if !self.recent_revocations.is_empty() {
            let mut revocations = table(&["Started", "Scope", "Target", "Outcome", "Revoked", "Failed"]);
            for r in &self.recent_revocations {
                revocations.add_row(vec![
                    Cell::new(format_time(Some(r.started_at))),
                    Cell::new(r.scope.as_str()),
                    Cell::new(truncate(&r.target, 32)),
                    Cell::new(r.outcome.as_str()),
                    Cell::new(r.succeeded.len()),
                    Cell::new(r.failed.len()),
                ]);
            }
            sections.push(format!("Recent emergency revocations\n{revocations}"));
        }

        sections.join("\n\n")
    }
}

/// Print inventory freshness, parked rotations and recent records.
pub async fn execute(args: StatusArgs, ctx: &CommandContext) -> Result<u8> {
    let report = ctx.engine.status(args.limit).await?;
    output(&report, ctx.json);
    Ok(exit::OK)
}
