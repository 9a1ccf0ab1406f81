//! `keywarden discover`: refresh the inventory and list what was found.

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;

use crate::cli::commands::CommandContext;
use crate::cli::exit;
use crate::cli::output::{format_time, output, table, truncate, CommandOutput};
use crate::services::DiscoveryReport;

/// Arguments for `discover`.
#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Only this provider id
    #[arg(long)]
    pub provider: Option<String>,
}

impl CommandOutput for DiscoveryReport {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        for (provider, count) in &self.refresh.refreshed {
            lines.push(format!("{provider}: {count} credential(s)"));
        }
        for failure in &self.refresh.failed {
            lines.push(format!("! {}: {} (showing last known snapshot)", failure.provider, failure.error));
        }

        let mut t = table(&["Provider", "Project", "Principal", "Credential", "Kind", "Issued"]);
        for item in &self.credentials {
            let c = &item.credential;
            t.add_row(vec![
                Cell::new(c.provider.as_str()),
                Cell::new(&c.project),
                Cell::new(truncate(&c.principal, 48)),
                Cell::new(truncate(&c.id, 24)),
                Cell::new(c.kind.as_str()),
                Cell::new(format_time(c.issued_at)),
            ]);
        }
        if !self.credentials.is_empty() {
            lines.push(t.to_string());
        }
        lines.join("\n")
    }
}

/// Refresh the inventory and list it.
pub async fn execute(args: DiscoverArgs, ctx: &CommandContext) -> Result<u8> {
    let report = ctx
        .engine
        .discover(CommandContext::provider_id(args.provider))
        .await?;
    output(&report, ctx.json);

    Ok(if report.refresh.failed.is_empty() {
        exit::OK
    } else {
        exit::WARNING
    })
}
