//! `keywarden run`: the long-running scheduler.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::cli::commands::check::parse_duration;
use crate::cli::commands::{ctrl_c_token, CommandContext};
use crate::cli::exit;
use crate::cli::output::{output, CommandOutput};
use crate::infrastructure::setup::policy_source;
use crate::services::{Scheduler, SchedulerStats};

/// Arguments for `run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override the configured cycle interval (e.g. 15m)
    #[arg(long, value_parser = parse_duration)]
    pub interval: Option<Duration>,
}

impl CommandOutput for SchedulerStats {
    fn to_human(&self) -> String {
        format!(
            "Scheduler stopped after {} cycle(s); {} failed, {} policy reload(s) rejected.",
            self.cycles, self.failed_cycles, self.rejected_reloads
        )
    }
}

/// Run the scheduler until Ctrl-C.
pub async fn execute(args: RunArgs, ctx: &CommandContext) -> Result<u8> {
    let interval = args.interval.unwrap_or(ctx.config.scheduler.interval);
    let scheduler = Scheduler::new(ctx.engine.clone(), interval)
        .with_policy_source(policy_source(ctx.config_path.clone()));

    info!(providers = ctx.config.providers.len(), "starting scheduler, Ctrl-C to stop");
    let stats = scheduler.run(ctrl_c_token()).await?;
    output(&stats, ctx.json);
    Ok(exit::OK)
}
