//! `keywarden cleanup`: finish a rotation parked in the cutover window.

use anyhow::Result;
use clap::Args;
use uuid::Uuid;

use crate::cli::commands::CommandContext;
use crate::cli::exit;
use crate::cli::output::output;

use super::rotate::RotationOutput;

/// Arguments for `cleanup`.
#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Id of the parked rotation record (see `keywarden status`)
    pub record_id: Uuid,
}

/// Revoke the predecessor of a parked rotation.
pub async fn execute(args: CleanupArgs, ctx: &CommandContext) -> Result<u8> {
    let report = ctx.engine.cleanup(args.record_id, ctx.initiator()).await?;
    let code = exit::for_rotation(&report);
    output(&RotationOutput::from(report), ctx.json);
    Ok(code)
}
