//! `keywarden emergency-revoke`: out-of-band revocation with confirmation.

use anyhow::Result;
use clap::{Args, ValueEnum};
use comfy_table::Cell;
use serde::Serialize;

use crate::cli::commands::CommandContext;
use crate::cli::exit;
use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::{RevocationRecord, RevocationRequest, RevocationScope};

/// Revocation scope
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ScopeArg {
    /// One credential, by id
    Credential,
    /// Every credential of one principal
    Principal,
    /// Every credential in one project
    Project,
}

impl From<ScopeArg> for RevocationScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Credential => Self::SingleCredential,
            ScopeArg::Principal => Self::AllCredentialsForPrincipal,
            ScopeArg::Project => Self::AllCredentialsInProject,
        }
    }
}

/// Arguments for `emergency-revoke`.
#[derive(Args, Debug)]
pub struct EmergencyRevokeArgs {
    /// Blast radius
    #[arg(long, value_enum)]
    pub scope: ScopeArg,

    /// Credential id, principal, or project depending on --scope
    pub target: String,

    /// Why this is happening; recorded in the audit log
    #[arg(long)]
    pub justification: String,

    /// Confirmation token (REVOKE-CREDENTIALS)
    #[arg(long)]
    pub confirm: String,

    /// Second confirmation for project scope (revoke-all:<project>)
    #[arg(long)]
    pub confirm_project: Option<String>,
}

/// Result of `emergency-revoke`.
#[derive(Debug, Serialize)]
pub struct RevocationOutput {
    /// Persisted revocation record.
    #[serde(flatten)]
    pub record: RevocationRecord,
}

impl CommandOutput for RevocationOutput {
    fn to_human(&self) -> String {
        let r = &self.record;
        let mut out = format!(
            "Emergency revocation {} ({} '{}'): {}\n  revoked {} of {}",
            r.id,
            r.scope,
            r.target,
            r.outcome,
            r.succeeded.len(),
            r.attempted.len()
        );
        if !r.failed.is_empty() {
            let mut t = table(&["Principal", "Credential", "Error"]);
            for f in &r.failed {
                t.add_row(vec![
                    Cell::new(&f.principal),
                    Cell::new(&f.credential_id),
                    Cell::new(&f.error),
                ]);
            }
            out.push_str("\n\nStill active:\n");
            out.push_str(&t.to_string());
        }
        out
    }
}

/// Validate confirmation, revoke and print the record.
pub async fn execute(args: EmergencyRevokeArgs, ctx: &CommandContext) -> Result<u8> {
    let request = RevocationRequest {
        scope: args.scope.into(),
        target: args.target,
        justification: args.justification,
        confirmation_token: args.confirm,
        project_confirmation: args.confirm_project,
        initiator: ctx.initiator(),
    };

    let record = ctx.engine.emergency_revoke(request).await?;
    let code = exit::for_revocation(record.outcome);
    output(&RevocationOutput { record }, ctx.json);
    Ok(code)
}
