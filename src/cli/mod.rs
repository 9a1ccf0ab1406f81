//! Command-line interface.

pub mod commands;
pub mod exit;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::check::CheckArgs;
use commands::cleanup::CleanupArgs;
use commands::discover::DiscoverArgs;
use commands::init::InitArgs;
use commands::revoke::EmergencyRevokeArgs;
use commands::rotate::{RotateAllArgs, RotateArgs};
use commands::run::RunArgs;
use commands::status::StatusArgs;
use commands::CommandContext;

fn default_actor() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "operator".to_string())
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "keywarden", version, about = "Credential inventory, health checks and rotation")]
pub struct Cli {
    /// Configuration file (defaults to .keywarden/config.yaml plus env overrides)
    #[arg(long, short, global = true, env = "KEYWARDEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Operator name recorded as the initiator of actions
    #[arg(long, global = true, env = "KEYWARDEN_ACTOR", default_value_t = default_actor())]
    pub actor: String,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter configuration file
    Init(InitArgs),
    /// Refresh the inventory and list every credential
    Discover(DiscoverArgs),
    /// Classify credentials; exit code reflects the worst state
    Check(CheckArgs),
    /// Show inventory freshness, parked rotations and recent records
    Status(StatusArgs),
    /// Rotate one principal's long-lived key
    Rotate(RotateArgs),
    /// Rotate every credential in the rotate-now state
    RotateAll(RotateAllArgs),
    /// Finish a rotation parked in the cutover window
    Cleanup(CleanupArgs),
    /// Revoke credentials immediately, bypassing the rotation workflow
    EmergencyRevoke(EmergencyRevokeArgs),
    /// Run the scheduler until interrupted
    Run(RunArgs),
}

/// Run a command against a fully wired context. `init` is handled before
/// the context exists.
pub async fn dispatch(command: Commands, ctx: &CommandContext) -> anyhow::Result<u8> {
    match command {
        Commands::Init(args) => commands::init::execute(&args, ctx.json),
        Commands::Discover(args) => commands::discover::execute(args, ctx).await,
        Commands::Check(args) => commands::check::execute(args, ctx).await,
        Commands::Status(args) => commands::status::execute(args, ctx).await,
        Commands::Rotate(args) => commands::rotate::execute(args, ctx).await,
        Commands::RotateAll(args) => commands::rotate::execute_all(args, ctx).await,
        Commands::Cleanup(args) => commands::cleanup::execute(args, ctx).await,
        Commands::EmergencyRevoke(args) => commands::revoke::execute(args, ctx).await,
        Commands::Run(args) => commands::run::execute(args, ctx).await,
    }
}

/// Report an error that escaped a command and return its exit code.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> u8 {
    let code = exit::for_error(err);
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
            "exit_code": code,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_rotate() {
        let cli = Cli::try_parse_from([
            "keywarden",
            "--actor",
            "alice",
            "rotate",
            "deploy@prod.iam",
            "--provider",
            "gcp:prod",
            "--reveal-secret",
        ])
        .unwrap();
        assert_eq!(cli.actor, "alice");
        match cli.command {
            Commands::Rotate(args) => {
                assert_eq!(args.principal, "deploy@prod.iam");
                assert_eq!(args.provider, "gcp:prod");
                assert!(args.reveal_secret);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rotate_requires_provider() {
        assert!(Cli::try_parse_from(["keywarden", "rotate", "svc"]).is_err());
    }

    #[test]
    fn test_parse_check_filters() {
        let cli = Cli::try_parse_from([
            "keywarden", "check", "--kind", "federated", "--older-than", "60d", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Check(args) = cli.command else {
            panic!("expected check");
        };
        let query = args.query();
        assert_eq!(query.older_than, Some(std::time::Duration::from_secs(60 * 86_400)));
        assert!(query.kind.is_some());
    }

    #[test]
    fn test_emergency_revoke_needs_justification() {
        let missing = Cli::try_parse_from([
            "keywarden",
            "emergency-revoke",
            "--scope",
            "principal",
            "svc",
            "--confirm",
            "REVOKE-CREDENTIALS",
        ]);
        assert!(missing.is_err());

        let cli = Cli::try_parse_from([
            "keywarden",
            "emergency-revoke",
            "--scope",
            "project",
            "prod",
            "--justification",
            "leaked",
            "--confirm",
            "REVOKE-CREDENTIALS",
            "--confirm-project",
            "revoke-all:prod",
        ])
        .unwrap();
        let Commands::EmergencyRevoke(args) = cli.command else {
            panic!("expected emergency-revoke");
        };
        assert_eq!(args.confirm_project.as_deref(), Some("revoke-all:prod"));
    }

    #[test]
    fn test_cleanup_rejects_bad_uuid() {
        assert!(Cli::try_parse_from(["keywarden", "cleanup", "not-a-uuid"]).is_err());
    }
}
