//! Implementation of the `keywarden init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::cli::exit;
use crate::cli::output::{output, CommandOutput};
use crate::infrastructure::setup::init_project;

/// Arguments for `init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(long, short)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

/// Result of `init`.
#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    /// False when the file existed and `--force` was not given.
    pub success: bool,
    /// What happened.
    pub message: String,
    /// File written or left alone.
    pub config_path: PathBuf,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        format!("{}\n  {}", self.message, self.config_path.display())
    }
}

/// Write the starter configuration.
pub fn execute(args: &InitArgs, json_mode: bool) -> Result<u8> {
    let target = if args.path.is_absolute() {
        args.path.clone()
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(&args.path)
    };

    let config_path = init_project(&target, args.force)?;
    output(
        &InitOutput {
            success: true,
            message: if args.force {
                "Configuration rewritten with defaults.".to_string()
            } else {
                "Configuration written.".to_string()
            },
            config_path,
        },
        json_mode,
    );
    Ok(exit::OK)
}
