//! CLI command implementations.
//!
//! Every command except `init` receives a [`CommandContext`] and returns the
//! process exit code.

pub mod check;
pub mod cleanup;
pub mod discover;
pub mod init;
pub mod revoke;
pub mod rotate;
pub mod run;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::domain::models::{Config, Initiator, ProviderId};
use crate::services::CredentialEngine;

/// Everything a command needs once configuration is loaded.
pub struct CommandContext {
    /// Engine built from `config`.
    pub engine: Arc<CredentialEngine>,
    /// Loaded configuration.
    pub config: Config,
    /// File the configuration came from, if any.
    pub config_path: Option<PathBuf>,
    /// Print JSON instead of tables.
    pub json: bool,
    /// Operator recorded in the audit log.
    pub actor: String,
}

impl CommandContext {
    /// Initiator for operator-triggered actions.
    pub fn initiator(&self) -> Initiator {
        Initiator::operator(self.actor.clone())
    }

    /// Wrap an optional `--provider` value.
    pub fn provider_id(provider: Option<String>) -> Option<ProviderId> {
        provider.map(ProviderId::new)
    }
}

/// A token cancelled on Ctrl-C.
pub fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next safe point");
            child.cancel();
        }
    });
    token
}
