//! Control-plane adapters and their factory.

pub mod azure;
pub mod gcp;
pub mod http;
pub mod local;
pub mod memory;

use std::sync::Arc;

use crate::domain::models::ProviderConfig;
use crate::domain::ports::ProviderAdapter;

pub use azure::{AzureProvider, GraphClient};
pub use gcp::{GcpClient, GcpProvider};
pub use local::LocalProvider;
pub use memory::{InMemoryProvider, ProviderOp};

/// Create an adapter from its configuration.
///
/// Access tokens are read from the environment here. A missing token does
/// not fail construction; that provider's calls fail as permission-denied.
pub fn create_provider(config: &ProviderConfig) -> Arc<dyn ProviderAdapter> {
    let id = config.provider_id();
    match config {
        ProviderConfig::Gcp {
            project,
            token_env,
            base_url,
            token_url,
            ..
        } => {
            let client = GcpClient::new(
                project.clone(),
                http::token_from_env(token_env),
                token_env.clone(),
                base_url.clone(),
                token_url.clone(),
            );
            Arc::new(GcpProvider::new(id, client))
        }
        ProviderConfig::Azure {
            tenant,
            token_env,
            graph_base_url,
            login_base_url,
            ..
        } => {
            let client = GraphClient::new(
                tenant.clone(),
                http::token_from_env(token_env),
                token_env.clone(),
                graph_base_url.clone(),
                login_base_url.clone(),
            );
            Arc::new(AzureProvider::new(id, client))
        }
        ProviderConfig::Local { path, scope, .. } => Arc::new(LocalProvider::new(id, scope.clone(), path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_uses_configured_id() {
        let config: ProviderConfig =
            serde_yaml::from_str("kind: azure\ntenant: contoso\n").unwrap();
        let adapter = create_provider(&config);
        assert_eq!(adapter.id().as_str(), "azure:contoso");
        assert_eq!(adapter.project(), "contoso");
    }
}
