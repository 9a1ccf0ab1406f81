//! Azure AD application credentials via Microsoft Graph.
//!
//! Principals are application client ids. Password credentials are
//! long-lived keys; federated identity credentials are token bindings and
//! can be discovered and revoked but never created here.

pub mod client;
pub(crate) mod models;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::errors::{ProviderError, ProviderResult};
use crate::domain::models::{
    Credential, CredentialKind, IssuedCredential, PrincipalFilter, PrincipalInfo, ProviderId,
    SecretMaterial,
};
use crate::domain::ports::ProviderAdapter;

pub use client::GraphClient;
use models::{Application, PasswordCredential};

const PASSWORD_DISPLAY_NAME: &str = "keywarden-rotation";

/// Entra ID application secrets and federated credentials.
pub struct AzureProvider {
    id: ProviderId,
    client: GraphClient,
}

impl AzureProvider {
    /// Adapter registered under `id`.
    pub fn new(id: ProviderId, client: GraphClient) -> Self {
        Self { id, client }
    }

    fn credential(&self, app_id: &str, id: String, kind: CredentialKind, issued_at: Option<DateTime<Utc>>) -> Credential {
        Credential {
            id,
            principal: app_id.to_string(),
            provider: self.id.clone(),
            project: self.client.tenant().to_string(),
            kind,
            issued_at,
        }
    }

    fn password(&self, app_id: &str, password: &PasswordCredential) -> Credential {
        self.credential(
            app_id,
            password.key_id.clone(),
            CredentialKind::LongLivedKey,
            password.start_date_time.as_deref().and_then(parse_timestamp),
        )
    }

    async fn credentials_of(&self, app: &Application) -> ProviderResult<Vec<Credential>> {
        let mut credentials: Vec<Credential> = app
            .password_credentials
            .iter()
            .map(|p| self.password(&app.app_id, p))
            .collect();

        for binding in self.client.list_federated(&app.app_id).await? {
            credentials.push(self.credential(
                &app.app_id,
                binding.id,
                CredentialKind::FederatedTokenBinding,
                None,
            ));
        }
        Ok(credentials)
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}

#[async_trait]
impl ProviderAdapter for AzureProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn project(&self) -> &str {
        self.client.tenant()
    }

    async fn discover(&self, filter: &PrincipalFilter) -> ProviderResult<Vec<Credential>> {
        let applications = match filter {
            PrincipalFilter::All => self.client.list_applications().await?,
            PrincipalFilter::Only(names) => {
                let mut apps = Vec::with_capacity(names.len());
                for name in names {
                    match self.client.get_application(name).await {
                        Ok(app) => apps.push(app),
                        Err(e) if e.is_not_found() => debug!(principal = %name, "application not found"),
                        Err(e) => return Err(e),
                    }
                }
                apps
            }
        };

        let mut credentials = Vec::new();
        for app in &applications {
            credentials.extend(self.credentials_of(app).await?);
        }
        Ok(credentials)
    }

    async fn describe(&self, principal: &str) -> ProviderResult<PrincipalInfo> {
        let app = self.client.get_application(principal).await?;
        Ok(PrincipalInfo {
            principal: app.app_id,
            provider: self.id.clone(),
            project: self.client.tenant().to_string(),
            display_name: app.display_name,
            disabled: false,
        })
    }

    async fn create_credential(&self, principal: &str) -> ProviderResult<IssuedCredential> {
        let mut created = self.client.add_password(principal, PASSWORD_DISPLAY_NAME).await?;
        let secret = created
            .secret_text
            .take()
            .ok_or_else(|| ProviderError::invalid_argument("addPassword response carried no secret"))?;
        Ok(IssuedCredential {
            credential: self.password(principal, &created),
            secret: SecretMaterial::new(secret),
        })
    }

    async fn validate_credential(&self, issued: &IssuedCredential) -> ProviderResult<()> {
        self.client
            .client_credentials(&issued.credential.principal, issued.secret.expose())
            .await
    }

    async fn revoke_credential(&self, credential: &Credential) -> ProviderResult<()> {
        match credential.kind {
            CredentialKind::LongLivedKey => {
                self.client
                    .remove_password(&credential.principal, &credential.id)
                    .await
            }
            CredentialKind::FederatedTokenBinding => {
                self.client
                    .delete_federated(&credential.principal, &credential.id)
                    .await
            }
        }
    }
}
