//! Microsoft Graph HTTP client for application credentials.
//!
//! Applications are addressed by client id (`appId`) using Graph's
//! alternate-key syntax, so callers never need the object id.

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::adapters::providers::http::{
    error_for_status, error_for_transport, missing_token, send_delete, send_json,
};
use crate::domain::errors::{ProviderError, ProviderResult};

use super::models::{
    AddPasswordRequest, Application, FederatedIdentityCredential, NewPassword, OAuthError, Page,
    PasswordCredential, RemovePasswordRequest,
};

/// Production Microsoft Graph endpoint.
pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com";
/// Production Entra ID login endpoint.
pub const LOGIN_BASE: &str = "https://login.microsoftonline.com";

const APPLICATION_FIELDS: &str = "id,appId,displayName,passwordCredentials";

/// Graph client for one tenant, authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: Client,
    graph_base: String,
    login_base: String,
    tenant: String,
    token: Option<String>,
    token_env: String,
}

impl GraphClient {
    /// `graph_base` and `login_base` override the production endpoints.
    pub fn new(
        tenant: impl Into<String>,
        token: Option<String>,
        token_env: impl Into<String>,
        graph_base: Option<String>,
        login_base: Option<String>,
    ) -> Self {
        let trim = |s: String| s.trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            graph_base: trim(graph_base.unwrap_or_else(|| GRAPH_API_BASE.to_string())),
            login_base: trim(login_base.unwrap_or_else(|| LOGIN_BASE.to_string())),
            tenant: tenant.into(),
            token,
            token_env: token_env.into(),
        }
    }

    /// Tenant id the client is bound to.
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    fn request_url(&self, method: Method, url: &str) -> ProviderResult<RequestBuilder> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| missing_token(&self.token_env))?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header("User-Agent", "keywarden"))
    }

    fn request(&self, method: Method, path: &str) -> ProviderResult<RequestBuilder> {
        self.request_url(method, &format!("{}/v1.0/{path}", self.graph_base))
    }

    fn app_path(app_id: &str) -> String {
        format!("applications(appId='{app_id}')")
    }

    async fn collect_pages<T: DeserializeOwned>(
        &self,
        first: RequestBuilder,
        context: &str,
    ) -> ProviderResult<Vec<T>> {
        let mut items = Vec::new();
        let mut page: Page<T> = send_json(first, context).await?;
        loop {
            items.append(&mut page.value);
            let Some(next) = page.next_link.take() else {
                break;
            };
            page = send_json(self.request_url(Method::GET, &next)?, context).await?;
        }
        Ok(items)
    }

    /// Every application registration, following `@odata.nextLink`.
    pub async fn list_applications(&self) -> ProviderResult<Vec<Application>> {
        let req = self
            .request(Method::GET, "applications")?
            .query(&[("$select", APPLICATION_FIELDS)]);
        self.collect_pages(req, "list applications").await
    }

    /// One application by client id.
    pub async fn get_application(&self, app_id: &str) -> ProviderResult<Application> {
        let req = self
            .request(Method::GET, &Self::app_path(app_id))?
            .query(&[("$select", APPLICATION_FIELDS)]);
        send_json(req, "get application").await
    }

    /// Federated identity credentials of an application.
    pub async fn list_federated(&self, app_id: &str) -> ProviderResult<Vec<FederatedIdentityCredential>> {
        let req = self.request(
            Method::GET,
            &format!("{}/federatedIdentityCredentials", Self::app_path(app_id)),
        )?;
        self.collect_pages(req, "list federated credentials").await
    }

    /// Add a client secret. `secretText` is only returned here.
    pub async fn add_password(&self, app_id: &str, display_name: &str) -> ProviderResult<PasswordCredential> {
        let req = self
            .request(Method::POST, &format!("{}/addPassword", Self::app_path(app_id)))?
            .json(&AddPasswordRequest {
                password_credential: NewPassword {
                    display_name: display_name.to_string(),
                },
            });
        send_json(req, "add password").await
    }

    /// Remove a client secret. Removing one that no longer exists succeeds.
    pub async fn remove_password(&self, app_id: &str, key_id: &str) -> ProviderResult<()> {
        let req = self
            .request(Method::POST, &format!("{}/removePassword", Self::app_path(app_id)))?
            .json(&RemovePasswordRequest {
                key_id: key_id.to_string(),
            });
        send_delete(req, "remove password").await
    }

    /// Delete a federated identity credential; an absent one counts as deleted.
    pub async fn delete_federated(&self, app_id: &str, credential_id: &str) -> ProviderResult<()> {
        let req = self.request(
            Method::DELETE,
            &format!(
                "{}/federatedIdentityCredentials/{credential_id}",
                Self::app_path(app_id)
            ),
        )?;
        send_delete(req, "delete federated credential").await
    }

    /// Run a client-credentials grant with a freshly added secret.
    ///
    /// `invalid_client` right after creation means the secret has not
    /// propagated yet.
    pub async fn client_credentials(&self, app_id: &str, secret: &str) -> ProviderResult<()> {
        let context = "client credentials grant";
        let url = format!("{}/{}/oauth2/v2.0/token", self.login_base, self.tenant);
        let scope = format!("{}/.default", GRAPH_API_BASE);
        let response = self
            .http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", app_id),
                ("client_secret", secret),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| error_for_transport(&e, context))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        let oauth: OAuthError = serde_json::from_str(&body).unwrap_or_default();
        if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED)
            && oauth.error == "invalid_client"
        {
            return Err(ProviderError::propagation_delay(format!(
                "new secret not yet accepted: {}",
                oauth.error_description.unwrap_or(oauth.error)
            )));
        }
        Err(error_for_status(status, context, &body))
    }
}
