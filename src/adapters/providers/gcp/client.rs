//! IAM v1 HTTP client.

use reqwest::{Client, Method, RequestBuilder, StatusCode};

use crate::adapters::providers::http::{
    error_for_status, error_for_transport, missing_token, send_delete, send_json,
};
use crate::domain::errors::{ProviderError, ProviderResult};

use super::models::{
    CreateKeyRequest, ListKeysResponse, ListServiceAccountsResponse, OAuthError, ServiceAccount,
    ServiceAccountKey,
};

/// Production IAM endpoint.
pub const IAM_API_BASE: &str = "https://iam.googleapis.com";
/// Production OAuth token endpoint, used to prove a new key works.
pub const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Thin IAM client for one project, authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct GcpClient {
    http: Client,
    base_url: String,
    token_url: String,
    project: String,
    token: Option<String>,
    token_env: String,
}

impl GcpClient {
    /// `base_url` and `token_url` override the production endpoints.
    pub fn new(
        project: impl Into<String>,
        token: Option<String>,
        token_env: impl Into<String>,
        base_url: Option<String>,
        token_url: Option<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url
                .unwrap_or_else(|| IAM_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            token_url: token_url.unwrap_or_else(|| OAUTH_TOKEN_URL.to_string()),
            project: project.into(),
            token,
            token_env: token_env.into(),
        }
    }

    /// Project whose service accounts this client manages.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Audience for signed JWT assertions.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    fn request(&self, method: Method, path: &str) -> ProviderResult<RequestBuilder> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| missing_token(&self.token_env))?;
        Ok(self
            .http
            .request(method, format!("{}/v1/{path}", self.base_url))
            .bearer_auth(token)
            .header("User-Agent", "keywarden"))
    }

    fn account_path(&self, email: &str) -> String {
        format!("projects/{}/serviceAccounts/{email}", self.project)
    }

    /// Every service account in the project, following pagination.
    pub async fn list_accounts(&self) -> ProviderResult<Vec<ServiceAccount>> {
        let mut accounts = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self
                .request(Method::GET, &format!("projects/{}/serviceAccounts", self.project))?
                .query(&[("pageSize", "100")]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }
            let page: ListServiceAccountsResponse = send_json(req, "list service accounts").await?;
            accounts.extend(page.accounts);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(accounts)
    }

    /// One service account by email.
    pub async fn get_account(&self, email: &str) -> ProviderResult<ServiceAccount> {
        let req = self.request(Method::GET, &self.account_path(email))?;
        send_json(req, "get service account").await
    }

    /// User-managed keys of a service account. System-managed keys are never listed.
    pub async fn list_keys(&self, email: &str) -> ProviderResult<Vec<ServiceAccountKey>> {
        let req = self
            .request(Method::GET, &format!("{}/keys", self.account_path(email)))?
            .query(&[("keyTypes", "USER_MANAGED")]);
        let resp: ListKeysResponse = send_json(req, "list keys").await?;
        Ok(resp.keys)
    }

    /// Create a key. The response carries the private key file exactly once.
    pub async fn create_key(&self, email: &str) -> ProviderResult<ServiceAccountKey> {
        let req = self
            .request(Method::POST, &format!("{}/keys", self.account_path(email)))?
            .json(&CreateKeyRequest::default());
        send_json(req, "create key").await
    }

    /// Delete a user-managed key. Deleting a key that no longer exists succeeds.
    pub async fn delete_key(&self, email: &str, key_id: &str) -> ProviderResult<()> {
        let req = self.request(
            Method::DELETE,
            &format!("{}/keys/{key_id}", self.account_path(email)),
        )?;
        send_delete(req, "delete key").await
    }

    /// Exchange a signed JWT assertion for an access token.
    ///
    /// `invalid_grant` right after creation means the key has not propagated.
    pub async fn exchange_assertion(&self, assertion: &str) -> ProviderResult<()> {
        let context = "token exchange";
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion),
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
        if status == StatusCode::BAD_REQUEST && oauth.error == "invalid_grant" {
            return Err(ProviderError::propagation_delay(format!(
                "new key not yet accepted: {}",
                oauth.error_description.unwrap_or(oauth.error)
            )));
        }
        Err(error_for_status(status, context, &body))
    }
}
