//! Request and response bodies for the IAM v1 REST API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListServiceAccountsResponse {
    #[serde(default)]
    pub accounts: Vec<ServiceAccount>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountKey {
    /// `projects/{project}/serviceAccounts/{email}/keys/{key_id}`
    pub name: String,
    #[serde(default)]
    pub valid_after_time: Option<String>,
    #[serde(default)]
    pub key_type: Option<String>,
    /// Only present on create responses.
    #[serde(default)]
    pub private_key_data: Option<String>,
}

impl ServiceAccountKey {
    pub fn key_id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListKeysResponse {
    #[serde(default)]
    pub keys: Vec<ServiceAccountKey>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyRequest {
    pub private_key_type: &'static str,
    pub key_algorithm: &'static str,
}

impl Default for CreateKeyRequest {
    fn default() -> Self {
        Self {
            private_key_type: "TYPE_GOOGLE_CREDENTIALS_FILE",
            key_algorithm: "KEY_ALG_RSA_2048",
        }
    }
}

/// The decoded `privateKeyData` of a new key.
#[derive(Deserialize)]
pub struct KeyFile {
    pub client_email: String,
    pub private_key_id: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JwtClaims<'a> {
    pub iss: &'a str,
    pub scope: &'a str,
    pub aud: &'a str,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct OAuthError {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}
