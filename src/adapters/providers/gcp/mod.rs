//! Google Cloud IAM service-account keys.
//!
//! Principals are service-account emails. Only `USER_MANAGED` keys are
//! inventoried. A new key is validated by signing a JWT assertion with it and
//! exchanging that at the OAuth token endpoint.

pub mod client;
pub(crate) mod models;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tracing::debug;

use crate::domain::errors::{ProviderError, ProviderResult};
use crate::domain::models::{
    Credential, CredentialKind, IssuedCredential, PrincipalFilter, PrincipalInfo, ProviderId,
    SecretMaterial,
};
use crate::domain::ports::ProviderAdapter;

pub use client::GcpClient;
use models::{JwtClaims, KeyFile, ServiceAccountKey};

const ASSERTION_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Google Cloud IAM service-account keys.
pub struct GcpProvider {
    id: ProviderId,
    client: GcpClient,
}

impl GcpProvider {
    /// Adapter registered under `id`.
    pub fn new(id: ProviderId, client: GcpClient) -> Self {
        Self { id, client }
    }

    fn to_credential(&self, email: &str, key: &ServiceAccountKey) -> Credential {
        Credential {
            id: key.key_id().to_string(),
            principal: email.to_string(),
            provider: self.id.clone(),
            project: self.client.project().to_string(),
            kind: CredentialKind::LongLivedKey,
            issued_at: key.valid_after_time.as_deref().and_then(parse_timestamp),
        }
    }

    async fn keys_of(&self, email: &str) -> ProviderResult<Vec<Credential>> {
        Ok(self
            .client
            .list_keys(email)
            .await?
            .iter()
            .map(|k| self.to_credential(email, k))
            .collect())
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}

/// Build the signed assertion used to prove a new key works.
pub fn sign_assertion(key_file: &KeyFile, audience: &str, now: DateTime<Utc>) -> ProviderResult<String> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(key_file.private_key_id.clone());

    let claims = JwtClaims {
        iss: &key_file.client_email,
        scope: ASSERTION_SCOPE,
        aud: audience,
        iat: now.timestamp(),
        exp: now.timestamp() + 3600,
    };

    let key = EncodingKey::from_rsa_pem(key_file.private_key.as_bytes())
        .map_err(|e| ProviderError::invalid_argument(format!("new key is not a usable RSA key: {e}")))?;
    jsonwebtoken::encode(&header, &claims, &key)
        .map_err(|e| ProviderError::invalid_argument(format!("signing assertion failed: {e}")))
}

#[async_trait]
impl ProviderAdapter for GcpProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn project(&self) -> &str {
        self.client.project()
    }

    async fn discover(&self, filter: &PrincipalFilter) -> ProviderResult<Vec<Credential>> {
        let emails: Vec<String> = match filter {
            PrincipalFilter::All => self
                .client
                .list_accounts()
                .await?
                .into_iter()
                .map(|a| a.email)
                .collect(),
            PrincipalFilter::Only(names) => names.clone(),
        };

        let mut credentials = Vec::new();
        for email in &emails {
            match self.keys_of(email).await {
                Ok(keys) => credentials.extend(keys),
                Err(e) if e.is_not_found() => debug!(principal = %email, "service account vanished during discovery"),
                Err(e) => return Err(e),
            }
        }
        Ok(credentials)
    }

    async fn describe(&self, principal: &str) -> ProviderResult<PrincipalInfo> {
        let account = self.client.get_account(principal).await?;
        Ok(PrincipalInfo {
            principal: account.email,
            provider: self.id.clone(),
            project: self.client.project().to_string(),
            display_name: account.display_name,
            disabled: account.disabled,
        })
    }

    async fn create_credential(&self, principal: &str) -> ProviderResult<IssuedCredential> {
        let key = self.client.create_key(principal).await?;
        let encoded = key
            .private_key_data
            .as_deref()
            .ok_or_else(|| ProviderError::invalid_argument("create key response carried no key material"))?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ProviderError::invalid_argument(format!("key material is not base64: {e}")))?;
        let secret = String::from_utf8(decoded)
            .map_err(|e| ProviderError::invalid_argument(format!("key material is not UTF-8: {e}")))?;

        Ok(IssuedCredential {
            credential: self.to_credential(principal, &key),
            secret: SecretMaterial::new(secret),
        })
    }

    async fn validate_credential(&self, issued: &IssuedCredential) -> ProviderResult<()> {
        let key_file: KeyFile = serde_json::from_str(issued.secret.expose())
            .map_err(|e| ProviderError::invalid_argument(format!("key file is malformed: {e}")))?;
        if key_file.private_key_id != issued.credential.id {
            return Err(ProviderError::invalid_argument(format!(
                "key file belongs to key {}, expected {}",
                key_file.private_key_id, issued.credential.id
            )));
        }
        let assertion = sign_assertion(&key_file, self.client.token_url(), Utc::now())?;
        self.client.exchange_assertion(&assertion).await
    }

    async fn revoke_credential(&self, credential: &Credential) -> ProviderResult<()> {
        if !credential.kind.is_rotatable() {
            return Err(ProviderError::invalid_argument(format!(
                "{} credentials are not managed by this provider",
                credential.kind
            )));
        }
        self.client.delete_key(&credential.principal, &credential.id).await
    }
}
