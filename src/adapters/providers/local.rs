//! JSON-file control plane for offline use and demos.
//!
//! ```json
//! { "principals": [ { "name": "ci-deployer", "disabled": false,
//!     "credentials": [ { "id": "k1", "kind": "long-lived-key",
//!                        "issued_at": "2024-01-01T00:00:00Z" } ] } ] }
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::errors::{ProviderError, ProviderResult};
use crate::domain::models::{
    Credential, CredentialKind, IssuedCredential, PrincipalFilter, PrincipalInfo, ProviderId,
    SecretMaterial,
};
use crate::domain::ports::ProviderAdapter;

/// On-disk layout of the JSON file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LocalDocument {
    /// Every principal in scope.
    #[serde(default)]
    pub principals: Vec<LocalPrincipal>,
}

/// One principal and its credentials.
#[derive(Debug, Serialize, Deserialize)]
pub struct LocalPrincipal {
    /// Principal name.
    pub name: String,
    /// Human label.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Disabled principals are reported but never rotated.
    #[serde(default)]
    pub disabled: bool,
    /// Credentials currently issued.
    #[serde(default)]
    pub credentials: Vec<LocalCredential>,
}

/// One credential entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalCredential {
    /// Credential id, unique within the file.
    pub id: String,
    /// Defaults to a long-lived key.
    #[serde(default = "default_kind")]
    pub kind: CredentialKind,
    /// Missing means unknown age.
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
}

const fn default_kind() -> CredentialKind {
    CredentialKind::LongLivedKey
}

/// Provider adapter backed by a JSON file.
pub struct LocalProvider {
    id: ProviderId,
    scope: String,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalProvider {
    /// Adapter over the file at `path`. The file is created on first write.
    pub fn new(id: ProviderId, scope: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            id,
            scope: scope.into(),
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> ProviderResult<LocalDocument> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                ProviderError::invalid_argument(format!("{} is malformed: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LocalDocument::default()),
            Err(e) => Err(ProviderError::unavailable(format!("read {}: {e}", self.path.display()))),
        }
    }

    async fn store(&self, document: &LocalDocument) -> ProviderResult<()> {
        let json = serde_json::to_string_pretty(document)
            .map_err(|e| ProviderError::invalid_argument(format!("serialize: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| ProviderError::unavailable(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ProviderError::unavailable(format!("replace {}: {e}", self.path.display())))
    }

    fn to_credential(&self, principal: &str, c: &LocalCredential) -> Credential {
        Credential {
            id: c.id.clone(),
            principal: principal.to_string(),
            provider: self.id.clone(),
            project: self.scope.clone(),
            kind: c.kind,
            issued_at: c.issued_at,
        }
    }
}

fn not_found_principal(principal: &str) -> ProviderError {
    ProviderError::not_found(format!("principal {principal}"))
}

#[async_trait]
impl ProviderAdapter for LocalProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn project(&self) -> &str {
        &self.scope
    }

    async fn discover(&self, filter: &PrincipalFilter) -> ProviderResult<Vec<Credential>> {
        let document = self.load().await?;
        Ok(document
            .principals
            .iter()
            .filter(|p| filter.matches(&p.name))
            .flat_map(|p| p.credentials.iter().map(|c| self.to_credential(&p.name, c)))
            .collect())
    }

    async fn describe(&self, principal: &str) -> ProviderResult<PrincipalInfo> {
        let document = self.load().await?;
        let p = document
            .principals
            .iter()
            .find(|p| p.name == principal)
            .ok_or_else(|| not_found_principal(principal))?;
        Ok(PrincipalInfo {
            principal: p.name.clone(),
            provider: self.id.clone(),
            project: self.scope.clone(),
            display_name: p.display_name.clone(),
            disabled: p.disabled,
        })
    }

    async fn create_credential(&self, principal: &str) -> ProviderResult<IssuedCredential> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;
        let p = document
            .principals
            .iter_mut()
            .find(|p| p.name == principal)
            .ok_or_else(|| not_found_principal(principal))?;
        if p.disabled {
            return Err(ProviderError::permission_denied(format!("principal {principal} is disabled")));
        }

        let created = LocalCredential {
            id: Uuid::new_v4().simple().to_string(),
            kind: CredentialKind::LongLivedKey,
            issued_at: Some(Utc::now()),
        };
        p.credentials.push(created.clone());
        self.store(&document).await?;

        Ok(IssuedCredential {
            credential: self.to_credential(principal, &created),
            secret: SecretMaterial::new(format!("kw_{}", Uuid::new_v4().simple())),
        })
    }

    async fn validate_credential(&self, issued: &IssuedCredential) -> ProviderResult<()> {
        let document = self.load().await?;
        let present = document
            .principals
            .iter()
            .filter(|p| p.name == issued.credential.principal && !p.disabled)
            .flat_map(|p| p.credentials.iter())
            .any(|c| c.id == issued.credential.id);
        if present {
            Ok(())
        } else {
            Err(ProviderError::not_found(format!("credential {}", issued.credential.id)))
        }
    }

    async fn revoke_credential(&self, credential: &Credential) -> ProviderResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;
        let Some(p) = document
            .principals
            .iter_mut()
            .find(|p| p.name == credential.principal)
        else {
            return Ok(());
        };
        let before = p.credentials.len();
        p.credentials.retain(|c| c.id != credential.id);
        if p.credentials.len() == before {
            return Ok(());
        }
        self.store(&document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded(dir: &TempDir) -> LocalProvider {
        let path = dir.path().join("plane.json");
        std::fs::write(
            &path,
            r#"{"principals":[{"name":"ci","credentials":[
                {"id":"k1","kind":"long-lived-key","issued_at":"2024-01-01T00:00:00Z"},
                {"id":"f1","kind":"federated-token-binding"}]}]}"#,
        )
        .unwrap();
        LocalProvider::new(ProviderId::new("local:lab"), "lab", path)
    }

    #[tokio::test]
    async fn test_discover_reads_file() {
        let dir = TempDir::new().unwrap();
        let provider = seeded(&dir);

        let found = provider.discover(&PrincipalFilter::All).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].project, "lab");
        assert!(found[0].issued_at.is_some());
        assert_eq!(found[1].kind, CredentialKind::FederatedTokenBinding);
        assert!(found[1].issued_at.is_none());
    }

    #[tokio::test]
    async fn test_create_validate_revoke_persist() {
        let dir = TempDir::new().unwrap();
        let provider = seeded(&dir);

        let issued = provider.create_credential("ci").await.unwrap();
        provider.validate_credential(&issued).await.unwrap();
        assert!(issued.secret.expose().starts_with("kw_"));

        let old = provider
            .discover(&PrincipalFilter::single("ci"))
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.id == "k1")
            .unwrap();
        provider.revoke_credential(&old).await.unwrap();

        let ids: Vec<_> = provider
            .discover(&PrincipalFilter::All)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert!(ids.contains(&issued.credential.id));
        assert!(!ids.contains(&"k1".to_string()));
    }

    #[tokio::test]
    async fn test_revoke_twice_succeeds() {
        let dir = TempDir::new().unwrap();
        let provider = seeded(&dir);
        let key = provider
            .discover(&PrincipalFilter::single("ci"))
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.id == "k1")
            .unwrap();

        provider.revoke_credential(&key).await.unwrap();
        provider.revoke_credential(&key).await.unwrap();

        let mut orphan = key.clone();
        orphan.principal = "deleted-sa".to_string();
        provider.revoke_credential(&orphan).await.unwrap();

        let remaining = provider.discover(&PrincipalFilter::All).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "f1");
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_plane() {
        let dir = TempDir::new().unwrap();
        let provider = LocalProvider::new(ProviderId::new("local:x"), "x", dir.path().join("none.json"));
        assert!(provider.discover(&PrincipalFilter::All).await.unwrap().is_empty());
        assert!(provider.describe("ci").await.unwrap_err().is_not_found());
    }
}
