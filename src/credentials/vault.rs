use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{AccountVault, CredentialStore, PortalCredentials, LOGIN_KEY, PASSWORD_KEY};
use crate::models::Identity;

/// [`AccountVault`] over a key/value [`CredentialStore`], with the identity
/// kept as a JSON file next to the harvested documents.
pub struct StoreVault {
    store: Option<Box<dyn CredentialStore>>,
    identity_path: PathBuf,
}

impl StoreVault {
    pub fn new(store: Option<Box<dyn CredentialStore>>, identity_path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            identity_path: identity_path.into(),
        }
    }
}

#[async_trait]
impl AccountVault for StoreVault {
    fn account_present(&self) -> bool {
        self.store.is_some()
    }

    async fn get_credentials(&self) -> Result<Option<PortalCredentials>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };

        let login = store.get(LOGIN_KEY).await.context("Failed to read portal login")?;
        let secret = store
            .get(PASSWORD_KEY)
            .await
            .context("Failed to read portal password")?;

        Ok(match (login, secret) {
            (Some(login), Some(secret)) => Some(PortalCredentials {
                login: login.expose_secret().to_string(),
                secret,
            }),
            _ => None,
        })
    }

    async fn save_credentials(&self, credentials: &PortalCredentials) -> Result<()> {
        let Some(store) = self.store.as_ref().filter(|s| s.supports_write()) else {
            tracing::debug!("Credential backend is absent or read-only; not saving scraped login");
            return Ok(());
        };

        store
            .set(LOGIN_KEY, SecretString::from(credentials.login.clone()))
            .await?;
        store.set(PASSWORD_KEY, credentials.secret.clone()).await?;
        Ok(())
    }

    async fn save_identity(&self, identity: &Identity) -> Result<()> {
        if let Some(parent) = self.identity_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(identity).context("Failed to serialize identity")?;
        tokio::fs::write(&self.identity_path, content)
            .await
            .with_context(|| format!("Failed to write {}", self.identity_path.display()))
    }
}

/// In-memory vault for tests; records everything saved into it.
#[derive(Debug, Default)]
pub struct MemoryVault {
    account_present: bool,
    credentials: Mutex<Option<(String, String)>>,
    saved_credentials: Mutex<Vec<String>>,
    identities: Mutex<Vec<Identity>>,
}

impl MemoryVault {
    /// A configured account with no stored credentials yet.
    pub fn new() -> Self {
        Self {
            account_present: true,
            ..Self::default()
        }
    }

    /// No account configured: the harvester must wait for a human login.
    pub fn without_account() -> Self {
        Self::default()
    }

    pub fn with_credentials(self, login: impl Into<String>, secret: impl Into<String>) -> Self {
        if let Ok(mut creds) = self.credentials.lock() {
            *creds = Some((login.into(), secret.into()));
        }
        self
    }

    /// Logins passed to `save_credentials`, in call order.
    pub fn saved_logins(&self) -> Vec<String> {
        self.saved_credentials
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn saved_identities(&self) -> Vec<Identity> {
        self.identities.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AccountVault for MemoryVault {
    fn account_present(&self) -> bool {
        self.account_present
    }

    async fn get_credentials(&self) -> Result<Option<PortalCredentials>> {
        let creds = self
            .credentials
            .lock()
            .map_err(|_| anyhow::anyhow!("vault lock poisoned"))?;
        Ok(creds
            .as_ref()
            .map(|(login, secret)| PortalCredentials::new(login.clone(), secret.clone())))
    }

    async fn save_credentials(&self, credentials: &PortalCredentials) -> Result<()> {
        let mut saved = self
            .saved_credentials
            .lock()
            .map_err(|_| anyhow::anyhow!("vault lock poisoned"))?;
        saved.push(credentials.login.clone());
        Ok(())
    }

    async fn save_identity(&self, identity: &Identity) -> Result<()> {
        let mut identities = self
            .identities
            .lock()
            .map_err(|_| anyhow::anyhow!("vault lock poisoned"))?;
        identities.push(identity.clone());
        Ok(())
    }
}
