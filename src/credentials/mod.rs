//! Credential storage abstraction.
//!
//! Two layers:
//! - [`CredentialStore`], a key/value backend (pass, environment variables, memory).
//! - [`AccountVault`], what the portal harvester talks to: the login/password
//!   pair plus a place to record the account holder's identity.
//!
//! # Configuration
//!
//! The `[credentials]` section of `billharvest.toml` picks the backend:
//!
//! ```toml
//! [credentials]
//! backend = "pass"
//! path = "energy/direct-energie"
//!
//! [credentials.fields]
//! login = "email"
//! ```

mod config;
mod env;
mod memory;
mod pass;
mod session;
mod vault;

pub use config::CredentialConfig;
pub use env::{EnvConfig, EnvCredentialStore};
pub use memory::MemoryCredentialStore;
pub use pass::{PassConfig, PassCredentialStore};
pub use session::{SessionCache, SessionData};
pub use vault::{MemoryVault, StoreVault};

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;

use crate::models::Identity;

/// Key under which the portal login is stored.
pub const LOGIN_KEY: &str = "login";
/// Key under which the portal password is stored.
pub const PASSWORD_KEY: &str = "password";

/// A key-value store for credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve a credential by key. `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<SecretString>>;

    /// Store a credential. Read-only backends return an error.
    async fn set(&self, key: &str, value: SecretString) -> Result<()>;

    /// Some backends (like environment variables) are read-only.
    fn supports_write(&self) -> bool {
        true
    }
}

/// Login and password for the customer portal.
#[derive(Debug, Clone)]
pub struct PortalCredentials {
    pub login: String,
    pub secret: SecretString,
}

impl PortalCredentials {
    pub fn new(login: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            secret: SecretString::from(secret.into()),
        }
    }
}

/// Account-level collaborator used by the harvester.
///
/// Every call is a single round trip; nothing here waits on the portal.
#[async_trait]
pub trait AccountVault: Send + Sync {
    /// Whether a portal account is configured at all. Without one the
    /// harvester never submits the login form itself.
    fn account_present(&self) -> bool;

    async fn get_credentials(&self) -> Result<Option<PortalCredentials>>;

    async fn save_credentials(&self, credentials: &PortalCredentials) -> Result<()>;

    async fn save_identity(&self, identity: &Identity) -> Result<()>;
}
