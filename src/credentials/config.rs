//! Backend selection for the `[credentials]` config section.

use serde::{Deserialize, Serialize};

use super::env::{EnvConfig, EnvCredentialStore};
use super::pass::{PassConfig, PassCredentialStore};
use super::CredentialStore;

/// Configuration for a credential store.
///
/// ```toml
/// [credentials]
/// backend = "env"
/// login_var = "PORTAL_LOGIN"
/// password_var = "PORTAL_PASSWORD"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CredentialConfig {
    /// Password-store (pass) backend.
    Pass {
        #[serde(flatten)]
        config: PassConfig,
    },
    /// Environment variables (read-only).
    Env {
        #[serde(flatten)]
        config: EnvConfig,
    },
}

impl CredentialConfig {
    pub fn build(&self) -> Box<dyn CredentialStore> {
        match self {
            CredentialConfig::Pass { config } => Box::new(PassCredentialStore::new(config.clone())),
            CredentialConfig::Env { config } => Box::new(EnvCredentialStore::new(config.clone())),
        }
    }
}
