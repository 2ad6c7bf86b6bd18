//! Read-only credentials from environment variables.

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::{CredentialStore, LOGIN_KEY, PASSWORD_KEY};

fn default_login_var() -> String {
    "BILLHARVEST_LOGIN".to_string()
}

fn default_password_var() -> String {
    "BILLHARVEST_PASSWORD".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvConfig {
    #[serde(default = "default_login_var")]
    pub login_var: String,
    #[serde(default = "default_password_var")]
    pub password_var: String,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            login_var: default_login_var(),
            password_var: default_password_var(),
        }
    }
}

pub struct EnvCredentialStore {
    config: EnvConfig,
}

impl EnvCredentialStore {
    pub fn new(config: EnvConfig) -> Self {
        Self { config }
    }

    fn var_for(&self, key: &str) -> Option<&str> {
        match key {
            LOGIN_KEY => Some(self.config.login_var.as_str()),
            PASSWORD_KEY => Some(self.config.password_var.as_str()),
            _ => None,
        }
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        Ok(self
            .var_for(key)
            .and_then(|var| std::env::var(var).ok())
            .filter(|value| !value.is_empty())
            .map(SecretString::from))
    }

    async fn set(&self, key: &str, _value: SecretString) -> Result<()> {
        anyhow::bail!("environment credentials are read-only (tried to set {key:?})")
    }

    fn supports_write(&self) -> bool {
        false
    }
}
