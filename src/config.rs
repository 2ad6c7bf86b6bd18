use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialConfig;
use crate::duration::{
    deserialize_duration, deserialize_optional_duration, serialize_duration,
    serialize_optional_duration,
};

fn default_base_url() -> String {
    "https://clients.direct-energie.com".to_string()
}

fn default_vendor() -> String {
    "Direct Energie".to_string()
}

/// Customer portal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Root URL of the customer portal. Every page path is joined onto it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Vendor label used in filenames and document records.
    #[serde(default = "default_vendor")]
    pub vendor: String,

    /// Run the browser without a window. CAPTCHA hand-off needs a visible window.
    pub headless: bool,

    /// Browser profile directory. Defaults to `<data_dir>/profile`.
    pub browser_profile_dir: Option<PathBuf>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            vendor: default_vendor(),
            headless: false,
            browser_profile_dir: None,
        }
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_poll_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_contact_attempts() -> u32 {
    5
}

fn default_max_recoveries() -> u32 {
    3
}

/// Waits, retries and the outer run budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Interval between two checks of a polled condition.
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub poll_interval: Duration,

    /// Upper bound for every polled wait except the human (CAPTCHA/login) wait.
    #[serde(
        default = "default_poll_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub poll_timeout: Duration,

    /// Optional budget for the whole run, human wait included.
    #[serde(
        default,
        deserialize_with = "deserialize_optional_duration",
        serialize_with = "serialize_optional_duration"
    )]
    pub run_timeout: Option<Duration>,

    /// Attempts at reaching the contact-information page.
    #[serde(default = "default_contact_attempts")]
    pub contact_attempts: u32,

    /// Reload-based recoveries allowed for one logical navigation step.
    #[serde(default = "default_max_recoveries")]
    pub max_recoveries: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            poll_timeout: default_poll_timeout(),
            run_timeout: None,
            contact_attempts: default_contact_attempts(),
            max_recoveries: default_max_recoveries(),
        }
    }
}

/// Application configuration, as read from `billharvest.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from config file location.
    /// If not specified, defaults to the config file's directory.
    pub data_dir: Option<PathBuf>,

    pub portal: PortalConfig,

    pub timing: TimingConfig,

    /// Where the portal login and password come from. Without it every run
    /// waits for a human to log in.
    pub credentials: Option<CredentialConfig>,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.to_path_buf(),
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub profile_dir: PathBuf,
    pub portal: PortalConfig,
    pub timing: TimingConfig,
    pub credentials: Option<CredentialConfig>,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./billharvest.toml` if it exists in current directory
/// 2. `<XDG data dir>/billharvest/billharvest.toml`
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("billharvest.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("billharvest").join("billharvest.toml");
    }

    local_config
}

impl ResolvedConfig {
    /// Load config from `config_path`, or fall back to defaults rooted next to it.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        let config = if config_path.exists() {
            Config::load(config_path)?
        } else {
            Config::default()
        };

        let config_dir = match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir().context("Could not determine current directory")?,
        };

        Ok(Self::from_config(config, &config_dir))
    }

    pub fn from_config(config: Config, config_dir: &Path) -> Self {
        let data_dir = config.resolve_data_dir(config_dir);
        let profile_dir = match &config.portal.browser_profile_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => config_dir.join(dir),
            None => data_dir.join("profile"),
        };

        Self {
            data_dir,
            profile_dir,
            portal: config.portal,
            timing: config.timing,
            credentials: config.credentials,
        }
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join("documents")
    }

    pub fn identity_file(&self) -> PathBuf {
        self.data_dir.join("identity.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() -> Result<()> {
        let config: Config = toml::from_str("")?;

        assert_eq!(config.portal.base_url, "https://clients.direct-energie.com");
        assert_eq!(config.portal.vendor, "Direct Energie");
        assert_eq!(config.timing.poll_interval, Duration::from_secs(1));
        assert_eq!(config.timing.poll_timeout, Duration::from_secs(30));
        assert_eq!(config.timing.contact_attempts, 5);
        assert!(config.timing.run_timeout.is_none());
        assert!(config.credentials.is_none());
        Ok(())
    }

    #[test]
    fn parses_timing_and_credentials() -> Result<()> {
        let config: Config = toml::from_str(
            r#"
data_dir = "harvest"

[portal]
base_url = "https://portal.example"
headless = true

[timing]
poll_interval = "250ms"
poll_timeout = "10s"
run_timeout = "2h"
contact_attempts = 2

[credentials]
backend = "env"
login_var = "PORTAL_LOGIN"
password_var = "PORTAL_PASSWORD"
"#,
        )?;

        assert_eq!(config.portal.base_url, "https://portal.example");
        assert!(config.portal.headless);
        assert_eq!(config.timing.poll_interval, Duration::from_millis(250));
        assert_eq!(config.timing.poll_timeout, Duration::from_secs(10));
        assert_eq!(config.timing.run_timeout, Some(Duration::from_secs(7200)));
        assert_eq!(config.timing.contact_attempts, 2);
        assert_eq!(config.timing.max_recoveries, 3);
        assert!(matches!(
            config.credentials,
            Some(CredentialConfig::Env { .. })
        ));

        let resolved = ResolvedConfig::from_config(config, Path::new("/etc/billharvest"));
        assert_eq!(resolved.data_dir, PathBuf::from("/etc/billharvest/harvest"));
        assert_eq!(
            resolved.profile_dir,
            PathBuf::from("/etc/billharvest/harvest/profile")
        );
        Ok(())
    }

    #[test]
    fn rejects_bad_duration() {
        let parsed: std::result::Result<Config, _> = toml::from_str(
            r#"
[timing]
poll_interval = "soon"
"#,
        );
        assert!(parsed.is_err());
    }
}
