//! Local cache of portal cookies between runs.
//!
//! A cached session lets the next run land directly on an authenticated
//! page, and gives the file fetcher a `Cookie` header.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    /// Session cookies (name -> value).
    #[serde(default)]
    pub cookies: HashMap<String, String>,

    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

impl SessionData {
    pub fn new(cookies: HashMap<String, String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            cookies,
            captured_at: Some(captured_at),
        }
    }

    /// Format cookies as a Cookie header value, in a stable order.
    pub fn cookie_header(&self) -> String {
        let mut pairs: Vec<_> = self.cookies.iter().collect();
        pairs.sort();
        pairs
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn is_older_than(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.captured_at {
            Some(at) => now - at > max_age,
            None => true,
        }
    }
}

pub struct SessionCache {
    cache_dir: PathBuf,
}

impl SessionCache {
    /// Uses `<cache dir>/billharvest/sessions/`.
    pub fn new() -> Result<Self> {
        let cache_dir = dirs::cache_dir()
            .context("Could not find cache directory")?
            .join("billharvest")
            .join("sessions");
        Self::with_path(cache_dir)
    }

    pub fn with_path(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create session cache dir: {cache_dir:?}"))?;
        Ok(Self { cache_dir })
    }

    fn session_file(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.cache_dir.join(format!("{safe}.json"))
    }

    pub fn get(&self, key: &str) -> Result<Option<SessionData>> {
        let path = self.session_file(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read session file: {path:?}"))
            }
        };

        let session = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {path:?}"))?;
        Ok(Some(session))
    }

    pub fn set(&self, key: &str, session: &SessionData) -> Result<()> {
        let path = self.session_file(key);
        let content =
            serde_json::to_string_pretty(session).context("Failed to serialize session")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write session file: {path:?}"))
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        let path = self.session_file(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete session file: {path:?}"))?;
        }
        Ok(())
    }
}
