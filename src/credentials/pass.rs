//! Password-store (pass) credential backend.
//!
//! The first line of the entry is the password; further lines are
//! `field: value` pairs (e.g. `login: jane@example.com`).

use std::collections::BTreeMap;
use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{CredentialStore, PASSWORD_KEY};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassConfig {
    /// The pass entry path (e.g., "energy/direct-energie").
    pub path: String,

    /// Logical key → field name in the entry, when they differ.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

pub struct PassCredentialStore {
    config: PassConfig,
}

impl PassCredentialStore {
    pub fn new(config: PassConfig) -> Self {
        Self { config }
    }

    fn field_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.config.fields.get(key).map(String::as_str).unwrap_or(key)
    }

    fn show(&self) -> Result<PassEntry> {
        let output = Command::new("pass")
            .arg("show")
            .arg(&self.config.path)
            .output()
            .context("Failed to run pass command")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("pass show {} failed: {}", self.config.path, stderr.trim());
        }

        let content = String::from_utf8(output.stdout).context("Invalid UTF-8 in pass output")?;
        Ok(PassEntry::parse(&content))
    }

    fn insert(&self, entry: &PassEntry) -> Result<()> {
        let mut child = Command::new("pass")
            .args(["insert", "--multiline", "--force"])
            .arg(&self.config.path)
            .stdin(Stdio::piped())
            .spawn()
            .context("Failed to spawn pass command")?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(entry.render().as_bytes())
                .context("Failed to write to pass stdin")?;
        }

        let status = child.wait().context("Failed to wait for pass command")?;
        if !status.success() {
            anyhow::bail!("pass insert {} failed", self.config.path);
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PassCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        let entry = self.show()?;
        Ok(entry
            .get(self.field_name(key))
            .map(|v| SecretString::from(v.to_string())))
    }

    async fn set(&self, key: &str, value: SecretString) -> Result<()> {
        // A missing entry is created from scratch.
        let mut entry = self.show().unwrap_or_default();
        entry.put(self.field_name(key), value.expose_secret());
        self.insert(&entry)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct PassEntry {
    password: Option<String>,
    fields: BTreeMap<String, String>,
}

impl PassEntry {
    fn parse(content: &str) -> Self {
        let mut lines = content.lines();
        let password = lines.next().map(str::to_string).filter(|p| !p.is_empty());
        let fields = lines
            .filter_map(|line| line.split_once(": "))
            .map(|(k, v)| (k.trim().to_string(), v.replace("\\n", "\n")))
            .collect();
        Self { password, fields }
    }

    fn get(&self, field: &str) -> Option<&str> {
        if field == PASSWORD_KEY {
            return self.password.as_deref();
        }
        self.fields.get(field).map(String::as_str)
    }

    fn put(&mut self, field: &str, value: &str) {
        if field == PASSWORD_KEY {
            self.password = Some(value.to_string());
        } else {
            self.fields.insert(field.to_string(), value.to_string());
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(self.password.as_deref().unwrap_or_default());
        out.push('\n');
        for (key, value) in &self.fields {
            out.push_str(&format!("{key}: {}\n", value.replace('\n', "\\n")));
        }
        out
    }
}
