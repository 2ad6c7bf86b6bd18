//! Downloads of document files, authenticated with the portal session cookies.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::credentials::SessionData;

#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Use these cookies for every later download.
    fn set_cookies(&self, cookies: &HashMap<String, String>);

    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// [`FileFetcher`] over plain HTTP GETs with a `Cookie` header.
pub struct HttpFileFetcher {
    client: Client,
    session: RwLock<SessionData>,
}

impl HttpFileFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36")
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            session: RwLock::new(SessionData::default()),
        })
    }

    /// Start from a session cached by an earlier run.
    pub fn with_session(self, session: SessionData) -> Self {
        if let Ok(mut current) = self.session.write() {
            *current = session;
        }
        self
    }

    fn cookie_header(&self) -> String {
        self.session
            .read()
            .map(|session| session.cookie_header())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FileFetcher for HttpFileFetcher {
    fn set_cookies(&self, cookies: &HashMap<String, String>) {
        if let Ok(mut session) = self.session.write() {
            session.cookies = cookies.clone();
            session.captured_at = Some(chrono::Utc::now());
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut request = self.client.get(url).header("accept", "application/pdf, */*");
        let cookies = self.cookie_header();
        if !cookies.is_empty() {
            request = request.header("cookie", cookies);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("HTTP GET request failed: {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            anyhow::bail!("Document download failed ({status}): {excerpt}");
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read document body: {url}"))?;
        Ok(bytes.to_vec())
    }
}
