//! [`PageDriver`] over a real Chrome/Chromium through the DevTools protocol.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::page::BringToFrontParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::driver::PageDriver;
use crate::credentials::SessionData;

/// Upper bound on waiting for a click to finish loading the next page.
const CLICK_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ChromeDriver {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromeDriver {
    /// Start a browser on `profile_dir`, restoring cached portal cookies.
    pub async fn launch(
        profile_dir: &Path,
        headless: bool,
        base_url: &str,
        session: Option<&SessionData>,
    ) -> Result<Self> {
        std::fs::create_dir_all(profile_dir)
            .with_context(|| format!("Failed to create profile dir: {}", profile_dir.display()))?;

        let (browser, mut handler) = launch_browser(profile_dir, headless).await?;
        let handler = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open browser page")?;
        if let Some(session) = session {
            apply_cookies(&page, session, base_url).await?;
        }

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler,
        })
    }

    pub async fn close(self) {
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(err) = browser.close().await {
                tracing::debug!(error = %err, "Browser did not close cleanly");
            }
        }
        self.handler.abort();
    }

    fn query(selector: &str) -> Result<String> {
        serde_json::to_string(selector).context("Failed to quote selector")
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to open {url}"))?;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.page.reload().await.context("Failed to reload page")?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.context("Failed to read page content")
    }

    async fn is_element_present(&self, selector: &str) -> Result<bool> {
        let script = format!("document.querySelector({}) !== null", Self::query(selector)?);
        let result = self.page.evaluate(script).await?;
        decode_result(result.value(), selector)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.page
            .find_element(selector)
            .await
            .with_context(|| format!("No element matches {selector}"))?
            .click()
            .await?;
        // Clicks on links start a navigation; let it settle before the next check.
        let _ = tokio::time::timeout(CLICK_NAVIGATION_TIMEOUT, self.page.wait_for_navigation()).await;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(script).await?;
        // Scripts evaluating to `undefined` carry no value at all.
        Ok(result.into_value::<serde_json::Value>().unwrap_or(serde_json::Value::Null))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.page
            .find_element(selector)
            .await
            .with_context(|| format!("No input matches {selector}"))?
            .click()
            .await?
            .type_str(value)
            .await?;
        Ok(())
    }

    async fn input_value(&self, selector: &str) -> Result<Option<String>> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.value : null; }})()",
            Self::query(selector)?
        );
        let result = self.page.evaluate(script).await?;
        decode_result(result.value(), selector)
    }

    async fn surface(&self) -> Result<()> {
        self.page.execute(BringToFrontParams::default()).await?;
        Ok(())
    }

    async fn cookies(&self) -> Result<HashMap<String, String>> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .map(|cookie| (cookie.name, cookie.value))
            .collect())
    }
}

/// Decode what a page script returned. DevTools omits the value of a
/// `null` result, so absence decodes as `null`.
fn decode_result<T: DeserializeOwned>(value: Option<&serde_json::Value>, selector: &str) -> Result<T> {
    let value = value.cloned().unwrap_or(serde_json::Value::Null);
    serde_json::from_value(value.clone())
        .with_context(|| format!("Script for {selector} returned an unexpected value: {value}"))
}

async fn launch_browser(profile_dir: &Path, headless: bool) -> Result<(Browser, chromiumoxide::handler::Handler)> {
    let chrome_path = find_chrome()
        .context("Chrome/Chromium not found. Please install Chrome or Chromium to harvest documents.")?;

    let mut builder = BrowserConfig::builder()
        .chrome_executable(chrome_path)
        .viewport(None)
        .user_data_dir(profile_dir)
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--no-first-run")
        .arg("--no-default-browser-check");
    if !headless {
        builder = builder.with_head();
    }
    let config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

    Browser::launch(config)
        .await
        .context("Failed to launch browser")
}

async fn apply_cookies(page: &Page, session: &SessionData, base_url: &str) -> Result<()> {
    let cookies: Vec<CookieParam> = session
        .cookies
        .iter()
        .map(|(name, value)| {
            let mut cookie = CookieParam::new(name.clone(), value.clone());
            cookie.url = Some(base_url.to_string());
            cookie
        })
        .collect();

    if !cookies.is_empty() {
        page.set_cookies(cookies).await?;
    }
    Ok(())
}

fn which(program: &str) -> Option<String> {
    let output = std::process::Command::new("which").arg(program).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!path.is_empty()).then_some(path)
}

/// Find Chrome/Chromium executable.
fn find_chrome() -> Option<String> {
    if let Some(path) = ["google-chrome", "chromium"].into_iter().find_map(which) {
        return Some(path);
    }

    [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/run/current-system/sw/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    ]
    .into_iter()
    .find(|candidate| Path::new(candidate).exists())
    .map(str::to_string)
}
