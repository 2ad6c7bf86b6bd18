//! Page-automation primitives the execution context is built on.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use super::wait::WaitPolicy;

const CLEAR_BODY_JS: &str = "document.body && (document.body.innerHTML = ''); true";

/// A live page in some browser.
///
/// Implementations are used from a single execution task; every method is
/// one round trip to the page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    async fn reload(&self) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Serialized DOM of the current page.
    async fn content(&self) -> Result<String>;

    async fn is_element_present(&self, selector: &str) -> Result<bool>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Type `value` into the input matched by `selector`.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Live value of an input (what the user typed, not the HTML attribute).
    async fn input_value(&self, selector: &str) -> Result<Option<String>>;

    /// Returns false if the element did not appear within `policy.timeout`.
    async fn wait_for_element(&self, selector: &str, policy: WaitPolicy) -> Result<bool> {
        let started = tokio::time::Instant::now();
        loop {
            if self.is_element_present(selector).await? {
                return Ok(true);
            }
            if started.elapsed() >= policy.timeout {
                return Ok(false);
            }
            tokio::time::sleep(policy.interval).await;
        }
    }

    async fn click_and_wait_for(
        &self,
        click_selector: &str,
        result_selector: &str,
        policy: WaitPolicy,
    ) -> Result<bool> {
        self.click(click_selector).await?;
        self.wait_for_element(result_selector, policy).await
    }

    async fn clear_body(&self) -> Result<()> {
        self.evaluate(CLEAR_BODY_JS).await.map(|_| ())
    }

    /// Bring the page in front of a human (CAPTCHA, manual login).
    async fn surface(&self) -> Result<()> {
        Ok(())
    }

    async fn cookies(&self) -> Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }
}
