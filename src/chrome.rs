//! Chrome-backed browser session
//!
//! Drives a Chromium instance over the DevTools Protocol. Element
//! locators with a CSS equivalent go through the element API; text
//! locators are resolved by scanning the DOM from an injected script,
//! since the protocol has no text selector.

use crate::error::{Error, Result};
use crate::session::{BrowserSession, Locator};
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const PROBE_INTERVAL: Duration = Duration::from_millis(250);
const SETTLE: Duration = Duration::from_millis(100);

/// One Chromium page wired to the [`BrowserSession`] capability set.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromeSession {
    /// Launch a Chromium instance and open a blank page.
    ///
    /// # Errors
    ///
    /// Returns an error if the browser cannot be configured or
    /// launched.
    pub async fn launch(headless: bool) -> Result<Self> {
        let mut builder = BrowserConfig::builder();
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(Error::Session)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Session(format!("Browser launch failed: {e}")))?;

        // The websocket event loop must be polled for the session to
        // make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            debug!("Browser event loop exited");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::Session(format!("Failed to open page: {e}")))?;

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    /// Close the browser and stop the event loop.
    pub async fn close(mut self) {
        self.browser.close().await.ok();
        self.browser.wait().await.ok();
        self.handler_task.abort();
    }

    async fn exists(&self, locator: &Locator) -> bool {
        match locator {
            Locator::Text(text) => self.text_exists(text).await.unwrap_or(false),
            other => match other.as_css() {
                Some(css) => self.page.find_element(css).await.is_ok(),
                None => false,
            },
        }
    }

    async fn text_exists(&self, text: &str) -> Result<bool> {
        let needle = encode(text)?;
        let script = format!(
            "(() => {{
                const needle = {needle};
                return document.body !== null
                    && document.body.innerText.includes(needle);
            }})()"
        );
        self.eval(script).await
    }

    async fn click_by_text(&self, text: &str) -> Result<bool> {
        let needle = encode(text)?;
        // Deepest element whose own text nodes contain the needle;
        // reversing the document-order list gets leaves before their
        // containers.
        let script = format!(
            r#"(() => {{
                const needle = {needle};
                const all = Array.from(document.querySelectorAll("*")).reverse();
                const hit = all.find((el) =>
                    Array.from(el.childNodes)
                        .filter((n) => n.nodeType === Node.TEXT_NODE)
                        .map((n) => n.textContent)
                        .join("")
                        .includes(needle));
                if (!hit) return false;
                try {{ hit.scrollIntoView({{ block: "center" }}); }} catch (_e) {{}}
                try {{ hit.click(); return true; }} catch (_e) {{ return false; }}
            }})()"#
        );
        self.eval(script).await
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| Error::Session(format!("Script evaluation failed: {e}")))?
            .into_value()
            .map_err(|e| Error::Session(format!("Unexpected script result: {e}")))
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| Error::Session(format!("Navigation to {url} failed: {e}")))?
            .wait_for_navigation()
            .await
            .map_err(|e| Error::Session(format!("Navigation to {url} did not settle: {e}")))?;
        Ok(())
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.exists(locator).await {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
    }

    async fn click(&self, locator: &Locator) -> Result<bool> {
        if let Locator::Text(text) = locator {
            return self.click_by_text(text).await;
        }
        let Some(css) = locator.as_css() else {
            return Ok(false);
        };
        let Ok(element) = self.page.find_element(css).await else {
            return Ok(false);
        };
        element
            .click()
            .await
            .map_err(|e| Error::Session(format!("Click on {locator} failed: {e}")))?;
        tokio::time::sleep(SETTLE).await;
        Ok(true)
    }

    async fn type_into(&self, locator: &Locator, text: &str) -> Result<bool> {
        let Some(css) = locator.as_css() else {
            return Ok(false);
        };
        let Ok(element) = self.page.find_element(css).await else {
            return Ok(false);
        };

        if let Err(e) = element.click().await {
            warn!("Focus click on {locator} failed: {e}");
        }
        element
            .call_js_fn("function() { this.value = \"\"; }", false)
            .await
            .ok();
        element
            .type_str(text)
            .await
            .map_err(|e| Error::Session(format!("Typing into {locator} failed: {e}")))?;
        Ok(true)
    }

    async fn read_value(&self, locator: &Locator) -> Result<Option<String>> {
        let Some(css) = locator.as_css() else {
            return Ok(None);
        };
        let selector = encode(&css)?;
        let script = format!(
            "(() => {{
                const el = document.querySelector({selector});
                return el ? String(el.value ?? \"\") : null;
            }})()"
        );
        self.eval(script).await
    }

    async fn page_contains(&self, fragment: &str, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let content = self
                .page
                .content()
                .await
                .map_err(|e| Error::Session(format!("Failed to read page content: {e}")))?;
            if content.contains(fragment) {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
    }
}

/// JSON-encode a string for safe embedding in an injected script.
fn encode(value: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Session(format!("Encoding failed: {e}")))
}
