//! Narrow browser-session abstraction
//!
//! The login flow, challenge handling, and link builder depend only
//! on this capability set, not on a specific automation engine.
//! Probe-style operations report absence as `Ok(false)` / `Ok(None)`
//! so strategy lists can skip to the next candidate; `Err` means the
//! session itself is broken.

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// A description used to find one UI element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Element id attribute.
    Id(String),
    /// Element name attribute.
    Name(String),
    /// CSS selector.
    Css(String),
    /// Visible text fragment.
    Text(String),
}

impl Locator {
    pub fn id(value: impl Into<String>) -> Self {
        Self::Id(value.into())
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self::Name(value.into())
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self::Css(value.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// The CSS selector equivalent, when one exists. Text locators
    /// have none and are resolved by scanning page text.
    #[must_use]
    pub fn as_css(&self) -> Option<String> {
        match self {
            Self::Id(id) => Some(format!("#{id}")),
            Self::Name(name) => Some(format!("[name=\"{name}\"]")),
            Self::Css(css) => Some(css.clone()),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(v) => write!(f, "id={v}"),
            Self::Name(v) => write!(f, "name={v}"),
            Self::Css(v) => write!(f, "css={v}"),
            Self::Text(v) => write!(f, "text={v}"),
        }
    }
}

/// One authenticated browser session.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Load `url` and wait for navigation to settle.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Wait until the locator matches something; `false` on timeout.
    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<bool>;

    /// Click the first match. `Ok(false)` when nothing matches.
    async fn click(&self, locator: &Locator) -> Result<bool>;

    /// Clear the first matching form control and type `text` into it.
    /// `Ok(false)` when nothing matches.
    async fn type_into(&self, locator: &Locator, text: &str) -> Result<bool>;

    /// Current value of the first matching form control.
    async fn read_value(&self, locator: &Locator) -> Result<Option<String>>;

    /// Whether the page contains `fragment` within `timeout`.
    async fn page_contains(&self, fragment: &str, timeout: Duration) -> Result<bool>;
}
