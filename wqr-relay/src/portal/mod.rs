//! Portal browser automation
//!
//! The relay drives the lab portal through the [`PortalDriver`] trait. The
//! trait exposes the handful of browser primitives the workflow needs
//! (navigate, locate, read, click, fill, observe downloads and tabs); the
//! production implementation speaks the W3C WebDriver protocol
//! ([`webdriver::WebDriverSession`]), tests use a scripted in-memory driver.
//!
//! # Architecture
//! - [`layout`]: element locators for the portal's pages
//! - [`session`]: login and report filtering on top of a driver
//! - [`webdriver`]: WebDriver HTTP client

pub mod layout;
pub mod session;
pub mod webdriver;

pub use layout::PortalLayout;
pub use session::{PortalError, PortalSession};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Element location strategy
///
/// In TOML: `{ css = "#id" }` or `{ xpath = "//a" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locator {
    Css(String),
    Xpath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::Xpath(expr.into())
    }

    /// WebDriver `using` value
    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::Css(_) => "css selector",
            Locator::Xpath(_) => "xpath",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Locator::Css(v) | Locator::Xpath(v) => v,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy(), self.value())
    }
}

/// Opaque reference to an element on the current page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

/// Opaque reference to a browser tab
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabHandle(pub String);

/// An open browser tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub handle: TabHandle,
    pub url: String,
    /// The tab the session started with
    pub is_main: bool,
}

/// A completed native browser download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEvent {
    /// Name the browser chose for the file
    pub suggested_name: String,
    /// Where the browser saved it, if it did
    pub saved_path: Option<PathBuf>,
    /// Source URL, if the automation layer knows it
    pub url: Option<String>,
}

/// Session cookie, forwarded to authenticated document fetches
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
}

/// Browser automation errors
#[derive(Debug, Error)]
pub enum DriverError {
    /// Session could not be created or is gone
    #[error("Browser session error: {0}")]
    Session(String),

    /// Element lookup found nothing
    #[error("Element not found: {0}")]
    NoSuchElement(String),

    /// Element handle outlived the page rendering it came from
    #[error("Stale element: {0}")]
    StaleElement(String),

    /// Bounded wait expired
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Driver rejected a command
    #[error("WebDriver error {status}: {error}: {message}")]
    Command {
        status: u16,
        error: String,
        message: String,
    },

    /// Transport failure talking to the driver
    #[error("Network error: {0}")]
    Network(String),

    /// Response could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// File I/O error (download directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Browser primitives used by the workflow
///
/// Every call blocks the calling step until the browser reports completion
/// or the call's own timeout elapses.
#[async_trait]
pub trait PortalDriver: Send + Sync {
    /// Navigate the main tab
    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    /// URL of the current tab
    async fn current_url(&self) -> Result<String, DriverError>;

    /// Wait until the current document has finished loading
    async fn wait_ready(&self, timeout: Duration) -> Result<(), DriverError>;

    /// All elements matching `locator` on the current page
    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError>;

    /// All descendants of `parent` matching `locator`
    async fn find_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, DriverError>;

    /// Rendered text of an element
    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError>;

    /// Whether a checkbox (or option) is active
    async fn is_checked(&self, element: &ElementHandle) -> Result<bool, DriverError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Replace an input's value
    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError>;

    /// Wait for a native download to complete
    ///
    /// Returns `Ok(None)` when no download finished within `timeout`.
    async fn wait_for_download(
        &self,
        timeout: Duration,
    ) -> Result<Option<DownloadEvent>, DriverError>;

    /// Open tabs with their current URLs
    async fn tabs(&self) -> Result<Vec<TabInfo>, DriverError>;

    /// Close a tab; focus returns to the main tab
    async fn close_tab(&self, tab: &TabHandle) -> Result<(), DriverError>;

    /// Cookies of the active session
    async fn cookies(&self) -> Result<Vec<BrowserCookie>, DriverError>;

    /// End the browser session
    async fn quit(&self) -> Result<(), DriverError>;

    /// First element matching `locator`, if any
    async fn find_first(&self, locator: &Locator) -> Result<Option<ElementHandle>, DriverError> {
        Ok(self.find_all(locator).await?.into_iter().next())
    }

    /// First element matching `locator`, or `NoSuchElement`
    async fn require(&self, locator: &Locator) -> Result<ElementHandle, DriverError> {
        self.find_first(locator)
            .await?
            .ok_or_else(|| DriverError::NoSuchElement(locator.to_string()))
    }
}
