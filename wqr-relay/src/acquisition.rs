//! Batch download acquisition
//!
//! Clicking the portal's "Download Selected" button has three possible
//! outcomes: the browser downloads a file, the current tab navigates to
//! the document, or the document opens in a new tab. The engine walks an
//! explicit state machine over those outcomes:
//!
//! ```text
//! Idle → Triggered → DirectDownload ─┐
//!                  → PageNavigated  ─┼→ Resolved
//!                  → TabOpened      ─┘
//!        (any state)                  → Failed
//! ```
//!
//! Each detection strategy has its own bounded wait. Documents found by
//! URL are fetched over HTTP with the browser session's cookies.

use crate::portal::{BrowserCookie, DownloadEvent, DriverError, PortalDriver, PortalLayout, TabInfo};
use chrono::NaiveDate;
use reqwest::header::COOKIE;
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wqr_common::config::AcquisitionSettings;

/// Poll interval for URL and tab checks
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How the artifact was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    DirectDownload,
    PageNavigated,
    TabOpened,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::DirectDownload => "direct_download",
            Strategy::PageNavigated => "page_navigated",
            Strategy::TabOpened => "tab_opened",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File or archive retrieved from the portal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
    pub suggested_name: String,
    pub bytes: Vec<u8>,
    /// Absent when read from a saved browser download
    pub source_url: Option<String>,
    pub strategy: Strategy,
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Download Selected button not found")]
    TriggerMissing,

    #[error("No document found: {0}")]
    NoDocument(String),

    #[error("Failed to download document: HTTP {status} ({url})")]
    Fetch { url: String, status: u16 },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Browser error: {0}")]
    Driver(#[from] DriverError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Acquisition state machine states
#[derive(Debug)]
pub enum AcquisitionState {
    Idle,
    Triggered,
    DirectDownload(DownloadEvent),
    PageNavigated { url: String },
    TabOpened { tab: TabInfo },
    Resolved(DownloadArtifact),
    Failed(AcquisitionError),
}

impl AcquisitionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AcquisitionState::Resolved(_) | AcquisitionState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            AcquisitionState::Idle => "idle",
            AcquisitionState::Triggered => "triggered",
            AcquisitionState::DirectDownload(_) => "direct_download",
            AcquisitionState::PageNavigated { .. } => "page_navigated",
            AcquisitionState::TabOpened { .. } => "tab_opened",
            AcquisitionState::Resolved(_) => "resolved",
            AcquisitionState::Failed(_) => "failed",
        }
    }
}

/// Whether a URL points at a document (`.pdf` anywhere, any case)
pub fn is_document_url(url: &str, extension: &str) -> bool {
    url.to_lowercase().contains(&format!(".{}", extension.to_lowercase()))
}

/// File name for a document fetched by URL
///
/// Last path segment without query or fragment; anything not ending in the
/// document extension becomes `water_report_<YYYYMMDD>.<ext>`.
pub fn name_from_url(url: &str, extension: &str, today: NaiveDate) -> String {
    let segment = url
        .split(|c| c == '?' || c == '#')
        .next()
        .unwrap_or_default()
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let suffix = format!(".{}", extension.to_lowercase());
    if segment.len() > suffix.len() && segment.to_lowercase().ends_with(&suffix) {
        segment.to_string()
    } else {
        format!("water_report_{}.{}", today.format("%Y%m%d"), extension)
    }
}

/// Authenticated HTTP fetch reusing the browser's session cookies
pub struct DocumentFetcher {
    http: Client,
}

impl DocumentFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AcquisitionError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AcquisitionError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    pub async fn fetch(&self, url: &str, cookies: &[BrowserCookie]) -> Result<Vec<u8>, AcquisitionError> {
        debug!(url = %url, cookies = cookies.len(), "Fetching document");

        let mut request = self.http.get(url);
        if !cookies.is_empty() {
            let header = cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(COOKIE, header);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AcquisitionError::Http(e.to_string()))?;

        if response.status().as_u16() != 200 {
            return Err(AcquisitionError::Fetch {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AcquisitionError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

pub struct AcquisitionEngine<'a> {
    driver: &'a dyn PortalDriver,
    layout: &'a PortalLayout,
    settings: &'a AcquisitionSettings,
    fetcher: &'a DocumentFetcher,
    today: NaiveDate,
}

impl<'a> AcquisitionEngine<'a> {
    pub fn new(
        driver: &'a dyn PortalDriver,
        layout: &'a PortalLayout,
        settings: &'a AcquisitionSettings,
        fetcher: &'a DocumentFetcher,
        today: NaiveDate,
    ) -> Self {
        Self {
            driver,
            layout,
            settings,
            fetcher,
            today,
        }
    }

    /// Trigger the batch download and resolve it to one artifact
    pub async fn run(&self) -> Result<DownloadArtifact, AcquisitionError> {
        let mut state = AcquisitionState::Idle;
        while !state.is_terminal() {
            let from = state.name();
            state = self.step(state).await;
            debug!("Acquisition: {} -> {}", from, state.name());
        }

        match state {
            AcquisitionState::Resolved(artifact) => {
                info!(
                    "Acquired '{}' ({} bytes) via {}",
                    artifact.suggested_name,
                    artifact.bytes.len(),
                    artifact.strategy
                );
                Ok(artifact)
            }
            AcquisitionState::Failed(e) => Err(e),
            other => Err(AcquisitionError::NoDocument(format!(
                "acquisition stopped in state {}",
                other.name()
            ))),
        }
    }

    /// Advance the state machine by one transition
    pub async fn step(&self, state: AcquisitionState) -> AcquisitionState {
        match state {
            AcquisitionState::Idle => match self.trigger().await {
                Ok(()) => AcquisitionState::Triggered,
                Err(e) => AcquisitionState::Failed(e),
            },
            AcquisitionState::Triggered => self.detect().await,
            AcquisitionState::DirectDownload(event) => self.resolve_download(event).await,
            AcquisitionState::PageNavigated { url } => {
                match self.fetch_url(&url, Strategy::PageNavigated).await {
                    Ok(artifact) => AcquisitionState::Resolved(artifact),
                    Err(e) => AcquisitionState::Failed(e),
                }
            }
            AcquisitionState::TabOpened { tab } => {
                let result = self.fetch_url(&tab.url, Strategy::TabOpened).await;
                if !tab.is_main {
                    if let Err(e) = self.driver.close_tab(&tab.handle).await {
                        warn!("Could not close document tab: {}", e);
                    }
                }
                match result {
                    Ok(artifact) => AcquisitionState::Resolved(artifact),
                    Err(e) => AcquisitionState::Failed(e),
                }
            }
            terminal => terminal,
        }
    }

    async fn trigger(&self) -> Result<(), AcquisitionError> {
        let button = self
            .driver
            .find_first(&self.layout.download_button)
            .await?
            .ok_or(AcquisitionError::TriggerMissing)?;
        info!("Clicking 'Download Selected'");
        self.driver.click(&button).await?;
        Ok(())
    }

    /// Try the three detection strategies in order
    async fn detect(&self) -> AcquisitionState {
        match self.driver.wait_for_download(self.settings.download_timeout).await {
            Ok(Some(event)) => return AcquisitionState::DirectDownload(event),
            Ok(None) => info!("Download event not triggered, checking for page navigation"),
            Err(e) => warn!("Download wait failed: {}", e),
        }

        match self.poll_current_url().await {
            Ok(Some(url)) => {
                info!("Document loaded in current page: {}", url);
                return AcquisitionState::PageNavigated { url };
            }
            Ok(None) => info!("Current page is not a document, scanning tabs"),
            Err(e) => warn!("Could not read current URL: {}", e),
        }

        match self.poll_tabs().await {
            Ok(Some(tab)) => {
                info!("Document found in tab: {}", tab.url);
                AcquisitionState::TabOpened { tab }
            }
            Ok(None) => AcquisitionState::Failed(AcquisitionError::NoDocument(
                "no download, navigation or document tab detected".to_string(),
            )),
            Err(e) => AcquisitionState::Failed(e.into()),
        }
    }

    async fn poll_current_url(&self) -> Result<Option<String>, DriverError> {
        let deadline = Instant::now() + self.settings.navigation_timeout;
        loop {
            let url = self.driver.current_url().await?;
            if is_document_url(&url, &self.settings.document_extension) {
                return Ok(Some(url));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn poll_tabs(&self) -> Result<Option<TabInfo>, DriverError> {
        let deadline = Instant::now() + self.settings.tab_timeout;
        loop {
            let tabs = self.driver.tabs().await?;
            debug!("Found {} tab(s) open", tabs.len());
            // Prefer a tab other than the main one
            let mut documents: Vec<TabInfo> = tabs
                .into_iter()
                .filter(|t| is_document_url(&t.url, &self.settings.document_extension))
                .collect();
            documents.sort_by_key(|t| t.is_main);
            if let Some(tab) = documents.into_iter().next() {
                return Ok(Some(tab));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn resolve_download(&self, event: DownloadEvent) -> AcquisitionState {
        if let Some(path) = &event.saved_path {
            let bytes = match tokio::fs::read(path).await {
                Ok(bytes) => bytes,
                Err(e) => return AcquisitionState::Failed(e.into()),
            };
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!("Could not remove browser download {}: {}", path.display(), e);
            }
            return AcquisitionState::Resolved(DownloadArtifact {
                suggested_name: event.suggested_name,
                bytes,
                source_url: event.url,
                strategy: Strategy::DirectDownload,
            });
        }

        match &event.url {
            Some(url) => match self.fetch(url).await {
                Ok(bytes) => AcquisitionState::Resolved(DownloadArtifact {
                    suggested_name: event.suggested_name.clone(),
                    bytes,
                    source_url: Some(url.clone()),
                    strategy: Strategy::DirectDownload,
                }),
                Err(e) => AcquisitionState::Failed(e),
            },
            None => AcquisitionState::Failed(AcquisitionError::NoDocument(
                "download event carried neither a file nor a URL".to_string(),
            )),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AcquisitionError> {
        let cookies = self.driver.cookies().await?;
        self.fetcher.fetch(url, &cookies).await
    }

    async fn fetch_url(&self, url: &str, strategy: Strategy) -> Result<DownloadArtifact, AcquisitionError> {
        let bytes = self.fetch(url).await?;
        Ok(DownloadArtifact {
            suggested_name: name_from_url(url, &self.settings.document_extension, self.today),
            bytes,
            source_url: Some(url.to_string()),
            strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    #[test]
    fn test_document_url_detection() {
        assert!(is_document_url("https://portal/Reports/Report-1.PDF?id=3", "pdf"));
        assert!(is_document_url("https://portal/view.pdf", "pdf"));
        assert!(!is_document_url("https://portal/Reports.aspx", "pdf"));
    }

    #[test]
    fn test_name_from_url() {
        assert_eq!(
            name_from_url("https://portal/files/report-2024-03-04.pdf?token=abc", "pdf", day()),
            "report-2024-03-04.pdf"
        );
        assert_eq!(
            name_from_url("https://portal/GetReport.aspx?file=a.pdf", "pdf", day()),
            "water_report_20240305.pdf"
        );
        assert_eq!(name_from_url("https://portal/", "pdf", day()), "water_report_20240305.pdf");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!AcquisitionState::Idle.is_terminal());
        assert!(!AcquisitionState::Triggered.is_terminal());
        assert!(AcquisitionState::Failed(AcquisitionError::TriggerMissing).is_terminal());
    }
}
