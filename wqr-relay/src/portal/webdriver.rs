//! W3C WebDriver client
//!
//! Drives Chrome through chromedriver (or any W3C-compliant endpoint) over
//! plain HTTP. Only the commands the relay needs are implemented.
//!
//! # Downloads
//! WebDriver has no download events. Each session gets a private staging
//! directory configured as Chrome's download directory; a "native download
//! event" is a new, fully written file appearing there.
//!
//! # API Reference
//! - https://www.w3.org/TR/webdriver2/

use super::{BrowserCookie, DownloadEvent, DriverError, ElementHandle, Locator, PortalDriver, TabHandle, TabInfo};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// W3C WebDriver web element reference key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Poll interval for readiness and download checks
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Suffixes browsers use for downloads still being written
const PARTIAL_SUFFIXES: &[&str] = &["crdownload", "part", "partial", "tmp"];

/// Session settings
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// e.g. `http://localhost:9515`
    pub endpoint: String,
    pub headless: bool,
    /// Parent of the per-session download staging directory
    pub download_root: PathBuf,
    /// HTTP timeout per WebDriver command
    pub command_timeout: Duration,
    /// How long a started download may take to finish
    pub completion_timeout: Duration,
}

impl WebDriverConfig {
    pub fn new(endpoint: impl Into<String>, download_root: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: endpoint.into(),
            headless: false,
            download_root: download_root.into(),
            command_timeout: Duration::from_secs(60),
            completion_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }
}

/// An open WebDriver session
pub struct WebDriverSession {
    http: Client,
    /// `{endpoint}/session/{id}`
    base: String,
    main_window: String,
    download_dir: PathBuf,
    completion_timeout: Duration,
    seen_downloads: Mutex<HashSet<PathBuf>>,
}

impl WebDriverSession {
    /// Create a browser session with downloads routed to a staging directory
    pub async fn start(config: &WebDriverConfig) -> Result<Self, DriverError> {
        let staging = config.download_root.join(format!(".browser-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&staging).await?;
        let download_dir = tokio::fs::canonicalize(&staging).await?;

        let http = Client::builder()
            .timeout(config.command_timeout)
            .build()
            .map_err(|e| DriverError::Session(format!("Failed to create HTTP client: {}", e)))?;

        let mut args = vec!["--start-maximized".to_string()];
        if config.headless {
            args.push("--headless=new".to_string());
        }

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": args,
                        "prefs": {
                            "download.default_directory": download_dir.to_string_lossy(),
                            "download.prompt_for_download": false,
                            "download.directory_upgrade": true
                        }
                    }
                }
            }
        });

        let endpoint = config.endpoint.trim_end_matches('/');
        info!("Starting browser session via {}", endpoint);

        let value = execute(http.post(format!("{}/session", endpoint)).json(&capabilities))
            .await
            .map_err(|e| DriverError::Session(format!("Could not create session: {}", e)))?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Parse("session response missing sessionId".to_string()))?;

        let mut session = Self {
            http,
            base: format!("{}/session/{}", endpoint, session_id),
            main_window: String::new(),
            download_dir,
            completion_timeout: config.completion_timeout,
            seen_downloads: Mutex::new(HashSet::new()),
        };

        session.main_window = session
            .command(Method::GET, "/window", None)
            .await?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Parse("window handle is not a string".to_string()))?;

        debug!(session_id = %session_id, download_dir = %session.download_dir.display(), "Browser session ready");
        Ok(session)
    }

    /// Staging directory Chrome downloads into
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, DriverError> {
        let url = format!("{}{}", self.base, path);
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        execute(request).await
    }

    async fn script(&self, script: &str, args: Vec<Value>) -> Result<Value, DriverError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn switch_to(&self, handle: &str) -> Result<(), DriverError> {
        self.command(Method::POST, "/window", Some(json!({ "handle": handle })))
            .await
            .map(|_| ())
    }

    /// Completed files not reported yet, plus whether anything is still being written
    async fn scan_downloads(&self) -> Result<(Vec<PathBuf>, bool), DriverError> {
        let seen = self.seen_downloads.lock().await;
        let mut completed = Vec::new();
        let mut in_progress = false;

        let mut entries = tokio::fs::read_dir(&self.download_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() || seen.contains(&path) {
                continue;
            }
            if is_partial(&path) {
                in_progress = true;
            } else {
                completed.push(path);
            }
        }
        completed.sort();
        Ok((completed, in_progress))
    }
}

fn element_ref(element: &ElementHandle) -> Value {
    json!({ ELEMENT_KEY: element.0 })
}

fn parse_elements(value: Value) -> Result<Vec<ElementHandle>, DriverError> {
    let items = value
        .as_array()
        .ok_or_else(|| DriverError::Parse("element list is not an array".to_string()))?;
    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| ElementHandle(id.to_string()))
                .ok_or_else(|| DriverError::Parse(format!("not an element reference: {}", item)))
        })
        .collect()
}

fn is_partial(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PARTIAL_SUFFIXES.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Send a WebDriver command and unwrap the `value` member of the reply
async fn execute(request: RequestBuilder) -> Result<Value, DriverError> {
    let response = request
        .send()
        .await
        .map_err(|e| DriverError::Network(e.to_string()))?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| DriverError::Parse(format!("Invalid WebDriver response: {}", e)))?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Err(command_error(status.as_u16(), error, message))
}

/// Map a WebDriver error code onto `DriverError`
fn command_error(status: u16, error: String, message: String) -> DriverError {
    match error.as_str() {
        "no such element" => DriverError::NoSuchElement(message),
        "stale element reference" => DriverError::StaleElement(message),
        "timeout" | "script timeout" => DriverError::Timeout(message),
        "invalid session id" | "session not created" => DriverError::Session(message),
        _ => DriverError::Command {
            status,
            error,
            message,
        },
    }
}

#[async_trait]
impl PortalDriver for WebDriverSession {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        debug!(url = %url, "Navigate");
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.command(Method::GET, "/url", None)
            .await?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Parse("url is not a string".to_string()))
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.script("return document.readyState", vec![]).await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout(format!(
                    "page not ready after {:?} (readyState {})",
                    timeout, state
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError> {
        let value = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": locator.strategy(), "value": locator.value() })),
            )
            .await?;
        parse_elements(value)
    }

    async fn find_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let value = self
            .command(
                Method::POST,
                &format!("/element/{}/elements", parent.0),
                Some(json!({ "using": locator.strategy(), "value": locator.value() })),
            )
            .await?;
        parse_elements(value)
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        self.command(Method::GET, &format!("/element/{}/text", element.0), None)
            .await?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Parse("element text is not a string".to_string()))
    }

    async fn is_checked(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        self.command(Method::GET, &format!("/element/{}/selected", element.0), None)
            .await?
            .as_bool()
            .ok_or_else(|| DriverError::Parse("selected state is not a boolean".to_string()))
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.command(Method::POST, &format!("/element/{}/click", element.0), Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        // Date inputs ignore typed keys in some locales; set the value directly
        self.script(
            "const el = arguments[0]; el.value = arguments[1]; \
             el.dispatchEvent(new Event('input', { bubbles: true })); \
             el.dispatchEvent(new Event('change', { bubbles: true }));",
            vec![element_ref(element), Value::String(value.to_string())],
        )
        .await
        .map(|_| ())
    }

    async fn wait_for_download(
        &self,
        timeout: Duration,
    ) -> Result<Option<DownloadEvent>, DriverError> {
        let start_deadline = Instant::now() + timeout;
        let mut finish_deadline: Option<Instant> = None;

        loop {
            let (completed, in_progress) = self.scan_downloads().await?;

            if let Some(path) = completed.into_iter().next() {
                self.seen_downloads.lock().await.insert(path.clone());
                let suggested_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                info!("Browser download finished: {}", suggested_name);
                return Ok(Some(DownloadEvent {
                    suggested_name,
                    saved_path: Some(path),
                    url: None,
                }));
            }

            // Once a download has started it gets the longer completion window
            if in_progress && finish_deadline.is_none() {
                debug!("Browser download in progress");
                finish_deadline = Some(Instant::now() + self.completion_timeout);
            }

            if Instant::now() >= finish_deadline.unwrap_or(start_deadline) {
                if in_progress {
                    warn!("Browser download did not finish within {:?}", self.completion_timeout);
                }
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn tabs(&self) -> Result<Vec<TabInfo>, DriverError> {
        let handles: Vec<String> = serde_json::from_value(
            self.command(Method::GET, "/window/handles", None).await?,
        )
        .map_err(|e| DriverError::Parse(format!("window handles: {}", e)))?;

        let mut tabs = Vec::with_capacity(handles.len());
        for handle in handles {
            self.switch_to(&handle).await?;
            let url = self.current_url().await?;
            tabs.push(TabInfo {
                is_main: handle == self.main_window,
                handle: TabHandle(handle),
                url,
            });
        }
        self.switch_to(&self.main_window).await?;
        Ok(tabs)
    }

    async fn close_tab(&self, tab: &TabHandle) -> Result<(), DriverError> {
        if tab.0 == self.main_window {
            warn!("Refusing to close the main tab");
            return Ok(());
        }
        self.switch_to(&tab.0).await?;
        self.command(Method::DELETE, "/window", None).await?;
        self.switch_to(&self.main_window).await
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>, DriverError> {
        serde_json::from_value(self.command(Method::GET, "/cookie", None).await?)
            .map_err(|e| DriverError::Parse(format!("cookies: {}", e)))
    }

    async fn quit(&self) -> Result<(), DriverError> {
        info!("Closing browser session");
        let result = execute(self.http.request(Method::DELETE, &self.base)).await.map(|_| ());

        // Staging directory only survives if something was left in it
        if let Err(e) = tokio::fs::remove_dir(&self.download_dir).await {
            debug!("Download staging directory kept: {}", e);
        }
        result
    }
}
