//! Configuration loading and resolution
//!
//! Configuration is resolved once, before the workflow starts, into an
//! immutable [`RelayConfig`]. Priority order for every value:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (after `.env` has been loaded)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Credentials and destinations are not validated during resolution. Each
//! workflow stage asks for its own section ([`RelayConfig::portal`],
//! [`RelayConfig::graph`], ...) so a missing value only aborts the stage
//! that needs it.

use crate::dates::DateRange;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default WebDriver endpoint (chromedriver's default port)
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

/// Default download root
pub const DEFAULT_DOWNLOAD_PATH: &str = "./downloads";

/// Microsoft Graph v1.0 endpoint
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Microsoft identity platform endpoint
pub const DEFAULT_LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";

/// Environment variable names
pub mod env_keys {
    pub const PORTAL_URL: &str = "PORTAL_URL";
    pub const PORTAL_USERNAME: &str = "PORTAL_USERNAME";
    pub const PORTAL_PASSWORD: &str = "PORTAL_PASSWORD";
    pub const DOWNLOAD_PATH: &str = "DOWNLOAD_PATH";
    pub const WEBDRIVER_URL: &str = "WEBDRIVER_URL";
    pub const HEADLESS: &str = "WQR_HEADLESS";
    pub const CONFIG_FILE: &str = "WQR_CONFIG";
    pub const SITE_URL: &str = "SHAREPOINT_SITE_URL";
    pub const FOLDER_PATH: &str = "SHAREPOINT_FOLDER_PATH";
    pub const TENANT_ID: &str = "SHAREPOINT_TENANT_ID";
    pub const CLIENT_ID: &str = "SHAREPOINT_CLIENT_ID";
    pub const CLIENT_SECRET: &str = "SHAREPOINT_CLIENT_SECRET";
    pub const EMAIL_SENDER: &str = "EMAIL_SENDER_ADDRESS";
    pub const EMAIL_TO: &str = "EMAIL_TO";
}

// ============================================================================
// TOML file schema
// ============================================================================

/// Configuration file contents
///
/// Every section is optional; missing sections fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub portal: PortalSection,
    pub download: DownloadSection,
    pub selection: SelectionSettings,
    pub acquisition: AcquisitionSection,
    pub store: StoreSection,
    pub graph: GraphSection,
    pub mail: MailSection,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PortalSection {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub webdriver_url: Option<String>,
    pub headless: Option<bool>,
    /// Pause after each page-changing interaction
    pub settle_delay_ms: Option<u64>,
    /// Element locator overrides, see `wqr_relay::portal::PortalLayout`
    pub layout: toml::Table,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DownloadSection {
    pub path: Option<PathBuf>,
}

/// Row status classification sets (compared case-insensitively)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SelectionSettings {
    /// Completed-report statuses that get selected
    pub allowed_statuses: Vec<String>,
    /// Recognized statuses that are skipped
    pub skipped_statuses: Vec<String>,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            allowed_statuses: vec!["water".to_string()],
            skipped_statuses: vec!["in progress".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AcquisitionSection {
    pub download_timeout_secs: Option<u64>,
    pub navigation_timeout_secs: Option<u64>,
    pub tab_timeout_secs: Option<u64>,
    pub http_timeout_secs: Option<u64>,
    pub document_extension: Option<String>,
    pub archive_extension: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSection {
    pub site_url: Option<String>,
    pub folder_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GraphSection {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub graph_base_url: Option<String>,
    pub login_base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MailSection {
    pub sender: Option<String>,
    pub to: Option<String>,
    pub format: Option<MessageFormat>,
}

/// Notification body format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    #[default]
    Html,
    Text,
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Acquisition timeouts and file extensions
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionSettings {
    /// Wait for a native download event
    pub download_timeout: Duration,
    /// Wait for the current page to show a document
    pub navigation_timeout: Duration,
    /// Wait for a new tab to show a document
    pub tab_timeout: Duration,
    /// Authenticated document fetch timeout
    pub http_timeout: Duration,
    /// Document extension without dot, lowercase
    pub document_extension: String,
    /// Container archive extension without dot, lowercase
    pub archive_extension: String,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            download_timeout: Duration::from_secs(10),
            navigation_timeout: Duration::from_secs(3),
            tab_timeout: Duration::from_secs(3),
            http_timeout: Duration::from_secs(30),
            document_extension: "pdf".to_string(),
            archive_extension: "zip".to_string(),
        }
    }
}

/// Portal login settings
#[derive(Debug, Clone)]
pub struct PortalCredentials {
    pub url: String,
    pub username: String,
    pub password: String,
}

/// Client-credential grant settings for the Graph API
#[derive(Debug, Clone)]
pub struct GraphCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub graph_base_url: String,
    pub login_base_url: String,
}

/// Upload destination
#[derive(Debug, Clone)]
pub struct StoreTarget {
    /// e.g. `https://tenant.sharepoint.com/sites/lab`
    pub site_url: String,
    /// Folder inside the document library, may be empty
    pub folder_path: String,
}

/// Notification settings
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub sender: String,
    pub to: String,
    pub format: MessageFormat,
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub date_range: Option<DateRange>,
    pub download_dir: Option<PathBuf>,
    pub webdriver_url: Option<String>,
    pub headless: Option<bool>,
}

/// Immutable, fully resolved run configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub date_range: DateRange,
    pub download_dir: PathBuf,
    pub webdriver_url: String,
    pub headless: bool,
    pub settle_delay: Duration,
    pub portal_layout: toml::Table,
    pub selection: SelectionSettings,
    pub acquisition: AcquisitionSettings,
    pub logging: LoggingConfig,

    portal_url: Option<String>,
    portal_username: Option<String>,
    portal_password: Option<String>,
    site_url: Option<String>,
    folder_path: Option<String>,
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    graph_base_url: String,
    login_base_url: String,
    mail_sender: Option<String>,
    mail_to: Option<String>,
    mail_format: MessageFormat,
}

impl RelayConfig {
    /// Resolve the run configuration from CLI overrides, the process
    /// environment and the TOML file contents.
    ///
    /// `today` anchors the default date range (yesterday).
    pub fn resolve(
        toml: TomlConfig,
        overrides: ConfigOverrides,
        today: chrono::NaiveDate,
    ) -> Result<Self> {
        let date_range = match overrides.date_range {
            Some(range) => range,
            None => DateRange::yesterday(today)?,
        };

        let download_dir = overrides
            .download_dir
            .or_else(|| env_value(env_keys::DOWNLOAD_PATH).map(PathBuf::from))
            .or(toml.download.path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_PATH));

        let webdriver_url = overrides
            .webdriver_url
            .or_else(|| env_value(env_keys::WEBDRIVER_URL))
            .or(toml.portal.webdriver_url)
            .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string());

        let headless = match overrides.headless {
            Some(flag) => flag,
            None => match env_value(env_keys::HEADLESS) {
                Some(raw) => parse_flag(&raw).ok_or_else(|| {
                    Error::Config(format!("{} must be true or false, got '{}'", env_keys::HEADLESS, raw))
                })?,
                None => toml.portal.headless.unwrap_or(false),
            },
        };

        let acquisition = resolve_acquisition(&toml.acquisition)?;

        if toml.selection.allowed_statuses.is_empty() {
            return Err(Error::Config(
                "selection.allowed_statuses must name at least one status".to_string(),
            ));
        }

        let config = Self {
            date_range,
            download_dir,
            webdriver_url,
            headless,
            settle_delay: Duration::from_millis(toml.portal.settle_delay_ms.unwrap_or(2000)),
            portal_layout: toml.portal.layout,
            selection: toml.selection,
            acquisition,
            logging: toml.logging,

            portal_url: pick(env_keys::PORTAL_URL, toml.portal.url),
            portal_username: pick(env_keys::PORTAL_USERNAME, toml.portal.username),
            portal_password: pick(env_keys::PORTAL_PASSWORD, toml.portal.password),
            site_url: pick(env_keys::SITE_URL, toml.store.site_url),
            folder_path: pick(env_keys::FOLDER_PATH, toml.store.folder_path),
            tenant_id: pick(env_keys::TENANT_ID, toml.graph.tenant_id),
            client_id: pick(env_keys::CLIENT_ID, toml.graph.client_id),
            client_secret: pick(env_keys::CLIENT_SECRET, toml.graph.client_secret),
            graph_base_url: toml
                .graph
                .graph_base_url
                .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string()),
            login_base_url: toml
                .graph
                .login_base_url
                .unwrap_or_else(|| DEFAULT_LOGIN_BASE_URL.to_string()),
            mail_sender: pick(env_keys::EMAIL_SENDER, toml.mail.sender),
            mail_to: pick(env_keys::EMAIL_TO, toml.mail.to),
            mail_format: toml.mail.format.unwrap_or_default(),
        };

        debug!(
            date_range = %config.date_range,
            download_dir = %config.download_dir.display(),
            webdriver_url = %config.webdriver_url,
            headless = config.headless,
            "Configuration resolved"
        );

        Ok(config)
    }

    /// Folder that receives this run's files: `<download_dir>/<YYYY-MM-DD>`
    pub fn run_folder(&self, run_date: chrono::NaiveDate) -> PathBuf {
        self.download_dir.join(run_date.format("%Y-%m-%d").to_string())
    }

    /// Portal login settings, or the list of missing variables
    pub fn portal(&self) -> Result<PortalCredentials> {
        let mut missing = Vec::new();
        let url = require(&self.portal_url, env_keys::PORTAL_URL, &mut missing);
        let username = require(&self.portal_username, env_keys::PORTAL_USERNAME, &mut missing);
        let password = require(&self.portal_password, env_keys::PORTAL_PASSWORD, &mut missing);
        match (url, username, password) {
            (Some(url), Some(username), Some(password)) => Ok(PortalCredentials {
                url,
                username,
                password,
            }),
            _ => Err(missing_error("Portal", &missing)),
        }
    }

    /// Graph API credentials, or the list of missing variables
    pub fn graph(&self) -> Result<GraphCredentials> {
        let mut missing = Vec::new();
        let tenant_id = require(&self.tenant_id, env_keys::TENANT_ID, &mut missing);
        let client_id = require(&self.client_id, env_keys::CLIENT_ID, &mut missing);
        let client_secret = require(&self.client_secret, env_keys::CLIENT_SECRET, &mut missing);
        match (tenant_id, client_id, client_secret) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => Ok(GraphCredentials {
                tenant_id,
                client_id,
                client_secret,
                graph_base_url: self.graph_base_url.clone(),
                login_base_url: self.login_base_url.clone(),
            }),
            _ => Err(missing_error("Graph API", &missing)),
        }
    }

    /// Upload destination, or the missing site variable
    pub fn store(&self) -> Result<StoreTarget> {
        let mut missing = Vec::new();
        let site_url = require(&self.site_url, env_keys::SITE_URL, &mut missing)
            .ok_or_else(|| missing_error("SharePoint", &missing))?;
        Ok(StoreTarget {
            site_url,
            folder_path: self
                .folder_path
                .as_deref()
                .unwrap_or("")
                .trim_matches('/')
                .to_string(),
        })
    }

    /// Notification settings, or the list of missing variables
    pub fn mail(&self) -> Result<MailSettings> {
        let mut missing = Vec::new();
        let sender = require(&self.mail_sender, env_keys::EMAIL_SENDER, &mut missing);
        let to = require(&self.mail_to, env_keys::EMAIL_TO, &mut missing);
        match (sender, to) {
            (Some(sender), Some(to)) => Ok(MailSettings {
                sender,
                to,
                format: self.mail_format,
            }),
            _ => Err(missing_error("Email", &missing)),
        }
    }
}

fn resolve_acquisition(section: &AcquisitionSection) -> Result<AcquisitionSettings> {
    let defaults = AcquisitionSettings::default();
    let secs = |value: Option<u64>, default: Duration| value.map(Duration::from_secs).unwrap_or(default);
    let extension = |value: &Option<String>, default: String| -> Result<String> {
        match value {
            Some(ext) => {
                let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
                if ext.is_empty() {
                    Err(Error::Config("file extensions must not be empty".to_string()))
                } else {
                    Ok(ext)
                }
            }
            None => Ok(default),
        }
    };

    Ok(AcquisitionSettings {
        download_timeout: secs(section.download_timeout_secs, defaults.download_timeout),
        navigation_timeout: secs(section.navigation_timeout_secs, defaults.navigation_timeout),
        tab_timeout: secs(section.tab_timeout_secs, defaults.tab_timeout),
        http_timeout: secs(section.http_timeout_secs, defaults.http_timeout),
        document_extension: extension(&section.document_extension, defaults.document_extension)?,
        archive_extension: extension(&section.archive_extension, defaults.archive_extension)?,
    })
}

/// Read an environment variable, treating blank values as unset
pub fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn pick(env_name: &str, toml_value: Option<String>) -> Option<String> {
    env_value(env_name).or_else(|| toml_value.filter(|v| !v.trim().is_empty()))
}

fn require(value: &Option<String>, name: &'static str, missing: &mut Vec<&'static str>) -> Option<String> {
    if value.is_none() {
        missing.push(name);
    }
    value.clone()
}

fn missing_error(section: &str, missing: &[&str]) -> Error {
    Error::Config(format!(
        "{} configuration missing. Please set {}",
        section,
        missing.join(", ")
    ))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Config file discovery
// ============================================================================

/// Outcome of the `.env` lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DotenvStatus {
    Loaded(PathBuf),
    NotFound,
    Failed(String),
}

impl From<dotenvy::Result<PathBuf>> for DotenvStatus {
    fn from(result: dotenvy::Result<PathBuf>) -> Self {
        match result {
            Ok(path) => DotenvStatus::Loaded(path),
            Err(e) if e.not_found() => DotenvStatus::NotFound,
            Err(e) => DotenvStatus::Failed(e.to_string()),
        }
    }
}

/// Where the startup configuration came from
///
/// Files are read before the tracing subscriber exists, so the outcome is
/// kept and reported with [`ConfigSources::log`] once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSources {
    pub dotenv: DotenvStatus,
    pub config_file: Option<PathBuf>,
}

impl ConfigSources {
    pub fn log(&self) {
        match &self.dotenv {
            DotenvStatus::Loaded(path) => info!("Loaded environment from {}", path.display()),
            DotenvStatus::NotFound => debug!("No .env file found"),
            DotenvStatus::Failed(e) => warn!("Failed to load .env file: {}", e),
        }
        match &self.config_file {
            Some(path) => info!("Loaded TOML configuration from {}", path.display()),
            None => debug!("No config file found, using defaults"),
        }
    }
}

/// Load `.env` from the working directory if present
///
/// Values already in the process environment are not overwritten.
pub fn load_dotenv() -> DotenvStatus {
    dotenvy::dotenv().into()
}

/// Locate the TOML config file
///
/// Priority: explicit path → `WQR_CONFIG` → `<config_dir>/wqr/wqr-relay.toml`.
/// An explicit path (CLI or environment) must exist; the platform default
/// is optional.
pub fn locate_config_file(cli_path: Option<&Path>) -> Result<Option<PathBuf>> {
    let explicit = cli_path
        .map(Path::to_path_buf)
        .or_else(|| env_value(env_keys::CONFIG_FILE).map(PathBuf::from));

    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(Error::Config(format!("Config file not found: {}", path.display())));
    }

    Ok(default_config_path().filter(|p| p.exists()))
}

/// Platform config path, e.g. `~/.config/wqr/wqr-relay.toml` on Linux
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("wqr").join("wqr-relay.toml"))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;
    Ok(toml::from_str(&content)?)
}

/// Load the TOML config if one is found, otherwise defaults
///
/// Returns the file that was read alongside its contents.
pub fn load_or_default(cli_path: Option<&Path>) -> Result<(TomlConfig, Option<PathBuf>)> {
    match locate_config_file(cli_path)? {
        Some(path) => Ok((load_toml_config(&path)?, Some(path))),
        None => Ok((TomlConfig::default(), None)),
    }
}
