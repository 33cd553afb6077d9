//! Microsoft Graph client
//!
//! One client per run. The client-credential token is requested on first
//! use and shared by the upload relay and the notifier.
//!
//! # API Reference
//! - Token: `POST {login_base}/{tenant}/oauth2/v2.0/token`
//! - Site: `GET sites/{hostname}:{path}`
//! - Library: `GET sites/{id}/drive`
//! - https://learn.microsoft.com/graph/api/overview

pub mod mail;
pub mod upload;

pub use mail::Notifier;
pub use upload::UploadRelay;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use wqr_common::config::GraphCredentials;

/// Scope requested for application permissions
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Default timeout for Graph requests (uploads included)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Characters escaped inside a URL path segment
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Failed to acquire access token: {0}")]
    Auth(String),

    #[error("{context}: HTTP {status} - {body}")]
    Api {
        context: String,
        status: u16,
        body: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid SharePoint site URL format: {0}")]
    InvalidSiteUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

/// Encode each `/`-separated segment of a drive path
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| utf8_percent_encode(s, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Split a site URL into Graph's `hostname` and server-relative path
pub fn site_address(site_url: &str) -> Result<(String, String), GraphError> {
    let url = reqwest::Url::parse(site_url)
        .map_err(|e| GraphError::InvalidSiteUrl(format!("{}: {}", site_url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| GraphError::InvalidSiteUrl(format!("{}: no hostname", site_url)))?;
    let host = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    Ok((host, url.path().trim_end_matches('/').to_string()))
}

pub struct GraphClient {
    http: Client,
    credentials: GraphCredentials,
    token: OnceCell<String>,
}

impl GraphClient {
    pub fn new(credentials: GraphCredentials) -> Result<Self, GraphError> {
        Self::with_timeout(credentials, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(credentials: GraphCredentials, timeout: Duration) -> Result<Self, GraphError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GraphError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            credentials,
            token: OnceCell::new(),
        })
    }

    /// Bearer token, requested once per client
    pub async fn token(&self) -> Result<&str, GraphError> {
        self.token
            .get_or_try_init(|| self.acquire_token())
            .await
            .map(String::as_str)
    }

    async fn acquire_token(&self) -> Result<String, GraphError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.credentials.login_base_url.trim_end_matches('/'),
            self.credentials.tenant_id
        );
        info!("Authenticating with Microsoft Graph");

        let response = self
            .http
            .post(&url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("scope", GRAPH_SCOPE),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| GraphError::Network(e.to_string()))?;

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GraphError::Auth(format!("unreadable token response: {}", e)))?;

        token.access_token.ok_or_else(|| {
            GraphError::Auth(
                token
                    .error_description
                    .unwrap_or_else(|| "Unknown error".to_string()),
            )
        })
    }

    /// Absolute Graph URL for a relative API path
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.credentials.graph_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Authorized request builder
    pub async fn request(&self, method: reqwest::Method, path: &str) -> Result<RequestBuilder, GraphError> {
        let token = self.token().await?;
        Ok(self.http.request(method, self.url(path)).bearer_auth(token))
    }

    /// Send a request, returning the response or an API error
    pub async fn send(&self, request: RequestBuilder, context: &str, accept: &[u16]) -> Result<Response, GraphError> {
        let response = request
            .send()
            .await
            .map_err(|e| GraphError::Network(format!("{}: {}", context, e)))?;
        let status = response.status().as_u16();
        if accept.contains(&status) {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GraphError::Api {
            context: context.to_string(),
            status,
            body,
        })
    }

    async fn get_id(&self, path: &str, context: &str) -> Result<String, GraphError> {
        let request = self.request(reqwest::Method::GET, path).await?;
        let response = self.send(request, context, &[200]).await?;
        response
            .json::<IdResponse>()
            .await
            .map(|r| r.id)
            .map_err(|e| GraphError::Parse(format!("{}: {}", context, e)))
    }

    /// Document library id for a SharePoint site URL
    pub async fn resolve_drive(&self, site_url: &str) -> Result<String, GraphError> {
        let (host, path) = site_address(site_url)?;
        let site_path = if path.is_empty() {
            format!("sites/{}", host)
        } else {
            format!("sites/{}:{}", host, path)
        };

        let site_id = self.get_id(&site_path, "Failed to get site information").await?;
        debug!(site_id = %site_id, "Found SharePoint site");

        let drive_id = self
            .get_id(&format!("sites/{}/drive", site_id), "Failed to get document library")
            .await?;
        info!("Found document library for {}", site_url);
        Ok(drive_id)
    }
}
