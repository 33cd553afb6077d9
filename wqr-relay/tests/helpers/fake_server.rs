//! Fake Microsoft Graph and portal document server
//!
//! One axum app bound to an ephemeral port answers:
//! - `POST /{tenant}/oauth2/v2.0/token`
//! - `GET /v1.0/sites/{host}:{path}` and `GET /v1.0/sites/site-1/drive`
//! - `PUT /v1.0/drives/drive-1/root:/{path}:/content`
//! - `POST /v1.0/users/{sender}/sendMail`
//! - `GET /docs/{name}` (requires the portal session cookie)
//!
//! Every request is recorded for assertions.

use super::mock_driver::SESSION_COOKIE;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const TOKEN: &str = "test-token";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

#[derive(Debug, Default)]
struct ServerState {
    requests: Vec<RecordedRequest>,
    reject_token: bool,
    missing_site: bool,
    failing_uploads: HashSet<String>,
    mail_status: Option<u16>,
    documents: HashMap<String, Vec<u8>>,
}

type Shared = Arc<Mutex<ServerState>>;

pub struct FakeServer {
    pub base_url: String,
    state: Shared,
}

impl FakeServer {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(ServerState::default()));
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn reject_token(&self) {
        self.state.lock().unwrap().reject_token = true;
    }

    pub fn missing_site(&self) {
        self.state.lock().unwrap().missing_site = true;
    }

    /// Uploads of `name` answer HTTP 500
    pub fn fail_upload(&self, name: &str) {
        self.state.lock().unwrap().failing_uploads.insert(name.to_string());
    }

    pub fn mail_status(&self, status: u16) {
        self.state.lock().unwrap().mail_status = Some(status);
    }

    /// Serve `bytes` at `/docs/{name}`
    pub fn document(&self, name: &str, bytes: &[u8]) -> String {
        self.state
            .lock()
            .unwrap()
            .documents
            .insert(name.to_string(), bytes.to_vec());
        format!("{}/docs/{}", self.base_url, name)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, method: &str, path_prefix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path.starts_with(path_prefix))
            .collect()
    }

    pub fn token_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.path.ends_with("/oauth2/v2.0/token"))
            .count()
    }

    pub fn uploads(&self) -> Vec<RecordedRequest> {
        self.requests_to("PUT", "/v1.0/drives/")
    }

    pub fn mails(&self) -> Vec<RecordedRequest> {
        self.requests_to("POST", "/v1.0/users/")
    }
}

async fn handle(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let mut state = state.lock().unwrap();
    state.requests.push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        headers: headers.clone(),
        body: body.to_vec(),
    });

    if method == Method::POST && path.ends_with("/oauth2/v2.0/token") {
        return if state.reject_token {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid_client", "error_description": "bad client secret" })),
            )
                .into_response()
        } else {
            Json(json!({ "access_token": TOKEN, "token_type": "Bearer", "expires_in": 3599 }))
                .into_response()
        };
    }

    if let Some(name) = path.strip_prefix("/docs/") {
        let cookie = headers
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let expected = format!("{}={}", SESSION_COOKIE.0, SESSION_COOKIE.1);
        if !cookie.contains(&expected) {
            return StatusCode::FORBIDDEN.into_response();
        }
        return match state.documents.get(name) {
            Some(bytes) => bytes.clone().into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        };
    }

    if !path.starts_with("/v1.0/") {
        return StatusCode::NOT_FOUND.into_response();
    }
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", TOKEN))
        .unwrap_or(false);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
    }

    if method == Method::GET && path == "/v1.0/sites/site-1/drive" {
        return Json(json!({ "id": "drive-1", "driveType": "documentLibrary" })).into_response();
    }
    if method == Method::GET && path.starts_with("/v1.0/sites/") {
        return if state.missing_site {
            (StatusCode::NOT_FOUND, "itemNotFound").into_response()
        } else {
            Json(json!({ "id": "site-1" })).into_response()
        };
    }

    if method == Method::PUT && path.starts_with("/v1.0/drives/drive-1/root:/") {
        let remote = path
            .trim_start_matches("/v1.0/drives/drive-1/root:/")
            .trim_end_matches(":/content")
            .to_string();
        let name = remote.rsplit('/').next().unwrap_or_default().to_string();
        if state.failing_uploads.contains(&name) {
            return (StatusCode::INTERNAL_SERVER_ERROR, "upload exploded").into_response();
        }
        return (
            StatusCode::CREATED,
            Json(json!({ "name": name, "webUrl": format!("https://share.test/{}", remote) })),
        )
            .into_response();
    }

    if method == Method::POST && path.starts_with("/v1.0/users/") && path.ends_with("/sendMail") {
        let status = state.mail_status.unwrap_or(202);
        return StatusCode::from_u16(status)
            .unwrap_or(StatusCode::ACCEPTED)
            .into_response();
    }

    StatusCode::NOT_FOUND.into_response()
}
