//! Upload relay
//!
//! Pushes normalized files to the SharePoint document library one at a
//! time. A failing file is recorded and the loop moves on; a failure to
//! authenticate or resolve the library aborts the whole stage.

use super::{encode_path, GraphClient, GraphError};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::Deserialize;
use tracing::{error, info};
use wqr_common::config::StoreTarget;
use wqr_common::summary::{ErrorKind, NormalizedFile, RunSummary, UploadedFile};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    web_url: Option<String>,
}

/// MIME type sent with an upload
pub fn content_type(file_name: &str) -> &'static str {
    if file_name.to_lowercase().ends_with(".pdf") {
        "application/pdf"
    } else {
        "application/octet-stream"
    }
}

pub struct UploadRelay<'a> {
    client: &'a GraphClient,
    target: &'a StoreTarget,
}

impl<'a> UploadRelay<'a> {
    pub fn new(client: &'a GraphClient, target: &'a StoreTarget) -> Self {
        Self { client, target }
    }

    /// Upload every file, returning the stage's summary delta
    pub async fn upload_all(&self, files: &[NormalizedFile]) -> RunSummary {
        let drive_id = match self.client.resolve_drive(&self.target.site_url).await {
            Ok(id) => id,
            Err(e) => {
                let message = format!("SharePoint Graph API error: {}", e);
                error!("{}", message);
                return RunSummary::failed(ErrorKind::Upload, message);
            }
        };

        let mut summary = RunSummary::new();
        for file in files {
            let name = file.file_name();
            info!("Uploading {} to SharePoint", name);
            match self.upload_file(&drive_id, file).await {
                Ok(uploaded) => {
                    info!("Successfully uploaded: {}", name);
                    summary.uploaded.push(uploaded);
                }
                Err(e) => {
                    let message = format!("Error uploading {}: {}", name, e);
                    error!("{}", message);
                    summary = summary.with_error(ErrorKind::Upload, message);
                }
            }
        }

        info!("Uploaded {} of {} file(s)", summary.uploaded.len(), files.len());
        summary
    }

    /// `PUT drives/{drive}/root:/{folder}/{name}:/content`
    pub async fn upload_file(&self, drive_id: &str, file: &NormalizedFile) -> Result<UploadedFile, GraphError> {
        let name = file.file_name();
        if !tokio::fs::try_exists(&file.path).await.unwrap_or(false) {
            return Err(GraphError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found: {}", file.path.display()),
            )));
        }
        let bytes = tokio::fs::read(&file.path).await?;

        let remote = if self.target.folder_path.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", self.target.folder_path, name)
        };
        let path = format!("drives/{}/root:/{}:/content", drive_id, encode_path(&remote));

        let request = self
            .client
            .request(Method::PUT, &path)
            .await?
            .header(CONTENT_TYPE, content_type(&name))
            .body(bytes);
        let response = self.client.send(request, "Upload rejected", &[200, 201]).await?;

        // The link is informational; a body without it still counts as uploaded
        let web_url = response
            .json::<DriveItem>()
            .await
            .ok()
            .and_then(|item| item.web_url)
            .filter(|url| !url.is_empty());

        Ok(UploadedFile { name, web_url })
    }
}
