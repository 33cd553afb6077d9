//! Artifact normalization
//!
//! Writes an acquired artifact into the run folder. Archives are expanded
//! in place and removed; every document gets its canonical name (hyphens
//! replaced by underscores in the file name).

use crate::acquisition::DownloadArtifact;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use wqr_common::summary::NormalizedFile;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Error extracting archive: {0}")]
    Corrupt(String),

    #[error("Unusable file name '{0}'")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    Task(String),
}

/// Canonical file name: hyphens become underscores
///
/// `report-2024-01-01.pdf` → `report_2024_01_01.pdf`
pub fn canonical_name(name: &str) -> String {
    name.replace('-', "_")
}

/// Case-insensitive extension check on a file name
pub fn has_extension(name: &str, extension: &str) -> bool {
    name.to_lowercase()
        .ends_with(&format!(".{}", extension.to_lowercase()))
}

/// `name` with `_<n>` inserted before the extension
///
/// `a_b.pdf` → `a_b_2.pdf`
pub fn numbered_name(name: &str, n: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, n, ext),
        _ => format!("{}_{}", name, n),
    }
}

/// First of `path`, `path_2`, `path_3`, ... not yet taken by this archive
fn unclaimed_path(path: PathBuf, claimed: &HashSet<PathBuf>) -> PathBuf {
    if !claimed.contains(&path) {
        return path;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let next = (2..)
        .map(|n| path.with_file_name(numbered_name(&name, n)))
        .find(|candidate| !claimed.contains(candidate));
    next.unwrap_or(path)
}

/// Final path component of a portal-suggested name
fn base_name(name: &str) -> Result<String, ArchiveError> {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ArchiveError::InvalidName(name.to_string()))
}

pub struct ArchiveNormalizer {
    folder: PathBuf,
    document_extension: String,
    archive_extension: String,
}

impl ArchiveNormalizer {
    /// `folder` is the run's date folder; it is created on demand
    pub fn new(
        folder: impl Into<PathBuf>,
        document_extension: impl Into<String>,
        archive_extension: impl Into<String>,
    ) -> Self {
        Self {
            folder: folder.into(),
            document_extension: document_extension.into(),
            archive_extension: archive_extension.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Persist an artifact and return the files ready for upload
    pub async fn normalize(&self, artifact: &DownloadArtifact) -> Result<Vec<NormalizedFile>, ArchiveError> {
        tokio::fs::create_dir_all(&self.folder).await?;
        let original_name = base_name(&artifact.suggested_name)?;

        if !has_extension(&original_name, &self.archive_extension) {
            let path = self.folder.join(canonical_name(&original_name));
            tokio::fs::write(&path, &artifact.bytes).await?;
            info!("Saved {}", path.display());
            return Ok(vec![NormalizedFile {
                path,
                original_name,
            }]);
        }

        let archive_path = self.folder.join(canonical_name(&original_name));
        tokio::fs::write(&archive_path, &artifact.bytes).await?;
        info!("Extracting archive {}", archive_path.display());

        let files = tokio::task::spawn_blocking({
            let archive = archive_path.clone();
            let folder = self.folder.clone();
            let extension = self.document_extension.clone();
            move || extract_documents(&archive, &folder, &extension)
        })
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))??;

        tokio::fs::remove_file(&archive_path).await?;
        info!("Extracted {} document(s), archive removed", files.len());
        Ok(files)
    }
}

/// Expand all members of `archive` under `folder`, renaming documents
///
/// Documents are written straight to their canonical name. Two members
/// that canonicalize to the same path (`a-b.pdf`, `a_b.pdf`) keep both
/// files: the later one gets a numbered name.
fn extract_documents(archive: &Path, folder: &Path, extension: &str) -> Result<Vec<NormalizedFile>, ArchiveError> {
    let corrupt = |e: zip::result::ZipError| ArchiveError::Corrupt(e.to_string());
    let mut zip = zip::ZipArchive::new(File::open(archive)?).map_err(corrupt)?;
    let mut files = Vec::new();
    let mut claimed = HashSet::new();

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(corrupt)?;
        let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            warn!("Skipping archive member with unsafe path: {}", entry.name());
            continue;
        };
        let target = folder.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        let member_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let is_document = has_extension(&member_name, extension);

        let destination = if is_document {
            let canonical = target.with_file_name(canonical_name(&member_name));
            let path = unclaimed_path(canonical.clone(), &claimed);
            if path != canonical {
                warn!(
                    "Archive member {} collides with {}, saved as {}",
                    relative.display(),
                    canonical.display(),
                    path.display()
                );
            }
            path
        } else {
            target
        };

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&destination)?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| ArchiveError::Corrupt(format!("{}: {}", relative.display(), e)))?;
        debug!("Extracted {} to {}", relative.display(), destination.display());

        if is_document {
            claimed.insert(destination.clone());
            files.push(NormalizedFile {
                path: destination,
                original_name: member_name,
            });
        }
    }

    Ok(files)
}
