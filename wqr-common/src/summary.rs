//! Run summary and outcome classification
//!
//! Every workflow stage returns a `RunSummary` describing only what that
//! stage did. The pipeline folds the stage summaries together with
//! [`RunSummary::merge`]; no stage mutates shared state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Error taxonomy for recovered run errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Required setting missing or invalid
    Configuration,
    /// Portal authentication failed
    Login,
    /// No usable rows or filter controls
    Selection,
    /// All download detection strategies exhausted
    Acquisition,
    /// Corrupt or unreadable container archive
    Archive,
    /// Per-file upload failure or store resolution failure
    Upload,
    /// Message could not be composed or sent
    Notification,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Login => "login",
            ErrorKind::Selection => "selection",
            ErrorKind::Acquisition => "acquisition",
            ErrorKind::Archive => "archive",
            ErrorKind::Upload => "upload",
            ErrorKind::Notification => "notification",
        }
    }
}

/// A recovered error recorded in the run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RunError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A downloaded, renamed file waiting for upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedFile {
    /// Location on disk after renaming
    pub path: PathBuf,
    /// Name as delivered by the portal
    pub original_name: String,
}

impl NormalizedFile {
    /// File name after normalization
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.original_name.clone())
    }
}

/// A file accepted by the document store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    /// Canonical web link returned by the store
    pub web_url: Option<String>,
}

/// Row classification counters from the selection stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionCounts {
    pub selected: usize,
    pub skipped: usize,
    pub indeterminate: usize,
}

impl SelectionCounts {
    fn merge(self, other: Self) -> Self {
        Self {
            selected: self.selected + other.selected,
            skipped: self.skipped + other.skipped,
            indeterminate: self.indeterminate + other.indeterminate,
        }
    }
}

/// Run-scoped accumulation of files, counters and errors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub selection: SelectionCounts,
    pub downloaded: Vec<NormalizedFile>,
    pub uploaded: Vec<UploadedFile>,
    pub errors: Vec<RunError>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary holding a single error
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::default().with_error(kind, message)
    }

    /// Append an error, returning the updated summary
    pub fn with_error(mut self, kind: ErrorKind, message: impl Into<String>) -> Self {
        self.errors.push(RunError::new(kind, message));
        self
    }

    /// Combine two stage summaries; `other` follows `self` in every list
    pub fn merge(self, other: RunSummary) -> RunSummary {
        let mut downloaded = self.downloaded;
        downloaded.extend(other.downloaded);
        let mut uploaded = self.uploaded;
        uploaded.extend(other.uploaded);
        let mut errors = self.errors;
        errors.extend(other.errors);

        RunSummary {
            selection: self.selection.merge(other.selection),
            downloaded,
            uploaded,
            errors,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Errors of one kind
    pub fn errors_of(&self, kind: ErrorKind) -> impl Iterator<Item = &RunError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    pub fn outcome(&self) -> RunOutcome {
        RunOutcome::classify(self.downloaded.len(), self.uploaded.len(), self.errors.len())
    }
}

/// Overall run status reported to the recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Success,
    NoReportsFound,
    PartialSuccess,
    Error,
}

impl RunOutcome {
    /// Classification rules, first match wins:
    /// - no errors, at least one download, everything uploaded → Success
    /// - no errors, nothing downloaded → NoReportsFound
    /// - something downloaded and something uploaded → PartialSuccess
    /// - anything else → Error
    pub fn classify(downloaded: usize, uploaded: usize, errors: usize) -> Self {
        if errors == 0 && downloaded > 0 && uploaded == downloaded {
            RunOutcome::Success
        } else if errors == 0 && downloaded == 0 {
            RunOutcome::NoReportsFound
        } else if downloaded > 0 && uploaded > 0 {
            RunOutcome::PartialSuccess
        } else {
            RunOutcome::Error
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Success => "SUCCESS",
            RunOutcome::NoReportsFound => "NO REPORTS FOUND",
            RunOutcome::PartialSuccess => "PARTIAL SUCCESS",
            RunOutcome::Error => "ERROR",
        }
    }

    /// Header colour used in HTML notifications
    pub fn color(&self) -> &'static str {
        match self {
            RunOutcome::Success => "#28a745",
            RunOutcome::NoReportsFound => "#17a2b8",
            RunOutcome::PartialSuccess => "#ffc107",
            RunOutcome::Error => "#dc3545",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
