//! Run progress events
//!
//! The pipeline emits these at stage boundaries when an event channel is
//! attached. Observers are optional; a closed channel is ignored.

use crate::summary::{ErrorKind, RunOutcome};
use serde::{Deserialize, Serialize};

/// Workflow stage identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Login,
    Filter,
    Selection,
    Acquisition,
    Normalization,
    Upload,
    Notification,
}

/// Progress event for a single run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    /// A stage began
    StageStarted { stage: Stage },

    /// Selection finished
    RowsSelected {
        selected: usize,
        skipped: usize,
        indeterminate: usize,
    },

    /// The batch download resolved to an artifact
    ArtifactResolved {
        /// Suggested file name
        name: String,
        /// Detection strategy, e.g. "direct_download"
        strategy: String,
        size_bytes: usize,
    },

    /// One file reached the document store
    FileUploaded { name: String, web_url: Option<String> },

    /// A stage recorded an error
    StageFailed {
        stage: Stage,
        kind: ErrorKind,
        message: String,
    },

    /// Run finished (notification attempted)
    RunCompleted {
        outcome: RunOutcome,
        downloaded: usize,
        uploaded: usize,
        errors: usize,
    },
}
