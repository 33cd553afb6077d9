//! Run workflow
//!
//! A run is a strictly linear sequence of stages:
//! 1. Portal: login, filter, select, acquire, normalize
//! 2. Upload to the document library
//! 3. Notification
//!
//! Each stage returns a [`wqr_common::RunSummary`] delta; the pipeline
//! merges them in order.

pub mod pipeline;

pub use pipeline::{Pipeline, PipelineConfig};

use chrono::{NaiveDate, NaiveDateTime};

/// Wall-clock anchors for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunClock {
    /// Local date naming the run folder and fallback file names
    pub today: NaiveDate,
    pub started_at: NaiveDateTime,
}

impl RunClock {
    pub fn now() -> Self {
        let now = chrono::Local::now().naive_local();
        Self {
            today: now.date(),
            started_at: now,
        }
    }

    pub fn at(started_at: NaiveDateTime) -> Self {
        Self {
            today: started_at.date(),
            started_at,
        }
    }
}
