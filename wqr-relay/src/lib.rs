//! # WQR Relay
//!
//! Daily water report relay: logs into the lab portal, downloads the
//! completed water reports for a date range, uploads them to SharePoint and
//! mails a status summary.
//!
//! # Architecture
//! - [`portal`]: browser driver trait, WebDriver adapter, login and filter
//! - [`selection`]: report row classification and selection
//! - [`acquisition`]: batch download state machine
//! - [`normalizer`]: archive expansion and file naming
//! - [`graph`]: Microsoft Graph client, upload relay and notifier
//! - [`workflow`]: the run pipeline tying the stages together

pub mod acquisition;
pub mod graph;
pub mod normalizer;
pub mod portal;
pub mod selection;
pub mod workflow;

pub use workflow::{Pipeline, PipelineConfig, RunClock};
