//! # WQR Common Library
//!
//! Shared code for the water report relay:
//! - Error type and result alias
//! - Configuration loading (`.env`, environment, TOML)
//! - Logging initialization
//! - Report date range
//! - Run summary, error taxonomy and outcome classification
//! - Run events for progress observers

pub mod config;
pub mod dates;
pub mod error;
pub mod events;
pub mod logging;
pub mod summary;

pub use error::{Error, Result};
pub use summary::{RunOutcome, RunSummary};
