//! Test Helper Utilities
//!
//! Shared utilities for testing wqr-relay

#![allow(dead_code, unused_imports)]

pub mod fake_server;
pub mod fixtures;
pub mod mock_driver;

pub use fake_server::{FakeServer, RecordedRequest};
pub use fixtures::{clear_env, relay_config, zip_bytes};
pub use mock_driver::{DownloadBehavior, MockDriver, MockRow};
