//! Run summary and event serialization tests

use std::path::PathBuf;
use wqr_common::events::{RunEvent, Stage};
use wqr_common::summary::{ErrorKind, NormalizedFile, RunOutcome, RunSummary, UploadedFile};

fn downloaded(names: &[&str]) -> RunSummary {
    RunSummary {
        downloaded: names
            .iter()
            .map(|n| NormalizedFile {
                path: PathBuf::from("/data").join(n),
                original_name: n.to_string(),
            })
            .collect(),
        ..Default::default()
    }
}

fn uploaded(names: &[&str]) -> RunSummary {
    RunSummary {
        uploaded: names
            .iter()
            .map(|n| UploadedFile {
                name: n.to_string(),
                web_url: Some(format!("https://store.example/{}", n)),
            })
            .collect(),
        ..Default::default()
    }
}

#[test]
fn test_all_uploaded_is_success() {
    let summary = downloaded(&["a.pdf", "b.pdf"]).merge(uploaded(&["a.pdf", "b.pdf"]));
    assert_eq!(summary.outcome(), RunOutcome::Success);
}

#[test]
fn test_empty_run_is_no_reports_found() {
    assert_eq!(RunSummary::new().outcome(), RunOutcome::NoReportsFound);
}

#[test]
fn test_partial_upload_is_partial_success() {
    let summary = downloaded(&["a.pdf", "b.pdf"])
        .merge(uploaded(&["a.pdf"]))
        .merge(RunSummary::failed(ErrorKind::Upload, "Error uploading b.pdf: HTTP 503"));
    assert_eq!(summary.outcome(), RunOutcome::PartialSuccess);
}

#[test]
fn test_nothing_uploaded_is_error() {
    let summary = downloaded(&["a.pdf"])
        .merge(RunSummary::failed(ErrorKind::Upload, "Graph API credentials not configured"));
    assert_eq!(summary.outcome(), RunOutcome::Error);
    assert_eq!(summary.outcome().label(), "ERROR");
}

#[test]
fn test_login_failure_without_downloads_is_error() {
    let summary = RunSummary::failed(ErrorKind::Login, "Login failed: still on login page");
    assert_eq!(summary.outcome(), RunOutcome::Error);
}

#[test]
fn test_run_event_serializes_with_type_tag() {
    let event = RunEvent::StageFailed {
        stage: Stage::Acquisition,
        kind: ErrorKind::Acquisition,
        message: "No PDF found in any open pages".to_string(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "StageFailed");
    assert_eq!(json["stage"], "acquisition");
    assert_eq!(json["kind"], "acquisition");
}
