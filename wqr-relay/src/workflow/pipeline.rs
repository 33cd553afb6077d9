//! Pipeline orchestrator
//!
//! Drives one complete run against an already started browser session.
//!
//! # Error Handling
//! - Every recovered error lands in the returned [`RunSummary`]
//! - A failing stage stops only the stages that depend on it
//! - The browser session is closed once the portal stage ends, on every path
//! - The notification stage always runs (unless disabled)
//!
//! # Example
//! ```rust,ignore
//! let pipeline = Pipeline::new(relay_config, PipelineConfig::default());
//! let summary = pipeline.run(&driver, RunClock::now()).await;
//! ```

use super::RunClock;
use crate::acquisition::{AcquisitionEngine, DocumentFetcher};
use crate::graph::mail::{compose, MessageContext};
use crate::graph::{GraphClient, Notifier, UploadRelay};
use crate::normalizer::ArchiveNormalizer;
use crate::portal::{PortalDriver, PortalLayout, PortalSession};
use crate::selection::SelectionEngine;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use wqr_common::config::RelayConfig;
use wqr_common::events::{RunEvent, Stage};
use wqr_common::summary::{ErrorKind, RunSummary};

/// Pipeline switches
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Keep files local
    pub skip_upload: bool,
    /// Do not send the status message
    pub skip_notify: bool,
    /// Pause after each checkbox click
    pub click_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            skip_upload: false,
            skip_notify: false,
            click_delay: Duration::from_millis(500),
        }
    }
}

pub struct Pipeline {
    relay: RelayConfig,
    config: PipelineConfig,
    event_tx: Option<mpsc::Sender<RunEvent>>,
}

impl Pipeline {
    pub fn new(relay: RelayConfig, config: PipelineConfig) -> Self {
        Self {
            relay,
            config,
            event_tx: None,
        }
    }

    /// Create pipeline with event channel for progress reporting
    pub fn with_events(relay: RelayConfig, config: PipelineConfig, event_tx: mpsc::Sender<RunEvent>) -> Self {
        Self {
            relay,
            config,
            event_tx: Some(event_tx),
        }
    }

    pub fn relay_config(&self) -> &RelayConfig {
        &self.relay
    }

    /// Execute a full run and return the merged summary
    ///
    /// Never fails; problems are recorded in the summary. `driver` is quit
    /// before returning.
    pub async fn run(&self, driver: &dyn PortalDriver, clock: RunClock) -> RunSummary {
        info!("Run started for reports {}", self.relay.date_range);

        let portal = self.portal_stage(driver, clock).await;
        if let Err(e) = driver.quit().await {
            warn!("Browser session did not close cleanly: {}", e);
        }
        self.finish(portal, clock).await
    }

    /// Upload and notification stages following a portal stage summary
    ///
    /// Used directly when no browser session could be started.
    pub async fn finish(&self, portal: RunSummary, clock: RunClock) -> RunSummary {
        let graph = match self.relay.graph() {
            Ok(credentials) => GraphClient::new(credentials).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let mut summary = portal;

        if self.config.skip_upload {
            info!("Upload disabled, {} file(s) kept locally", summary.downloaded.len());
        } else if summary.downloaded.is_empty() {
            info!("No files to upload");
        } else {
            let delta = self.upload_stage(&graph, &summary).await;
            summary = summary.merge(delta);
        }

        if self.config.skip_notify {
            info!("Notification disabled");
        } else {
            let delta = self.notify_stage(&graph, &summary, clock).await;
            summary = summary.merge(delta);
        }

        self.emit_event(RunEvent::RunCompleted {
            outcome: summary.outcome(),
            downloaded: summary.downloaded.len(),
            uploaded: summary.uploaded.len(),
            errors: summary.errors.len(),
        })
        .await;

        info!("Run finished: {}", summary.outcome());
        summary
    }

    /// Login through normalization
    async fn portal_stage(&self, driver: &dyn PortalDriver, clock: RunClock) -> RunSummary {
        let layout = match PortalLayout::from_table(&self.relay.portal_layout) {
            Ok(layout) => layout,
            Err(e) => return self.fail(Stage::Login, ErrorKind::Configuration, e.to_string()).await,
        };
        let credentials = match self.relay.portal() {
            Ok(credentials) => credentials,
            Err(e) => return self.fail(Stage::Login, ErrorKind::Configuration, e.to_string()).await,
        };

        let session = PortalSession::new(driver, &layout).with_settle_delay(self.relay.settle_delay);

        self.emit_event(RunEvent::StageStarted { stage: Stage::Login }).await;
        if let Err(e) = session.login(&credentials).await {
            return self.fail(Stage::Login, ErrorKind::Login, e.to_string()).await;
        }

        self.emit_event(RunEvent::StageStarted { stage: Stage::Filter }).await;
        if let Err(e) = session.apply_filter(&self.relay.date_range).await {
            return self.fail(Stage::Filter, ErrorKind::Selection, e.to_string()).await;
        }

        self.emit_event(RunEvent::StageStarted { stage: Stage::Selection }).await;
        let report = match SelectionEngine::new(driver, &layout, &self.relay.selection)
            .with_click_delay(self.config.click_delay)
            .run()
            .await
        {
            Ok(report) => report,
            Err(e) => {
                let message = format!("Error reading report table: {}", e);
                return self.fail(Stage::Selection, ErrorKind::Selection, message).await;
            }
        };
        self.emit_event(RunEvent::RowsSelected {
            selected: report.counts.selected,
            skipped: report.counts.skipped,
            indeterminate: report.counts.indeterminate,
        })
        .await;

        let summary = RunSummary {
            selection: report.counts,
            ..Default::default()
        };

        if report.no_usable_rows() {
            let message = format!("{} row(s) found but none has a selection checkbox", report.rows);
            return summary.merge(self.fail(Stage::Selection, ErrorKind::Selection, message).await);
        }
        if !report.has_selection() {
            info!("No completed reports found for {}", self.relay.date_range);
            return summary;
        }

        self.emit_event(RunEvent::StageStarted { stage: Stage::Acquisition }).await;
        let fetcher = match DocumentFetcher::new(self.relay.acquisition.http_timeout) {
            Ok(fetcher) => fetcher,
            Err(e) => {
                return summary.merge(self.fail(Stage::Acquisition, ErrorKind::Acquisition, e.to_string()).await)
            }
        };
        let engine = AcquisitionEngine::new(driver, &layout, &self.relay.acquisition, &fetcher, clock.today);
        let artifact = match engine.run().await {
            Ok(artifact) => artifact,
            Err(e) => {
                let message = format!("Error downloading reports: {}", e);
                return summary.merge(self.fail(Stage::Acquisition, ErrorKind::Acquisition, message).await);
            }
        };
        self.emit_event(RunEvent::ArtifactResolved {
            name: artifact.suggested_name.clone(),
            strategy: artifact.strategy.to_string(),
            size_bytes: artifact.bytes.len(),
        })
        .await;

        self.emit_event(RunEvent::StageStarted { stage: Stage::Normalization }).await;
        let normalizer = ArchiveNormalizer::new(
            self.relay.run_folder(clock.today),
            self.relay.acquisition.document_extension.clone(),
            self.relay.acquisition.archive_extension.clone(),
        );
        match normalizer.normalize(&artifact).await {
            Ok(files) => {
                info!("Downloaded {} report(s) to {}", files.len(), normalizer.folder().display());
                summary.merge(RunSummary {
                    downloaded: files,
                    ..Default::default()
                })
            }
            Err(e) => summary.merge(self.fail(Stage::Normalization, ErrorKind::Archive, e.to_string()).await),
        }
    }

    async fn upload_stage(&self, graph: &Result<GraphClient, String>, summary: &RunSummary) -> RunSummary {
        self.emit_event(RunEvent::StageStarted { stage: Stage::Upload }).await;

        let client = match graph {
            Ok(client) => client,
            Err(e) => return self.fail(Stage::Upload, ErrorKind::Configuration, e.clone()).await,
        };
        let target = match self.relay.store() {
            Ok(target) => target,
            Err(e) => return self.fail(Stage::Upload, ErrorKind::Configuration, e.to_string()).await,
        };

        let delta = UploadRelay::new(client, &target).upload_all(&summary.downloaded).await;
        for file in &delta.uploaded {
            self.emit_event(RunEvent::FileUploaded {
                name: file.name.clone(),
                web_url: file.web_url.clone(),
            })
            .await;
        }
        for e in &delta.errors {
            self.emit_event(RunEvent::StageFailed {
                stage: Stage::Upload,
                kind: e.kind,
                message: e.message.clone(),
            })
            .await;
        }
        delta
    }

    async fn notify_stage(
        &self,
        graph: &Result<GraphClient, String>,
        summary: &RunSummary,
        clock: RunClock,
    ) -> RunSummary {
        self.emit_event(RunEvent::StageStarted { stage: Stage::Notification }).await;

        let settings = match self.relay.mail() {
            Ok(settings) => settings,
            Err(e) => return self.fail(Stage::Notification, ErrorKind::Notification, e.to_string()).await,
        };
        let client = match graph {
            Ok(client) => client,
            Err(e) => return self.fail(Stage::Notification, ErrorKind::Configuration, e.clone()).await,
        };

        let context = MessageContext {
            generated_at: clock.started_at,
            date_range: self.relay.date_range,
        };
        let message = compose(summary, &context, settings.format);

        match Notifier::new(client, &settings).send(&message).await {
            Ok(()) => RunSummary::new(),
            Err(e) => {
                let message = format!("Error sending notification email: {}", e);
                self.fail(Stage::Notification, ErrorKind::Notification, message).await
            }
        }
    }

    /// Log, report and wrap a stage error
    async fn fail(&self, stage: Stage, kind: ErrorKind, message: String) -> RunSummary {
        error!("{}", message);
        self.emit_event(RunEvent::StageFailed {
            stage,
            kind,
            message: message.clone(),
        })
        .await;
        RunSummary::failed(kind, message)
    }

    async fn emit_event(&self, event: RunEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}
