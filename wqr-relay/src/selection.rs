//! Report row selection
//!
//! Walks the filtered report table row by row, classifies each row by its
//! status cell and ticks the checkbox of every completed report.
//! Classification is pure ([`classify_row`]); only [`SelectionEngine::run`]
//! touches the browser.

use crate::portal::{DriverError, ElementHandle, PortalDriver, PortalLayout};
use std::time::Duration;
use tracing::{debug, info, warn};
use wqr_common::config::SelectionSettings;
use wqr_common::summary::SelectionCounts;

/// Pause after each checkbox click (the grid posts back on change)
const DEFAULT_CLICK_DELAY: Duration = Duration::from_millis(500);

/// Transient view of one table row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    /// Zero-based row position
    pub index: usize,
    /// First cell text that matched a known status, trimmed
    pub status_label: Option<String>,
    pub checkbox: Option<ElementHandle>,
}

/// What to do with a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDecision {
    Select,
    Skip,
    Indeterminate,
}

fn matches_any(statuses: &[String], text: &str) -> bool {
    let text = text.trim();
    statuses.iter().any(|s| s.trim().eq_ignore_ascii_case(text))
}

/// Whether a cell text is one of the configured statuses
pub fn is_known_status(settings: &SelectionSettings, text: &str) -> bool {
    matches_any(&settings.allowed_statuses, text) || matches_any(&settings.skipped_statuses, text)
}

/// Decide a row's fate
///
/// A row needs both a known status and a checkbox to be selected or
/// skipped; anything less is indeterminate.
pub fn classify_row(row: &ReportRow, settings: &SelectionSettings) -> RowDecision {
    let (Some(status), Some(_)) = (&row.status_label, &row.checkbox) else {
        return RowDecision::Indeterminate;
    };
    if matches_any(&settings.allowed_statuses, status) {
        RowDecision::Select
    } else if matches_any(&settings.skipped_statuses, status) {
        RowDecision::Skip
    } else {
        RowDecision::Indeterminate
    }
}

/// Outcome of one selection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionReport {
    /// Rows found in the table
    pub rows: usize,
    /// Rows that had a checkbox at all
    pub rows_with_checkbox: usize,
    pub counts: SelectionCounts,
}

impl SelectionReport {
    /// At least one row is ticked and ready for download
    pub fn has_selection(&self) -> bool {
        self.counts.selected > 0
    }

    /// The table has rows but none can be selected
    pub fn no_usable_rows(&self) -> bool {
        self.rows > 0 && self.rows_with_checkbox == 0
    }
}

pub struct SelectionEngine<'a> {
    driver: &'a dyn PortalDriver,
    layout: &'a PortalLayout,
    settings: &'a SelectionSettings,
    click_delay: Duration,
}

impl<'a> SelectionEngine<'a> {
    pub fn new(
        driver: &'a dyn PortalDriver,
        layout: &'a PortalLayout,
        settings: &'a SelectionSettings,
    ) -> Self {
        Self {
            driver,
            layout,
            settings,
            click_delay: DEFAULT_CLICK_DELAY,
        }
    }

    pub fn with_click_delay(mut self, click_delay: Duration) -> Self {
        self.click_delay = click_delay;
        self
    }

    /// Look up row `index` in the current rendering of the table and read it
    ///
    /// Handles do not survive a grid postback, so each row is located again
    /// right before it is read and possibly clicked.
    async fn read_row_at(&self, index: usize) -> Result<ReportRow, DriverError> {
        let handles = self.driver.find_all(&self.layout.report_rows).await?;
        let handle = handles
            .get(index)
            .ok_or_else(|| DriverError::NoSuchElement(format!("report row {}", index + 1)))?;
        self.read_row(index, handle).await
    }

    async fn read_row(&self, index: usize, handle: &ElementHandle) -> Result<ReportRow, DriverError> {
        let checkbox = self
            .driver
            .find_within(handle, &self.layout.row_checkbox)
            .await?
            .into_iter()
            .next();

        let mut status_label = None;
        for cell in self.driver.find_within(handle, &self.layout.row_cells).await? {
            let text = self.driver.text(&cell).await?;
            if is_known_status(self.settings, &text) {
                status_label = Some(text.trim().to_string());
                break;
            }
        }

        Ok(ReportRow {
            index,
            status_label,
            checkbox,
        })
    }

    /// Tick a row's checkbox unless it already is
    async fn select(&self, checkbox: &ElementHandle) -> Result<(), DriverError> {
        if self.driver.is_checked(checkbox).await? {
            return Ok(());
        }
        self.driver.click(checkbox).await?;
        if !self.click_delay.is_zero() {
            tokio::time::sleep(self.click_delay).await;
        }
        Ok(())
    }

    /// Classify and select all rows
    ///
    /// Zero rows or zero matches is not an error here; the caller decides.
    /// Only a failure to list the rows at all is returned as `Err`.
    pub async fn run(&self) -> Result<SelectionReport, DriverError> {
        let rows = self.driver.find_all(&self.layout.report_rows).await?.len();
        info!("Found {} row(s) in the report table", rows);

        let mut report = SelectionReport {
            rows,
            ..Default::default()
        };

        for index in 0..rows {
            let row = match self.read_row_at(index).await {
                Ok(row) => row,
                Err(e) => {
                    warn!("Row {}: could not be read: {}", index + 1, e);
                    report.counts.indeterminate += 1;
                    continue;
                }
            };
            if row.checkbox.is_some() {
                report.rows_with_checkbox += 1;
            }

            let status = row.status_label.as_deref().unwrap_or("?");
            match (classify_row(&row, self.settings), &row.checkbox) {
                (RowDecision::Select, Some(checkbox)) => match self.select(checkbox).await {
                    Ok(()) => {
                        report.counts.selected += 1;
                        info!("Row {}: status '{}' - SELECTED", row.index + 1, status);
                    }
                    Err(e) => {
                        report.counts.indeterminate += 1;
                        warn!("Row {}: selection failed: {}", row.index + 1, e);
                    }
                },
                (RowDecision::Skip, _) => {
                    report.counts.skipped += 1;
                    info!("Row {}: status '{}' - SKIPPED", row.index + 1, status);
                }
                _ => {
                    report.counts.indeterminate += 1;
                    debug!(
                        row = row.index + 1,
                        has_status = row.status_label.is_some(),
                        has_checkbox = row.checkbox.is_some(),
                        "Could not determine status or find checkbox"
                    );
                    warn!("Row {}: could not determine status or find checkbox", row.index + 1);
                }
            }
        }

        info!(
            "Selection: {} selected, {} skipped, {} indeterminate",
            report.counts.selected, report.counts.skipped, report.counts.indeterminate
        );
        Ok(report)
    }
}
