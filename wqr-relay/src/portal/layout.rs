//! Element locators for the lab portal
//!
//! Defaults match the portal's ASP.NET pages. Any locator can be replaced
//! from the `[portal.layout]` TOML table without touching the others.

use super::Locator;
use serde::{Deserialize, Serialize};
use wqr_common::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalLayout {
    pub username_field: Locator,
    pub password_field: Locator,
    pub login_button: Locator,
    /// Optional link from the landing page to the full report list
    pub view_all_link: Locator,
    pub water_tab: Locator,
    pub start_date_field: Locator,
    pub end_date_field: Locator,
    pub update_range_button: Locator,
    /// Data rows of the results table (header excluded)
    pub report_rows: Locator,
    /// Cells within a row
    pub row_cells: Locator,
    /// Selection checkbox within a row
    pub row_checkbox: Locator,
    pub download_button: Locator,
}

impl Default for PortalLayout {
    fn default() -> Self {
        Self {
            username_field: Locator::css(r#"input[name*="UserName"], input[type="text"]"#),
            password_field: Locator::css(r#"input[name*="Password"], input[type="password"]"#),
            login_button: Locator::css(r#"input[type="submit"], button[type="submit"]"#),
            view_all_link: Locator::xpath(r#"//*[@id="content"]/h4/a"#),
            water_tab: Locator::xpath(r#"//*[@id="tabs"]/ul/li[3]/a"#),
            start_date_field: Locator::css("#ContentPlaceHolder1_portalContent_txtStartDate"),
            end_date_field: Locator::css("#ContentPlaceHolder1_portalContent_txtEndDate"),
            update_range_button: Locator::css(
                "#ContentPlaceHolder1_portalContent_btnSubmitDateChanges",
            ),
            report_rows: Locator::css(
                r#"#ContentPlaceHolder1_portalContent_grdWaterReports tr[id*="grdWaterReports"]"#,
            ),
            row_cells: Locator::css("td"),
            row_checkbox: Locator::css(r#"input[id*="chkWater"]"#),
            download_button: Locator::css(
                "#ContentPlaceHolder1_portalContent_btnDownloadSelectedWater",
            ),
        }
    }
}

impl PortalLayout {
    /// Defaults overlaid with the entries of a `[portal.layout]` table
    pub fn from_table(table: &toml::Table) -> Result<Self> {
        if table.is_empty() {
            return Ok(Self::default());
        }
        toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e| Error::Config(format!("Invalid [portal.layout] section: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_gives_defaults() {
        let layout = PortalLayout::from_table(&toml::Table::new()).unwrap();
        assert_eq!(layout, PortalLayout::default());
    }

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let table: toml::Table = toml::from_str(
            r##"
            download_button = { css = "#btnDownload" }
            water_tab = { xpath = "//a[text()='Water']" }
            "##,
        )
        .unwrap();
        let layout = PortalLayout::from_table(&table).unwrap();
        assert_eq!(layout.download_button, Locator::css("#btnDownload"));
        assert_eq!(layout.water_tab, Locator::xpath("//a[text()='Water']"));
        assert_eq!(layout.row_cells, Locator::css("td"));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let table: toml::Table = toml::from_str(r#"download_button = { id = "x" }"#).unwrap();
        assert!(PortalLayout::from_table(&table).is_err());
    }
}
