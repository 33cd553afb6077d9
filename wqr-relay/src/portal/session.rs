//! Portal login and report filtering
//!
//! Both steps are thin sequences of driver calls. Each page-changing
//! interaction is followed by a readiness wait and a short settle delay,
//! since the portal re-renders its grid after the load event fires.
//!
//! # Filter policy
//! A missing Water tab or date-range control aborts filtering with
//! [`PortalError::Filter`]. The relay never proceeds with an unfiltered
//! report table.

use super::{DriverError, PortalDriver, PortalLayout};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use wqr_common::config::PortalCredentials;
use wqr_common::dates::DateRange;

/// Default wait for page loads
const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default pause after page-changing interactions
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Portal navigation errors
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("Login failed: {0}")]
    Login(String),

    #[error("Report filter unavailable: {0}")]
    Filter(String),
}

/// Login and filtering against one browser session
pub struct PortalSession<'a> {
    driver: &'a dyn PortalDriver,
    layout: &'a PortalLayout,
    settle_delay: Duration,
    page_timeout: Duration,
}

impl<'a> PortalSession<'a> {
    pub fn new(driver: &'a dyn PortalDriver, layout: &'a PortalLayout) -> Self {
        Self {
            driver,
            layout,
            settle_delay: DEFAULT_SETTLE_DELAY,
            page_timeout: DEFAULT_PAGE_TIMEOUT,
        }
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn with_page_timeout(mut self, page_timeout: Duration) -> Self {
        self.page_timeout = page_timeout;
        self
    }

    /// Fill and submit the login form
    ///
    /// The login counts as failed when the password field is still on the
    /// page after submitting.
    pub async fn login(&self, credentials: &PortalCredentials) -> Result<(), PortalError> {
        let login = |e: DriverError| PortalError::Login(e.to_string());

        info!("Navigating to portal: {}", credentials.url);
        self.driver.goto(&credentials.url).await.map_err(login)?;
        self.driver.wait_ready(self.page_timeout).await.map_err(login)?;

        debug!("Entering credentials");
        let username = self.driver.require(&self.layout.username_field).await.map_err(login)?;
        self.driver.fill(&username, &credentials.username).await.map_err(login)?;
        let password = self.driver.require(&self.layout.password_field).await.map_err(login)?;
        self.driver.fill(&password, &credentials.password).await.map_err(login)?;

        let submit = self.driver.require(&self.layout.login_button).await.map_err(login)?;
        self.driver.click(&submit).await.map_err(login)?;
        self.settle().await.map_err(login)?;

        if self
            .driver
            .find_first(&self.layout.password_field)
            .await
            .map_err(login)?
            .is_some()
        {
            return Err(PortalError::Login(
                "login form still displayed after submit (credentials rejected?)".to_string(),
            ));
        }

        info!("Login successful");
        Ok(())
    }

    /// Open the water report table filtered to `range`
    pub async fn apply_filter(&self, range: &DateRange) -> Result<(), PortalError> {
        let filter = |e: DriverError| PortalError::Filter(e.to_string());

        // The landing page sometimes links to the full list, sometimes is the list
        match self.driver.find_first(&self.layout.view_all_link).await {
            Ok(Some(link)) => {
                info!("Clicking 'View All Reports'");
                if let Err(e) = self.click_and_settle(&link).await {
                    warn!("Could not open 'View All Reports': {}", e);
                }
            }
            Ok(None) => info!("'View All Reports' link not found, continuing"),
            Err(e) => warn!("'View All Reports' lookup failed: {}", e),
        }

        let tab = self
            .driver
            .find_first(&self.layout.water_tab)
            .await
            .map_err(filter)?
            .ok_or_else(|| PortalError::Filter("Water tab not found".to_string()))?;
        info!("Opening Water tab");
        self.click_and_settle(&tab).await.map_err(filter)?;

        let start = self
            .driver
            .find_first(&self.layout.start_date_field)
            .await
            .map_err(filter)?
            .ok_or_else(|| PortalError::Filter("start date field not found".to_string()))?;
        let end = self
            .driver
            .find_first(&self.layout.end_date_field)
            .await
            .map_err(filter)?
            .ok_or_else(|| PortalError::Filter("end date field not found".to_string()))?;
        let update = self
            .driver
            .find_first(&self.layout.update_range_button)
            .await
            .map_err(filter)?
            .ok_or_else(|| PortalError::Filter("'Update Date Range' button not found".to_string()))?;

        self.driver.fill(&start, &range.start_input()).await.map_err(filter)?;
        self.driver.fill(&end, &range.end_input()).await.map_err(filter)?;
        debug!(start = %range.start_input(), end = %range.end_input(), "Date range entered");

        self.click_and_settle(&update).await.map_err(filter)?;
        info!("Report table filtered to {}", range);
        Ok(())
    }

    async fn click_and_settle(&self, element: &super::ElementHandle) -> Result<(), DriverError> {
        self.driver.click(element).await?;
        self.settle().await
    }

    async fn settle(&self) -> Result<(), DriverError> {
        self.driver.wait_ready(self.page_timeout).await?;
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        Ok(())
    }
}
