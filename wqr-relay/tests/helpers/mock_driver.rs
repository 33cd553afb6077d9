//! Scripted in-memory portal
//!
//! Answers the default `PortalLayout` locators with a tiny page model:
//! login page → landing page → water report table. Element handles are
//! readable ids (`submit`, `row-2-cb`, ...) so tests can assert on clicks.
//!
//! With [`MockDriver::with_postback`] a checkbox click re-renders the grid:
//! row handles issued before the click become stale, as in the portal.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use wqr_relay::portal::{
    BrowserCookie, DownloadEvent, DriverError, ElementHandle, Locator, PortalDriver, PortalLayout,
    TabHandle, TabInfo,
};

pub const SESSION_COOKIE: (&str, &str) = ("ASP.NET_SessionId", "abc123");

/// One row of the report table
#[derive(Debug, Clone)]
pub struct MockRow {
    pub cells: Vec<String>,
    pub checkbox: bool,
    pub checked: bool,
}

impl MockRow {
    pub fn report(status: &str) -> Self {
        Self {
            cells: vec!["WR-1001".to_string(), "2024-01-01".to_string(), status.to_string()],
            checkbox: true,
            checked: false,
        }
    }

    pub fn without_checkbox(status: &str) -> Self {
        Self {
            checkbox: false,
            ..Self::report(status)
        }
    }

    pub fn checked(mut self) -> Self {
        self.checked = true;
        self
    }
}

/// What clicking "Download Selected" does
#[derive(Debug, Clone)]
pub enum DownloadBehavior {
    /// Browser saves a file
    Saved { name: String, bytes: Vec<u8> },
    /// Browser reports a download by URL only
    Url { name: String, url: String },
    /// Current tab navigates to a URL
    Navigate { url: String },
    /// A new tab opens on a URL
    NewTab { url: String },
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Login,
    Landing,
    Reports,
}

#[derive(Debug)]
struct State {
    page: Page,
    current_url: String,
    accept_login: bool,
    view_all_link: bool,
    water_tab: bool,
    date_filter: bool,
    download_button: bool,
    rows: Vec<MockRow>,
    unreadable_rows: HashSet<usize>,
    postback: bool,
    rendered: HashSet<String>,
    behavior: DownloadBehavior,
    pending_download: Option<DownloadEvent>,
    extra_tabs: Vec<TabInfo>,
    closed_tabs: Vec<String>,
    clicks: Vec<String>,
    filled: Vec<(String, String)>,
    quit: bool,
}

pub struct MockDriver {
    layout: PortalLayout,
    download_dir: PathBuf,
    state: Mutex<State>,
}

impl MockDriver {
    /// `download_dir` receives files for [`DownloadBehavior::Saved`]
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            layout: PortalLayout::default(),
            download_dir: download_dir.into(),
            state: Mutex::new(State {
                page: Page::Login,
                current_url: "about:blank".to_string(),
                accept_login: true,
                view_all_link: true,
                water_tab: true,
                date_filter: true,
                download_button: true,
                rows: Vec::new(),
                unreadable_rows: HashSet::new(),
                postback: false,
                rendered: HashSet::new(),
                behavior: DownloadBehavior::Nothing,
                pending_download: None,
                extra_tabs: Vec::new(),
                closed_tabs: Vec::new(),
                clicks: Vec::new(),
                filled: Vec::new(),
                quit: false,
            }),
        }
    }

    fn update(self, f: impl FnOnce(&mut State)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn with_rows(self, rows: Vec<MockRow>) -> Self {
        self.update(|s| s.rows = rows)
    }

    pub fn with_behavior(self, behavior: DownloadBehavior) -> Self {
        self.update(|s| s.behavior = behavior)
    }

    pub fn rejecting_login(self) -> Self {
        self.update(|s| s.accept_login = false)
    }

    pub fn without_view_all_link(self) -> Self {
        self.update(|s| s.view_all_link = false)
    }

    pub fn without_water_tab(self) -> Self {
        self.update(|s| s.water_tab = false)
    }

    pub fn without_date_filter(self) -> Self {
        self.update(|s| s.date_filter = false)
    }

    pub fn without_download_button(self) -> Self {
        self.update(|s| s.download_button = false)
    }

    pub fn with_unreadable_row(self, index: usize) -> Self {
        self.update(|s| {
            s.unreadable_rows.insert(index);
        })
    }

    /// Checkbox clicks re-render the grid and invalidate row handles
    pub fn with_postback(self) -> Self {
        self.update(|s| s.postback = true)
    }

    /// Start on the report table, as if login and filtering already ran
    pub fn on_reports_page(self) -> Self {
        self.update(|s| {
            s.page = Page::Reports;
            s.current_url = "https://portal.test/Reports.aspx".to_string();
        })
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn click_count(&self, id: &str) -> usize {
        self.state.lock().unwrap().clicks.iter().filter(|c| *c == id).count()
    }

    pub fn filled(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().filled.clone()
    }

    pub fn row_checked(&self, index: usize) -> bool {
        self.state.lock().unwrap().rows[index].checked
    }

    pub fn closed_tabs(&self) -> Vec<String> {
        self.state.lock().unwrap().closed_tabs.clone()
    }

    pub fn quit_called(&self) -> bool {
        self.state.lock().unwrap().quit
    }

    fn ids(ids: &[&str]) -> Vec<ElementHandle> {
        ids.iter().map(|id| ElementHandle(id.to_string())).collect()
    }

    fn row_index(id: &str) -> Option<usize> {
        id.strip_prefix("row-")?.split('-').next()?.parse().ok()
    }

    fn stale(id: &str) -> DriverError {
        DriverError::StaleElement(format!("{} is not attached to the page document", id))
    }

    /// Row handles must come from the current rendering of the grid
    fn check_live(state: &State, element: &ElementHandle) -> Result<(), DriverError> {
        if state.postback && element.0.starts_with("row-") && !state.rendered.contains(&element.0) {
            return Err(Self::stale(&element.0));
        }
        Ok(())
    }

    fn trigger_download(&self, state: &mut State) -> Result<(), DriverError> {
        match state.behavior.clone() {
            DownloadBehavior::Saved { name, bytes } => {
                let path = self.download_dir.join(&name);
                std::fs::write(&path, bytes)?;
                state.pending_download = Some(DownloadEvent {
                    suggested_name: name,
                    saved_path: Some(path),
                    url: None,
                });
            }
            DownloadBehavior::Url { name, url } => {
                state.pending_download = Some(DownloadEvent {
                    suggested_name: name,
                    saved_path: None,
                    url: Some(url),
                });
            }
            DownloadBehavior::Navigate { url } => state.current_url = url,
            DownloadBehavior::NewTab { url } => state.extra_tabs.push(TabInfo {
                handle: TabHandle("tab-2".to_string()),
                url,
                is_main: false,
            }),
            DownloadBehavior::Nothing => {}
        }
        Ok(())
    }
}

#[async_trait]
impl PortalDriver for MockDriver {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.current_url = url.to_string();
        state.page = Page::Login;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.state.lock().unwrap().current_url.clone())
    }

    async fn wait_ready(&self, _timeout: Duration) -> Result<(), DriverError> {
        Ok(())
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError> {
        let mut state = self.state.lock().unwrap();
        let l = &self.layout;
        let on = |page: Page| state.page == page;

        let found = if *locator == l.username_field {
            if on(Page::Login) { Self::ids(&["username"]) } else { vec![] }
        } else if *locator == l.password_field {
            if on(Page::Login) { Self::ids(&["password"]) } else { vec![] }
        } else if *locator == l.login_button {
            if on(Page::Login) { Self::ids(&["submit"]) } else { vec![] }
        } else if *locator == l.view_all_link {
            if on(Page::Landing) && state.view_all_link { Self::ids(&["view-all"]) } else { vec![] }
        } else if *locator == l.water_tab {
            if !on(Page::Login) && state.water_tab { Self::ids(&["water-tab"]) } else { vec![] }
        } else if *locator == l.start_date_field {
            if on(Page::Reports) && state.date_filter { Self::ids(&["start-date"]) } else { vec![] }
        } else if *locator == l.end_date_field {
            if on(Page::Reports) && state.date_filter { Self::ids(&["end-date"]) } else { vec![] }
        } else if *locator == l.update_range_button {
            if on(Page::Reports) && state.date_filter { Self::ids(&["update"]) } else { vec![] }
        } else if *locator == l.report_rows {
            if on(Page::Reports) {
                (0..state.rows.len()).map(|i| ElementHandle(format!("row-{}", i))).collect()
            } else {
                vec![]
            }
        } else if *locator == l.download_button {
            if on(Page::Reports) && state.download_button { Self::ids(&["download"]) } else { vec![] }
        } else {
            vec![]
        };
        if *locator == l.report_rows {
            state.rendered.extend(found.iter().map(|h| h.0.clone()));
        }
        Ok(found)
    }

    async fn find_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let mut state = self.state.lock().unwrap();
        Self::check_live(&state, parent)?;
        let index = Self::row_index(&parent.0)
            .ok_or_else(|| DriverError::NoSuchElement(parent.0.clone()))?;
        if state.unreadable_rows.contains(&index) {
            return Err(Self::stale(&parent.0));
        }
        let row = state
            .rows
            .get(index)
            .ok_or_else(|| DriverError::NoSuchElement(parent.0.clone()))?;

        let found: Vec<ElementHandle> = if *locator == self.layout.row_checkbox {
            if row.checkbox {
                vec![ElementHandle(format!("row-{}-cb", index))]
            } else {
                vec![]
            }
        } else if *locator == self.layout.row_cells {
            (0..row.cells.len())
                .map(|j| ElementHandle(format!("row-{}-cell-{}", index, j)))
                .collect()
        } else {
            vec![]
        };
        state.rendered.extend(found.iter().map(|h| h.0.clone()));
        Ok(found)
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let state = self.state.lock().unwrap();
        Self::check_live(&state, element)?;
        let parts: Vec<&str> = element.0.split('-').collect();
        match parts.as_slice() {
            ["row", i, "cell", j] => {
                let i: usize = i.parse().map_err(|_| DriverError::NoSuchElement(element.0.clone()))?;
                let j: usize = j.parse().map_err(|_| DriverError::NoSuchElement(element.0.clone()))?;
                Ok(state.rows[i].cells[j].clone())
            }
            _ => Ok(String::new()),
        }
    }

    async fn is_checked(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let state = self.state.lock().unwrap();
        Self::check_live(&state, element)?;
        let index = Self::row_index(&element.0)
            .ok_or_else(|| DriverError::NoSuchElement(element.0.clone()))?;
        Ok(state.rows[index].checked)
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        Self::check_live(&state, element)?;
        state.clicks.push(element.0.clone());
        match element.0.as_str() {
            "submit" => {
                if state.accept_login {
                    state.page = Page::Landing;
                    state.current_url = "https://portal.test/Default.aspx".to_string();
                }
            }
            "water-tab" => {
                state.page = Page::Reports;
                state.current_url = "https://portal.test/Reports.aspx".to_string();
            }
            "download" => self.trigger_download(&mut state)?,
            id if id.ends_with("-cb") => {
                if let Some(index) = Self::row_index(id) {
                    let row = &mut state.rows[index];
                    row.checked = !row.checked;
                }
                if state.postback {
                    state.rendered.clear();
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        self.state
            .lock()
            .unwrap()
            .filled
            .push((element.0.clone(), value.to_string()));
        Ok(())
    }

    async fn wait_for_download(
        &self,
        _timeout: Duration,
    ) -> Result<Option<DownloadEvent>, DriverError> {
        Ok(self.state.lock().unwrap().pending_download.take())
    }

    async fn tabs(&self) -> Result<Vec<TabInfo>, DriverError> {
        let state = self.state.lock().unwrap();
        let mut tabs = vec![TabInfo {
            handle: TabHandle("main".to_string()),
            url: state.current_url.clone(),
            is_main: true,
        }];
        tabs.extend(state.extra_tabs.iter().cloned());
        Ok(tabs)
    }

    async fn close_tab(&self, tab: &TabHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.extra_tabs.retain(|t| t.handle != *tab);
        state.closed_tabs.push(tab.0.clone());
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>, DriverError> {
        Ok(vec![BrowserCookie {
            name: SESSION_COOKIE.0.to_string(),
            value: SESSION_COOKIE.1.to_string(),
        }])
    }

    async fn quit(&self) -> Result<(), DriverError> {
        self.state.lock().unwrap().quit = true;
        Ok(())
    }
}
