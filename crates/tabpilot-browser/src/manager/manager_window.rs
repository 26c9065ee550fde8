//! Crawl window and tab group: best-effort containers for automation tabs.

use tracing::{debug, info, warn};

use super::TabManager;
use crate::platform::{CreateTab, CreateWindow, TabId, TabInfo, WindowId};

/// How a new automation tab is kept out of the user's way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Inside the minimized crawl window.
    ///
    /// Over CDP only the first tab lands in the crawl window itself, taking
    /// over its blank page. Later tabs each get a minimized window of their
    /// own, and the window id carried here is the one they were asked for.
    CrawlWindow(WindowId),
    /// Unfocused in the current window, grouped when possible.
    Background,
}

impl TabManager {
    /// The minimized crawl window, created on first need.
    ///
    /// Returns `None` when the platform cannot minimize windows or creation
    /// fails. Never errors.
    pub async fn get_or_create_crawl_window(&self) -> Option<WindowId> {
        let mut crawl = self.crawl.lock().await;

        if let Some(id) = crawl.window {
            match self.platform.get_window(id).await {
                Ok(_) => return Some(id),
                Err(_) => {
                    debug!("Crawl window {} is gone", id);
                    crawl.window = None;
                }
            }
        }

        if !self.platform.capabilities().minimized_windows {
            return None;
        }

        match self.platform.create_window(CreateWindow::minimized()).await {
            Ok(window) => {
                info!("Created crawl window {}", window.id);
                crawl.window = Some(window.id);
                Some(window.id)
            }
            Err(e) => {
                warn!("Could not create crawl window: {}", e);
                None
            }
        }
    }

    /// Put a tab into the shared, collapsed crawl group. Failures are
    /// swallowed.
    pub async fn group_crawl_tab(&self, tab_id: &TabId) {
        if !self.platform.capabilities().tab_groups {
            return;
        }

        let mut crawl = self.crawl.lock().await;
        let existing = crawl.group;

        match self.platform.group_tabs(std::slice::from_ref(tab_id), existing).await {
            Ok(group) if existing == Some(group) => {}
            Ok(group) => {
                crawl.group = Some(group);
                if let Err(e) = self
                    .platform
                    .update_group(group, &self.config.crawl_group_title, true)
                    .await
                {
                    debug!("Could not label crawl group: {}", e);
                }
            }
            Err(e) => {
                debug!("Could not group tab {}: {}", tab_id, e);
                // A stale group id is replaced on the next call.
                if existing.is_some() {
                    crawl.group = None;
                }
            }
        }
    }

    /// Open an automation tab on the best rung the platform supports.
    pub(super) async fn open_crawl_tab(&self, url: &str) -> Result<(TabInfo, Placement), super::BrowserError> {
        if let Some(window_id) = self.get_or_create_crawl_window().await {
            match self
                .platform
                .create_tab(CreateTab::background(url).in_window(window_id))
                .await
            {
                Ok(tab) => return Ok((tab, Placement::CrawlWindow(window_id))),
                Err(e) => warn!("Could not open tab in crawl window {}: {}", window_id, e),
            }
        }

        let tab = self.platform.create_tab(CreateTab::background(url)).await?;
        self.group_crawl_tab(&tab.id).await;
        Ok((tab, Placement::Background))
    }
}
