//! TabManager tab lifecycle: acquisition, load waiting, cleanup.

use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::{BrowserError, TabManager};
use crate::platform::{PlatformError, TabEvent, TabId, TabStatus, UpdateTab};

impl TabManager {
    /// Get a tab for `engine` that the user is not looking at.
    ///
    /// Reuses a matching tab unless the user is viewing it; otherwise opens
    /// the engine's new-chat page out of view and waits for it to load.
    pub async fn get_or_create_engine_tab(&self, engine: &str) -> Result<TabId, BrowserError> {
        let lock = self.engine_lock(engine);
        let _guard = lock.lock().await;

        if let Some(tab) = self.find_engine_tab(engine).await {
            if self.is_tab_active_by_user(&tab.id).await {
                info!("User is viewing {} tab {}, opening a fresh one", engine, tab.id);
            } else {
                if let Err(e) = self.platform.update_tab(&tab.id, UpdateTab::deactivate()).await {
                    debug!("Could not deactivate tab {}: {}", tab.id, e);
                }
                debug!("Reusing {} tab {}", engine, tab.id);
                return Ok(tab.id);
            }
        }

        let def = self
            .engines
            .get(engine)
            .ok_or_else(|| BrowserError::UnknownEngine(engine.to_string()))?;

        let (tab, placement) = self.open_crawl_tab(&def.new_chat_url).await?;
        info!("Opened {} tab {} ({:?})", engine, tab.id, placement);

        self.registry.insert(engine.to_string(), tab.id.clone());
        self.wait_for_tab_load(&tab.id, self.config.tab_load_timeout).await?;
        Ok(tab.id)
    }

    /// Wait until the tab reports load complete, then the settle delay.
    ///
    /// The event subscription is released before this returns, on success,
    /// timeout and error alike.
    pub async fn wait_for_tab_load(&self, tab_id: &TabId, timeout: Duration) -> Result<(), BrowserError> {
        let events = self.platform.subscribe_tab_events();

        match tokio::time::timeout(timeout, self.load_complete(tab_id, events)).await {
            Ok(Ok(())) => {
                tokio::time::sleep(self.config.settle_delay).await;
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!("Tab {} did not load within {:?}", tab_id, timeout);
                Err(BrowserError::TabLoadTimeout {
                    tab: tab_id.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Resolve once `tab_id` is complete. Owns the receiver so dropping the
    /// future unsubscribes.
    async fn load_complete(
        &self,
        tab_id: &TabId,
        mut events: broadcast::Receiver<TabEvent>,
    ) -> Result<(), BrowserError> {
        // The tab may have finished before we subscribed.
        if self.is_complete(tab_id).await? {
            return Ok(());
        }

        loop {
            match events.recv().await {
                Ok(TabEvent::Updated { tab_id: id, status }) if &id == tab_id => {
                    if status == TabStatus::Complete {
                        return Ok(());
                    }
                }
                Ok(TabEvent::Removed { tab_id: id }) if &id == tab_id => {
                    return Err(BrowserError::TabClosed(id));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Missed {} tab events, re-checking {}", skipped, tab_id);
                    if self.is_complete(tab_id).await? {
                        return Ok(());
                    }
                }
                Err(RecvError::Closed) => {
                    return Err(BrowserError::Platform(PlatformError::Connection(
                        "tab event stream closed".to_string(),
                    )));
                }
            }
        }
    }

    async fn is_complete(&self, tab_id: &TabId) -> Result<bool, BrowserError> {
        match self.platform.get_tab(tab_id).await {
            Ok(tab) => Ok(tab.status == TabStatus::Complete),
            Err(PlatformError::TabNotFound(id)) => Err(BrowserError::TabClosed(id)),
            Err(e) => {
                debug!("Status check on {} failed: {}", tab_id, e);
                Ok(false)
            }
        }
    }

    /// Close the engine's tab, if any. Already-closed tabs are fine.
    pub async fn close_engine_tab(&self, engine: &str) {
        if let Some((_, tab_id)) = self.registry.remove(engine) {
            self.remove_tab_quietly(&tab_id).await;
        }
    }

    /// Close every registered tab and the crawl window.
    pub async fn close_all_crawl_tabs(&self) {
        let entries: Vec<(String, TabId)> = self
            .registry
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        for (engine, tab_id) in entries {
            self.registry.remove_if(&engine, |_, id| id == &tab_id);
            self.remove_tab_quietly(&tab_id).await;
        }

        let mut crawl = self.crawl.lock().await;
        if let Some(window_id) = crawl.window.take() {
            if let Err(e) = self.platform.remove_window(window_id).await {
                debug!("Crawl window {} already gone: {}", window_id, e);
            }
        }
        crawl.group = None;
        info!("Closed all crawl tabs");
    }

    /// Drop registry entries whose tab no longer exists.
    pub async fn cleanup_tabs(&self) -> usize {
        let entries: Vec<(String, TabId)> = self
            .registry
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut removed = 0;
        for (engine, tab_id) in entries {
            if self.platform.get_tab(&tab_id).await.is_err()
                && self.registry.remove_if(&engine, |_, id| id == &tab_id).is_some()
            {
                debug!("Dropped stale {} tab {}", engine, tab_id);
                removed += 1;
            }
        }
        removed
    }

    async fn remove_tab_quietly(&self, tab_id: &TabId) {
        match self.platform.remove_tab(tab_id).await {
            Ok(()) => debug!("Closed tab {}", tab_id),
            Err(e) => debug!("Tab {} already closed: {}", tab_id, e),
        }
    }
}
