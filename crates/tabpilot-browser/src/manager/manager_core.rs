//! TabManager core: struct definition, registry lookups, user activity.

use std::sync::Arc;

use dashmap::DashMap;
use tabpilot_workqueue::QueryTask;
use tokio::sync::Mutex;
use tracing::debug;

use super::{BrowserError, TabManagerConfig};
use crate::dispatch::{ContentResult, ExecutionDispatcher};
use crate::engines::EngineRegistry;
use crate::platform::{GroupId, MessageTransport, TabId, TabInfo, TabPlatform, WindowId};

/// Shared low-visibility containers for automation tabs.
#[derive(Debug, Default)]
pub(super) struct CrawlResources {
    pub(super) window: Option<WindowId>,
    pub(super) group: Option<GroupId>,
}

/// Owns the engine → tab mapping and the crawl window/group.
///
/// Registry entries are back-references: the browser owns the tabs and can
/// close them at any time, so every read re-validates before trusting one.
pub struct TabManager {
    pub(super) platform: Arc<dyn TabPlatform>,
    pub(super) engines: EngineRegistry,
    pub(super) config: TabManagerConfig,
    pub(super) dispatcher: ExecutionDispatcher,
    pub(super) registry: DashMap<String, TabId>,
    /// Serializes tab acquisition per engine.
    pub(super) engine_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Guards first use of the crawl singletons.
    pub(super) crawl: Mutex<CrawlResources>,
}

impl TabManager {
    pub fn new(
        platform: Arc<dyn TabPlatform>,
        transport: Arc<dyn MessageTransport>,
        engines: EngineRegistry,
        config: TabManagerConfig,
    ) -> Self {
        let dispatcher = ExecutionDispatcher::new(transport, config.task_execution_timeout);
        Self {
            platform,
            engines,
            config,
            dispatcher,
            registry: DashMap::new(),
            engine_locks: DashMap::new(),
            crawl: Mutex::new(CrawlResources::default()),
        }
    }

    pub fn config(&self) -> &TabManagerConfig {
        &self.config
    }

    pub fn engines(&self) -> &EngineRegistry {
        &self.engines
    }

    /// Cached tab for an engine, without validation.
    pub fn registered_tab(&self, engine: &str) -> Option<TabId> {
        self.registry.get(engine).map(|entry| entry.value().clone())
    }

    pub fn registered_count(&self) -> usize {
        self.registry.len()
    }

    /// The crawl window currently cached, without validation.
    pub async fn crawl_window(&self) -> Option<WindowId> {
        self.crawl.lock().await.window
    }

    /// The crawl tab group currently cached.
    pub async fn crawl_group(&self) -> Option<GroupId> {
        self.crawl.lock().await.group
    }

    /// True only when the tab is selected in a window that has OS focus.
    /// Platform errors count as "not active".
    pub async fn is_tab_active_by_user(&self, tab_id: &TabId) -> bool {
        let tab = match self.platform.get_tab(tab_id).await {
            Ok(tab) => tab,
            Err(e) => {
                debug!("Activity check on {} failed: {}", tab_id, e);
                return false;
            }
        };
        if !tab.active {
            return false;
        }
        let Some(window_id) = tab.window_id else {
            return false;
        };
        match self.platform.get_window(window_id).await {
            Ok(window) => window.focused,
            Err(_) => false,
        }
    }

    /// Find a live tab for `engine`: the cached one if it still exists and
    /// still shows the engine, otherwise the first open tab that does.
    pub async fn find_engine_tab(&self, engine: &str) -> Option<TabInfo> {
        let def = self.engines.get(engine)?;

        if let Some(cached) = self.registered_tab(engine) {
            match self.platform.get_tab(&cached).await {
                Ok(tab) if def.matches_url(&tab.url) => return Some(tab),
                Ok(tab) => {
                    debug!("Tab {} for {} navigated away to {}", cached, engine, tab.url);
                    self.registry.remove_if(engine, |_, id| id == &cached);
                }
                Err(_) => {
                    debug!("Tab {} for {} is gone", cached, engine);
                    self.registry.remove_if(engine, |_, id| id == &cached);
                }
            }
        }

        let tabs = match self.platform.query_tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                debug!("Tab scan for {} failed: {}", engine, e);
                return None;
            }
        };
        let found = tabs.into_iter().find(|tab| def.matches_url(&tab.url))?;
        debug!("Found open {} tab {}", engine, found.id);
        self.registry.insert(engine.to_string(), found.id.clone());
        Some(found)
    }

    /// Run a task in a tab through the content script.
    pub async fn execute_task_in_tab(
        &self,
        tab: &TabId,
        task: &QueryTask,
    ) -> Result<ContentResult, BrowserError> {
        self.dispatcher.execute_task_in_tab(tab, task).await
    }

    pub(super) fn engine_lock(&self, engine: &str) -> Arc<Mutex<()>> {
        self.engine_locks
            .entry(engine.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
