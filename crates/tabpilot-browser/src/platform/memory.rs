//! In-memory browser used by tests and dry runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{
    CreateTab, CreateWindow, GroupId, MessageTransport, PlatformCapabilities, PlatformError,
    TabEvent, TabId, TabInfo, TabPlatform, TabStatus, UpdateTab, WindowId, WindowInfo,
    WindowState,
};

type Responder = Arc<dyn Fn(&TabId, &Value) -> Option<Value> + Send + Sync>;

/// A tab group as the fake browser sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub title: String,
    pub collapsed: bool,
    pub tabs: Vec<TabId>,
}

#[derive(Default)]
struct MemoryState {
    tabs: Vec<TabInfo>,
    windows: BTreeMap<i64, WindowInfo>,
    groups: BTreeMap<i64, GroupInfo>,
    next_tab: u64,
    next_window: i64,
    next_group: i64,
    auto_complete: bool,
    fail_window_creation: bool,
    capabilities: PlatformCapabilities,
    responder: Option<Responder>,
    sent: Vec<(TabId, Value)>,
}

impl MemoryState {
    fn tab_mut(&mut self, id: &TabId) -> Result<&mut TabInfo, PlatformError> {
        self.tabs
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| PlatformError::TabNotFound(id.clone()))
    }

    fn current_window(&self) -> Option<WindowId> {
        self.windows
            .values()
            .find(|w| w.focused)
            .or_else(|| {
                self.windows
                    .values()
                    .find(|w| w.state != WindowState::Minimized)
            })
            .map(|w| w.id)
    }

    fn select_tab(&mut self, id: &TabId, window_id: Option<WindowId>) {
        for tab in self.tabs.iter_mut().filter(|t| t.window_id == window_id) {
            tab.active = &tab.id == id;
        }
    }

    fn add_window(&mut self, focused: bool, state: WindowState) -> WindowInfo {
        self.next_window += 1;
        if focused {
            for w in self.windows.values_mut() {
                w.focused = false;
            }
        }
        let window = WindowInfo {
            id: WindowId(self.next_window),
            focused,
            state,
        };
        self.windows.insert(window.id.0, window.clone());
        window
    }

    fn add_tab(&mut self, url: String, window_id: Option<WindowId>, active: bool, status: TabStatus) -> TabInfo {
        self.next_tab += 1;
        let tab = TabInfo {
            id: TabId(format!("tab-{}", self.next_tab)),
            url,
            window_id,
            active: false,
            status,
        };
        self.tabs.push(tab.clone());
        if active {
            self.select_tab(&tab.id, window_id);
        }
        TabInfo { active, ..tab }
    }
}

/// In-memory [`TabPlatform`] and [`MessageTransport`].
///
/// Starts with one focused normal window. Tabs it creates stay `loading`
/// until [`MemoryPlatform::complete_tab`] is called, unless auto-complete is
/// switched on. Content-script messages hang forever until a responder is
/// installed.
pub struct MemoryPlatform {
    state: Mutex<MemoryState>,
    events: broadcast::Sender<TabEvent>,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlatform {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        let mut state = MemoryState::default();
        state.add_window(true, WindowState::Normal);
        Self {
            state: Mutex::new(state),
            events,
        }
    }

    pub fn with_capabilities(self, capabilities: PlatformCapabilities) -> Self {
        self.state.lock().capabilities = capabilities;
        self
    }

    /// Newly created tabs report `complete` right away.
    pub fn set_auto_complete(&self, enabled: bool) {
        self.state.lock().auto_complete = enabled;
    }

    pub fn set_fail_window_creation(&self, fail: bool) {
        self.state.lock().fail_window_creation = fail;
    }

    /// Script the content script: called for every message sent.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&TabId, &Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.state.lock().responder = Some(Arc::new(responder));
    }

    /// Open a loaded tab the way a user would.
    pub fn open_tab(&self, url: &str, window_id: WindowId, active: bool) -> TabId {
        let mut state = self.state.lock();
        state
            .add_tab(url.to_string(), Some(window_id), active, TabStatus::Complete)
            .id
    }

    /// The window the fake browser starts with.
    pub fn main_window(&self) -> WindowId {
        WindowId(1)
    }

    /// Finish loading a tab and notify subscribers.
    pub fn complete_tab(&self, id: &TabId) {
        let found = {
            let mut state = self.state.lock();
            match state.tab_mut(id) {
                Ok(tab) => {
                    tab.status = TabStatus::Complete;
                    true
                }
                Err(_) => false,
            }
        };
        if found {
            let _ = self.events.send(TabEvent::Updated {
                tab_id: id.clone(),
                status: TabStatus::Complete,
            });
        }
    }

    /// Close a tab behind the manager's back.
    pub fn close_tab(&self, id: &TabId) {
        let removed = {
            let mut state = self.state.lock();
            let before = state.tabs.len();
            state.tabs.retain(|t| &t.id != id);
            before != state.tabs.len()
        };
        if removed {
            let _ = self.events.send(TabEvent::Removed { tab_id: id.clone() });
        }
    }

    /// Give OS focus to `window_id` and select `tab` in it.
    pub fn focus(&self, window_id: WindowId, tab: Option<&TabId>) {
        let mut state = self.state.lock();
        for w in state.windows.values_mut() {
            w.focused = w.id == window_id;
        }
        if let Some(tab) = tab {
            state.select_tab(tab, Some(window_id));
        }
    }

    /// Take focus away from every window.
    pub fn blur_all(&self) {
        for w in self.state.lock().windows.values_mut() {
            w.focused = false;
        }
    }

    pub fn tab(&self, id: &TabId) -> Option<TabInfo> {
        self.state.lock().tabs.iter().find(|t| &t.id == id).cloned()
    }

    pub fn tabs(&self) -> Vec<TabInfo> {
        self.state.lock().tabs.clone()
    }

    pub fn windows(&self) -> Vec<WindowInfo> {
        self.state.lock().windows.values().cloned().collect()
    }

    pub fn group(&self, id: GroupId) -> Option<GroupInfo> {
        self.state.lock().groups.get(&id.0).cloned()
    }

    pub fn group_of(&self, tab: &TabId) -> Option<GroupId> {
        self.state
            .lock()
            .groups
            .iter()
            .find(|(_, g)| g.tabs.contains(tab))
            .map(|(id, _)| GroupId(*id))
    }

    /// Messages sent to content scripts so far.
    pub fn sent_messages(&self) -> Vec<(TabId, Value)> {
        self.state.lock().sent.clone()
    }

    /// Live tab-event subscriptions.
    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }
}

#[async_trait]
impl TabPlatform for MemoryPlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        self.state.lock().capabilities
    }

    async fn get_tab(&self, id: &TabId) -> Result<TabInfo, PlatformError> {
        self.state
            .lock()
            .tabs
            .iter()
            .find(|t| &t.id == id)
            .cloned()
            .ok_or_else(|| PlatformError::TabNotFound(id.clone()))
    }

    async fn query_tabs(&self) -> Result<Vec<TabInfo>, PlatformError> {
        Ok(self.tabs())
    }

    async fn create_tab(&self, options: CreateTab) -> Result<TabInfo, PlatformError> {
        let mut state = self.state.lock();
        let window_id = match options.window_id {
            Some(id) if state.windows.contains_key(&id.0) => id,
            Some(id) => return Err(PlatformError::WindowNotFound(id)),
            None => state
                .current_window()
                .ok_or_else(|| PlatformError::Backend("no open window".to_string()))?,
        };
        let status = if state.auto_complete {
            TabStatus::Complete
        } else {
            TabStatus::Loading
        };
        Ok(state.add_tab(options.url, Some(window_id), options.active, status))
    }

    async fn update_tab(&self, id: &TabId, update: UpdateTab) -> Result<TabInfo, PlatformError> {
        let navigated = update.url.is_some();
        let tab = {
            let mut state = self.state.lock();
            let window_id = state.tab_mut(id)?.window_id;
            match update.active {
                Some(true) => state.select_tab(id, window_id),
                Some(false) => state.tab_mut(id)?.active = false,
                None => {}
            }
            let tab = state.tab_mut(id)?;
            if let Some(url) = update.url {
                tab.url = url;
                tab.status = TabStatus::Loading;
            }
            tab.clone()
        };
        if navigated {
            let _ = self.events.send(TabEvent::Updated {
                tab_id: id.clone(),
                status: TabStatus::Loading,
            });
        }
        Ok(tab)
    }

    async fn remove_tab(&self, id: &TabId) -> Result<(), PlatformError> {
        {
            let mut state = self.state.lock();
            state.tab_mut(id)?;
            state.tabs.retain(|t| &t.id != id);
            for group in state.groups.values_mut() {
                group.tabs.retain(|t| t != id);
            }
        }
        let _ = self.events.send(TabEvent::Removed { tab_id: id.clone() });
        Ok(())
    }

    async fn get_window(&self, id: WindowId) -> Result<WindowInfo, PlatformError> {
        self.state
            .lock()
            .windows
            .get(&id.0)
            .cloned()
            .ok_or(PlatformError::WindowNotFound(id))
    }

    async fn create_window(&self, options: CreateWindow) -> Result<WindowInfo, PlatformError> {
        let mut state = self.state.lock();
        if state.fail_window_creation {
            return Err(PlatformError::Backend("window creation refused".to_string()));
        }
        if options.state == WindowState::Minimized && !state.capabilities.minimized_windows {
            return Err(PlatformError::Unsupported("minimized windows"));
        }
        Ok(state.add_window(options.focused, options.state))
    }

    async fn remove_window(&self, id: WindowId) -> Result<(), PlatformError> {
        let closed: Vec<TabId> = {
            let mut state = self.state.lock();
            if state.windows.remove(&id.0).is_none() {
                return Err(PlatformError::WindowNotFound(id));
            }
            let closed = state
                .tabs
                .iter()
                .filter(|t| t.window_id == Some(id))
                .map(|t| t.id.clone())
                .collect();
            state.tabs.retain(|t| t.window_id != Some(id));
            closed
        };
        for tab_id in closed {
            let _ = self.events.send(TabEvent::Removed { tab_id });
        }
        Ok(())
    }

    async fn group_tabs(
        &self,
        tabs: &[TabId],
        group: Option<GroupId>,
    ) -> Result<GroupId, PlatformError> {
        let mut state = self.state.lock();
        if !state.capabilities.tab_groups {
            return Err(PlatformError::Unsupported("tab groups"));
        }
        for tab in tabs {
            state.tab_mut(tab)?;
        }
        let id = match group {
            Some(id) if state.groups.contains_key(&id.0) => id,
            Some(id) => return Err(PlatformError::GroupNotFound(id.0)),
            None => {
                state.next_group += 1;
                let id = GroupId(state.next_group);
                state.groups.insert(
                    id.0,
                    GroupInfo {
                        title: String::new(),
                        collapsed: false,
                        tabs: Vec::new(),
                    },
                );
                id
            }
        };
        for existing in state.groups.values_mut() {
            existing.tabs.retain(|t| !tabs.contains(t));
        }
        if let Some(entry) = state.groups.get_mut(&id.0) {
            entry.tabs.extend(tabs.iter().cloned());
        }
        Ok(id)
    }

    async fn update_group(
        &self,
        group: GroupId,
        title: &str,
        collapsed: bool,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        let entry = state
            .groups
            .get_mut(&group.0)
            .ok_or(PlatformError::GroupNotFound(group.0))?;
        entry.title = title.to_string();
        entry.collapsed = collapsed;
        Ok(())
    }

    fn subscribe_tab_events(&self) -> broadcast::Receiver<TabEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl MessageTransport for MemoryPlatform {
    async fn send_message(&self, tab: &TabId, message: Value) -> Result<Option<Value>, PlatformError> {
        let responder = {
            let mut state = self.state.lock();
            if !state.tabs.iter().any(|t| &t.id == tab) {
                return Err(PlatformError::Connection(format!(
                    "could not establish connection with tab {}",
                    tab
                )));
            }
            state.sent.push((tab.clone(), message.clone()));
            state.responder.clone()
        };
        match responder {
            Some(respond) => Ok(respond(tab, &message)),
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
