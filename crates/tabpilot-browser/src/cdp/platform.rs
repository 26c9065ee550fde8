//! [`TabPlatform`] over the Chrome DevTools Protocol.
//!
//! Tabs are page targets and windows are browser windows. CDP cannot place a
//! new target into an existing window: a tab requested for a window takes
//! over that window's blank placeholder page if it still has one, and gets a
//! minimized window of its own otherwise. Tab groups do not exist in CDP.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::client::CdpClient;
use super::error::CdpError;
use super::protocol::{dispatch_expression, CdpEvent, PageState, PAGE_STATE_EXPRESSION};
use super::session::PageSession;
use crate::platform::{
    CreateTab, CreateWindow, GroupId, MessageTransport, PlatformCapabilities, PlatformError,
    TabEvent, TabId, TabInfo, TabPlatform, TabStatus, UpdateTab, WindowId, WindowInfo,
    WindowState,
};

/// Blank pages opened with new windows, waiting to be taken over by the
/// first tab created for that window.
#[derive(Debug, Default)]
pub(crate) struct Placeholders(DashMap<i64, String>);

impl Placeholders {
    pub(crate) fn record(&self, window_id: i64, target_id: String) {
        self.0.insert(window_id, target_id);
    }

    /// Claim the window's placeholder page. Each placeholder is handed out once.
    pub(crate) fn take(&self, window_id: i64) -> Option<String> {
        self.0.remove(&window_id).map(|(_, target)| target)
    }

    pub(crate) fn forget_window(&self, window_id: i64) {
        self.0.remove(&window_id);
    }

    pub(crate) fn forget_target(&self, target_id: &str) {
        self.0.retain(|_, target| target != target_id);
    }
}

/// The user's Chrome, driven over CDP.
pub struct CdpPlatform {
    client: Arc<CdpClient>,
    /// target id → attached session.
    sessions: Arc<DashMap<String, Arc<PageSession>>>,
    placeholders: Arc<Placeholders>,
    tab_events: broadcast::Sender<TabEvent>,
    pump: tokio::task::JoinHandle<()>,
}

impl CdpPlatform {
    /// Connect to Chrome's debugging endpoint and start tracking targets.
    pub async fn connect(endpoint: &str) -> Result<Self, CdpError> {
        let client = Arc::new(CdpClient::connect(endpoint).await?);
        client
            .call("Target.setDiscoverTargets", Some(serde_json::json!({"discover": true})))
            .await?;

        let sessions: Arc<DashMap<String, Arc<PageSession>>> = Arc::new(DashMap::new());
        let placeholders = Arc::new(Placeholders::default());
        let (tab_events, _) = broadcast::channel(256);

        let pump = {
            let events = client.subscribe_events();
            let sessions = sessions.clone();
            let placeholders = placeholders.clone();
            let tab_events = tab_events.clone();
            tokio::spawn(async move {
                Self::pump_events(events, sessions, placeholders, tab_events).await;
            })
        };

        info!("Connected to browser at {}", endpoint);
        Ok(Self {
            client,
            sessions,
            placeholders,
            tab_events,
            pump,
        })
    }

    /// Translate protocol events into tab events.
    async fn pump_events(
        mut events: broadcast::Receiver<CdpEvent>,
        sessions: Arc<DashMap<String, Arc<PageSession>>>,
        placeholders: Arc<Placeholders>,
        tab_events: broadcast::Sender<TabEvent>,
    ) {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Dropped {} CDP events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            if let Some(tab_event) = Self::translate(&event, &sessions) {
                if let TabEvent::Removed { tab_id } = &tab_event {
                    placeholders.forget_target(tab_id.as_str());
                }
                let _ = tab_events.send(tab_event);
            }
        }
    }

    fn translate(
        event: &CdpEvent,
        sessions: &DashMap<String, Arc<PageSession>>,
    ) -> Option<TabEvent> {
        let target_of_session = |session_id: &str| {
            sessions
                .iter()
                .find(|entry| entry.value().session_id() == session_id)
                .map(|entry| TabId(entry.key().clone()))
        };

        match event.method.as_str() {
            "Target.targetDestroyed" => {
                let target_id = event.params["targetId"].as_str()?.to_string();
                sessions.remove(&target_id);
                Some(TabEvent::Removed {
                    tab_id: TabId(target_id),
                })
            }
            "Page.loadEventFired" => Some(TabEvent::Updated {
                tab_id: target_of_session(event.session_id.as_deref()?)?,
                status: TabStatus::Complete,
            }),
            "Page.frameNavigated" if event.params["frame"].get("parentId").is_none() => {
                Some(TabEvent::Updated {
                    tab_id: target_of_session(event.session_id.as_deref()?)?,
                    status: TabStatus::Loading,
                })
            }
            _ => None,
        }
    }

    /// Attached session for a tab, attaching on first use.
    async fn session(&self, tab: &TabId) -> Result<Arc<PageSession>, PlatformError> {
        if let Some(session) = self.sessions.get(tab.as_str()) {
            return Ok(session.value().clone());
        }
        let session = Arc::new(self.client.attach(tab.as_str()).await?);
        self.sessions.insert(tab.0.clone(), session.clone());
        Ok(session)
    }

    async fn page_state(&self, tab: &TabId) -> Result<PageState, PlatformError> {
        let session = self.session(tab).await?;
        let value = session.evaluate(PAGE_STATE_EXPRESSION).await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    fn parse_state(state: Option<&str>) -> WindowState {
        match state {
            Some("minimized") => WindowState::Minimized,
            Some("maximized") => WindowState::Maximized,
            Some("fullscreen") => WindowState::Fullscreen,
            _ => WindowState::Normal,
        }
    }

    fn state_name(state: WindowState) -> &'static str {
        match state {
            WindowState::Normal => "normal",
            WindowState::Minimized => "minimized",
            WindowState::Maximized => "maximized",
            WindowState::Fullscreen => "fullscreen",
        }
    }

    async fn page_targets(&self) -> Result<Vec<super::protocol::TargetInfo>, PlatformError> {
        Ok(self
            .client
            .get_targets()
            .await?
            .into_iter()
            .filter(|t| t.is_page())
            .collect())
    }

    /// Navigate the window's placeholder page to `url`, if it still has one.
    async fn take_over_placeholder(&self, window_id: WindowId, url: &str) -> Option<TabInfo> {
        let tab = TabId(self.placeholders.take(window_id.0)?);
        let navigated = match self.session(&tab).await {
            Ok(session) => session.navigate(url).await.map_err(PlatformError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = navigated {
            debug!("Placeholder {} in window {} unusable: {}", tab, window_id, e);
            return None;
        }

        debug!("Reused placeholder {} in window {} for {}", tab, window_id, url);
        Some(TabInfo {
            id: tab,
            url: url.to_string(),
            window_id: Some(window_id),
            active: false,
            status: TabStatus::Loading,
        })
    }

    /// Open a page target in a window of its own.
    async fn open_in_new_window(
        &self,
        url: &str,
        options: &CreateWindow,
    ) -> Result<(String, i64), PlatformError> {
        let target_id = self.client.create_target(url, !options.focused, true).await?;
        let (window_id, _) = self.client.get_window_for_target(&target_id).await?;
        if options.state != WindowState::Normal {
            self.client
                .set_window_state(window_id, Self::state_name(options.state))
                .await?;
        }
        Ok((target_id, window_id))
    }
}

#[async_trait]
impl TabPlatform for CdpPlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities {
            minimized_windows: true,
            tab_groups: false,
        }
    }

    async fn get_tab(&self, id: &TabId) -> Result<TabInfo, PlatformError> {
        let info = self
            .client
            .get_target_info(id.as_str())
            .await
            .map_err(|_| PlatformError::TabNotFound(id.clone()))?;
        if !info.is_page() {
            return Err(PlatformError::TabNotFound(id.clone()));
        }

        let state = self.page_state(id).await?;
        let window_id = match self.client.get_window_for_target(id.as_str()).await {
            Ok((window_id, _)) => Some(WindowId(window_id)),
            Err(_) => None,
        };

        Ok(TabInfo {
            id: id.clone(),
            url: info.url,
            window_id,
            active: state.visible,
            status: if state.ready_state == "complete" {
                TabStatus::Complete
            } else {
                TabStatus::Loading
            },
        })
    }

    /// Cheap listing: ids and URLs only. Use `get_tab` for live state.
    async fn query_tabs(&self) -> Result<Vec<TabInfo>, PlatformError> {
        Ok(self
            .page_targets()
            .await?
            .into_iter()
            .map(|t| TabInfo {
                id: TabId(t.target_id),
                url: t.url,
                window_id: None,
                active: false,
                status: TabStatus::Complete,
            })
            .collect())
    }

    async fn create_tab(&self, options: CreateTab) -> Result<TabInfo, PlatformError> {
        if let Some(window_id) = options.window_id {
            if let Some(tab) = self.take_over_placeholder(window_id, &options.url).await {
                return Ok(tab);
            }
        }

        let (target_id, window_id) = match options.window_id {
            Some(_) => {
                let (target_id, window_id) = self
                    .open_in_new_window(&options.url, &CreateWindow::minimized())
                    .await?;
                (target_id, Some(WindowId(window_id)))
            }
            None => {
                let target_id = self
                    .client
                    .create_target(&options.url, !options.active, false)
                    .await?;
                (target_id, None)
            }
        };

        let tab = TabId(target_id);
        // Attach now so load events for this tab are reported.
        self.session(&tab).await?;
        debug!("Created target {} for {}", tab, options.url);

        Ok(TabInfo {
            id: tab,
            url: options.url,
            window_id,
            active: options.active,
            status: TabStatus::Loading,
        })
    }

    async fn update_tab(&self, id: &TabId, update: UpdateTab) -> Result<TabInfo, PlatformError> {
        if let Some(url) = &update.url {
            self.session(id).await?.navigate(url).await?;
        }
        if update.active == Some(true) {
            self.client.activate_target(id.as_str()).await?;
        }
        // Deactivation has no CDP equivalent; leaving the tab alone is enough.
        self.get_tab(id).await
    }

    async fn remove_tab(&self, id: &TabId) -> Result<(), PlatformError> {
        self.sessions.remove(id.as_str());
        self.client
            .close_target(id.as_str())
            .await
            .map_err(|_| PlatformError::TabNotFound(id.clone()))
    }

    async fn get_window(&self, id: WindowId) -> Result<WindowInfo, PlatformError> {
        let bounds = self
            .client
            .get_window_bounds(id.0)
            .await
            .map_err(|_| PlatformError::WindowNotFound(id))?;
        let state = Self::parse_state(bounds.window_state.as_deref());

        // Focus is only observable from inside a page we are attached to.
        let mut focused = false;
        if state != WindowState::Minimized {
            let attached: Vec<(String, Arc<PageSession>)> = self
                .sessions
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect();
            for (target_id, session) in attached {
                let in_window = matches!(
                    self.client.get_window_for_target(&target_id).await,
                    Ok((window_id, _)) if window_id == id.0
                );
                if !in_window {
                    continue;
                }
                if let Ok(value) = session.evaluate(PAGE_STATE_EXPRESSION).await {
                    let page: PageState = serde_json::from_value(value).unwrap_or_default();
                    if page.focused {
                        focused = true;
                        break;
                    }
                }
            }
        }

        Ok(WindowInfo { id, focused, state })
    }

    async fn create_window(&self, options: CreateWindow) -> Result<WindowInfo, PlatformError> {
        let (target_id, window_id) = self.open_in_new_window("about:blank", &options).await?;
        self.placeholders.record(window_id, target_id);
        Ok(WindowInfo {
            id: WindowId(window_id),
            focused: options.focused,
            state: options.state,
        })
    }

    async fn remove_window(&self, id: WindowId) -> Result<(), PlatformError> {
        self.placeholders.forget_window(id.0);
        let mut closed = 0;
        for target in self.page_targets().await? {
            if let Ok((window_id, _)) = self.client.get_window_for_target(&target.target_id).await {
                if window_id == id.0 {
                    self.remove_tab(&TabId(target.target_id)).await?;
                    closed += 1;
                }
            }
        }
        if closed == 0 {
            return Err(PlatformError::WindowNotFound(id));
        }
        Ok(())
    }

    async fn group_tabs(
        &self,
        _tabs: &[TabId],
        _group: Option<GroupId>,
    ) -> Result<GroupId, PlatformError> {
        Err(PlatformError::Unsupported("tab groups"))
    }

    async fn update_group(
        &self,
        _group: GroupId,
        _title: &str,
        _collapsed: bool,
    ) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported("tab groups"))
    }

    fn subscribe_tab_events(&self) -> broadcast::Receiver<TabEvent> {
        self.tab_events.subscribe()
    }
}

#[async_trait]
impl MessageTransport for CdpPlatform {
    async fn send_message(&self, tab: &TabId, message: Value) -> Result<Option<Value>, PlatformError> {
        let session = self
            .session(tab)
            .await
            .map_err(|e| PlatformError::Connection(format!("tab {}: {}", tab, e)))?;

        // Unbounded: the dispatcher owns the timeout.
        let reply = session
            .evaluate_with_timeout(&dispatch_expression(&message), None)
            .await?;

        Ok(match reply {
            Value::Null => None,
            other => Some(other),
        })
    }
}

impl Drop for CdpPlatform {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
