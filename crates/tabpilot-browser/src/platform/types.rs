//! Platform data types and errors.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Browser tab handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabId(pub String);

impl TabId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Browser window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId(pub i64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tab group handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    Loading,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub url: String,
    pub window_id: Option<WindowId>,
    /// Selected tab of its window.
    pub active: bool,
    pub status: TabStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowState {
    Normal,
    Minimized,
    Maximized,
    Fullscreen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: WindowId,
    /// Has OS focus.
    pub focused: bool,
    pub state: WindowState,
}

/// Options for [`super::TabPlatform::create_tab`].
#[derive(Debug, Clone)]
pub struct CreateTab {
    pub url: String,
    /// Target window; `None` means the current window.
    pub window_id: Option<WindowId>,
    pub active: bool,
}

impl CreateTab {
    /// An unfocused tab in the current window.
    pub fn background(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            window_id: None,
            active: false,
        }
    }

    pub fn in_window(mut self, window_id: WindowId) -> Self {
        self.window_id = Some(window_id);
        self
    }
}

/// Options for [`super::TabPlatform::update_tab`].
#[derive(Debug, Clone, Default)]
pub struct UpdateTab {
    pub active: Option<bool>,
    pub url: Option<String>,
}

impl UpdateTab {
    pub fn deactivate() -> Self {
        Self {
            active: Some(false),
            url: None,
        }
    }
}

/// Options for [`super::TabPlatform::create_window`].
#[derive(Debug, Clone)]
pub struct CreateWindow {
    pub focused: bool,
    pub state: WindowState,
}

impl CreateWindow {
    /// A minimized window that does not take focus.
    pub fn minimized() -> Self {
        Self {
            focused: false,
            state: WindowState::Minimized,
        }
    }
}

/// Optional strategies a platform supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    pub minimized_windows: bool,
    pub tab_groups: bool,
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self {
            minimized_windows: true,
            tab_groups: true,
        }
    }
}

/// Tab change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabEvent {
    Updated { tab_id: TabId, status: TabStatus },
    Removed { tab_id: TabId },
}

/// Platform call errors.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("No tab with id: {0}")]
    TabNotFound(TabId),

    #[error("No window with id: {0}")]
    WindowNotFound(WindowId),

    #[error("No tab group with id: {0}")]
    GroupNotFound(i64),

    #[error("Not supported by this browser: {0}")]
    Unsupported(&'static str),

    #[error("Browser connection error: {0}")]
    Connection(String),

    #[error("Browser call failed: {0}")]
    Backend(String),
}
