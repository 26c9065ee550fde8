//! Host browser capability set.
//!
//! The tab manager only talks to the browser through [`TabPlatform`] and
//! [`MessageTransport`]. [`MemoryPlatform`] backs the tests; the CDP backend
//! lives in [`crate::cdp`].

mod memory;
mod types;

pub use memory::{GroupInfo, MemoryPlatform};
pub use types::*;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

/// Tab and window operations of the host browser.
#[async_trait]
pub trait TabPlatform: Send + Sync {
    /// Which optional strategies this platform supports.
    fn capabilities(&self) -> PlatformCapabilities;

    async fn get_tab(&self, id: &TabId) -> Result<TabInfo, PlatformError>;

    async fn query_tabs(&self) -> Result<Vec<TabInfo>, PlatformError>;

    async fn create_tab(&self, options: CreateTab) -> Result<TabInfo, PlatformError>;

    async fn update_tab(&self, id: &TabId, update: UpdateTab) -> Result<TabInfo, PlatformError>;

    async fn remove_tab(&self, id: &TabId) -> Result<(), PlatformError>;

    async fn get_window(&self, id: WindowId) -> Result<WindowInfo, PlatformError>;

    async fn create_window(&self, options: CreateWindow) -> Result<WindowInfo, PlatformError>;

    async fn remove_window(&self, id: WindowId) -> Result<(), PlatformError>;

    /// Add tabs to `group`, or to a new group when `None`.
    async fn group_tabs(
        &self,
        tabs: &[TabId],
        group: Option<GroupId>,
    ) -> Result<GroupId, PlatformError>;

    async fn update_group(
        &self,
        group: GroupId,
        title: &str,
        collapsed: bool,
    ) -> Result<(), PlatformError>;

    /// Subscribe to tab updates. Dropping the receiver unsubscribes.
    fn subscribe_tab_events(&self) -> broadcast::Receiver<TabEvent>;
}

/// Request/response channel to the content script of a tab.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send `message` and wait for the reply. `Ok(None)` means the content
    /// script answered with nothing.
    async fn send_message(&self, tab: &TabId, message: Value) -> Result<Option<Value>, PlatformError>;
}
