//! Tab manager errors and configuration.

use std::time::Duration;

use tabpilot_config::BrowserConfig;
use thiserror::Error;

use crate::platform::{PlatformError, TabId};

/// Errors that reach the task queue.
///
/// The display text is what gets classified, so load and dispatch timeouts
/// say "timeout", lost connections say "connection", and the rest avoid
/// the classifier's keywords so the underlying message decides.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Unknown engine: {0}")]
    UnknownEngine(String),

    #[error("Tab load timeout after {timeout_ms}ms (tab {tab})")]
    TabLoadTimeout { tab: TabId, timeout_ms: u64 },

    #[error("Tab closed during tab load: {0}")]
    TabClosed(TabId),

    #[error("Task execution timeout after {timeout_ms}ms (tab {tab})")]
    ExecutionTimeout { tab: TabId, timeout_ms: u64 },

    #[error("Content script connection failed: {0}")]
    Transport(String),

    /// The page answered, but the adapter or the browser call itself failed.
    #[error("Content script failed: {0}")]
    ScriptFailed(String),

    #[error("Content script returned no response")]
    NoResponse,

    #[error("Malformed content script response: {0}")]
    MalformedResponse(String),

    #[error("Could not open engine tab: {0}")]
    Platform(#[from] PlatformError),
}

/// Tab manager timing and naming.
#[derive(Debug, Clone)]
pub struct TabManagerConfig {
    pub tab_load_timeout: Duration,
    /// Extra wait after load completes.
    pub settle_delay: Duration,
    pub task_execution_timeout: Duration,
    pub crawl_group_title: String,
}

impl Default for TabManagerConfig {
    fn default() -> Self {
        Self {
            tab_load_timeout: Duration::from_millis(30_000),
            settle_delay: Duration::from_millis(2_000),
            task_execution_timeout: Duration::from_millis(180_000),
            crawl_group_title: "AI Crawl".to_string(),
        }
    }
}

impl From<&BrowserConfig> for TabManagerConfig {
    fn from(config: &BrowserConfig) -> Self {
        Self {
            tab_load_timeout: Duration::from_millis(config.tab_load_timeout_ms),
            settle_delay: Duration::from_millis(config.tab_settle_delay_ms),
            task_execution_timeout: Duration::from_millis(config.task_execution_timeout_ms),
            crawl_group_title: config.crawl_group_title.clone(),
        }
    }
}
