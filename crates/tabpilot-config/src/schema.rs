//! Configuration schema definitions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::loader::ConfigLoader;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Extra engines or overrides of the built-in ones.
    #[serde(default)]
    pub engines: Vec<EngineConfig>,
}

/// Base directory for state files: `~/.tabpilot`.
pub fn tabpilot_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".tabpilot"))
        .unwrap_or_else(|| PathBuf::from(".tabpilot"))
}

fn resolve_path(configured: Option<&str>, default_name: &str) -> PathBuf {
    match configured {
        Some(path) => PathBuf::from(ConfigLoader::expand_path(path)),
        None => tabpilot_dir().join(default_name),
    }
}

/// Task queue retry policy and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,

    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Persisted queue file (default `~/.tabpilot/queue.json`).
    #[serde(default)]
    pub store_path: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_retry_delay_ms: default_base_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            store_path: None,
        }
    }
}

impl QueueConfig {
    pub fn store_path(&self) -> PathBuf {
        resolve_path(self.store_path.as_deref(), "queue.json")
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_retry_delay_ms() -> u64 {
    10_000
}

fn default_max_retry_delay_ms() -> u64 {
    300_000
}

/// Browser connection and tab timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// CDP HTTP endpoint of the user's browser.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_tab_load_timeout_ms")]
    pub tab_load_timeout_ms: u64,

    /// Extra wait after load completes, for page scripts to initialize.
    #[serde(default = "default_tab_settle_delay_ms")]
    pub tab_settle_delay_ms: u64,

    #[serde(default = "default_task_execution_timeout_ms")]
    pub task_execution_timeout_ms: u64,

    #[serde(default = "default_crawl_group_title")]
    pub crawl_group_title: String,

    /// How often stale registry entries are swept.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            tab_load_timeout_ms: default_tab_load_timeout_ms(),
            tab_settle_delay_ms: default_tab_settle_delay_ms(),
            task_execution_timeout_ms: default_task_execution_timeout_ms(),
            crawl_group_title: default_crawl_group_title(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:9222".to_string()
}

fn default_tab_load_timeout_ms() -> u64 {
    30_000
}

fn default_tab_settle_delay_ms() -> u64 {
    2_000
}

fn default_task_execution_timeout_ms() -> u64 {
    180_000
}

fn default_crawl_group_title() -> String {
    "AI Crawl".to_string()
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

/// Scheduler loop and result submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_submit_interval_secs")]
    pub submit_interval_secs: u64,

    /// Result file (default `~/.tabpilot/results.jsonl`).
    #[serde(default)]
    pub results_path: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            poll_interval_ms: default_poll_interval_ms(),
            submit_interval_secs: default_submit_interval_secs(),
            results_path: None,
        }
    }
}

impl SchedulerConfig {
    pub fn results_path(&self) -> PathBuf {
        resolve_path(self.results_path.as_deref(), "results.jsonl")
    }
}

fn default_max_concurrent() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_submit_interval_secs() -> u64 {
    30
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory (default `~/.tabpilot/logs`).
    #[serde(default)]
    pub dir: Option<String>,

    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            max_log_files: default_max_log_files(),
        }
    }
}

impl LoggingConfig {
    pub fn dir(&self) -> PathBuf {
        resolve_path(self.dir.as_deref(), "logs")
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    30
}

/// An engine definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub id: String,
    pub new_chat_url: String,
    /// Hosts whose pages belong to this engine (subdomains included).
    #[serde(default)]
    pub hosts: Vec<String>,
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
