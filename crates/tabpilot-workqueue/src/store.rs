//! Task persistence store.
//!
//! Stores hold the live subset of the queue (pending and running tasks) as
//! one ordered list that is rewritten after every mutation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::QueueError;
use crate::task::ManagedTask;

/// Task store trait for persistence.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Load the persisted tasks in their stored order.
    async fn load(&self) -> Result<Vec<ManagedTask>, QueueError>;

    /// Replace the persisted tasks.
    async fn save(&self, tasks: &[ManagedTask]) -> Result<(), QueueError>;
}

/// In-memory task store for testing.
pub struct MemoryTaskStore {
    tasks: parking_lot::RwLock<Vec<ManagedTask>>,
    fail_writes: AtomicBool,
}

impl MemoryTaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_tasks(Vec::new())
    }

    /// Create a store pre-populated as if written by an earlier process.
    pub fn with_tasks(tasks: Vec<ManagedTask>) -> Self {
        Self {
            tasks: parking_lot::RwLock::new(tasks),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Current persisted contents.
    pub fn snapshot(&self) -> Vec<ManagedTask> {
        self.tasks.read().clone()
    }

    /// Make subsequent saves fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn load(&self) -> Result<Vec<ManagedTask>, QueueError> {
        Ok(self.snapshot())
    }

    async fn save(&self, tasks: &[ManagedTask]) -> Result<(), QueueError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(QueueError::Store("writes disabled".to_string()));
        }
        *self.tasks.write() = tasks.to_vec();
        Ok(())
    }
}

/// JSON file store.
///
/// The whole list lives in one file. Writes go to a sibling temp file first
/// and are renamed into place, so a crash mid-write leaves the previous
/// contents intact.
pub struct FileTaskStore {
    path: PathBuf,
}

impl FileTaskStore {
    /// Create a store backed by `path`, creating the parent directory.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                QueueError::Store(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        debug!("FileTaskStore initialized at {:?}", path);
        Ok(Self { path })
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn load(&self) -> Result<Vec<ManagedTask>, QueueError> {
        if !fs::try_exists(&self.path).await? {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let tasks: Vec<ManagedTask> = serde_json::from_str(&content)?;
        debug!("Loaded {} tasks from {:?}", tasks.len(), self.path);
        Ok(tasks)
    }

    async fn save(&self, tasks: &[ManagedTask]) -> Result<(), QueueError> {
        let content = serde_json::to_string_pretty(tasks)?;
        let tmp = self.temp_path();

        fs::write(&tmp, content).await.map_err(|e| {
            QueueError::Store(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &self.path).await.map_err(|e| {
            QueueError::Store(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        debug!("Saved {} tasks to {:?}", tasks.len(), self.path);
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
