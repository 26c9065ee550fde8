//! Result submission.
//!
//! Terminal results leave the queue only after a sink acknowledges them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::QueueError;
use crate::queue::TaskQueue;
use crate::task::TaskResult;

/// Destination for finished results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Submit results, returning the ids that were accepted.
    async fn submit(&self, results: &[TaskResult]) -> Result<Vec<String>, QueueError>;
}

/// Appends one JSON document per line.
pub struct JsonlResultSink {
    path: PathBuf,
}

impl JsonlResultSink {
    /// Create a sink writing to `path`, creating the parent directory.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        Ok(Self { path })
    }

    /// Output file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResultSink for JsonlResultSink {
    async fn submit(&self, results: &[TaskResult]) -> Result<Vec<String>, QueueError> {
        if results.is_empty() {
            return Ok(Vec::new());
        }

        let mut buf = String::new();
        for result in results {
            buf.push_str(&serde_json::to_string(result)?);
            buf.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| QueueError::Sink(format!("{}: {}", self.path.display(), e)))?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;

        debug!("Appended {} results to {:?}", results.len(), self.path);
        Ok(results.iter().map(|r| r.id.clone()).collect())
    }
}

/// Collects results in memory.
#[derive(Default)]
pub struct MemoryResultSink {
    results: parking_lot::Mutex<Vec<TaskResult>>,
}

impl MemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything submitted so far.
    pub fn results(&self) -> Vec<TaskResult> {
        self.results.lock().clone()
    }
}

#[async_trait]
impl ResultSink for MemoryResultSink {
    async fn submit(&self, results: &[TaskResult]) -> Result<Vec<String>, QueueError> {
        self.results.lock().extend_from_slice(results);
        Ok(results.iter().map(|r| r.id.clone()).collect())
    }
}

/// Upload unsubmitted results and drop the acknowledged tasks.
///
/// Returns the number of tasks removed from the queue.
pub async fn submit_results(queue: &TaskQueue, sink: &dyn ResultSink) -> Result<usize, QueueError> {
    let results = queue.get_unsubmitted_results().await;
    if results.is_empty() {
        return Ok(0);
    }

    let accepted = sink.submit(&results).await?;
    let removed = queue.remove_submitted(&accepted).await;
    info!("Submitted {} results ({} removed from queue)", accepted.len(), removed);
    Ok(removed)
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
