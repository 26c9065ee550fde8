//! Task definition and status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::ErrorCategory;

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting in queue.
    Pending,
    /// Claimed by the scheduler.
    Running,
    /// Completed successfully.
    Completed,
    /// Failed permanently.
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

impl TaskStatus {
    /// Live tasks are the only ones persisted.
    pub fn is_live(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        !self.is_live()
    }

    /// Stable string form, matching the serialized representation.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A query to run against one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTask {
    /// Unique id within the queue.
    pub id: String,
    /// Owning run on the backend.
    pub task_id: String,
    /// Query item the result belongs to.
    pub query_item_id: String,
    /// Engine identifier (e.g. `chatgpt`).
    pub engine: String,
    /// Query text sent to the engine.
    pub query: String,
    /// Opaque extra payload forwarded to the content script.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl QueryTask {
    /// Create a new task with a generated id.
    pub fn new(
        task_id: impl Into<String>,
        query_item_id: impl Into<String>,
        engine: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            query_item_id: query_item_id.into(),
            engine: engine.into(),
            query: query.into(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Override the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A citation extracted alongside a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// What a successful execution produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// Terminal outcome of a task, ready for upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: String,
    pub task_id: String,
    pub query_item_id: String,
    pub engine: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    /// Success projection.
    pub fn success(task: &QueryTask, output: TaskOutput, completed_at: DateTime<Utc>) -> Self {
        Self {
            id: task.id.clone(),
            task_id: task.task_id.clone(),
            query_item_id: task.query_item_id.clone(),
            engine: task.engine.clone(),
            success: true,
            response: Some(output.response),
            citations: output.citations,
            error: None,
            error_category: None,
            completed_at,
        }
    }

    /// Failure projection.
    pub fn failure(
        task: &QueryTask,
        error: impl Into<String>,
        category: ErrorCategory,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: task.id.clone(),
            task_id: task.task_id.clone(),
            query_item_id: task.query_item_id.clone(),
            engine: task.engine.clone(),
            success: false,
            response: None,
            citations: Vec::new(),
            error: Some(error.into()),
            error_category: Some(category),
            completed_at,
        }
    }
}

/// A task in the queue with its retry bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedTask {
    pub task: QueryTask,
    pub status: TaskStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<TaskResult>,
    #[serde(default)]
    pub retry_count: u32,
    /// Earliest time the task may be claimed again (None = immediately).
    #[serde(default)]
    pub retry_after: Option<DateTime<Utc>>,
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub error_category: Option<ErrorCategory>,
}

impl ManagedTask {
    /// Wrap a task fresh off the enqueue path.
    pub fn new(task: QueryTask, initial_delay_ms: u64) -> Self {
        Self {
            task,
            status: TaskStatus::Pending,
            started_at: None,
            completed_at: None,
            result: None,
            retry_count: 0,
            retry_after: None,
            retry_delay_ms: initial_delay_ms,
            last_error: None,
            error_category: None,
        }
    }

    /// Task id.
    pub fn id(&self) -> &str {
        &self.task.id
    }

    /// Whether the task can be claimed at `now`.
    pub fn is_ready_at(&self, now: DateTime<Utc>) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }

        match self.retry_after {
            Some(after) => after <= now,
            None => true,
        }
    }

    /// Whether the task can be claimed right now.
    pub fn is_ready(&self) -> bool {
        self.is_ready_at(Utc::now())
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
