//! Task queue state machine.
//!
//! ```text
//! pending ──claim──► running ──ok──► completed
//!    ▲                  │
//!    └──retryable───────┤
//!                       └──captcha / login / skip / exhausted──► failed
//! ```
//!
//! Tasks are kept in insertion order and claimed FIFO among those that are
//! ready. Only pending and running tasks are persisted; terminal tasks stay
//! in memory until their results are acknowledged via
//! [`TaskQueue::remove_submitted`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::classifier::{classify, ErrorCategory};
use crate::config::QueueConfig;
use crate::store::{MemoryTaskStore, TaskStore};
use crate::task::{ManagedTask, QueryTask, TaskOutput, TaskResult, TaskStatus};

/// What `mark_failed` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    /// The task went back to pending.
    pub retrying: bool,
    pub category: ErrorCategory,
}

/// Per-status task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueStats {
    /// Count a slice of tasks.
    pub fn from_tasks(tasks: &[ManagedTask]) -> Self {
        let mut stats = Self::default();
        for task in tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Total number of tasks.
    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed
    }
}

/// FIFO task queue with retry bookkeeping.
pub struct TaskQueue {
    config: QueueConfig,
    store: Arc<dyn TaskStore>,
    tasks: RwLock<Vec<ManagedTask>>,
}

impl TaskQueue {
    /// Create a queue backed by an in-memory store.
    pub fn new(config: QueueConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryTaskStore::new()))
    }

    /// Create a queue with a custom store.
    pub fn with_store(config: QueueConfig, store: Arc<dyn TaskStore>) -> Self {
        Self {
            config,
            store,
            tasks: RwLock::new(Vec::new()),
        }
    }

    /// Queue configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Rebuild the in-memory queue from the store.
    ///
    /// Tasks found running cannot have survived the restart and are reset
    /// to pending. Returns the number of tasks restored.
    pub async fn recover(&self) -> usize {
        let persisted = match self.store.load().await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("Failed to load persisted queue, starting empty: {}", e);
                Vec::new()
            }
        };

        let mut tasks = self.tasks.write().await;
        let mut seen: HashSet<String> = tasks.iter().map(|t| t.id().to_string()).collect();
        let mut reset = 0;

        for mut task in persisted {
            if !seen.insert(task.id().to_string()) {
                continue;
            }
            if task.status == TaskStatus::Running {
                task.status = TaskStatus::Pending;
                task.started_at = None;
                reset += 1;
            }
            tasks.push(task);
        }

        info!("Recovered {} tasks ({} reset from running)", tasks.len(), reset);
        self.persist(&tasks).await;
        tasks.len()
    }

    /// Append tasks whose id is not already queued. Returns how many were added.
    pub async fn enqueue(&self, new_tasks: impl IntoIterator<Item = QueryTask>) -> usize {
        let mut tasks = self.tasks.write().await;
        let mut seen: HashSet<String> = tasks.iter().map(|t| t.id().to_string()).collect();
        let mut added = 0;

        for task in new_tasks {
            if !seen.insert(task.id.clone()) {
                debug!("Skipping duplicate task: {}", task.id);
                continue;
            }
            debug!("Enqueueing task: {} (engine: {})", task.id, task.engine);
            tasks.push(ManagedTask::new(task, self.config.initial_delay_ms()));
            added += 1;
        }

        if added > 0 {
            self.persist(&tasks).await;
        }
        added
    }

    /// First ready task in insertion order.
    pub async fn get_next_pending(&self) -> Option<ManagedTask> {
        let now = Utc::now();
        self.tasks
            .read()
            .await
            .iter()
            .find(|t| t.is_ready_at(now))
            .cloned()
    }

    /// Claim the next ready task, marking it running in the same step.
    pub async fn claim_next(&self) -> Option<ManagedTask> {
        let now = Utc::now();
        let mut tasks = self.tasks.write().await;
        let task = tasks.iter_mut().find(|t| t.is_ready_at(now))?;

        task.status = TaskStatus::Running;
        task.started_at = Some(now);
        let claimed = task.clone();
        debug!("Claimed task: {}", claimed.id());

        self.persist(&tasks).await;
        Some(claimed)
    }

    /// All running tasks.
    pub async fn get_running(&self) -> Vec<ManagedTask> {
        self.tasks
            .read()
            .await
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .cloned()
            .collect()
    }

    /// Look up a task by id.
    pub async fn get(&self, id: &str) -> Option<ManagedTask> {
        self.tasks.read().await.iter().find(|t| t.id() == id).cloned()
    }

    /// Move a task to running. Returns false for unknown ids.
    pub async fn mark_running(&self, id: &str) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.iter_mut().find(|t| t.id() == id) else {
            warn!("mark_running: unknown task {}", id);
            return false;
        };

        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        debug!("Task running: {}", id);

        self.persist(&tasks).await;
        true
    }

    /// Record a successful execution. Returns false for unknown ids and for
    /// tasks that already finished.
    pub async fn mark_completed(&self, id: &str, output: TaskOutput) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.iter_mut().find(|t| t.id() == id) else {
            warn!("mark_completed: unknown task {}", id);
            return false;
        };
        if task.status.is_terminal() {
            warn!("mark_completed: task {} is already {}", id, task.status);
            return false;
        }

        let now = Utc::now();
        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
        task.result = Some(TaskResult::success(&task.task, output, now));
        debug!("Task completed: {}", id);

        self.persist(&tasks).await;
        true
    }

    /// Record a failed execution and apply the retry policy.
    pub async fn mark_failed(&self, id: &str, error: &str) -> FailureOutcome {
        let category = classify(error);
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.iter_mut().find(|t| t.id() == id) else {
            warn!("mark_failed: unknown task {}", id);
            return FailureOutcome {
                retrying: false,
                category,
            };
        };
        if task.status.is_terminal() {
            warn!("mark_failed: task {} is already {}", id, task.status);
            return FailureOutcome {
                retrying: false,
                category: task.error_category.unwrap_or(category),
            };
        }

        let now = Utc::now();
        task.retry_count += 1;
        task.last_error = Some(error.to_string());
        task.error_category = Some(category);

        let retrying = category.is_retryable() && task.retry_count <= self.config.max_retries;
        if retrying {
            task.retry_delay_ms = self.config.next_delay_ms(task.retry_delay_ms);
            task.retry_after = Some(now + Duration::milliseconds(task.retry_delay_ms as i64));
            task.status = TaskStatus::Pending;
            debug!(
                "Retrying task {} in {}ms (attempt {})",
                id, task.retry_delay_ms, task.retry_count
            );
        } else {
            task.status = TaskStatus::Failed;
            task.completed_at = Some(now);
            task.result = Some(TaskResult::failure(&task.task, error, category, now));
            if category.needs_attention() {
                warn!("Task {} needs manual attention ({}): {}", id, category, error);
            } else {
                info!("Task {} failed permanently ({}): {}", id, category, error);
            }
        }

        self.persist(&tasks).await;
        FailureOutcome { retrying, category }
    }

    /// Terminal tasks carrying a result.
    pub async fn get_unsubmitted_results(&self) -> Vec<TaskResult> {
        self.tasks
            .read()
            .await
            .iter()
            .filter(|t| t.status.is_terminal())
            .filter_map(|t| t.result.clone())
            .collect()
    }

    /// Drop acknowledged tasks. Pending and running tasks are never removed.
    pub async fn remove_submitted(&self, ids: &[String]) -> usize {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();

        tasks.retain(|t| !(ids.contains(t.id()) && t.status.is_terminal()));

        let removed = before - tasks.len();
        if removed > 0 {
            debug!("Removed {} submitted tasks", removed);
            self.persist(&tasks).await;
        }
        removed
    }

    /// Whether another task may be claimed under `max_concurrent`.
    pub async fn has_capacity(&self, max_concurrent: usize) -> bool {
        self.running_count().await < max_concurrent
    }

    /// Number of running tasks.
    pub async fn running_count(&self) -> usize {
        self.tasks
            .read()
            .await
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .count()
    }

    /// Whether anything is pending or running.
    pub async fn has_live_tasks(&self) -> bool {
        self.tasks.read().await.iter().any(|t| t.status.is_live())
    }

    /// Per-status counts.
    pub async fn stats(&self) -> QueueStats {
        QueueStats::from_tasks(&self.tasks.read().await)
    }

    /// Number of tasks held in memory.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Check if queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Write the live subset. Failures are logged, not returned.
    async fn persist(&self, tasks: &[ManagedTask]) {
        let live: Vec<ManagedTask> = tasks
            .iter()
            .filter(|t| t.status.is_live())
            .cloned()
            .collect();

        if let Err(e) = self.store.save(&live).await {
            warn!("Failed to persist queue: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
