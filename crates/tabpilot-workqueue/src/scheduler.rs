//! Scheduler loop driving the queue.
//!
//! The loop is the only place tasks are claimed. Before each claim it asks
//! [`TaskQueue::has_capacity`]; the handler for every claimed task runs on
//! its own tokio task and reports back through `mark_completed` or
//! `mark_failed`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::queue::TaskQueue;
use crate::task::{ManagedTask, QueryTask, TaskOutput};

/// Executes one claimed task.
///
/// Errors are plain text; the queue classifies them.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &QueryTask) -> Result<TaskOutput, String>;
}

/// Concurrency-capped scheduler.
pub struct Scheduler {
    config: SchedulerConfig,
    running: AtomicBool,
    completed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    retried: Arc<AtomicU64>,
    in_flight: Mutex<JoinSet<()>>,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            running: AtomicBool::new(false),
            completed: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            retried: Arc::new(AtomicU64::new(0)),
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    /// Check if the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Tasks that finished successfully.
    pub fn tasks_completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Tasks that failed terminally.
    pub fn tasks_failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Failures that were sent back for retry.
    pub fn tasks_retried(&self) -> u64 {
        self.retried.load(Ordering::SeqCst)
    }

    /// Claim at most one task and start it. Returns whether a task was started.
    pub async fn tick<H: TaskHandler + 'static>(
        &self,
        queue: &Arc<TaskQueue>,
        handler: &Arc<H>,
    ) -> bool {
        if !queue.has_capacity(self.config.max_concurrent).await {
            return false;
        }
        let Some(task) = queue.claim_next().await else {
            return false;
        };

        debug!("Dispatching task {} to engine {}", task.id(), task.task.engine);

        let queue = queue.clone();
        let handler = handler.clone();
        let completed = self.completed.clone();
        let failed = self.failed.clone();
        let retried = self.retried.clone();

        let mut in_flight = self.in_flight.lock().await;
        // Reap anything already finished so the set does not grow.
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(async move {
            match Self::process(&queue, handler.as_ref(), task).await {
                Outcome::Completed => completed.fetch_add(1, Ordering::SeqCst),
                Outcome::Retrying => retried.fetch_add(1, Ordering::SeqCst),
                Outcome::Failed => failed.fetch_add(1, Ordering::SeqCst),
            };
        });
        true
    }

    /// Run a claimed task to completion and record the outcome.
    async fn process<H: TaskHandler + ?Sized>(
        queue: &TaskQueue,
        handler: &H,
        task: ManagedTask,
    ) -> Outcome {
        let id = task.id().to_string();
        match handler.handle(&task.task).await {
            Ok(output) => {
                queue.mark_completed(&id, output).await;
                debug!("Task {} completed", id);
                Outcome::Completed
            }
            Err(e) => {
                error!("Task {} failed: {}", id, e);
                let outcome = queue.mark_failed(&id, &e).await;
                if outcome.retrying {
                    Outcome::Retrying
                } else {
                    Outcome::Failed
                }
            }
        }
    }

    /// Wait for every in-flight task.
    pub async fn drain(&self) {
        let mut in_flight = self.in_flight.lock().await;
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Task handler panicked: {}", e);
            }
        }
    }

    /// Run until a shutdown signal arrives, then wait for in-flight tasks.
    pub async fn run_loop<H: TaskHandler + 'static>(
        self: Arc<Self>,
        queue: Arc<TaskQueue>,
        handler: Arc<H>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        self.running.store(true, Ordering::SeqCst);
        info!("Scheduler started (max_concurrent: {})", self.config.max_concurrent);

        let poll = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            // A tick is never raced against shutdown: dropping it between the
            // claim and the spawn would strand a task in `running`.
            let started = self.tick(&queue, &handler).await;

            match shutdown_rx.try_recv() {
                Err(broadcast::error::TryRecvError::Empty) => {}
                _ => break,
            }
            if started {
                continue;
            }

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(poll) => {}
            }
        }

        info!("Scheduler shutting down");
        self.drain().await;
        self.running.store(false, Ordering::SeqCst);
    }

    /// Run until nothing is pending or running.
    pub async fn run_until_idle<H: TaskHandler + 'static>(
        &self,
        queue: Arc<TaskQueue>,
        handler: Arc<H>,
    ) {
        self.running.store(true, Ordering::SeqCst);
        let poll = Duration::from_millis(self.config.poll_interval_ms);

        while queue.has_live_tasks().await {
            if !self.tick(&queue, &handler).await {
                tokio::time::sleep(poll).await;
            }
        }

        self.drain().await;
        self.running.store(false, Ordering::SeqCst);
        info!(
            "Queue idle: {} completed, {} failed, {} retries",
            self.tasks_completed(),
            self.tasks_failed(),
            self.tasks_retried()
        );
    }
}

enum Outcome {
    Completed,
    Retrying,
    Failed,
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
