//! `tabpilot run`: drive the queue against the user's browser.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use tabpilot_browser::cdp::CdpPlatform;
use tabpilot_browser::{EngineRegistry, EngineTaskHandler, TabManager, TabManagerConfig};
use tabpilot_config::{Config, ConfigValidator};
use tabpilot_workqueue::{
    submit_results, FileTaskStore, JsonlResultSink, QueryTask, QueueConfig, Scheduler,
    SchedulerConfig, TaskQueue,
};

/// A task as written in a tasks file; the id is generated when omitted.
#[derive(Debug, Deserialize)]
struct TaskEntry {
    #[serde(default)]
    id: Option<String>,
    task_id: String,
    query_item_id: String,
    engine: String,
    query: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

impl From<TaskEntry> for QueryTask {
    fn from(entry: TaskEntry) -> Self {
        let task = QueryTask::new(entry.task_id, entry.query_item_id, entry.engine, entry.query)
            .with_metadata(entry.metadata);
        match entry.id {
            Some(id) => task.with_id(id),
            None => task,
        }
    }
}

async fn load_tasks(path: &Path) -> Result<Vec<QueryTask>, Box<dyn std::error::Error>> {
    let content = tokio::fs::read_to_string(path).await?;
    let entries: Vec<TaskEntry> = serde_json::from_str(&content)?;
    Ok(entries.into_iter().map(QueryTask::from).collect())
}

fn queue_config(config: &Config) -> QueueConfig {
    QueueConfig {
        max_retries: config.queue.max_retries,
        base_retry_delay_ms: config.queue.base_retry_delay_ms,
        max_retry_delay_ms: config.queue.max_retry_delay_ms,
    }
}

fn scheduler_config(config: &Config) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent: config.scheduler.max_concurrent,
        poll_interval_ms: config.scheduler.poll_interval_ms,
    }
}

/// Run the scheduler until Ctrl-C, or until the queue drains with `until_empty`.
pub(crate) async fn run(
    config: Config,
    tasks_file: Option<PathBuf>,
    until_empty: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let validation = ConfigValidator::validate(&config);
    for warning in &validation.warnings {
        warn!("Config {}: {}", warning.path, warning.message);
    }
    validation.into_result()?;

    let store = Arc::new(FileTaskStore::new(config.queue.store_path()).await?);
    let queue = Arc::new(TaskQueue::with_store(queue_config(&config), store));
    queue.recover().await;

    if let Some(path) = tasks_file {
        let tasks = load_tasks(&path).await?;
        let offered = tasks.len();
        let added = queue.enqueue(tasks).await;
        info!("Enqueued {} of {} tasks from {}", added, offered, path.display());
    }

    let platform = Arc::new(CdpPlatform::connect(&config.browser.endpoint).await?);
    let manager = Arc::new(TabManager::new(
        platform.clone(),
        platform,
        EngineRegistry::from_config(&config.engines),
        TabManagerConfig::from(&config.browser),
    ));
    let handler = Arc::new(EngineTaskHandler::new(manager.clone()));
    let sink = Arc::new(JsonlResultSink::new(config.scheduler.results_path()).await?);
    let scheduler = Arc::new(Scheduler::new(scheduler_config(&config)));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let scheduler_rx = shutdown_tx.subscribe();

    let cleanup = {
        let manager = manager.clone();
        let period = Duration::from_secs(config.browser.cleanup_interval_secs);
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = interval.tick() => {
                        let removed = manager.cleanup_tabs().await;
                        if removed > 0 {
                            info!("Cleaned up {} stale tab registrations", removed);
                        }
                    }
                }
            }
        })
    };

    let submitter = {
        let queue = queue.clone();
        let sink = sink.clone();
        let period = Duration::from_secs(config.scheduler.submit_interval_secs);
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = interval.tick() => {
                        if let Err(e) = submit_results(&queue, sink.as_ref()).await {
                            error!("Result submission failed: {}", e);
                        }
                    }
                }
            }
        })
    };

    let trigger = {
        let queue = queue.clone();
        let shutdown_tx = shutdown_tx.clone();
        let poll = Duration::from_millis(config.scheduler.poll_interval_ms);
        tokio::spawn(async move {
            if until_empty {
                let drained = async {
                    loop {
                        tokio::time::sleep(poll).await;
                        if !queue.has_live_tasks().await {
                            break;
                        }
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
                    _ = drained => info!("Queue drained"),
                }
            } else {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Interrupted, shutting down");
            }
            let _ = shutdown_tx.send(());
        })
    };

    scheduler
        .clone()
        .run_loop(queue.clone(), handler, scheduler_rx)
        .await;

    trigger.abort();
    let _ = shutdown_tx.send(());
    let _ = cleanup.await;
    let _ = submitter.await;

    let submitted = submit_results(&queue, sink.as_ref()).await?;
    manager.close_all_crawl_tabs().await;

    let stats = queue.stats().await;
    info!(
        "Run finished: {} completed, {} failed, {} retries; {} results written to {}",
        scheduler.tasks_completed(),
        scheduler.tasks_failed(),
        scheduler.tasks_retried(),
        submitted,
        sink.path().display()
    );
    if stats.pending + stats.running > 0 {
        info!("{} tasks left in the queue for the next run", stats.pending + stats.running);
    }
    Ok(())
}
