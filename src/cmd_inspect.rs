//! Read-only commands: `status`, `classify`, `results`.

use tabpilot_config::Config;
use tabpilot_workqueue::{classify as classify_error, FileTaskStore, QueueStats, TaskStore};

/// Print the persisted queue.
pub(crate) async fn status(config: &Config, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileTaskStore::new(config.queue.store_path()).await?;
    let tasks = store.load().await?;
    let stats = QueueStats::from_tasks(&tasks);

    println!("Queue: {}", store.path().display());
    println!("  pending:   {}", stats.pending);
    println!("  running:   {}", stats.running);
    println!("  completed: {}", stats.completed);
    println!("  failed:    {}", stats.failed);

    if verbose {
        for managed in &tasks {
            let retry = match managed.retry_after {
                Some(at) => format!(" retry after {}", at.to_rfc3339()),
                None => String::new(),
            };
            println!(
                "{}  {:<10} {:<9} retries={}{}",
                managed.id(),
                managed.task.engine,
                managed.status,
                managed.retry_count,
                retry
            );
            if let Some(error) = &managed.last_error {
                let category = managed.error_category.unwrap_or_else(|| classify_error(error));
                println!("    [{}] {}", category, error);
            }
        }
    }
    Ok(())
}

/// Print the category a failure message falls into.
pub(crate) fn classify(text: &str) {
    let category = classify_error(text);
    let note = if category.is_retryable() {
        "will be retried"
    } else if category.needs_attention() {
        "needs a human in the browser"
    } else {
        "skipped"
    };
    println!("{} ({})", category, note);
}

/// Print where results go and how many have been written.
pub(crate) async fn results(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let path = config.scheduler.results_path();
    let count = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content.lines().filter(|l| !l.trim().is_empty()).count(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
        Err(e) => return Err(e.into()),
    };
    println!("{}: {} results", path.display(), count);
    Ok(())
}
