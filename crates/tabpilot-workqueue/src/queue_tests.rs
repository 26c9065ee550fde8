use super::*;

fn task(id: &str) -> QueryTask {
    QueryTask::new("run-1", format!("item-{}", id), "x", "query").with_id(id)
}

fn queue_with_store() -> (TaskQueue, Arc<MemoryTaskStore>) {
    let store = Arc::new(MemoryTaskStore::new());
    let queue = TaskQueue::with_store(QueueConfig::default(), store.clone());
    (queue, store)
}

fn persisted_ids(store: &MemoryTaskStore) -> Vec<String> {
    store.snapshot().iter().map(|t| t.id().to_string()).collect()
}

#[tokio::test]
async fn test_enqueue_is_idempotent_per_id() {
    let (queue, _) = queue_with_store();

    assert_eq!(queue.enqueue([task("a")]).await, 1);
    assert_eq!(queue.enqueue([task("a")]).await, 0);
    assert_eq!(queue.len().await, 1);

    assert_eq!(queue.enqueue([task("b"), task("b"), task("c")]).await, 2);
    assert_eq!(queue.len().await, 3);
}

#[tokio::test]
async fn test_enqueue_initializes_backoff() {
    let (queue, store) = queue_with_store();
    queue.enqueue([task("a")]).await;

    let managed = queue.get("a").await.unwrap();
    assert_eq!(managed.status, TaskStatus::Pending);
    assert_eq!(managed.retry_count, 0);
    assert_eq!(managed.retry_delay_ms, 10_000);
    assert_eq!(persisted_ids(&store), vec!["a"]);
}

#[tokio::test]
async fn test_get_next_pending_is_fifo() {
    let (queue, _) = queue_with_store();
    queue.enqueue([task("a"), task("b"), task("c")]).await;

    assert_eq!(queue.get_next_pending().await.unwrap().id(), "a");

    queue.mark_running("a").await;
    assert_eq!(queue.get_next_pending().await.unwrap().id(), "b");
}

#[tokio::test]
async fn test_get_next_pending_respects_retry_after() {
    let (queue, _) = queue_with_store();
    queue.enqueue([task("a"), task("b")]).await;

    // A retryable failure pushes "a" into the future.
    queue.mark_running("a").await;
    let outcome = queue.mark_failed("a", "network error").await;
    assert!(outcome.retrying);

    assert_eq!(queue.get_next_pending().await.unwrap().id(), "b");
    queue.mark_running("b").await;
    assert!(queue.get_next_pending().await.is_none());
}

#[tokio::test]
async fn test_get_next_pending_after_delay_elapsed() {
    let store = Arc::new(MemoryTaskStore::new());
    let mut waiting = ManagedTask::new(task("a"), 10_000);
    waiting.retry_after = Some(Utc::now() - Duration::seconds(1));
    store.save(&[waiting]).await.unwrap();

    let queue = TaskQueue::with_store(QueueConfig::default(), store);
    queue.recover().await;
    assert_eq!(queue.get_next_pending().await.unwrap().id(), "a");
}

#[tokio::test]
async fn test_get_next_pending_empty() {
    let queue = TaskQueue::new(QueueConfig::default());
    assert!(queue.get_next_pending().await.is_none());
    assert!(queue.claim_next().await.is_none());
}

#[tokio::test]
async fn test_claim_next_marks_running() {
    let (queue, store) = queue_with_store();
    queue.enqueue([task("a"), task("b")]).await;

    let claimed = queue.claim_next().await.unwrap();
    assert_eq!(claimed.id(), "a");
    assert_eq!(claimed.status, TaskStatus::Running);
    assert!(claimed.started_at.is_some());

    assert_eq!(queue.get_running().await.len(), 1);
    let persisted = store.snapshot();
    assert_eq!(persisted[0].status, TaskStatus::Running);
}

#[tokio::test]
async fn test_persistence_tracks_live_subset() {
    let (queue, store) = queue_with_store();
    queue.enqueue([task("a"), task("b")]).await;

    queue.mark_running("a").await;
    assert!(persisted_ids(&store).contains(&"a".to_string()));

    queue.mark_completed("a", TaskOutput::default()).await;
    assert_eq!(persisted_ids(&store), vec!["b"]);

    // Still queryable in memory.
    let done = queue.get("a").await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.completed_at.is_some());
    assert!(done.result.as_ref().unwrap().success);
}

#[tokio::test]
async fn test_retryable_backoff_doubles() {
    let (queue, _) = queue_with_store();
    queue.enqueue([task("a")]).await;

    queue.mark_running("a").await;
    let outcome = queue.mark_failed("a", "network timeout").await;
    assert_eq!(
        outcome,
        FailureOutcome {
            retrying: true,
            category: ErrorCategory::Retryable
        }
    );

    let managed = queue.get("a").await.unwrap();
    assert_eq!(managed.retry_count, 1);
    assert_eq!(managed.status, TaskStatus::Pending);
    assert_eq!(managed.retry_delay_ms, 20_000);
    assert_eq!(managed.error_category, Some(ErrorCategory::Retryable));
    assert_eq!(managed.last_error.as_deref(), Some("network timeout"));

    let after = managed.retry_after.unwrap();
    let expected = Utc::now() + Duration::milliseconds(20_000);
    assert!((expected - after).num_milliseconds().abs() < 1_000);
}

#[tokio::test]
async fn test_backoff_follows_formula_and_cap() {
    let config = QueueConfig {
        max_retries: 10,
        base_retry_delay_ms: 10_000,
        max_retry_delay_ms: 300_000,
    };
    let queue = TaskQueue::new(config.clone());
    queue.enqueue([task("a")]).await;

    let mut previous = queue.get("a").await.unwrap().retry_delay_ms;
    for n in 1..=8u32 {
        queue.mark_running("a").await;
        queue.mark_failed("a", "ECONNRESET").await;

        let delay = queue.get("a").await.unwrap().retry_delay_ms;
        let expected = (config.base_retry_delay_ms * 2u64.pow(n)).min(config.max_retry_delay_ms);
        assert_eq!(delay, expected, "after {} failures", n);
        assert!(delay >= previous);
        assert!(delay <= config.max_retry_delay_ms);
        previous = delay;
    }
}

#[tokio::test]
async fn test_retry_exhaustion_boundary() {
    let (queue, _) = queue_with_store();
    queue.enqueue([task("a")]).await;

    for attempt in 1..=3 {
        queue.mark_running("a").await;
        let outcome = queue.mark_failed("a", "network timeout").await;
        assert!(outcome.retrying, "attempt {} should retry", attempt);
    }
    assert_eq!(queue.get("a").await.unwrap().retry_count, 3);

    queue.mark_running("a").await;
    let outcome = queue.mark_failed("a", "network timeout").await;
    assert!(!outcome.retrying);
    assert_eq!(outcome.category, ErrorCategory::Retryable);

    let managed = queue.get("a").await.unwrap();
    assert_eq!(managed.retry_count, 4);
    assert_eq!(managed.status, TaskStatus::Failed);
    assert!(managed.completed_at.is_some());
    let result = managed.result.unwrap();
    assert!(!result.success);
    assert_eq!(result.error_category, Some(ErrorCategory::Retryable));
}

#[tokio::test]
async fn test_non_retryable_categories_fail_immediately() {
    let (queue, store) = queue_with_store();
    queue.enqueue([task("c"), task("l"), task("s")]).await;

    for (id, error, category) in [
        ("c", "Captcha detected", ErrorCategory::Captcha),
        ("l", "Session expired", ErrorCategory::LoginRequired),
        ("s", "invalid query", ErrorCategory::Skip),
    ] {
        queue.mark_running(id).await;
        let outcome = queue.mark_failed(id, error).await;
        assert!(!outcome.retrying);
        assert_eq!(outcome.category, category);

        let managed = queue.get(id).await.unwrap();
        assert_eq!(managed.status, TaskStatus::Failed);
        assert_eq!(managed.retry_count, 1);
        assert_eq!(managed.retry_delay_ms, 10_000);
        assert!(managed.retry_after.is_none());
    }

    assert!(store.snapshot().is_empty());
    assert!(queue.get_next_pending().await.is_none());
}

#[tokio::test]
async fn test_mark_failed_unknown_id() {
    let queue = TaskQueue::new(QueueConfig::default());
    let outcome = queue.mark_failed("missing", "captcha").await;
    assert!(!outcome.retrying);
    assert_eq!(outcome.category, ErrorCategory::Captcha);
    assert!(!queue.mark_running("missing").await);
    assert!(!queue.mark_completed("missing", TaskOutput::default()).await);
}

#[tokio::test]
async fn test_unsubmitted_results() {
    let (queue, _) = queue_with_store();
    queue.enqueue([task("a"), task("b"), task("c")]).await;

    queue.mark_running("a").await;
    queue.mark_completed("a", TaskOutput {
        response: "hello".to_string(),
        citations: Vec::new(),
    })
    .await;
    queue.mark_running("b").await;
    queue.mark_failed("b", "captcha").await;

    let results = queue.get_unsubmitted_results().await;
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(results[0].response.as_deref(), Some("hello"));
    assert_eq!(results[1].error_category, Some(ErrorCategory::Captcha));
}

#[tokio::test]
async fn test_remove_submitted_guards_live_tasks() {
    let (queue, _) = queue_with_store();
    queue.enqueue([task("a"), task("b"), task("c")]).await;

    queue.mark_running("a").await;
    queue.mark_running("b").await;
    queue.mark_completed("b", TaskOutput::default()).await;

    let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    assert_eq!(queue.remove_submitted(&ids).await, 1);

    assert!(queue.get("a").await.is_some());
    assert!(queue.get("b").await.is_none());
    assert!(queue.get("c").await.is_some());
}

#[tokio::test]
async fn test_remove_submitted_running_is_noop() {
    let (queue, _) = queue_with_store();
    queue.enqueue([task("a")]).await;
    queue.mark_running("a").await;

    assert_eq!(queue.remove_submitted(&["a".to_string()]).await, 0);
    assert_eq!(queue.get("a").await.unwrap().status, TaskStatus::Running);
}

#[tokio::test]
async fn test_has_capacity() {
    let (queue, _) = queue_with_store();
    queue.enqueue([task("a"), task("b")]).await;

    assert!(queue.has_capacity(1).await);
    queue.mark_running("a").await;
    assert!(!queue.has_capacity(1).await);
    assert!(queue.has_capacity(2).await);
    assert!(!queue.has_capacity(0).await);
}

#[tokio::test]
async fn test_recover_resets_running() {
    let mut running = ManagedTask::new(task("a"), 10_000);
    running.status = TaskStatus::Running;
    running.started_at = Some(Utc::now());
    let pending = ManagedTask::new(task("b"), 10_000);

    let store = Arc::new(MemoryTaskStore::with_tasks(vec![running, pending]));
    let queue = TaskQueue::with_store(QueueConfig::default(), store.clone());

    assert_eq!(queue.recover().await, 2);
    let a = queue.get("a").await.unwrap();
    assert_eq!(a.status, TaskStatus::Pending);
    assert!(a.started_at.is_none());
    assert!(queue.get_running().await.is_empty());

    // Order survives the round trip.
    assert_eq!(queue.get_next_pending().await.unwrap().id(), "a");
    assert!(store.snapshot().iter().all(|t| t.status == TaskStatus::Pending));
}

#[tokio::test]
async fn test_persistence_failure_is_not_fatal() {
    let (queue, store) = queue_with_store();
    store.set_fail_writes(true);

    assert_eq!(queue.enqueue([task("a")]).await, 1);
    assert!(queue.mark_running("a").await);
    assert!(queue.mark_completed("a", TaskOutput::default()).await);
    assert_eq!(queue.get("a").await.unwrap().status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_stats() {
    let (queue, _) = queue_with_store();
    queue.enqueue([task("a"), task("b"), task("c"), task("d")]).await;
    queue.mark_running("a").await;
    queue.mark_running("b").await;
    queue.mark_completed("b", TaskOutput::default()).await;
    queue.mark_running("c").await;
    queue.mark_failed("c", "invalid query").await;

    let stats = queue.stats().await;
    assert_eq!(
        stats,
        QueueStats {
            pending: 1,
            running: 1,
            completed: 1,
            failed: 1
        }
    );
    assert_eq!(stats.total(), 4);
    assert!(queue.has_live_tasks().await);
}

#[tokio::test]
async fn test_failed_task_stays_failed() {
    let (queue, store) = queue_with_store();
    queue.enqueue([task("a")]).await;
    queue.mark_running("a").await;

    let first = queue.mark_failed("a", "hCaptcha challenge").await;
    assert!(!first.retrying);
    assert_eq!(first.category, ErrorCategory::Captcha);

    let second = queue.mark_failed("a", "network timeout").await;
    assert!(!second.retrying);
    assert_eq!(second.category, ErrorCategory::Captcha);

    let managed = queue.get("a").await.unwrap();
    assert_eq!(managed.status, TaskStatus::Failed);
    assert_eq!(managed.retry_count, 1);
    assert_eq!(managed.last_error.as_deref(), Some("hCaptcha challenge"));
    assert!(managed.retry_after.is_none());

    assert!(!queue.mark_completed("a", TaskOutput::default()).await);
    assert_eq!(queue.get("a").await.unwrap().status, TaskStatus::Failed);
    assert!(persisted_ids(&store).is_empty());
}

#[tokio::test]
async fn test_completed_task_is_not_reopened() {
    let (queue, store) = queue_with_store();
    queue.enqueue([task("a")]).await;
    queue.mark_running("a").await;
    queue
        .mark_completed("a", TaskOutput {
            response: "answer".into(),
            citations: vec![],
        })
        .await;

    let outcome = queue.mark_failed("a", "network timeout").await;
    assert!(!outcome.retrying);

    let managed = queue.get("a").await.unwrap();
    assert_eq!(managed.status, TaskStatus::Completed);
    assert_eq!(managed.retry_count, 0);
    assert!(managed.last_error.is_none());
    assert!(managed.result.unwrap().success);
    assert!(queue.get_next_pending().await.is_none());
    assert!(persisted_ids(&store).is_empty());
}
