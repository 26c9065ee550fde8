use super::*;

#[test]
fn test_query_task_new() {
    let task = QueryTask::new("run-1", "item-1", "chatgpt", "best espresso grinder");
    assert_eq!(task.engine, "chatgpt");
    assert_eq!(task.task_id, "run-1");
    assert!(!task.id.is_empty());
    assert!(task.metadata.is_null());

    let other = QueryTask::new("run-1", "item-1", "chatgpt", "best espresso grinder");
    assert_ne!(task.id, other.id);
}

#[test]
fn test_with_id() {
    let task = QueryTask::new("run", "item", "gemini", "q").with_id("fixed");
    assert_eq!(task.id, "fixed");
}

#[test]
fn test_status_liveness() {
    assert!(TaskStatus::Pending.is_live());
    assert!(TaskStatus::Running.is_live());
    assert!(TaskStatus::Completed.is_terminal());
    assert!(TaskStatus::Failed.is_terminal());
}

#[test]
fn test_managed_task_new() {
    let managed = ManagedTask::new(QueryTask::new("r", "i", "claude", "q"), 10_000);
    assert_eq!(managed.status, TaskStatus::Pending);
    assert_eq!(managed.retry_count, 0);
    assert_eq!(managed.retry_delay_ms, 10_000);
    assert!(managed.retry_after.is_none());
    assert!(managed.result.is_none());
}

#[test]
fn test_is_ready() {
    let now = Utc::now();
    let mut managed = ManagedTask::new(QueryTask::new("r", "i", "claude", "q"), 10_000);
    assert!(managed.is_ready_at(now));

    managed.retry_after = Some(now + chrono::Duration::seconds(10));
    assert!(!managed.is_ready_at(now));
    assert!(managed.is_ready_at(now + chrono::Duration::seconds(10)));

    managed.retry_after = None;
    managed.status = TaskStatus::Running;
    assert!(!managed.is_ready_at(now));
}

#[test]
fn test_result_projections() {
    let task = QueryTask::new("run", "item", "perplexity", "q").with_id("t1");
    let now = Utc::now();

    let output = TaskOutput {
        response: "answer".to_string(),
        citations: vec![Citation {
            url: "https://example.com".to_string(),
            title: Some("Example".to_string()),
            snippet: None,
        }],
    };
    let ok = TaskResult::success(&task, output, now);
    assert!(ok.success);
    assert_eq!(ok.response.as_deref(), Some("answer"));
    assert_eq!(ok.citations.len(), 1);
    assert_eq!(ok.query_item_id, "item");

    let failed = TaskResult::failure(&task, "captcha", ErrorCategory::Captcha, now);
    assert!(!failed.success);
    assert_eq!(failed.error_category, Some(ErrorCategory::Captcha));
    assert!(failed.citations.is_empty());
}

#[test]
fn test_status_serialization() {
    let json = serde_json::to_string(&TaskStatus::Running).unwrap();
    assert_eq!(json, "\"running\"");
}

#[test]
fn test_query_task_deserialize_without_metadata() {
    let task: QueryTask = serde_json::from_str(
        r#"{"id":"a","task_id":"b","query_item_id":"c","engine":"chatgpt","query":"q"}"#,
    )
    .unwrap();
    assert_eq!(task.id, "a");
    assert!(task.metadata.is_null());
}

#[test]
fn test_status_display_matches_serialization() {
    assert_eq!(TaskStatus::Running.to_string(), "running");
    assert_eq!(format!("{:<9}|", TaskStatus::Failed), "failed   |");
}
