use std::sync::Arc;

use serde_json::json;
use tabpilot_workqueue::{classify, ErrorCategory};
use tokio::time::Instant;

use super::*;
use crate::platform::MemoryPlatform;

const TIMEOUT: Duration = Duration::from_millis(180_000);

fn setup() -> (Arc<MemoryPlatform>, ExecutionDispatcher, TabId, QueryTask) {
    let platform = Arc::new(MemoryPlatform::new());
    let tab = platform.open_tab("https://claude.ai/new", platform.main_window(), false);
    let dispatcher = ExecutionDispatcher::new(platform.clone(), TIMEOUT);
    let task = QueryTask::new("run-1", "item-1", "claude", "best rust web framework").with_id("t1");
    (platform, dispatcher, tab, task)
}

#[test]
fn test_message_wire_format() {
    let task = QueryTask::new("run-1", "item-1", "claude", "hello").with_id("t1");
    let value = serde_json::to_value(ContentMessage::ExecuteTask(task)).unwrap();
    assert_eq!(value["type"], "EXECUTE_TASK");
    assert_eq!(value["payload"]["id"], "t1");
    assert_eq!(value["payload"]["query"], "hello");

    let reply: ContentMessage = serde_json::from_value(json!({
        "type": "TASK_RESULT",
        "payload": {"success": true, "response": "hi", "citations": [{"url": "https://a.example/"}]}
    }))
    .unwrap();
    let ContentMessage::TaskResult(result) = reply else {
        panic!("expected TASK_RESULT");
    };
    assert!(result.success);
    assert_eq!(result.citations.len(), 1);
}

#[test]
fn test_into_output() {
    let ok = ContentResult {
        success: true,
        response: Some("answer".into()),
        ..Default::default()
    };
    assert_eq!(ok.into_output().unwrap().response, "answer");

    let failed = ContentResult {
        success: false,
        error: Some("Please verify you are human".into()),
        ..Default::default()
    };
    assert_eq!(failed.into_output().unwrap_err(), "Please verify you are human");

    let silent = ContentResult::default();
    assert_eq!(classify(&silent.into_output().unwrap_err()), ErrorCategory::Skip);
}

#[tokio::test]
async fn test_execute_task_success() {
    let (platform, dispatcher, tab, task) = setup();
    platform.set_responder(|_, msg| {
        assert_eq!(msg["type"], "EXECUTE_TASK");
        Some(json!({
            "type": "TASK_RESULT",
            "payload": {"success": true, "response": format!("answer to {}", msg["payload"]["query"].as_str().unwrap_or(""))}
        }))
    });

    let result = dispatcher.execute_task_in_tab(&tab, &task).await.unwrap();
    assert!(result.success);
    assert_eq!(result.response.as_deref(), Some("answer to best rust web framework"));

    let sent = platform.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, tab);
    assert_eq!(sent[0].1["payload"]["id"], "t1");
}

#[tokio::test]
async fn test_execute_task_failure_payload_is_not_an_error() {
    let (platform, dispatcher, tab, task) = setup();
    platform.set_responder(|_, _| {
        Some(json!({"type": "TASK_RESULT", "payload": {"success": false, "error": "Login required"}}))
    });

    let result = dispatcher.execute_task_in_tab(&tab, &task).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Login required"));
}

#[tokio::test(start_paused = true)]
async fn test_execute_task_times_out_at_limit() {
    let (_platform, dispatcher, tab, task) = setup();

    let start = Instant::now();
    let err = dispatcher.execute_task_in_tab(&tab, &task).await.unwrap_err();

    assert_eq!(start.elapsed(), TIMEOUT);
    assert!(matches!(err, BrowserError::ExecutionTimeout { timeout_ms: 180_000, .. }));
    assert_eq!(classify(&err.to_string()), ErrorCategory::Retryable);
}

#[tokio::test(start_paused = true)]
async fn test_execute_task_pending_before_limit() {
    let (_platform, dispatcher, tab, task) = setup();

    let early = tokio::time::timeout(
        TIMEOUT - Duration::from_millis(1),
        dispatcher.execute_task_in_tab(&tab, &task),
    )
    .await;
    assert!(early.is_err(), "dispatch must not reject before the limit");
}

#[tokio::test]
async fn test_execute_task_no_response() {
    let (platform, dispatcher, tab, task) = setup();
    platform.set_responder(|_, _| None);

    let err = dispatcher.execute_task_in_tab(&tab, &task).await.unwrap_err();
    assert!(matches!(err, BrowserError::NoResponse));
    assert_eq!(classify(&err.to_string()), ErrorCategory::Skip);
}

#[tokio::test]
async fn test_execute_task_malformed_responses() {
    let (platform, dispatcher, tab, task) = setup();

    platform.set_responder(|_, _| Some(json!({"type": "PONG"})));
    let err = dispatcher.execute_task_in_tab(&tab, &task).await.unwrap_err();
    assert!(matches!(err, BrowserError::MalformedResponse(_)));
    assert!(err.to_string().contains("PONG"));

    platform.set_responder(|_, _| Some(json!({"type": "TASK_RESULT", "payload": "nope"})));
    let err = dispatcher.execute_task_in_tab(&tab, &task).await.unwrap_err();
    assert!(matches!(err, BrowserError::MalformedResponse(_)));

    platform.set_responder(|_, _| Some(json!("just a string")));
    let err = dispatcher.execute_task_in_tab(&tab, &task).await.unwrap_err();
    assert_eq!(classify(&err.to_string()), ErrorCategory::Skip);
}

#[tokio::test]
async fn test_execute_task_transport_error() {
    let (platform, dispatcher, tab, task) = setup();
    platform.close_tab(&tab);

    let err = dispatcher.execute_task_in_tab(&tab, &task).await.unwrap_err();
    assert!(matches!(err, BrowserError::Transport(_)));
    assert_eq!(classify(&err.to_string()), ErrorCategory::Retryable);
}

/// Transport whose every send fails with a fixed error.
struct FailingTransport(fn() -> PlatformError);

#[async_trait::async_trait]
impl MessageTransport for FailingTransport {
    async fn send_message(&self, _tab: &TabId, _message: Value) -> Result<Option<Value>, PlatformError> {
        Err((self.0)())
    }
}

async fn send_through(error: fn() -> PlatformError) -> BrowserError {
    let dispatcher = ExecutionDispatcher::new(Arc::new(FailingTransport(error)), TIMEOUT);
    let task = QueryTask::new("run-1", "item-1", "claude", "q");
    dispatcher
        .execute_task_in_tab(&TabId::new("tab-1"), &task)
        .await
        .unwrap_err()
}

#[tokio::test]
async fn test_page_script_exception_is_not_retried() {
    let err = send_through(|| {
        crate::cdp::CdpError::JavaScript("Error: response selector not found".into()).into()
    })
    .await;

    assert!(matches!(err, BrowserError::ScriptFailed(_)));
    assert!(err.to_string().contains("response selector not found"));
    assert_eq!(classify(&err.to_string()), ErrorCategory::Skip);
}

#[tokio::test]
async fn test_script_failure_keeps_its_own_category() {
    let err = send_through(|| PlatformError::Backend("Login required to continue".into())).await;
    assert_eq!(classify(&err.to_string()), ErrorCategory::LoginRequired);

    let err = send_through(|| PlatformError::Unsupported("messaging")).await;
    assert!(matches!(err, BrowserError::ScriptFailed(_)));
    assert_eq!(classify(&err.to_string()), ErrorCategory::Skip);
}

#[tokio::test]
async fn test_lost_connection_is_retried() {
    let err = send_through(|| PlatformError::Connection("socket closed".into())).await;
    assert!(matches!(err, BrowserError::Transport(_)));
    assert_eq!(classify(&err.to_string()), ErrorCategory::Retryable);
}
