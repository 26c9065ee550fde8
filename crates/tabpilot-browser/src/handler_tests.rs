use serde_json::json;
use tabpilot_workqueue::{classify, ErrorCategory};

use super::*;
use crate::engines::EngineRegistry;
use crate::manager::TabManagerConfig;
use crate::platform::MemoryPlatform;

fn handler() -> (Arc<MemoryPlatform>, EngineTaskHandler) {
    let platform = Arc::new(MemoryPlatform::new());
    platform.set_auto_complete(true);
    let manager = TabManager::new(
        platform.clone(),
        platform.clone(),
        EngineRegistry::builtin(),
        TabManagerConfig::default(),
    );
    (platform, EngineTaskHandler::new(Arc::new(manager)))
}

#[tokio::test(start_paused = true)]
async fn test_handle_success() {
    let (platform, handler) = handler();
    platform.set_responder(|_, _| {
        Some(json!({
            "type": "TASK_RESULT",
            "payload": {
                "success": true,
                "response": "Axum and Actix are popular.",
                "citations": [{"url": "https://docs.rs/axum", "title": "axum"}]
            }
        }))
    });

    let task = QueryTask::new("run-1", "item-1", "perplexity", "rust web frameworks");
    let output = handler.handle(&task).await.unwrap();

    assert_eq!(output.response, "Axum and Actix are popular.");
    assert_eq!(output.citations[0].title.as_deref(), Some("axum"));
    assert!(handler.manager().registered_tab("perplexity").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_handle_reported_failure_is_classifiable() {
    let (platform, handler) = handler();
    platform.set_responder(|_, _| {
        Some(json!({
            "type": "TASK_RESULT",
            "payload": {"success": false, "error": "Cloudflare challenge detected"}
        }))
    });

    let task = QueryTask::new("run-1", "item-1", "chatgpt", "q");
    let err = handler.handle(&task).await.unwrap_err();
    assert_eq!(classify(&err), ErrorCategory::Captcha);
}

#[tokio::test]
async fn test_handle_unknown_engine() {
    let (_platform, handler) = handler();
    let task = QueryTask::new("run-1", "item-1", "bard", "q");

    let err = handler.handle(&task).await.unwrap_err();
    assert!(err.contains("bard"));
    assert_eq!(classify(&err), ErrorCategory::Skip);
}

#[tokio::test(start_paused = true)]
async fn test_handle_reuses_engine_tab() {
    let (platform, handler) = handler();
    platform.set_responder(|_, _| {
        Some(json!({"type": "TASK_RESULT", "payload": {"success": true, "response": "ok"}}))
    });

    for i in 0..3 {
        let task = QueryTask::new("run-1", format!("item-{}", i), "gemini", "q");
        handler.handle(&task).await.unwrap();
    }

    assert_eq!(platform.tabs().len(), 1);
    assert_eq!(platform.sent_messages().len(), 3);
}
