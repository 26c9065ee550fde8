use super::*;
use serde_json::json;

#[tokio::test]
async fn test_create_tab_in_current_window() {
    let platform = MemoryPlatform::new();
    let tab = platform
        .create_tab(CreateTab::background("https://chatgpt.com/"))
        .await
        .unwrap();

    assert_eq!(tab.window_id, Some(platform.main_window()));
    assert_eq!(tab.status, TabStatus::Loading);
    assert!(!tab.active);
}

#[tokio::test]
async fn test_create_tab_in_missing_window() {
    let platform = MemoryPlatform::new();
    let result = platform
        .create_tab(CreateTab::background("https://claude.ai/").in_window(WindowId(42)))
        .await;
    assert!(matches!(result, Err(PlatformError::WindowNotFound(WindowId(42)))));
}

#[tokio::test]
async fn test_active_tab_selection() {
    let platform = MemoryPlatform::new();
    let window = platform.main_window();
    let first = platform.open_tab("https://a.example/", window, true);
    let second = platform.open_tab("https://b.example/", window, true);

    assert!(!platform.tab(&first).unwrap().active);
    assert!(platform.tab(&second).unwrap().active);

    platform.update_tab(&second, UpdateTab::deactivate()).await.unwrap();
    assert!(!platform.tab(&second).unwrap().active);
}

#[tokio::test]
async fn test_complete_and_close_emit_events() {
    let platform = MemoryPlatform::new();
    let mut events = platform.subscribe_tab_events();
    assert_eq!(platform.listener_count(), 1);

    let tab = platform
        .create_tab(CreateTab::background("https://gemini.google.com/app"))
        .await
        .unwrap()
        .id;
    platform.complete_tab(&tab);
    platform.close_tab(&tab);

    assert_eq!(
        events.recv().await.unwrap(),
        TabEvent::Updated {
            tab_id: tab.clone(),
            status: TabStatus::Complete
        }
    );
    assert_eq!(events.recv().await.unwrap(), TabEvent::Removed { tab_id: tab.clone() });
    assert!(platform.get_tab(&tab).await.is_err());

    drop(events);
    assert_eq!(platform.listener_count(), 0);
}

#[tokio::test]
async fn test_remove_window_closes_its_tabs() {
    let platform = MemoryPlatform::new();
    let window = platform.create_window(CreateWindow::minimized()).await.unwrap();
    assert!(!window.focused);

    let tab = platform
        .create_tab(CreateTab::background("https://claude.ai/new").in_window(window.id))
        .await
        .unwrap()
        .id;

    platform.remove_window(window.id).await.unwrap();
    assert!(platform.tab(&tab).is_none());
    assert!(platform.get_window(window.id).await.is_err());
}

#[tokio::test]
async fn test_window_capability_respected() {
    let platform = MemoryPlatform::new().with_capabilities(PlatformCapabilities {
        minimized_windows: false,
        tab_groups: true,
    });
    let result = platform.create_window(CreateWindow::minimized()).await;
    assert!(matches!(result, Err(PlatformError::Unsupported(_))));
}

#[tokio::test]
async fn test_grouping() {
    let platform = MemoryPlatform::new();
    let window = platform.main_window();
    let a = platform.open_tab("https://a.example/", window, false);
    let b = platform.open_tab("https://b.example/", window, false);

    let group = platform.group_tabs(&[a.clone()], None).await.unwrap();
    assert_eq!(platform.group_tabs(&[b.clone()], Some(group)).await.unwrap(), group);
    platform.update_group(group, "AI Crawl", true).await.unwrap();

    let info = platform.group(group).unwrap();
    assert_eq!(info.tabs, vec![a.clone(), b]);
    assert_eq!(info.title, "AI Crawl");
    assert!(info.collapsed);
    assert_eq!(platform.group_of(&a), Some(group));

    let missing = platform.group_tabs(&[a], Some(GroupId(99))).await;
    assert!(matches!(missing, Err(PlatformError::GroupNotFound(99))));
}

#[tokio::test]
async fn test_send_message_uses_responder() {
    let platform = MemoryPlatform::new();
    let tab = platform.open_tab("https://claude.ai/", platform.main_window(), false);
    platform.set_responder(|_, msg| Some(json!({"echo": msg["type"].clone()})));

    let reply = platform
        .send_message(&tab, json!({"type": "PING"}))
        .await
        .unwrap();
    assert_eq!(reply, Some(json!({"echo": "PING"})));
    assert_eq!(platform.sent_messages().len(), 1);
}

#[tokio::test]
async fn test_send_message_to_closed_tab() {
    let platform = MemoryPlatform::new();
    let result = platform.send_message(&TabId::new("tab-404"), json!({})).await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("connection"));
}
