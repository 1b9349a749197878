//! IPC command routing without a socket.

use attention_alert::ipc::server::{dispatch_command, IpcRequest};

use super::test_helpers::{memory_history, started_system, test_config, Backends};

#[tokio::test]
async fn heartbeat_pause_resume() {
    let backends = Backends::new();
    let system = started_system(test_config(""), &backends, None);

    let resp = dispatch_command(&IpcRequest::command("heartbeat"), &system).await;
    assert!(resp.ok);
    assert!(!system.watchdog().is_paused());

    let resp = dispatch_command(&IpcRequest::command("pause"), &system).await;
    assert_eq!(resp.data, Some(serde_json::json!({ "paused": true })));
    assert!(system.watchdog().is_paused());

    let resp = dispatch_command(&IpcRequest::command("resume"), &system).await;
    assert!(resp.ok);
    assert!(!system.watchdog().is_paused());

    system.shutdown().await;
}

#[tokio::test]
async fn notify_returns_per_backend_outcomes() {
    let backends = Backends::new();
    let system = started_system(test_config(""), &backends, None);

    let request = IpcRequest {
        message: Some("tests are green".into()),
        urgency: Some("stalled".into()),
        ..IpcRequest::command("notify")
    };
    let resp = dispatch_command(&request, &system).await;

    assert!(resp.ok, "{:?}", resp.error);
    let data = resp.data.expect("data");
    assert_eq!(data["urgency"], "critical");
    assert_eq!(data["backends"]["audio"], "success");
    assert_eq!(backends.webhook.count(), 1);

    system.shutdown().await;
}

#[tokio::test]
async fn notify_requires_message_and_valid_urgency() {
    let backends = Backends::new();
    let system = started_system(test_config(""), &backends, None);

    let resp = dispatch_command(&IpcRequest::command("notify"), &system).await;
    assert!(!resp.ok);
    assert!(resp.error.expect("error").contains("message"));

    let request = IpcRequest {
        message: Some("hi".into()),
        urgency: Some("loud".into()),
        ..IpcRequest::command("notify")
    };
    let resp = dispatch_command(&request, &system).await;
    assert!(!resp.ok);
    assert_eq!(backends.audio.count(), 0);

    system.shutdown().await;
}

#[tokio::test]
async fn event_command_feeds_the_pipeline() {
    let backends = Backends::new();
    let system = started_system(test_config(""), &backends, None);

    let request: IpcRequest = serde_json::from_str(
        r#"{"command":"event","type":"permission_request","source":"ide","payload":{"tool":"rm"}}"#,
    )
    .expect("request parses");
    let resp = dispatch_command(&request, &system).await;

    assert!(resp.ok);
    assert!(resp.data.expect("data")["event_id"].is_string());
    assert_eq!(backends.audio.count(), 1);

    let resp = dispatch_command(&IpcRequest::command("event"), &system).await;
    assert!(!resp.ok);

    system.shutdown().await;
}

#[tokio::test]
async fn status_serializes_snapshot() {
    let backends = Backends::new();
    let system = started_system(test_config(""), &backends, None);

    let resp = dispatch_command(&IpcRequest::command("status"), &system).await;
    let data = resp.data.expect("data");
    assert_eq!(data["watchdog"]["paused"], true);
    assert_eq!(data["pending_escalations"], 0);

    system.shutdown().await;
}

#[tokio::test]
async fn history_requires_store() {
    let backends = Backends::new();
    let system = started_system(test_config(""), &backends, None);

    let resp = dispatch_command(&IpcRequest::command("history"), &system).await;
    assert_eq!(resp.error.as_deref(), Some("history is disabled"));

    system.shutdown().await;
}

#[tokio::test]
async fn history_lists_recent_events() {
    let backends = Backends::new();
    let system = started_system(test_config(""), &backends, Some(memory_history().await));

    for kind in ["awaiting_confirmation", "stdin_request", "permission_request"] {
        let request = IpcRequest {
            kind: Some(kind.into()),
            ..IpcRequest::command("event")
        };
        assert!(dispatch_command(&request, &system).await.ok);
    }

    let request = IpcRequest {
        limit: Some(2),
        ..IpcRequest::command("history")
    };
    let data = dispatch_command(&request, &system).await.data.expect("data");
    let events = data["events"].as_array().expect("events array");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event_type"], "permission_request");
    assert_eq!(events[0]["dispatches"][0]["backend"], "audio");

    system.shutdown().await;
}

#[tokio::test]
async fn unknown_command_is_rejected() {
    let backends = Backends::new();
    let system = started_system(test_config(""), &backends, None);

    let resp = dispatch_command(&IpcRequest::command("reboot"), &system).await;
    assert_eq!(resp.error.as_deref(), Some("unknown command: reboot"));

    system.shutdown().await;
}
