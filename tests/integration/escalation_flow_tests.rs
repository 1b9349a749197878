//! End-to-end escalation: report → classify → dedup → route → deliver.

use std::time::Duration;

use attention_alert::app::AttentionSystem;
use attention_alert::models::{DispatchOutcome, Severity};

use super::test_helpers::{memory_history, started_system, test_config, Backends};

const LADDER: &str = r#"
cooldown_seconds = 10

[[escalation]]
delay_seconds = 0
backend = "audio"

[[escalation]]
delay_seconds = 1
backend = "desktop"

[[escalation]]
delay_seconds = 2
action = "auto_pause"
"#;

fn report(system: &AttentionSystem, kind: &str) {
    system
        .surface()
        .report(kind, "host", serde_json::Map::new(), Severity::Warning);
}

#[tokio::test]
async fn blocked_agent_escalates_through_the_ladder() {
    let backends = Backends::new();
    let system = started_system(test_config(LADDER), &backends, None);

    report(&system, "awaiting_confirmation");
    assert_eq!(backends.audio.count(), 1, "immediate rule fires synchronously");
    assert_eq!(backends.desktop.count(), 0);
    assert_eq!(system.router().pending_count(), 2);

    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert_eq!(backends.desktop.count(), 1);
    assert_eq!(
        backends.desktop.titles(),
        ["Agent Waiting For Confirmation"]
    );
    assert!(!system.watchdog().is_paused());

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(system.watchdog().is_paused(), "auto_pause pauses stall detection");
    assert_eq!(system.router().pending_count(), 0);
    assert_eq!(backends.webhook.count(), 0);

    system.shutdown().await;
}

#[tokio::test]
async fn recovery_cancels_pending_escalation() {
    let backends = Backends::new();
    let system = started_system(test_config(LADDER), &backends, None);

    report(&system, "permission_request");
    assert_eq!(system.router().pending_count(), 2);

    report(&system, "execution_running");
    assert_eq!(system.router().pending_count(), 0);

    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert_eq!(backends.audio.count(), 1);
    assert_eq!(backends.desktop.count(), 0);

    system.shutdown().await;
}

#[tokio::test]
async fn repeated_signal_within_cooldown_alerts_once() {
    let backends = Backends::new();
    let system = started_system(test_config(LADDER), &backends, None);

    for _ in 0..5 {
        report(&system, "stdin_request");
    }
    assert_eq!(backends.audio.count(), 1);

    // Recovery resets the cooldown, so the next block alerts again.
    report(&system, "execution_running");
    report(&system, "stdin_request");
    assert_eq!(backends.audio.count(), 2);

    system.shutdown().await;
}

#[tokio::test]
async fn distinct_states_alert_independently() {
    let backends = Backends::new();
    let system = started_system(test_config(LADDER), &backends, None);

    report(&system, "awaiting_confirmation");
    report(&system, "permission_request");
    report(&system, "awaiting_user_input");
    assert_eq!(backends.audio.count(), 3);

    system.shutdown().await;
}

#[tokio::test]
async fn empty_ladder_broadcasts_to_every_backend() {
    let backends = Backends::new();
    let system = started_system(test_config("escalation = []"), &backends, None);

    report(&system, "awaiting_confirmation");
    assert_eq!(backends.audio.count(), 1);
    assert_eq!(backends.desktop.count(), 1);
    assert_eq!(backends.webhook.count(), 1);

    system.shutdown().await;
}

#[tokio::test]
async fn terminal_events_never_alert() {
    let backends = Backends::new();
    let system = started_system(test_config(LADDER), &backends, None);

    report(&system, "execution_completed");
    report(&system, "execution_failed");
    report(&system, "tool_call");
    assert_eq!(backends.audio.count(), 0);
    assert_eq!(system.router().pending_count(), 0);

    system.shutdown().await;
}

#[tokio::test]
async fn deliveries_are_recorded_in_history() {
    let backends = Backends::new();
    let history = memory_history().await;
    let system = started_system(test_config(LADDER), &backends, Some(history));

    report(&system, "awaiting_confirmation");
    tokio::time::sleep(Duration::from_millis(1300)).await;
    system.router().resolve_block();

    let store = system.history().expect("history enabled");
    store.flush().await;
    let events = store.repo().recent(10).await.expect("recent");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "awaiting_confirmation");

    let backends_hit: Vec<(&str, DispatchOutcome)> = events[0]
        .dispatches
        .iter()
        .map(|d| (d.backend.as_str(), d.status))
        .collect();
    assert_eq!(
        backends_hit,
        [("audio", DispatchOutcome::Success), ("desktop", DispatchOutcome::Success)]
    );

    system.shutdown().await;
}

#[tokio::test]
async fn shutdown_cancels_pending_timers() {
    let backends = Backends::new();
    let system = started_system(test_config(LADDER), &backends, None);

    report(&system, "awaiting_confirmation");
    system.shutdown().await;
    assert_eq!(system.router().pending_count(), 0);

    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert_eq!(backends.desktop.count(), 0);
}
