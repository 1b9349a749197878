//! Unit tests for the history repository and the queued writer.

use std::sync::Arc;

use attention_alert::history::{DispatchRecord, HistorySink, SqliteHistory};
use attention_alert::models::{AgentEvent, DispatchOutcome, Severity};
use attention_alert::persistence::db;
use attention_alert::persistence::history_repo::HistoryRepo;

async fn repo() -> HistoryRepo {
    let pool = db::connect_memory().await.expect("in-memory db");
    HistoryRepo::new(Arc::new(pool))
}

fn stdin_event() -> AgentEvent {
    let mut payload = serde_json::Map::new();
    payload.insert("pid".into(), serde_json::json!(4242));
    AgentEvent::new("stdin_request", "child-monitor", payload, Severity::Warning)
}

#[tokio::test]
async fn empty_store_has_zero_max_id() {
    let repo = repo().await;
    assert_eq!(repo.max_event_id().await.expect("max id"), 0);
    assert!(repo.recent(10).await.expect("recent").is_empty());
}

#[tokio::test]
async fn event_round_trips_with_dispatches() {
    let repo = repo().await;
    let event = stdin_event();
    repo.insert_event(1, &event).await.expect("insert event");
    repo.insert_dispatch(&DispatchRecord::new(Some(1), "audio", DispatchOutcome::Success, None))
        .await
        .expect("insert dispatch");
    repo.insert_dispatch(&DispatchRecord::new(
        Some(1),
        "webhook",
        DispatchOutcome::Failed,
        Some("backend: timeout".into()),
    ))
    .await
    .expect("insert dispatch");

    let stored = repo.recent(10).await.expect("recent");
    assert_eq!(stored.len(), 1);
    let row = &stored[0];
    assert_eq!(row.id, 1);
    assert_eq!(row.event_uuid, event.id().to_string());
    assert_eq!(row.event_type, "stdin_request");
    assert_eq!(row.source, "child-monitor");
    assert_eq!(row.severity, Severity::Warning);
    assert_eq!(row.payload, serde_json::json!({ "pid": 4242 }));

    let outcomes: Vec<_> = row.dispatches.iter().map(|d| (d.backend.as_str(), d.status)).collect();
    assert_eq!(
        outcomes,
        [("audio", DispatchOutcome::Success), ("webhook", DispatchOutcome::Failed)]
    );
    assert_eq!(row.dispatches[1].error_msg.as_deref(), Some("backend: timeout"));
}

#[tokio::test]
async fn recent_is_newest_first_and_limited() {
    let repo = repo().await;
    for id in 1..=5 {
        repo.insert_event(id, &AgentEvent::simple(format!("kind_{id}"), "host"))
            .await
            .expect("insert");
    }

    let ids: Vec<i64> = repo.recent(3).await.expect("recent").iter().map(|e| e.id).collect();
    assert_eq!(ids, [5, 4, 3]);
    assert_eq!(repo.max_event_id().await.expect("max id"), 5);
}

#[tokio::test]
async fn dispatch_without_event_is_stored() {
    let repo = repo().await;
    repo.insert_dispatch(&DispatchRecord::new(None, "desktop", DispatchOutcome::Suppressed, None))
        .await
        .expect("orphan dispatch");
    assert!(repo.dispatches_for(1).await.expect("dispatches").is_empty());
}

#[tokio::test]
async fn purge_removes_old_rows_and_their_dispatches() {
    let repo = repo().await;

    repo.insert_event(1, &AgentEvent::simple("old", "host")).await.expect("insert");
    repo.insert_dispatch(&DispatchRecord::new(Some(1), "audio", DispatchOutcome::Success, None))
        .await
        .expect("insert dispatch");
    repo.insert_event(2, &AgentEvent::simple("new", "host")).await.expect("insert");

    assert_eq!(repo.purge_older_than(30).await.expect("purge"), 0);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(repo.purge_older_than(0).await.expect("purge"), 2);
    assert!(repo.recent(10).await.expect("recent").is_empty());
    assert!(repo.dispatches_for(1).await.expect("dispatches").is_empty());
}

#[tokio::test]
async fn writer_assigns_sequential_ids_after_existing_rows() {
    let repo = repo().await;
    repo.insert_event(7, &AgentEvent::simple("seed", "host")).await.expect("seed");

    let history = SqliteHistory::open(repo.clone()).await.expect("open");
    let first = history.record_event(&AgentEvent::simple("awaiting_confirmation", "host"));
    let second = history.record_event(&AgentEvent::simple("permission_request", "host"));
    assert_eq!(first, Some(8));
    assert_eq!(second, Some(9));

    history.record_dispatch(DispatchRecord::new(first, "audio", DispatchOutcome::Success, None));
    history.flush().await;

    let stored = repo.recent(10).await.expect("recent");
    let kinds: Vec<&str> = stored.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(kinds, ["permission_request", "awaiting_confirmation", "seed"]);
    assert_eq!(stored[1].dispatches.len(), 1);
}

#[tokio::test]
async fn writer_accepts_records_from_plain_threads() {
    let history = Arc::new(SqliteHistory::open(repo().await).await.expect("open"));

    let worker = Arc::clone(&history);
    std::thread::spawn(move || {
        for _ in 0..10 {
            worker.record_event(&AgentEvent::simple("stdin_request", "child-monitor"));
        }
    })
    .join()
    .expect("thread");

    history.flush().await;
    assert_eq!(history.repo().recent(50).await.expect("recent").len(), 10);
}
