//! Retention purge task.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use attention_alert::models::AgentEvent;
use attention_alert::persistence::db;
use attention_alert::persistence::history_repo::HistoryRepo;
use attention_alert::persistence::retention::spawn_retention_task;

async fn seeded_repo() -> HistoryRepo {
    let pool = db::connect_memory().await.expect("db");
    let repo = HistoryRepo::new(Arc::new(pool));
    repo.insert_event(1, &AgentEvent::simple("stdin_request", "child-monitor"))
        .await
        .expect("insert");
    repo
}

#[tokio::test]
async fn first_purge_runs_immediately() {
    let repo = seeded_repo().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let cancel = CancellationToken::new();
    let task = spawn_retention_task(repo.clone(), 0, cancel.clone());
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(repo.recent(10).await.expect("recent").is_empty());
    cancel.cancel();
    task.await.expect("task joins");
}

#[tokio::test]
async fn recent_rows_survive_retention() {
    let repo = seeded_repo().await;

    let cancel = CancellationToken::new();
    let task = spawn_retention_task(repo.clone(), 30, cancel.clone());
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(repo.recent(10).await.expect("recent").len(), 1);
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("task stops on cancel")
        .expect("task joins");
}
