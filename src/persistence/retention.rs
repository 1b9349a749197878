//! Retention service for time-based history purge.
//!
//! Runs as a background task that deletes dispatch rows, then event rows,
//! older than `retention_days`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::history_repo::HistoryRepo;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the retention purge background task.
///
/// The first purge runs immediately, then hourly until `cancel` fires.
#[must_use]
pub fn spawn_retention_task(
    repo: HistoryRepo,
    retention_days: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("retention task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match repo.purge_older_than(retention_days).await {
                        Ok(deleted) => info!(retention_days, deleted, "retention purge completed"),
                        Err(err) => error!(%err, "retention purge failed"),
                    }
                }
            }
        }
    })
}
