//! Queue-backed `SQLite` history writer.
//!
//! The alerting core records history from synchronous code, sometimes from
//! threads outside the runtime. [`SqliteHistory`] therefore never touches
//! the database on the caller's thread: ids are assigned from an atomic
//! counter seeded with the current `MAX(id)`, and rows are pushed onto a
//! bounded channel drained in order by a single writer task.

use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info_span, warn, Instrument};

use crate::history::{DispatchRecord, HistorySink};
use crate::models::AgentEvent;
use crate::persistence::history_repo::HistoryRepo;
use crate::Result;

const QUEUE_CAPACITY: usize = 1024;

enum WriteOp {
    Event { id: i64, event: Box<AgentEvent> },
    Dispatch(DispatchRecord),
    Flush(oneshot::Sender<()>),
}

/// [`HistorySink`] persisting to `SQLite` through a background writer.
pub struct SqliteHistory {
    next_id: AtomicI64,
    queue: mpsc::Sender<WriteOp>,
    repo: HistoryRepo,
}

impl SqliteHistory {
    /// Seed the id counter from `repo` and spawn the writer task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the current maximum id cannot be read.
    pub async fn open(repo: HistoryRepo) -> Result<Self> {
        let last_id = repo.max_event_id().await?;
        let (queue, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run_writer(repo.clone(), rx).instrument(info_span!("history_writer")));
        debug!(last_id, "history writer started");
        Ok(Self {
            next_id: AtomicI64::new(last_id + 1),
            queue,
            repo,
        })
    }

    /// Read-side access to the stored history.
    #[must_use]
    pub fn repo(&self) -> &HistoryRepo {
        &self.repo
    }

    /// Wait until every write queued before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.queue.send(WriteOp::Flush(done_tx)).await.is_err() {
            warn!("history writer is gone; nothing to flush");
            return;
        }
        if done_rx.await.is_err() {
            warn!("history writer stopped before flush completed");
        }
    }

    fn enqueue(&self, op: WriteOp) -> bool {
        match self.queue.try_send(op) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("history queue full; row dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("history writer is gone; row dropped");
                false
            }
        }
    }
}

impl HistorySink for SqliteHistory {
    fn record_event(&self, event: &AgentEvent) -> Option<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.enqueue(WriteOp::Event {
            id,
            event: Box::new(event.clone()),
        })
        .then_some(id)
    }

    fn record_dispatch(&self, record: DispatchRecord) {
        let _ = self.enqueue(WriteOp::Dispatch(record));
    }
}

async fn run_writer(repo: HistoryRepo, mut rx: mpsc::Receiver<WriteOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Event { id, event } => {
                if let Err(err) = repo.insert_event(id, &event).await {
                    warn!(id, %err, "failed to record event");
                }
            }
            WriteOp::Dispatch(record) => {
                if let Err(err) = repo.insert_dispatch(&record).await {
                    warn!(backend = %record.backend, %err, "failed to record dispatch");
                }
            }
            WriteOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("history writer stopped");
}
