//! Notification history recording.
//!
//! The alerting core talks to history through [`HistorySink`], which is
//! synchronous and infallible from the caller's point of view. The `SQLite`
//! implementation lives in [`writer`].

pub mod writer;

use chrono::{DateTime, Utc};

use crate::models::{AgentEvent, DispatchOutcome};

pub use writer::SqliteHistory;

/// One backend delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    /// History id of the triggering event, if it was recorded.
    pub event_id: Option<i64>,
    /// Logical backend name.
    pub backend: String,
    /// What happened.
    pub outcome: DispatchOutcome,
    /// Error text for `failed` outcomes.
    pub error: Option<String>,
    /// Wall-clock time of the attempt.
    pub dispatched_at: DateTime<Utc>,
}

impl DispatchRecord {
    /// Record stamped with the current wall-clock time.
    #[must_use]
    pub fn new(
        event_id: Option<i64>,
        backend: impl Into<String>,
        outcome: DispatchOutcome,
        error: Option<String>,
    ) -> Self {
        Self {
            event_id,
            backend: backend.into(),
            outcome,
            error,
            dispatched_at: Utc::now(),
        }
    }
}

/// Destination for event and dispatch records.
///
/// Implementations must not block the caller for long and must never
/// panic; failures are logged and swallowed.
pub trait HistorySink: Send + Sync {
    /// Store an event and return its id, or `None` if it was not stored.
    fn record_event(&self, event: &AgentEvent) -> Option<i64>;

    /// Store a delivery attempt.
    fn record_dispatch(&self, record: DispatchRecord);
}
