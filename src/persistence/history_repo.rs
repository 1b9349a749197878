//! Event and dispatch history repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::history::DispatchRecord;
use crate::models::{AgentEvent, DispatchOutcome, Severity};
use crate::{AppError, Result};

use super::db::Database;

/// A stored delivery attempt.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoredDispatch {
    /// Logical backend name.
    pub backend: String,
    /// Outcome.
    pub status: DispatchOutcome,
    /// Time of the attempt.
    pub dispatched_at: DateTime<Utc>,
    /// Error text for failures.
    pub error_msg: Option<String>,
}

/// A stored event together with its delivery attempts.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoredEvent {
    /// History id.
    pub id: i64,
    /// Correlation id of the in-memory event.
    pub event_uuid: String,
    /// Raw type tag.
    pub event_type: String,
    /// Producer.
    pub source: String,
    /// Severity.
    pub severity: Severity,
    /// Opaque payload.
    pub payload: serde_json::Value,
    /// When the event was created.
    pub recorded_at: DateTime<Utc>,
    /// Delivery attempts, oldest first.
    pub dispatches: Vec<StoredDispatch>,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    event_uuid: String,
    event_type: String,
    source: String,
    severity: String,
    payload: String,
    recorded_at: String,
}

#[derive(sqlx::FromRow)]
struct DispatchRow {
    backend: String,
    status: String,
    dispatched_at: String,
    error_msg: Option<String>,
}

/// Fixed-width UTC timestamp so stored values order correctly as text.
fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

fn parse_outcome(raw: &str) -> Result<DispatchOutcome> {
    match raw {
        "success" => Ok(DispatchOutcome::Success),
        "suppressed" => Ok(DispatchOutcome::Suppressed),
        "failed" => Ok(DispatchOutcome::Failed),
        other => Err(AppError::Db(format!("invalid dispatch status: {other}"))),
    }
}

impl DispatchRow {
    fn into_stored(self) -> Result<StoredDispatch> {
        Ok(StoredDispatch {
            backend: self.backend,
            status: parse_outcome(&self.status)?,
            dispatched_at: parse_time("dispatched_at", &self.dispatched_at)?,
            error_msg: self.error_msg,
        })
    }
}

impl EventRow {
    fn into_stored(self, dispatches: Vec<StoredDispatch>) -> Result<StoredEvent> {
        let severity = self
            .severity
            .parse::<Severity>()
            .map_err(|e| AppError::Db(format!("invalid severity: {e}")))?;
        let payload = serde_json::from_str(&self.payload)
            .map_err(|e| AppError::Db(format!("invalid payload: {e}")))?;
        Ok(StoredEvent {
            id: self.id,
            event_uuid: self.event_uuid,
            event_type: self.event_type,
            source: self.source,
            severity,
            payload,
            recorded_at: parse_time("recorded_at", &self.recorded_at)?,
            dispatches,
        })
    }
}

/// Repository wrapper around `SQLite` for notification history.
#[derive(Clone)]
pub struct HistoryRepo {
    db: Arc<Database>,
}

impl HistoryRepo {
    /// Create a repository over `db`.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Highest stored event id, or 0 for an empty table.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on query failure.
    pub async fn max_event_id(&self) -> Result<i64> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM events")
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(max.unwrap_or(0))
    }

    /// Store `event` under the pre-assigned `id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on insert failure.
    pub async fn insert_event(&self, id: i64, event: &AgentEvent) -> Result<()> {
        let payload = serde_json::to_string(event.payload())
            .map_err(|e| AppError::Db(format!("failed to encode payload: {e}")))?;
        sqlx::query(
            "INSERT INTO events (id, event_uuid, event_type, source, severity, payload, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(id)
        .bind(event.id().to_string())
        .bind(event.kind())
        .bind(event.source())
        .bind(event.severity().as_str())
        .bind(payload)
        .bind(format_time(event.created_at()))
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Store one delivery attempt.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on insert failure.
    pub async fn insert_dispatch(&self, record: &DispatchRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO alert_dispatches (event_id, backend, status, dispatched_at, error_msg)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(record.event_id)
        .bind(&record.backend)
        .bind(record.outcome.as_str())
        .bind(format_time(record.dispatched_at))
        .bind(record.error.as_deref())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Delivery attempts for one event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on query failure or malformed rows.
    pub async fn dispatches_for(&self, event_id: i64) -> Result<Vec<StoredDispatch>> {
        let rows: Vec<DispatchRow> = sqlx::query_as(
            "SELECT backend, status, dispatched_at, error_msg
             FROM alert_dispatches WHERE event_id = ?1 ORDER BY id ASC",
        )
        .bind(event_id)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(DispatchRow::into_stored).collect()
    }

    /// The `limit` newest events, newest first, with their dispatches.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on query failure or malformed rows.
    pub async fn recent(&self, limit: u32) -> Result<Vec<StoredEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT id, event_uuid, event_type, source, severity, payload, recorded_at
             FROM events ORDER BY id DESC LIMIT ?1",
        )
        .bind(i64::from(limit))
        .fetch_all(self.db.as_ref())
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let dispatches = self.dispatches_for(row.id).await?;
            events.push(row.into_stored(dispatches)?);
        }
        Ok(events)
    }

    /// Delete rows older than `days`, dispatches first.
    ///
    /// Returns the number of deleted events.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on delete failure.
    pub async fn purge_older_than(&self, days: u32) -> Result<u64> {
        let cutoff = format_time(Utc::now() - chrono::Duration::days(i64::from(days)));

        let mut tx = self.db.begin().await?;
        sqlx::query(
            "DELETE FROM alert_dispatches
             WHERE dispatched_at < ?1
                OR event_id IN (SELECT id FROM events WHERE recorded_at < ?1)",
        )
        .bind(&cutoff)
        .execute(&mut *tx)
        .await?;
        let deleted = sqlx::query("DELETE FROM events WHERE recorded_at < ?1")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted)
    }
}
