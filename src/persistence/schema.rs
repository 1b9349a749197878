//! `SQLite` schema bootstrap logic.
//!
//! All definitions use `IF NOT EXISTS`, so bootstrap is safe to re-run on
//! every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Create the `events` and `alert_dispatches` tables and their indices.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS events (
    id              INTEGER PRIMARY KEY NOT NULL,
    event_uuid      TEXT NOT NULL,
    event_type      TEXT NOT NULL,
    source          TEXT NOT NULL,
    severity        TEXT NOT NULL CHECK(severity IN ('info','warning','critical')),
    payload         TEXT NOT NULL,
    recorded_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alert_dispatches (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id        INTEGER,
    backend         TEXT NOT NULL,
    status          TEXT NOT NULL CHECK(status IN ('success','suppressed','failed')),
    dispatched_at   TEXT NOT NULL,
    error_msg       TEXT
);

CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_recorded ON events(recorded_at);
CREATE INDEX IF NOT EXISTS idx_dispatches_event ON alert_dispatches(event_id);
CREATE INDEX IF NOT EXISTS idx_dispatches_time ON alert_dispatches(dispatched_at);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
