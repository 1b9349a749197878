//! Raw agent event model.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Advisory severity attached to an event or notification.
///
/// Severity never gates control flow in the alerting core; it only
/// influences how loudly a backend renders the alert.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    #[default]
    Info,
    /// Something needs attention soon.
    Warning,
    /// Something needs attention now.
    Critical,
}

impl Severity {
    /// Lowercase wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    /// Parses `info`, `warning`, `critical`; `stalled` is accepted as an
    /// alias for `critical` because hosts commonly send it as an urgency.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "critical" | "stalled" => Ok(Self::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// An occurrence reported by a producer (watchdog, child monitor, host).
///
/// Immutable once constructed. `timestamp` is a monotonic reading used for
/// every cooldown and escalation computation; `created_at` is wall-clock and
/// only used for history rows.
#[derive(Debug, Clone)]
pub struct AgentEvent {
    id: Uuid,
    kind: String,
    source: String,
    payload: serde_json::Map<String, serde_json::Value>,
    severity: Severity,
    timestamp: Instant,
    created_at: DateTime<Utc>,
}

impl AgentEvent {
    /// Construct an event stamped with the current monotonic and wall-clock time.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        source: impl Into<String>,
        payload: serde_json::Map<String, serde_json::Value>,
        severity: Severity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            source: source.into(),
            payload,
            severity,
            timestamp: Instant::now(),
            created_at: Utc::now(),
        }
    }

    /// Construct an event with an empty payload and `info` severity.
    #[must_use]
    pub fn simple(kind: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(kind, source, serde_json::Map::new(), Severity::Info)
    }

    /// Return a copy of this event carrying an explicit monotonic timestamp.
    ///
    /// Producers replaying buffered signals use this to preserve the instant
    /// the signal was observed rather than the instant it was published.
    #[must_use]
    pub fn at(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Correlation identifier used in logs.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Raw, producer-defined type tag.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Producer identifier.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Opaque contextual data.
    #[must_use]
    pub fn payload(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.payload
    }

    /// Advisory severity.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Monotonic creation instant.
    #[must_use]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Wall-clock creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
