//! Operations exposed to the host of the observed agent.
//!
//! Every operation that reports progress counts as a heartbeat. `notify`
//! bypasses classification and escalation and goes straight to every
//! backend; `report` feeds the regular pipeline through the bus.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::backends::BackendRegistry;
use crate::bus::EventBus;
use crate::history::HistorySink;
use crate::models::{AgentEvent, Alert, Severity, ALERTABLE_STATES};
use crate::orchestrator::alert_router::{fan_out, AlertRouter, FanOut};
use crate::orchestrator::deduplicator::Deduplicator;
use crate::orchestrator::watchdog::{Watchdog, WatchdogStatus};

/// Raw type recorded in history for direct notifications.
pub const USER_NOTIFICATION: &str = "user_notification";

/// Source tag for events that originate from this surface.
pub const SURFACE_SOURCE: &str = "host";

/// Snapshot returned by [`AgentSurface::status`].
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    /// Watchdog view.
    pub watchdog: WatchdogStatus,
    /// Armed escalation timers.
    pub pending_escalations: usize,
    /// Registered backends, in order.
    pub backends: Vec<String>,
    /// Milliseconds since each alertable state was last observed.
    pub last_seen_ms: BTreeMap<String, u64>,
}

/// Host-facing entry points.
#[derive(Clone)]
pub struct AgentSurface {
    bus: Arc<EventBus>,
    watchdog: Arc<Watchdog>,
    router: Arc<AlertRouter>,
    dedup: Arc<Deduplicator>,
    backends: BackendRegistry,
    history: Option<Arc<dyn HistorySink>>,
}

impl AgentSurface {
    /// Wire the surface to already-constructed components.
    #[must_use]
    pub fn new(
        bus: Arc<EventBus>,
        watchdog: Arc<Watchdog>,
        router: Arc<AlertRouter>,
        dedup: Arc<Deduplicator>,
        backends: BackendRegistry,
        history: Option<Arc<dyn HistorySink>>,
    ) -> Self {
        Self {
            bus,
            watchdog,
            router,
            dedup,
            backends,
            history,
        }
    }

    /// Signal that the agent is alive.
    pub fn heartbeat(&self) {
        self.watchdog.heartbeat();
    }

    /// Alert the operator directly through every backend.
    pub fn notify(&self, message: &str, urgency: Severity) -> FanOut {
        self.heartbeat();

        let alert = Alert::new(
            format!("Attention Alert ({})", urgency.as_str().to_ascii_uppercase()),
            message,
            urgency,
        );

        let event_id = self.history.as_ref().and_then(|history| {
            let mut payload = serde_json::Map::new();
            payload.insert("message".into(), message.into());
            history.record_event(&AgentEvent::new(USER_NOTIFICATION, SURFACE_SOURCE, payload, urgency))
        });

        let results = fan_out(&self.backends, &alert, self.history.as_deref(), event_id);
        info!(%urgency, backends = results.len(), "direct notification dispatched");
        results
    }

    /// Publish a raw event into the alerting pipeline.
    pub fn report(
        &self,
        kind: &str,
        source: &str,
        payload: serde_json::Map<String, serde_json::Value>,
        severity: Severity,
    ) -> AgentEvent {
        self.heartbeat();
        let event = AgentEvent::new(kind, source, payload, severity);
        self.bus.publish(&event);
        event
    }

    /// Suspend stall detection.
    pub fn pause(&self) {
        self.watchdog.pause();
    }

    /// Resume stall detection with a fresh window.
    pub fn resume(&self) {
        self.watchdog.resume();
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> SystemStatus {
        let last_seen_ms = ALERTABLE_STATES
            .iter()
            .filter_map(|state| {
                self.dedup.last_seen(*state).map(|seen| {
                    let ms = u64::try_from(seen.elapsed().as_millis()).unwrap_or(u64::MAX);
                    (state.as_str().to_owned(), ms)
                })
            })
            .collect();

        SystemStatus {
            watchdog: self.watchdog.status(),
            pending_escalations: self.router.pending_count(),
            backends: self.backends.names(),
            last_seen_ms,
        }
    }
}
