//! Per-state alert cooldown gate.
//!
//! Prevents alert spam when an agent loops emitting the same blocking or
//! stall event. Each canonical state has its own window: a `stalled` alert
//! does not suppress a `waiting_for_stdin` alert arriving at the same time.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::models::{AgentEvent, AgentState};

#[derive(Debug, Default)]
struct Windows {
    last_alerted: HashMap<AgentState, Instant>,
    last_seen: HashMap<AgentState, Instant>,
}

/// Suppresses repeated alerts for the same state inside a cooldown window.
#[derive(Debug)]
pub struct Deduplicator {
    cooldown: Duration,
    windows: Mutex<Windows>,
}

impl Deduplicator {
    /// Create a gate with the given per-state cooldown.
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            windows: Mutex::new(Windows::default()),
        }
    }

    /// Configured cooldown.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Decide whether `event` (already classified as `state`) may alert.
    ///
    /// Timing uses the event's monotonic timestamp, not the time of the
    /// call. An event stamped before the last accepted alert counts as zero
    /// elapsed time.
    pub fn should_alert(&self, event: &AgentEvent, state: AgentState) -> bool {
        let now = event.timestamp();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.last_seen.insert(state, now);

        if let Some(&last) = windows.last_alerted.get(&state) {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.cooldown {
                debug!(
                    %state,
                    elapsed_ms = elapsed.as_millis(),
                    cooldown_ms = self.cooldown.as_millis(),
                    "suppressed duplicate alert"
                );
                return false;
            }
        }

        windows.last_alerted.insert(state, now);
        debug!(%state, "alert allowed");
        true
    }

    /// Forget the last alert for `state` so its next occurrence alerts.
    pub fn reset(&self, state: AgentState) {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        if windows.last_alerted.remove(&state).is_some() {
            debug!(%state, "cooldown reset");
        }
    }

    /// Most recent observation of `state`, whether or not it alerted.
    #[must_use]
    pub fn last_seen(&self, state: AgentState) -> Option<Instant> {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_seen
            .get(&state)
            .copied()
    }
}
