//! Raw event type → canonical [`AgentState`] mapping.

use tracing::debug;

use crate::models::{AgentEvent, AgentState};

/// Raw type tag published when the agent asks for a yes/no confirmation.
pub const AWAITING_CONFIRMATION: &str = "awaiting_confirmation";
/// Raw type tag published when the agent waits on outside input.
pub const AWAITING_USER_INPUT: &str = "awaiting_user_input";
/// Raw type tag published when a child process appears blocked on stdin.
pub const STDIN_REQUEST: &str = "stdin_request";
/// Raw type tag published when the agent waits for a permission grant.
pub const PERMISSION_REQUEST: &str = "permission_request";
/// Raw type tag synthesized by the watchdog on a stall.
pub const EXECUTION_STALLED: &str = "execution_stalled";
/// Raw type tag for a finished run.
pub const EXECUTION_COMPLETED: &str = "execution_completed";
/// Raw type tag for a failed run.
pub const EXECUTION_FAILED: &str = "execution_failed";
/// Raw type tag announcing that the agent is making progress again.
pub const EXECUTION_RUNNING: &str = "execution_running";

/// Stateless classifier from producer vocabulary to canonical states.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateClassifier;

impl StateClassifier {
    /// Create a classifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Map an event to its canonical state; `None` for unrecognized types.
    #[must_use]
    #[allow(clippy::unused_self)] // Stateless mapper.
    pub fn classify(&self, event: &AgentEvent) -> Option<AgentState> {
        let state = Self::state_for(event.kind());
        if state.is_none() {
            debug!(kind = event.kind(), source = event.source(), "unclassified event type");
        }
        state
    }

    /// Lookup used by [`classify`](Self::classify).
    #[must_use]
    pub fn state_for(kind: &str) -> Option<AgentState> {
        match kind {
            AWAITING_CONFIRMATION => Some(AgentState::WaitingForConfirmation),
            AWAITING_USER_INPUT => Some(AgentState::WaitingForExternalInput),
            STDIN_REQUEST => Some(AgentState::WaitingForStdin),
            PERMISSION_REQUEST => Some(AgentState::WaitingForPermission),
            EXECUTION_STALLED => Some(AgentState::Stalled),
            EXECUTION_COMPLETED => Some(AgentState::Completed),
            EXECUTION_FAILED => Some(AgentState::Failed),
            EXECUTION_RUNNING => Some(AgentState::Running),
            _ => None,
        }
    }
}
