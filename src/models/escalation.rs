//! Escalation rule and dispatch outcome models.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::event::Severity;

/// Non-delivery action an escalation rule can trigger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EscalationAction {
    /// Ask the host to pause the agent (and stop stall re-firing).
    AutoPause,
}

impl EscalationAction {
    /// Parse a configured action name. Returns `None` for unknown names.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "auto_pause" => Some(Self::AutoPause),
            _ => None,
        }
    }

    /// Configured name of the action.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoPause => "auto_pause",
        }
    }
}

impl Display for EscalationAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an escalation rule does when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationTarget {
    /// Deliver through the backend registered under this logical name.
    Backend(String),
    /// Perform a non-delivery action.
    Action(EscalationAction),
}

/// One step of the escalation ladder.
///
/// A zero `delay` fires synchronously at dispatch time; anything greater
/// arms a cancellable timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationRule {
    /// Delay after dispatch before the rule fires.
    pub delay: Duration,
    /// Backend or action to run.
    pub target: EscalationTarget,
}

impl EscalationRule {
    /// Rule delivering through `backend` after `delay`.
    #[must_use]
    pub fn backend(delay: Duration, backend: impl Into<String>) -> Self {
        Self {
            delay,
            target: EscalationTarget::Backend(backend.into()),
        }
    }

    /// Rule running `action` after `delay`.
    #[must_use]
    pub fn action(delay: Duration, action: EscalationAction) -> Self {
        Self {
            delay,
            target: EscalationTarget::Action(action),
        }
    }

    /// Zero-delay backend rules fire at dispatch time.
    #[must_use]
    pub fn is_immediate(&self) -> bool {
        self.delay.is_zero() && matches!(self.target, EscalationTarget::Backend(_))
    }

    /// Rules with a positive delay are armed as timers.
    #[must_use]
    pub fn is_delayed(&self) -> bool {
        !self.delay.is_zero()
    }
}

/// Notification handed to a delivery backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// Short title, e.g. `Agent Stalled`.
    pub title: String,
    /// Detail body.
    pub message: String,
    /// How loudly to render it.
    pub urgency: Severity,
}

impl Alert {
    /// Construct an alert.
    #[must_use]
    pub fn new(title: impl Into<String>, message: impl Into<String>, urgency: Severity) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            urgency,
        }
    }
}

/// Result of handing an alert to one backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The backend triggered delivery.
    Success,
    /// The backend declined (disabled or not configured).
    Suppressed,
    /// The backend errored or panicked.
    Failed,
}

impl DispatchOutcome {
    /// Lowercase storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Suppressed => "suppressed",
            Self::Failed => "failed",
        }
    }
}

impl Display for DispatchOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
