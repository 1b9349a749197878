//! Canonical agent states.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Canonical execution state of the observed agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Making progress.
    Running,
    /// Blocked on a yes/no confirmation from the operator.
    WaitingForConfirmation,
    /// Blocked reading standard input.
    WaitingForStdin,
    /// Blocked on a permission grant.
    WaitingForPermission,
    /// Blocked on some other input from outside the agent.
    WaitingForExternalInput,
    /// No heartbeat within the stall timeout.
    Stalled,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

/// States that may raise an alert.
pub const ALERTABLE_STATES: [AgentState; 5] = [
    AgentState::WaitingForConfirmation,
    AgentState::WaitingForStdin,
    AgentState::WaitingForPermission,
    AgentState::WaitingForExternalInput,
    AgentState::Stalled,
];

impl AgentState {
    /// Whether this state belongs to the alertable set.
    #[must_use]
    pub fn is_alertable(self) -> bool {
        ALERTABLE_STATES.contains(&self)
    }

    /// `snake_case` identifier, matching the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::WaitingForConfirmation => "waiting_for_confirmation",
            Self::WaitingForStdin => "waiting_for_stdin",
            Self::WaitingForPermission => "waiting_for_permission",
            Self::WaitingForExternalInput => "waiting_for_external_input",
            Self::Stalled => "stalled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Human-readable title-case label, e.g. `Waiting For Stdin`.
    #[must_use]
    pub fn title(self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_ascii_uppercase().to_string() + chars.as_str()
                })
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Display for AgentState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
