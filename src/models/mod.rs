//! Domain model module declarations.

pub mod escalation;
pub mod event;
pub mod state;

pub use escalation::{Alert, DispatchOutcome, EscalationAction, EscalationRule, EscalationTarget};
pub use event::{AgentEvent, Severity};
pub use state::{AgentState, ALERTABLE_STATES};
