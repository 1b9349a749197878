//! Escalation scheduler.
//!
//! [`AlertRouter::dispatch`] fires the zero-delay rules of the escalation
//! ladder at once and arms a cancellable timer task for every delayed rule.
//! [`AlertRouter::resolve_block`] cancels every armed timer when the agent
//! recovers.
//!
//! Pending timers live in one map keyed by rule index. Each entry carries a
//! generation number; a woken timer must remove its own entry (same index,
//! same generation) under the lock before it fires. Cancellation and
//! re-arming clear the map, so a timer that lost the race finds its entry
//! gone and exits without firing. Once a timer has claimed itself it runs to
//! completion even if `resolve_block` arrives a moment later.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::backends::{self, BackendRef, BackendRegistry};
use crate::history::{DispatchRecord, HistorySink};
use crate::models::{
    AgentEvent, AgentState, Alert, DispatchOutcome, EscalationAction, EscalationRule,
    EscalationTarget,
};
use crate::Result;

/// Performs non-delivery escalation actions such as `auto_pause`.
pub trait ActionHandler: Send + Sync {
    /// Run `action` on behalf of the escalation that `event` started.
    ///
    /// # Errors
    ///
    /// Errors are logged by the router and otherwise ignored.
    fn invoke(&self, action: EscalationAction, event: &AgentEvent) -> Result<()>;
}

struct PendingTimer {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct PendingSet {
    timers: HashMap<usize, PendingTimer>,
    next_generation: u64,
}

impl PendingSet {
    fn cancel_all(&mut self) -> usize {
        let count = self.timers.len();
        for (_, timer) in self.timers.drain() {
            timer.cancel.cancel();
        }
        count
    }

    fn claim(&mut self, index: usize, generation: u64) -> bool {
        if self
            .timers
            .get(&index)
            .is_some_and(|timer| timer.generation == generation)
        {
            self.timers.remove(&index);
            true
        } else {
            false
        }
    }
}

/// Collaborators reached from both the dispatch path and timer tasks.
#[derive(Clone)]
struct Delivery {
    backends: BackendRegistry,
    history: Option<Arc<dyn HistorySink>>,
    actions: Option<Arc<dyn ActionHandler>>,
}

impl Delivery {
    fn record_event(&self, event: &AgentEvent) -> Option<i64> {
        self.history.as_ref().and_then(|h| h.record_event(event))
    }

    fn deliver_to(&self, backend: &BackendRef, alert: &Alert, event_id: Option<i64>) {
        let (outcome, error) = backends::deliver(backend.as_ref(), alert);
        if let Some(ref history) = self.history {
            history.record_dispatch(DispatchRecord::new(event_id, backend.name(), outcome, error));
        }
    }

    fn deliver_named(&self, name: &str, alert: &Alert, event_id: Option<i64>) {
        match self.backends.get(name) {
            Some(backend) => self.deliver_to(backend, alert, event_id),
            None => warn!(backend = name, "escalation names a backend that is not enabled; skipped"),
        }
    }

    fn run_action(&self, action: EscalationAction, event: &AgentEvent) {
        let Some(ref handler) = self.actions else {
            warn!(%action, "no action handler installed; escalation action skipped");
            return;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(action, event))) {
            Ok(Ok(())) => info!(%action, event_id = %event.id(), "escalation action executed"),
            Ok(Err(err)) => error!(%action, %err, "escalation action failed"),
            Err(_) => error!(%action, "escalation action panicked"),
        }
    }

    fn fire(&self, rule: &EscalationRule, alert: &Alert, event: &AgentEvent, event_id: Option<i64>) {
        match rule.target {
            EscalationTarget::Backend(ref name) => self.deliver_named(name, alert, event_id),
            EscalationTarget::Action(action) => self.run_action(action, event),
        }
    }
}

/// Routes alertable events through the escalation ladder.
pub struct AlertRouter {
    rules: Vec<EscalationRule>,
    delivery: Delivery,
    pending: Arc<Mutex<PendingSet>>,
    runtime: Handle,
}

impl AlertRouter {
    /// Create a router over `rules` and `backends`.
    ///
    /// Timer tasks are spawned on `runtime`, so `dispatch` may be called
    /// from threads outside the runtime.
    #[must_use]
    pub fn new(rules: Vec<EscalationRule>, backends: BackendRegistry, runtime: Handle) -> Self {
        Self {
            rules,
            delivery: Delivery {
                backends,
                history: None,
                actions: None,
            },
            pending: Arc::new(Mutex::new(PendingSet::default())),
            runtime,
        }
    }

    /// Record events and delivery outcomes in `history`.
    #[must_use]
    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.delivery.history = Some(history);
        self
    }

    /// Route escalation actions to `handler`.
    #[must_use]
    pub fn with_action_handler(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.delivery.actions = Some(handler);
        self
    }

    /// Configured escalation ladder.
    #[must_use]
    pub fn rules(&self) -> &[EscalationRule] {
        &self.rules
    }

    /// Build the notification for `event` classified as `state`.
    #[must_use]
    pub fn alert_for(event: &AgentEvent, state: AgentState) -> Alert {
        Alert::new(
            format!("Agent {}", state.title()),
            format!("Source: {}\nType: {}", event.source(), event.kind()),
            event.severity(),
        )
    }

    /// Alert on `event`, which has already passed deduplication.
    pub fn dispatch(&self, event: &AgentEvent, state: AgentState) {
        let alert = Self::alert_for(event, state);
        let event_id = self.delivery.record_event(event);

        info!(
            %state,
            event_id = %event.id(),
            source = event.source(),
            "dispatching alert"
        );

        if self.rules.is_empty() {
            fan_out(
                &self.delivery.backends,
                &alert,
                self.delivery.history.as_deref(),
                event_id,
            );
        } else {
            for rule in self.rules.iter().filter(|r| r.is_immediate()) {
                if let EscalationTarget::Backend(ref name) = rule.target {
                    self.delivery.deliver_named(name, &alert, event_id);
                }
            }
        }

        self.arm(event, &alert, event_id);
    }

    /// Cancel every armed timer without firing it.
    pub fn resolve_block(&self) {
        let cancelled = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel_all();
        if cancelled > 0 {
            info!(cancelled, "agent recovered, pending escalations cancelled");
        }
    }

    /// Number of armed timers.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .timers
            .len()
    }

    fn arm(&self, event: &AgentEvent, alert: &Alert, event_id: Option<i64>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let superseded = pending.cancel_all();
        if superseded > 0 {
            debug!(superseded, "previous escalation superseded");
        }

        for (index, rule) in self.rules.iter().enumerate() {
            if !rule.is_delayed() {
                continue;
            }
            pending.next_generation += 1;
            let generation = pending.next_generation;
            let cancel = CancellationToken::new();
            pending.timers.insert(
                index,
                PendingTimer {
                    generation,
                    cancel: cancel.clone(),
                },
            );

            debug!(rule_index = index, delay_ms = rule.delay.as_millis(), "escalation armed");

            let rule = rule.clone();
            let delivery = self.delivery.clone();
            let timers = Arc::clone(&self.pending);
            let alert = alert.clone();
            let event = event.clone();
            self.runtime.spawn(
                async move {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            debug!("escalation cancelled");
                            return;
                        }
                        () = tokio::time::sleep(rule.delay) => {}
                    }
                    let claimed = timers
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .claim(index, generation);
                    if !claimed {
                        debug!("escalation cancelled before firing");
                        return;
                    }
                    info!(delay_ms = rule.delay.as_millis(), "escalation firing");
                    delivery.fire(&rule, &alert, &event, event_id);
                }
                .instrument(info_span!("escalation", rule_index = index)),
            );
        }
    }
}

impl Drop for AlertRouter {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel_all();
    }
}

/// Outcome summary of a direct fan-out, in registry order.
pub type FanOut = Vec<(String, DispatchOutcome)>;

/// Deliver `alert` to every backend in `backends`, bypassing the ladder.
pub fn fan_out(
    backends: &BackendRegistry,
    alert: &Alert,
    history: Option<&dyn HistorySink>,
    event_id: Option<i64>,
) -> FanOut {
    backends
        .iter()
        .map(|backend| {
            let (outcome, error) = backends::deliver(backend.as_ref(), alert);
            if let Some(history) = history {
                history.record_dispatch(DispatchRecord::new(event_id, backend.name(), outcome, error));
            }
            (backend.name().to_owned(), outcome)
        })
        .collect()
}
