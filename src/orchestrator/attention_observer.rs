//! Bus subscriber that turns raw events into alerts.
//!
//! Classification, cooldown, and escalation are owned by separate
//! components; the observer only sequences them and owns the recovery
//! transition: a `running` state cancels pending escalations and clears
//! every cooldown so the next block alerts immediately.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::bus::{EventBus, EventSubscriber, SubscriberRef};
use crate::models::{AgentEvent, AgentState, ALERTABLE_STATES};
use crate::orchestrator::alert_router::AlertRouter;
use crate::orchestrator::classifier::StateClassifier;
use crate::orchestrator::deduplicator::Deduplicator;
use crate::Result;

/// Subscriber half of the observer, registered on the bus.
struct Pipeline {
    classifier: StateClassifier,
    dedup: Arc<Deduplicator>,
    router: Arc<AlertRouter>,
}

impl Pipeline {
    fn handle(&self, event: &AgentEvent) {
        let Some(state) = self.classifier.classify(event) else {
            return;
        };

        match state {
            AgentState::Running => {
                self.router.resolve_block();
                for alertable in ALERTABLE_STATES {
                    self.dedup.reset(alertable);
                }
                debug!(event_id = %event.id(), "agent running, block resolved");
            }
            AgentState::Completed | AgentState::Failed => {
                debug!(%state, event_id = %event.id(), "terminal state observed");
            }
            alertable => {
                if self.dedup.should_alert(event, alertable) {
                    self.router.dispatch(event, alertable);
                }
            }
        }
    }
}

impl EventSubscriber for Pipeline {
    fn name(&self) -> &str {
        "attention_observer"
    }

    fn on_event(&self, event: &AgentEvent) -> Result<()> {
        self.handle(event);
        Ok(())
    }
}

/// Glue between the bus, the classifier, the deduplicator, and the router.
pub struct AttentionObserver {
    bus: Arc<EventBus>,
    pipeline: SubscriberRef,
    registered: Mutex<bool>,
}

impl AttentionObserver {
    /// Create an observer; call [`start`](Self::start) to begin observing.
    #[must_use]
    pub fn new(bus: Arc<EventBus>, dedup: Arc<Deduplicator>, router: Arc<AlertRouter>) -> Self {
        Self {
            bus,
            pipeline: Arc::new(Pipeline {
                classifier: StateClassifier::new(),
                dedup,
                router,
            }),
            registered: Mutex::new(false),
        }
    }

    /// Subscribe to the bus.
    pub fn start(&self) {
        let mut registered = self.registered.lock().unwrap_or_else(PoisonError::into_inner);
        if !*registered {
            self.bus.subscribe(Arc::clone(&self.pipeline));
            *registered = true;
            info!("attention observer started");
        }
    }

    /// Unsubscribe from the bus.
    pub fn stop(&self) {
        let mut registered = self.registered.lock().unwrap_or_else(PoisonError::into_inner);
        if *registered {
            self.bus.unsubscribe(&self.pipeline);
            *registered = false;
            info!("attention observer stopped");
        }
    }

    /// Whether the observer is subscribed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.registered.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
