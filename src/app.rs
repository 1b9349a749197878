//! Composition root.
//!
//! [`AttentionSystem`] builds every component once, wires them together
//! explicitly, and owns their lifetimes. Nothing in the crate reaches for a
//! global instance.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backends::BackendRegistry;
use crate::bus::EventBus;
use crate::config::AlertConfig;
use crate::history::{HistorySink, SqliteHistory};
use crate::models::{AgentEvent, EscalationAction};
use crate::orchestrator::alert_router::{ActionHandler, AlertRouter};
use crate::orchestrator::attention_observer::AttentionObserver;
use crate::orchestrator::deduplicator::Deduplicator;
use crate::orchestrator::watchdog::Watchdog;
use crate::persistence::db;
use crate::persistence::history_repo::HistoryRepo;
use crate::persistence::retention::spawn_retention_task;
use crate::surface::AgentSurface;
use crate::Result;

/// Runs escalation actions against the live system.
///
/// Holds the watchdog weakly: the watchdog publishes onto the bus that
/// (through the observer and router) owns this handler.
struct SystemActions {
    watchdog: Weak<Watchdog>,
}

impl ActionHandler for SystemActions {
    fn invoke(&self, action: EscalationAction, event: &AgentEvent) -> Result<()> {
        match action {
            EscalationAction::AutoPause => {
                if let Some(watchdog) = self.watchdog.upgrade() {
                    watchdog.pause();
                }
                error!(
                    event_id = %event.id(),
                    kind = event.kind(),
                    "escalation exhausted without operator response; agent auto-paused"
                );
            }
        }
        Ok(())
    }
}

/// Every component of a running alerting service.
pub struct AttentionSystem {
    config: AlertConfig,
    bus: Arc<EventBus>,
    watchdog: Arc<Watchdog>,
    router: Arc<AlertRouter>,
    observer: AttentionObserver,
    history: Option<Arc<SqliteHistory>>,
    surface: AgentSurface,
    cancel: CancellationToken,
    retention: Mutex<Option<JoinHandle<()>>>,
}

impl AttentionSystem {
    /// Build the system from configuration.
    ///
    /// History is opened when enabled; a database that cannot be opened is
    /// logged and the system runs without history.
    pub async fn build(config: AlertConfig) -> Self {
        let backends = BackendRegistry::from_config(&config.backends, &Handle::current());

        let history = if config.history.enabled {
            match open_history(&config).await {
                Ok(history) => Some(Arc::new(history)),
                Err(err) => {
                    warn!(%err, "history unavailable; continuing without it");
                    None
                }
            }
        } else {
            None
        };

        Self::assemble(config, backends, history)
    }

    /// Build the system over explicit backends and history.
    #[must_use]
    pub fn assemble(
        config: AlertConfig,
        backends: BackendRegistry,
        history: Option<Arc<SqliteHistory>>,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let watchdog = Arc::new(Watchdog::new(
            Arc::clone(&bus),
            config.stall_timeout(),
            config.repeat_interval(),
        ));
        let dedup = Arc::new(Deduplicator::new(config.cooldown()));
        let sink: Option<Arc<dyn HistorySink>> =
            history.as_ref().map(|h| Arc::clone(h) as Arc<dyn HistorySink>);

        let mut router = AlertRouter::new(config.escalation_rules(), backends.clone(), Handle::current())
            .with_action_handler(Arc::new(SystemActions {
                watchdog: Arc::downgrade(&watchdog),
            }));
        if let Some(ref sink) = sink {
            router = router.with_history(Arc::clone(sink));
        }
        let router = Arc::new(router);

        let observer = AttentionObserver::new(Arc::clone(&bus), Arc::clone(&dedup), Arc::clone(&router));
        let surface = AgentSurface::new(
            Arc::clone(&bus),
            Arc::clone(&watchdog),
            Arc::clone(&router),
            dedup,
            backends,
            sink,
        );

        Self {
            config,
            bus,
            watchdog,
            router,
            observer,
            history,
            surface,
            cancel: CancellationToken::new(),
            retention: Mutex::new(None),
        }
    }

    /// Start the observer, the watchdog, and the retention task.
    pub fn start(&self) {
        self.observer.start();
        self.watchdog.start();

        if let Some(ref history) = self.history {
            let task = spawn_retention_task(
                history.repo().clone(),
                self.config.history.retention_days,
                self.cancel.child_token(),
            );
            *self.retention.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        }
        info!(
            rules = self.router.rules().len(),
            history = self.history.is_some(),
            "attention system started"
        );
    }

    /// Stop producing alerts and drain history.
    pub async fn shutdown(&self) {
        self.observer.stop();
        self.router.resolve_block();
        self.watchdog.stop().await;
        self.cancel.cancel();

        let retention = self
            .retention
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = retention {
            if let Err(err) = task.await {
                warn!(%err, "retention task ended abnormally");
            }
        }
        if let Some(ref history) = self.history {
            history.flush().await;
        }
        info!("attention system stopped");
    }

    /// Loaded configuration.
    #[must_use]
    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Event bus shared by every producer.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Stall watchdog.
    #[must_use]
    pub fn watchdog(&self) -> &Arc<Watchdog> {
        &self.watchdog
    }

    /// Escalation scheduler.
    #[must_use]
    pub fn router(&self) -> &Arc<AlertRouter> {
        &self.router
    }

    /// Host-facing operations.
    #[must_use]
    pub fn surface(&self) -> &AgentSurface {
        &self.surface
    }

    /// History store, when enabled.
    #[must_use]
    pub fn history(&self) -> Option<&Arc<SqliteHistory>> {
        self.history.as_ref()
    }
}

async fn open_history(config: &AlertConfig) -> Result<SqliteHistory> {
    let pool = db::connect(&config.history.db_path).await?;
    SqliteHistory::open(HistoryRepo::new(Arc::new(pool))).await
}
