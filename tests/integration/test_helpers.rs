//! Shared construction helpers for end-to-end tests.
//!
//! Builds an [`AttentionSystem`] over recording backends and, optionally,
//! an in-memory history store so tests can observe every delivery.

use std::sync::{Arc, Mutex};

use attention_alert::app::AttentionSystem;
use attention_alert::backends::{AlertBackend, BackendRegistry};
use attention_alert::history::SqliteHistory;
use attention_alert::models::Alert;
use attention_alert::persistence::db;
use attention_alert::persistence::history_repo::HistoryRepo;
use attention_alert::{AlertConfig, Result};

/// Backend that remembers every alert it was handed.
pub struct RecordingBackend {
    name: &'static str,
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingBackend {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            alerts: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }

    pub fn titles(&self) -> Vec<String> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.title.clone())
            .collect()
    }
}

impl AlertBackend for RecordingBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn dispatch(&self, alert: &Alert) -> Result<bool> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(true)
    }
}

/// The three standard backends, recorded.
pub struct Backends {
    pub audio: Arc<RecordingBackend>,
    pub desktop: Arc<RecordingBackend>,
    pub webhook: Arc<RecordingBackend>,
}

impl Backends {
    pub fn new() -> Self {
        Self {
            audio: RecordingBackend::new("audio"),
            desktop: RecordingBackend::new("desktop"),
            webhook: RecordingBackend::new("webhook"),
        }
    }

    pub fn registry(&self) -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register(self.audio.clone());
        registry.register(self.desktop.clone());
        registry.register(self.webhook.clone());
        registry
    }
}

/// Parse a test configuration; history is always disabled in the file
/// because tests hand the store to `assemble` directly.
pub fn test_config(extra: &str) -> AlertConfig {
    let toml = format!("ipc_name = \"attention-alert-test\"\n{extra}\n[history]\nenabled = false\n");
    AlertConfig::from_toml_str(&toml).expect("valid test config")
}

/// In-memory history store.
pub async fn memory_history() -> Arc<SqliteHistory> {
    let pool = db::connect_memory().await.expect("in-memory db");
    Arc::new(
        SqliteHistory::open(HistoryRepo::new(Arc::new(pool)))
            .await
            .expect("history opens"),
    )
}

/// Assembled and started system over recording backends.
pub fn started_system(
    config: AlertConfig,
    backends: &Backends,
    history: Option<Arc<SqliteHistory>>,
) -> Arc<AttentionSystem> {
    let system = Arc::new(AttentionSystem::assemble(config, backends.registry(), history));
    system.start();
    system
}
