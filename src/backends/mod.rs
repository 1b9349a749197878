//! Notification delivery backends.
//!
//! Every backend implements [`AlertBackend`]. `dispatch` must return quickly:
//! slow work (spawning a player process, an HTTP round trip) is handed to
//! the runtime and its eventual failure is only logged.

pub mod audio;
pub mod desktop;
pub mod webhook;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::process::Stdio;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use crate::config::BackendsConfig;
use crate::models::{Alert, DispatchOutcome};
use crate::Result;

pub use audio::AudioBackend;
pub use desktop::DesktopBackend;
pub use webhook::WebhookBackend;

/// Operating system family a backend renders for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux and other freedesktop systems.
    Linux,
    /// macOS.
    MacOs,
    /// Windows.
    Windows,
}

impl Platform {
    /// Platform this binary was compiled for.
    #[must_use]
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }
}

/// A helper process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Build a spec from a program and arguments.
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Run `candidates` in order on `runtime` until one exits successfully.
///
/// Returns immediately; failures are logged from the spawned task.
pub fn spawn_first_success(runtime: &Handle, backend: &'static str, candidates: Vec<CommandSpec>) {
    runtime.spawn(async move {
        for spec in &candidates {
            let status = tokio::process::Command::new(&spec.program)
                .args(&spec.args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            match status {
                Ok(status) if status.success() => {
                    debug!(backend, program = %spec.program, "helper succeeded");
                    return;
                }
                Ok(status) => debug!(backend, program = %spec.program, %status, "helper failed"),
                Err(err) => debug!(backend, program = %spec.program, %err, "helper unavailable"),
            }
        }
        warn!(backend, "no helper command succeeded");
    });
}

/// A channel through which an [`Alert`] reaches a human.
pub trait AlertBackend: Send + Sync {
    /// Logical name used by escalation rules.
    fn name(&self) -> &str;

    /// Trigger delivery of `alert`.
    ///
    /// Returns `Ok(true)` when delivery was started and `Ok(false)` when the
    /// backend is disabled or not configured.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Backend` when delivery could not be started.
    fn dispatch(&self, alert: &Alert) -> Result<bool>;
}

/// Shared handle to a backend.
pub type BackendRef = Arc<dyn AlertBackend>;

/// Ordered set of backends with lookup by logical name.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    ordered: Vec<BackendRef>,
    by_name: HashMap<String, BackendRef>,
}

impl BackendRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry of the enabled `audio`, `desktop`, and `webhook`
    /// backends, in that order.
    #[must_use]
    pub fn from_config(config: &BackendsConfig, runtime: &Handle) -> Self {
        let mut registry = Self::new();
        if config.audio.enabled {
            registry.register(Arc::new(AudioBackend::new(&config.audio, runtime.clone())));
        }
        if config.desktop.enabled {
            registry.register(Arc::new(DesktopBackend::new(&config.desktop, runtime.clone())));
        }
        if config.webhook.enabled {
            registry.register(Arc::new(WebhookBackend::new(&config.webhook, runtime.clone())));
        }
        registry
    }

    /// Add a backend. A later registration under the same name replaces the
    /// earlier one in place.
    pub fn register(&mut self, backend: BackendRef) {
        let name = backend.name().to_owned();
        if let Some(slot) = self.ordered.iter_mut().find(|b| b.name() == name) {
            warn!(backend = %name, "replacing registered backend");
            *slot = Arc::clone(&backend);
        } else {
            debug!(backend = %name, "backend registered");
            self.ordered.push(Arc::clone(&backend));
        }
        self.by_name.insert(name, backend);
    }

    /// Backend registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BackendRef> {
        self.by_name.get(name)
    }

    /// Backends in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &BackendRef> {
        self.ordered.iter()
    }

    /// Registered backend names in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.ordered.iter().map(|b| b.name().to_owned()).collect()
    }

    /// Number of registered backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether no backend is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Hand `alert` to `backend`, absorbing errors and panics.
///
/// Returns the outcome plus the error text for `failed` outcomes.
pub fn deliver(backend: &dyn AlertBackend, alert: &Alert) -> (DispatchOutcome, Option<String>) {
    match panic::catch_unwind(AssertUnwindSafe(|| backend.dispatch(alert))) {
        Ok(Ok(true)) => {
            debug!(backend = backend.name(), title = %alert.title, "alert dispatched");
            (DispatchOutcome::Success, None)
        }
        Ok(Ok(false)) => {
            debug!(backend = backend.name(), "backend disabled, alert suppressed");
            (DispatchOutcome::Suppressed, None)
        }
        Ok(Err(err)) => {
            warn!(backend = backend.name(), %err, "backend dispatch failed");
            (DispatchOutcome::Failed, Some(err.to_string()))
        }
        Err(_) => {
            error!(backend = backend.name(), "backend panicked during dispatch");
            (DispatchOutcome::Failed, Some("backend panicked".into()))
        }
    }
}
