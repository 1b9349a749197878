//! Configuration parsing, defaults, environment overrides, and secret loading.
//!
//! Configuration problems are never fatal at runtime: [`AlertConfig::load`]
//! logs and falls back to defaults. [`AlertConfig::from_toml_str`] is the
//! strict variant used by tests and by callers that want to surface errors.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::models::{EscalationAction, EscalationRule};
use crate::{AppError, Result};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "attention-alert.toml";

/// Environment variable overriding `cooldown_seconds`.
pub const ENV_COOLDOWN: &str = "ALERT_COOLDOWN";

/// Environment variable supplying the webhook signing secret.
pub const ENV_WEBHOOK_SECRET: &str = "ALERT_WEBHOOK_SECRET";

const KEYRING_SERVICE: &str = "attention-alert";

/// Audio backend settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct AudioConfig {
    /// Whether the backend delivers.
    pub enabled: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Desktop popup backend settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct DesktopConfig {
    /// Whether the backend delivers.
    pub enabled: bool,
    /// How long the popup stays on screen, where the platform supports it.
    pub duration_ms: u64,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_ms: 7000,
        }
    }
}

/// Webhook backend settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct WebhookConfig {
    /// Whether the backend delivers. Ignored when `url` is empty.
    pub enabled: bool,
    /// Endpoint receiving the JSON POST.
    pub url: String,
    /// HMAC-SHA256 signing secret; empty disables signing.
    pub secret: String,
}

/// Per-backend settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct BackendsConfig {
    /// Platform sound.
    pub audio: AudioConfig,
    /// Native popup.
    pub desktop: DesktopConfig,
    /// HTTP webhook.
    pub webhook: WebhookConfig,
}

/// One `[[escalation]]` entry as written in the config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct RuleConfig {
    /// Seconds after dispatch before the rule fires.
    pub delay_seconds: u64,
    /// Logical backend name (`audio`, `desktop`, `webhook`).
    pub backend: Option<String>,
    /// Action name (`auto_pause`).
    pub action: Option<String>,
}

impl RuleConfig {
    fn backend_rule(delay_seconds: u64, backend: &str) -> Self {
        Self {
            delay_seconds,
            backend: Some(backend.to_owned()),
            action: None,
        }
    }

    /// Convert into a typed rule. Returns `None` (with a warning) for
    /// entries that could never fire.
    fn to_rule(&self, index: usize) -> Option<EscalationRule> {
        let delay = Duration::from_secs(self.delay_seconds);
        if let Some(ref backend) = self.backend {
            return Some(EscalationRule::backend(delay, backend.clone()));
        }
        let Some(ref name) = self.action else {
            warn!(rule_index = index, "escalation rule has neither backend nor action; ignored");
            return None;
        };
        let Some(action) = EscalationAction::from_name(name) else {
            warn!(rule_index = index, action = %name, "unknown escalation action; ignored");
            return None;
        };
        if delay.is_zero() {
            warn!(rule_index = index, %action, "zero-delay action rule never fires; ignored");
            return None;
        }
        Some(EscalationRule::action(delay, action))
    }
}

fn default_escalation() -> Vec<RuleConfig> {
    vec![
        RuleConfig::backend_rule(0, "audio"),
        RuleConfig::backend_rule(30, "desktop"),
        RuleConfig::backend_rule(120, "webhook"),
        RuleConfig {
            delay_seconds: 600,
            backend: None,
            action: Some("auto_pause".into()),
        },
    ]
}

/// Notification history settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct HistoryConfig {
    /// Whether events and dispatches are recorded.
    pub enabled: bool,
    /// `SQLite` database file.
    pub db_path: PathBuf,
    /// Days to keep rows before the retention task purges them.
    pub retention_days: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: PathBuf::from("notifications.db"),
            retention_days: 30,
        }
    }
}

/// Top-level configuration parsed from `attention-alert.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct AlertConfig {
    /// Master switch; when false the server exits right after startup.
    pub enabled: bool,
    /// Minimum seconds between two accepted alerts for the same state.
    pub cooldown_seconds: u64,
    /// Seconds without a heartbeat before the watchdog reports a stall.
    pub stall_timeout_seconds: u64,
    /// Seconds between repeated stall signals; 0 fires once per episode.
    pub repeat_interval_seconds: u64,
    /// Named pipe / Unix socket identifier for the host surface.
    pub ipc_name: String,
    /// Delivery backend settings.
    pub backends: BackendsConfig,
    /// Ordered escalation ladder.
    pub escalation: Vec<RuleConfig>,
    /// History store settings.
    pub history: HistoryConfig,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_seconds: 10,
            stall_timeout_seconds: 30,
            repeat_interval_seconds: 0,
            ipc_name: "attention-alert".into(),
            backends: BackendsConfig::default(),
            escalation: default_escalation(),
            history: HistoryConfig::default(),
        }
    }
}

impl AlertConfig {
    /// Parse configuration from a TOML string.
    ///
    /// Settings may sit at the top level or inside an `[attention_alert]`
    /// table. Absent keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the TOML is malformed or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut table: toml::Table = raw.parse()?;
        let section = match table.remove("attention_alert") {
            Some(toml::Value::Table(inner)) => inner,
            Some(_) => {
                return Err(AppError::Config(
                    "attention_alert must be a table".into(),
                ))
            }
            None => table,
        };
        let config: Self = toml::Value::Table(section).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Strictly load configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or is invalid.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Leniently load configuration, then apply environment overrides.
    ///
    /// With no explicit path, [`DEFAULT_CONFIG_FILE`] in the working
    /// directory is used if present. A missing or malformed file falls back
    /// to defaults with a warning.
    #[must_use]
    pub fn load(path: Option<&Path>) -> Self {
        let candidate = path
            .map(Path::to_path_buf)
            .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()));

        let mut config = match candidate {
            Some(ref p) => match Self::load_from_path(p) {
                Ok(config) => {
                    info!(path = %p.display(), "configuration loaded");
                    config
                }
                Err(err) => {
                    warn!(path = %p.display(), %err, "config unusable, falling back to defaults");
                    Self::default()
                }
            },
            None => {
                info!("no config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config
    }

    /// Apply `ALERT_COOLDOWN` and `ALERT_WEBHOOK_SECRET` overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = env::var(ENV_COOLDOWN) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.cooldown_seconds = secs,
                Err(err) => warn!(value = %raw, %err, "ignoring invalid {ENV_COOLDOWN}"),
            }
        }
        if let Ok(secret) = env::var(ENV_WEBHOOK_SECRET) {
            self.backends.webhook.secret = secret;
        }
    }

    /// Fill an empty webhook secret from the OS keychain.
    ///
    /// Only consulted when the webhook backend is enabled and neither the
    /// config file nor the environment supplied a secret. A missing entry is
    /// not an error: the webhook is simply sent unsigned.
    pub async fn load_credentials(&mut self) {
        if !self.backends.webhook.enabled || !self.backends.webhook.secret.is_empty() {
            return;
        }

        let lookup = tokio::task::spawn_blocking(|| {
            keyring::Entry::new(KEYRING_SERVICE, "webhook_secret")
                .and_then(|entry| entry.get_password())
        })
        .await;

        match lookup {
            Ok(Ok(secret)) if !secret.is_empty() => {
                info!("webhook secret loaded from keychain");
                self.backends.webhook.secret = secret;
            }
            Ok(Ok(_)) => warn!("keychain webhook secret is empty; webhook will be unsigned"),
            Ok(Err(err)) => {
                info!(?err, "no webhook secret in keychain; webhook will be unsigned");
            }
            Err(err) => warn!(%err, "keychain task panicked"),
        }
    }

    /// Typed escalation ladder, in configured order.
    #[must_use]
    pub fn escalation_rules(&self) -> Vec<EscalationRule> {
        self.escalation
            .iter()
            .enumerate()
            .filter_map(|(index, rule)| rule.to_rule(index))
            .collect()
    }

    /// Per-state alert cooldown.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    /// Watchdog stall timeout.
    #[must_use]
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_seconds)
    }

    /// Watchdog repeat interval; zero disables re-firing.
    #[must_use]
    pub fn repeat_interval(&self) -> Duration {
        Duration::from_secs(self.repeat_interval_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.stall_timeout_seconds == 0 {
            return Err(AppError::Config(
                "stall_timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.ipc_name.trim().is_empty() {
            return Err(AppError::Config("ipc_name must not be empty".into()));
        }
        Ok(())
    }
}
