//! Native desktop popup backend.

use tokio::runtime::Handle;

use super::{spawn_first_success, AlertBackend, CommandSpec, Platform};
use crate::config::DesktopConfig;
use crate::models::{Alert, Severity};
use crate::Result;

/// `notify-send` urgency level for a severity.
#[must_use]
pub fn urgency_level(urgency: Severity) -> &'static str {
    match urgency {
        Severity::Info => "normal",
        Severity::Warning | Severity::Critical => "critical",
    }
}

fn applescript_quote(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn powershell_quote(text: &str) -> String {
    text.replace('\'', "''")
}

/// Popup invocation for `alert` on `platform`.
#[must_use]
pub fn popup_command(platform: Platform, alert: &Alert, duration_ms: u64) -> CommandSpec {
    match platform {
        Platform::Linux => CommandSpec::new(
            "notify-send",
            [
                "-u".to_owned(),
                urgency_level(alert.urgency).to_owned(),
                "-t".to_owned(),
                duration_ms.to_string(),
                alert.title.clone(),
                alert.message.clone(),
            ],
        ),
        Platform::MacOs => CommandSpec::new(
            "osascript",
            [
                "-e".to_owned(),
                format!(
                    "display notification \"{}\" with title \"{}\"",
                    applescript_quote(&alert.message),
                    applescript_quote(&alert.title)
                ),
            ],
        ),
        Platform::Windows => CommandSpec::new(
            "powershell",
            [
                "-NoProfile".to_owned(),
                "-Command".to_owned(),
                format!(
                    "Add-Type -AssemblyName PresentationFramework; \
                     [System.Windows.MessageBox]::Show('{}', '{}') | Out-Null",
                    powershell_quote(&alert.message),
                    powershell_quote(&alert.title)
                ),
            ],
        ),
    }
}

/// Shows a native notification popup.
pub struct DesktopBackend {
    enabled: bool,
    duration_ms: u64,
    platform: Platform,
    runtime: Handle,
}

impl DesktopBackend {
    /// Create the backend for the current platform.
    #[must_use]
    pub fn new(config: &DesktopConfig, runtime: Handle) -> Self {
        Self {
            enabled: config.enabled,
            duration_ms: config.duration_ms,
            platform: Platform::current(),
            runtime,
        }
    }
}

impl AlertBackend for DesktopBackend {
    fn name(&self) -> &str {
        "desktop"
    }

    fn dispatch(&self, alert: &Alert) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }
        let command = popup_command(self.platform, alert, self.duration_ms);
        spawn_first_success(&self.runtime, "desktop", vec![command]);
        Ok(true)
    }
}
