//! Platform sound backend.

use tokio::runtime::Handle;

use super::{spawn_first_success, AlertBackend, CommandSpec, Platform};
use crate::config::AudioConfig;
use crate::models::Alert;
use crate::Result;

const MACOS_SOUND: &str = "/System/Library/Sounds/Glass.aiff";
const FREEDESKTOP_SOUND: &str = "/usr/share/sounds/freedesktop/stereo/complete.oga";

/// Player invocations to try, in order, on `platform`.
#[must_use]
pub fn sound_commands(platform: Platform) -> Vec<CommandSpec> {
    match platform {
        Platform::Windows => vec![CommandSpec::new(
            "powershell",
            [
                "-NoProfile",
                "-Command",
                "[System.Media.SystemSounds]::Exclamation.Play()",
            ],
        )],
        Platform::MacOs => vec![CommandSpec::new("afplay", [MACOS_SOUND])],
        Platform::Linux => vec![
            CommandSpec::new("paplay", [FREEDESKTOP_SOUND]),
            CommandSpec::new("beep", Vec::<String>::new()),
        ],
    }
}

/// Plays a short system sound.
pub struct AudioBackend {
    enabled: bool,
    platform: Platform,
    runtime: Handle,
}

impl AudioBackend {
    /// Create the backend for the current platform.
    #[must_use]
    pub fn new(config: &AudioConfig, runtime: Handle) -> Self {
        Self {
            enabled: config.enabled,
            platform: Platform::current(),
            runtime,
        }
    }
}

impl AlertBackend for AudioBackend {
    fn name(&self) -> &str {
        "audio"
    }

    fn dispatch(&self, _alert: &Alert) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }
        spawn_first_success(&self.runtime, "audio", sound_commands(self.platform));
        Ok(true)
    }
}
