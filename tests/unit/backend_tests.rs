//! Unit tests for delivery backends and the backend registry.

use std::sync::Arc;

use tokio::runtime::Handle;

use attention_alert::backends::audio::sound_commands;
use attention_alert::backends::desktop::{popup_command, urgency_level};
use attention_alert::backends::webhook::{sign, WebhookBackend, WebhookPayload};
use attention_alert::backends::{deliver, AlertBackend, BackendRegistry, Platform};
use attention_alert::config::{BackendsConfig, WebhookConfig};
use attention_alert::models::{Alert, DispatchOutcome, Severity};

use super::test_helpers::{FailingBackend, PanickingBackend, RecordingBackend};

fn alert() -> Alert {
    Alert::new(
        "Agent Waiting For Stdin",
        "Source: child-monitor\nType: stdin_request",
        Severity::Warning,
    )
}

#[test]
fn linux_sound_falls_back_to_beep() {
    let commands = sound_commands(Platform::Linux);
    let programs: Vec<&str> = commands.iter().map(|c| c.program.as_str()).collect();
    assert_eq!(programs, ["paplay", "beep"]);
    assert!(commands[0].args[0].ends_with("complete.oga"));
}

#[test]
fn macos_and_windows_sounds() {
    assert_eq!(sound_commands(Platform::MacOs)[0].program, "afplay");
    let windows = &sound_commands(Platform::Windows)[0];
    assert_eq!(windows.program, "powershell");
    assert!(windows.args.iter().any(|a| a.contains("Exclamation")));
}

#[test]
fn notify_send_carries_urgency_and_duration() {
    let cmd = popup_command(Platform::Linux, &alert(), 7000);
    assert_eq!(cmd.program, "notify-send");
    assert_eq!(
        cmd.args,
        [
            "-u",
            "critical",
            "-t",
            "7000",
            "Agent Waiting For Stdin",
            "Source: child-monitor\nType: stdin_request",
        ]
    );
}

#[test]
fn info_alerts_are_normal_urgency() {
    assert_eq!(urgency_level(Severity::Info), "normal");
    assert_eq!(urgency_level(Severity::Critical), "critical");
}

#[test]
fn osascript_escapes_quotes() {
    let alert = Alert::new("Say \"hi\"", "path C:\\tmp", Severity::Info);
    let cmd = popup_command(Platform::MacOs, &alert, 0);
    assert_eq!(cmd.program, "osascript");
    assert_eq!(
        cmd.args[1],
        "display notification \"path C:\\\\tmp\" with title \"Say \\\"hi\\\"\""
    );
}

#[test]
fn powershell_doubles_single_quotes() {
    let alert = Alert::new("it's stuck", "don't wait", Severity::Info);
    let cmd = popup_command(Platform::Windows, &alert, 0);
    assert!(cmd.args[2].contains("'don''t wait', 'it''s stuck'"));
}

#[test]
fn signature_matches_known_hmac() {
    let signature = sign(b"The quick brown fox jumps over the lazy dog", "key").expect("sign");
    assert_eq!(
        signature,
        "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
    );
}

#[test]
fn webhook_payload_shape() {
    let alert = alert();
    let body = serde_json::to_value(WebhookPayload::from_alert(&alert)).expect("serialize");
    assert_eq!(
        body,
        serde_json::json!({
            "title": "Agent Waiting For Stdin",
            "message": "Source: child-monitor\nType: stdin_request",
            "urgency": "warning",
            "source": "attention_alert",
        })
    );
}

#[tokio::test]
async fn webhook_without_url_is_suppressed() {
    let config = WebhookConfig {
        enabled: true,
        url: "   ".into(),
        secret: String::new(),
    };
    let backend = WebhookBackend::new(&config, Handle::current());
    assert!(!backend.is_active());
    assert!(!backend.dispatch(&alert()).expect("dispatch"));
}

#[tokio::test]
async fn disabled_webhook_is_suppressed() {
    let config = WebhookConfig {
        enabled: false,
        url: "https://hooks.example.com".into(),
        secret: String::new(),
    };
    let backend = WebhookBackend::new(&config, Handle::current());
    assert_eq!(deliver(&backend, &alert()), (DispatchOutcome::Suppressed, None));
}

#[tokio::test]
async fn registry_from_config_registers_enabled_backends() {
    let registry = BackendRegistry::from_config(&BackendsConfig::default(), &Handle::current());
    assert_eq!(registry.names(), ["audio", "desktop"]);
    assert!(registry.get("webhook").is_none());
    assert!(registry.get("pager").is_none());

    let mut config = BackendsConfig::default();
    config.audio.enabled = false;
    config.webhook = WebhookConfig {
        enabled: true,
        url: "https://hooks.example.com".into(),
        secret: String::new(),
    };
    let registry = BackendRegistry::from_config(&config, &Handle::current());
    assert_eq!(registry.names(), ["desktop", "webhook"]);
}

#[test]
fn register_replaces_same_name_in_place() {
    let first = RecordingBackend::new("audio");
    let second = RecordingBackend::new("desktop");
    let replacement = RecordingBackend::new("audio");

    let mut registry = BackendRegistry::new();
    assert!(registry.is_empty());
    registry.register(first.clone());
    registry.register(second.clone());
    registry.register(replacement.clone());

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.names(), ["audio", "desktop"]);

    let audio = registry.get("audio").expect("audio registered");
    audio.dispatch(&alert()).expect("dispatch");
    assert_eq!(replacement.count(), 1);
    assert_eq!(first.count(), 0);
}

#[test]
fn deliver_maps_results_to_outcomes() {
    let ok = RecordingBackend::new("audio");
    let off = RecordingBackend::disabled("desktop");
    let failing = FailingBackend("webhook");

    assert_eq!(deliver(&*ok, &alert()), (DispatchOutcome::Success, None));
    assert_eq!(deliver(&*off, &alert()), (DispatchOutcome::Suppressed, None));

    let (outcome, error) = deliver(&failing, &alert());
    assert_eq!(outcome, DispatchOutcome::Failed);
    assert_eq!(error.as_deref(), Some("backend: speaker unplugged"));
}

#[test]
fn deliver_contains_panics() {
    let (outcome, error) = deliver(&PanickingBackend("audio"), &alert());
    assert_eq!(outcome, DispatchOutcome::Failed);
    assert!(error.is_some());
}
