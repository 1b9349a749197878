//! Local IPC server for `attention-alert-ctl` and host integrations.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Accepts line-delimited JSON commands and
//! routes them to the [`AgentSurface`](crate::surface::AgentSurface).
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "heartbeat"}
//! {"command": "notify", "message": "need input", "urgency": "warning"}
//! {"command": "event", "type": "awaiting_confirmation", "source": "host"}
//! {"command": "pause"}
//! {"command": "resume"}
//! {"command": "status"}
//! {"command": "history", "limit": 20}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "unknown command: foo"}
//! ```

use std::sync::Arc;

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::app::AttentionSystem;
use crate::models::Severity;
use crate::surface::SURFACE_SOURCE;
use crate::{AppError, Result};

const DEFAULT_HISTORY_LIMIT: u32 = 20;

/// Inbound IPC request.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct IpcRequest {
    /// Command verb.
    pub command: String,
    /// Notification text (`notify`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Notification urgency (`notify`); defaults to `info`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
    /// Raw event type (`event`).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Event producer (`event`); defaults to `host`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Event payload (`event`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Map<String, serde_json::Value>>,
    /// Event severity (`event`); defaults to `info`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// Row limit (`history`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl IpcRequest {
    /// Request carrying only a command verb.
    #[must_use]
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }
}

/// Outbound IPC response.
#[derive(Debug, Serialize, Deserialize)]
pub struct IpcResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Spawn the IPC server task.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_ipc_server(
    system: Arc<AttentionSystem>,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = system.config().ipc_name.clone();

    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "IPC server listening");

    let handle = tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                tokio::spawn(handle_connection(stream, Arc::clone(&system)));
                            }
                            Err(err) => warn!(%err, "IPC accept failed"),
                        }
                    }
                }
            }
        }
        .instrument(info_span!("ipc_server", name = %name)),
    );

    Ok(handle)
}

async fn handle_connection(
    stream: interprocess::local_socket::tokio::Stream,
    system: Arc<AttentionSystem>,
) {
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = match serde_json::from_str::<IpcRequest>(trimmed) {
                        Ok(request) => dispatch_command(&request, &system).await,
                        Err(err) => IpcResponse::error(format!("invalid json: {err}")),
                    };

                    let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
                    });
                    response_line.push('\n');

                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                        warn!(%err, "failed to write ipc response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "ipc read error");
                    break;
                }
            }
        }

        debug!("IPC connection closed");
    }
    .instrument(info_span!("ipc_conn"))
    .await;
}

fn parse_severity(raw: Option<&str>) -> std::result::Result<Severity, String> {
    raw.map_or(Ok(Severity::Info), str::parse)
}

/// Route one request to the surface.
pub async fn dispatch_command(request: &IpcRequest, system: &AttentionSystem) -> IpcResponse {
    debug!(command = %request.command, "ipc command");
    let surface = system.surface();

    match request.command.as_str() {
        "heartbeat" => {
            surface.heartbeat();
            IpcResponse::success(serde_json::json!({ "status": "alive" }))
        }
        "notify" => {
            let Some(ref message) = request.message else {
                return IpcResponse::error("missing required 'message' field");
            };
            let urgency = match parse_severity(request.urgency.as_deref()) {
                Ok(urgency) => urgency,
                Err(err) => return IpcResponse::error(err),
            };
            let results: serde_json::Map<String, serde_json::Value> = surface
                .notify(message, urgency)
                .into_iter()
                .map(|(backend, outcome)| (backend, outcome.as_str().into()))
                .collect();
            IpcResponse::success(serde_json::json!({ "urgency": urgency, "backends": results }))
        }
        "event" => {
            let Some(ref kind) = request.kind else {
                return IpcResponse::error("missing required 'type' field");
            };
            let severity = match parse_severity(request.severity.as_deref()) {
                Ok(severity) => severity,
                Err(err) => return IpcResponse::error(err),
            };
            let event = surface.report(
                kind,
                request.source.as_deref().unwrap_or(SURFACE_SOURCE),
                request.payload.clone().unwrap_or_default(),
                severity,
            );
            IpcResponse::success(serde_json::json!({ "event_id": event.id() }))
        }
        "pause" => {
            surface.pause();
            IpcResponse::success(serde_json::json!({ "paused": true }))
        }
        "resume" => {
            surface.resume();
            IpcResponse::success(serde_json::json!({ "paused": false }))
        }
        "status" => match serde_json::to_value(surface.status()) {
            Ok(status) => IpcResponse::success(status),
            Err(err) => IpcResponse::error(format!("failed to encode status: {err}")),
        },
        "history" => {
            let Some(history) = system.history() else {
                return IpcResponse::error("history is disabled");
            };
            history.flush().await;
            let limit = request.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
            match history.repo().recent(limit).await {
                Ok(events) => IpcResponse::success(serde_json::json!({ "events": events })),
                Err(err) => IpcResponse::error(format!("failed to read history: {err}")),
            }
        }
        other => IpcResponse::error(format!("unknown command: {other}")),
    }
}
