#![forbid(unsafe_code)]

//! `attention-alert-ctl`: local CLI companion for `attention-alert`.
//!
//! Connects to the IPC socket and sends JSON commands to the server. Hosts
//! without a native integration can call it from scripts to send
//! heartbeats and report events.

use std::io::{BufRead, BufReader, Write};

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

#[derive(Debug, Parser)]
#[command(
    name = "attention-alert-ctl",
    about = "Local CLI for the attention-alert server",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the server's `ipc_name` config).
    #[arg(long, default_value = "attention-alert")]
    ipc_name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Signal that the agent is alive.
    Heartbeat,

    /// Alert the operator through every backend.
    Notify {
        /// Message text.
        message: String,
        /// Urgency: info, warning, or critical.
        #[arg(long, default_value = "info")]
        urgency: String,
    },

    /// Report a raw agent event, e.g. `awaiting_confirmation`.
    Event {
        /// Raw event type.
        #[arg(value_name = "TYPE")]
        kind: String,
        /// Event producer.
        #[arg(long)]
        source: Option<String>,
        /// Severity: info, warning, or critical.
        #[arg(long)]
        severity: Option<String>,
        /// JSON object payload.
        #[arg(long)]
        payload: Option<String>,
    },

    /// Pause stall detection.
    Pause,

    /// Resume stall detection.
    Resume,

    /// Show watchdog and escalation status.
    Status,

    /// Show recent notification history.
    History {
        /// Maximum number of events.
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

fn build_request(command: &Command) -> Result<serde_json::Value, String> {
    let request = match command {
        Command::Heartbeat => serde_json::json!({ "command": "heartbeat" }),
        Command::Notify { message, urgency } => {
            serde_json::json!({ "command": "notify", "message": message, "urgency": urgency })
        }
        Command::Event {
            kind,
            source,
            severity,
            payload,
        } => {
            let mut req = serde_json::json!({ "command": "event", "type": kind });
            if let Some(s) = source {
                req["source"] = serde_json::Value::String(s.clone());
            }
            if let Some(s) = severity {
                req["severity"] = serde_json::Value::String(s.clone());
            }
            if let Some(raw) = payload {
                let value: serde_json::Value = serde_json::from_str(raw)
                    .map_err(|err| format!("--payload is not valid JSON: {err}"))?;
                if !value.is_object() {
                    return Err("--payload must be a JSON object".into());
                }
                req["payload"] = value;
            }
            req
        }
        Command::Pause => serde_json::json!({ "command": "pause" }),
        Command::Resume => serde_json::json!({ "command": "resume" }),
        Command::Status => serde_json::json!({ "command": "status" }),
        Command::History { limit } => serde_json::json!({ "command": "history", "limit": limit }),
    };
    Ok(request)
}

fn main() {
    let args = Cli::parse();

    let request_json = match build_request(&args.command) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(2);
        }
    };

    match send_ipc_command(&args.ipc_name, &request_json) {
        Ok(response) => {
            if let Some(obj) = response.as_object() {
                let ok = obj
                    .get("ok")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if ok {
                    if let Some(data) = obj.get("data") {
                        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                    } else {
                        println!("OK");
                    }
                } else {
                    let err_msg = obj
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    eprintln!("Error: {err_msg}");
                    std::process::exit(1);
                }
            } else {
                println!("{response}");
            }
        }
        Err(err) => {
            eprintln!("Failed to connect to server: {err}");
            eprintln!("Is attention-alert running with ipc_name '{}'?", args.ipc_name);
            std::process::exit(1);
        }
    }
}

/// Connect to the IPC socket, send a JSON command, and read the response.
fn send_ipc_command(
    ipc_name: &str,
    request: &serde_json::Value,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: serde_json::Value = serde_json::from_str(response_line.trim())?;
    Ok(response)
}
