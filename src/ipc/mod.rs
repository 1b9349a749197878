//! Local IPC layer for `attention-alert-ctl` and host integrations.
//!
//! Provides a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! server that accepts JSON-line commands.

pub mod server;
