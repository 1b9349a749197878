#![forbid(unsafe_code)]

//! Agent attention monitoring: classify blocking states, suppress alert
//! storms, escalate unacknowledged blocks, and detect stalls.

pub mod app;
pub mod backends;
pub mod bus;
pub mod config;
pub mod errors;
pub mod history;
pub mod ipc;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod surface;

pub use config::AlertConfig;
pub use errors::{AppError, Result};
