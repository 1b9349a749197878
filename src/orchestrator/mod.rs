//! Alerting core.
//!
//! Raw events flow from the bus through the [`attention_observer`], which
//! classifies them, gates them with the [`deduplicator`], and hands
//! survivors to the [`alert_router`]. The [`watchdog`] and the
//! [`child_monitor`] are producers that publish synthetic events.

pub mod alert_router;
pub mod attention_observer;
pub mod child_monitor;
pub mod classifier;
pub mod deduplicator;
pub mod watchdog;
