//! Heartbeat-driven stall watchdog.
//!
//! The watchdog starts paused and is activated by the first
//! [`heartbeat`](Watchdog::heartbeat). While active, a background task polls
//! the time since the last heartbeat; once it exceeds the stall timeout the
//! watchdog publishes an `execution_stalled` event on the bus, then repeats
//! it every `repeat_interval` until a heartbeat arrives. A heartbeat during
//! a stall publishes `execution_running` so pending escalations are
//! cancelled.
//!
//! The pause and stall flags are atomics; heartbeat timing sits behind a
//! mutex that is never held while publishing. Stall and recovery events are
//! published under a separate signal lock so subscribers always see a
//! recovery after the stall it ends. A recovery raised while that lock is
//! held (including from a subscriber reacting to the stall) is queued and
//! published by the lock holder before it lets go.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::bus::EventBus;
use crate::models::{AgentEvent, Severity};
use crate::orchestrator::classifier::{EXECUTION_RUNNING, EXECUTION_STALLED};

/// Source tag on events synthesized by the watchdog.
pub const WATCHDOG_SOURCE: &str = "watchdog";

const MIN_POLL: Duration = Duration::from_millis(10);
const MAX_POLL: Duration = Duration::from_secs(2);
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll cadence for a given stall timeout.
#[must_use]
pub fn poll_interval(timeout: Duration) -> Duration {
    (timeout / 3).clamp(MIN_POLL, MAX_POLL)
}

struct Timing {
    last_heartbeat: Instant,
    last_alert: Option<Instant>,
    alert_count: u32,
}

struct Shared {
    bus: Arc<EventBus>,
    timeout: Duration,
    repeat_interval: Duration,
    paused: AtomicBool,
    stalled: AtomicBool,
    recovery_pending: AtomicBool,
    timing: Mutex<Timing>,
    signal: Mutex<()>,
}

impl Shared {
    fn timing(&self) -> MutexGuard<'_, Timing> {
        self.timing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_signal(&self) -> Option<MutexGuard<'_, ()>> {
        match self.signal.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Run one poll under the signal lock, then flush any recovery queued
    /// while the stall was being published.
    fn poll(&self, cancel: &CancellationToken) {
        let guard = self.signal.lock().unwrap_or_else(PoisonError::into_inner);
        // A stop that raced the check wins.
        if let Some(event) = self.check(Instant::now()).filter(|_| !cancel.is_cancelled()) {
            self.bus.publish(&event);
        }
        self.publish_pending_recovery();
        drop(guard);
        self.flush_recovery();
    }

    /// Publish `execution_running` if one is queued. Caller holds `signal`.
    fn publish_pending_recovery(&self) {
        if self.recovery_pending.swap(false, Ordering::SeqCst) {
            info!("agent recovered from stall");
            self.bus.publish(&AgentEvent::simple(EXECUTION_RUNNING, WATCHDOG_SOURCE));
        }
    }

    /// Queue a recovery and publish it unless another thread holds the
    /// signal lock, in which case that thread publishes it on release.
    fn signal_recovery(&self) {
        self.recovery_pending.store(true, Ordering::SeqCst);
        self.flush_recovery();
    }

    fn flush_recovery(&self) {
        while self.recovery_pending.load(Ordering::SeqCst) {
            let Some(guard) = self.try_signal() else {
                return;
            };
            self.publish_pending_recovery();
            drop(guard);
        }
    }

    /// Decide whether a stall signal is due at `now` and build it.
    fn check(&self, now: Instant) -> Option<AgentEvent> {
        if self.paused.load(Ordering::SeqCst) {
            return None;
        }

        let mut timing = self.timing();
        let idle = now.saturating_duration_since(timing.last_heartbeat);
        if idle <= self.timeout {
            return None;
        }

        let due = match timing.last_alert {
            None => true,
            Some(last) => {
                !self.repeat_interval.is_zero()
                    && now.saturating_duration_since(last) > self.repeat_interval
            }
        };
        if !due {
            return None;
        }

        timing.last_alert = Some(now);
        timing.alert_count += 1;
        let alert_count = timing.alert_count;
        self.stalled.store(true, Ordering::SeqCst);
        drop(timing);

        warn!(idle_ms = idle.as_millis(), alert_count, "stall detected");

        let mut payload = serde_json::Map::new();
        payload.insert("idle_seconds".into(), idle.as_secs().into());
        payload.insert("alert_count".into(), alert_count.into());
        Some(AgentEvent::new(EXECUTION_STALLED, WATCHDOG_SOURCE, payload, Severity::Warning).at(now))
    }

    /// Start a fresh stall window; returns whether a stall was active.
    fn reset_timing(&self) -> bool {
        let mut timing = self.timing();
        timing.last_heartbeat = Instant::now();
        timing.last_alert = None;
        timing.alert_count = 0;
        self.stalled.swap(false, Ordering::SeqCst)
    }
}

/// Point-in-time view of the watchdog, reported by the status surface.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct WatchdogStatus {
    /// Whether monitoring is paused.
    pub paused: bool,
    /// Whether the current episode has fired a stall signal.
    pub stalled: bool,
    /// Milliseconds since the last heartbeat.
    pub idle_ms: u64,
    /// Stall signals fired in the current episode.
    pub alert_count: u32,
}

/// Heartbeat timer that publishes stall and recovery events.
pub struct Watchdog {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Watchdog {
    /// Create a paused watchdog publishing onto `bus`.
    ///
    /// `repeat_interval == 0` limits the watchdog to one signal per stall
    /// episode.
    #[must_use]
    pub fn new(bus: Arc<EventBus>, timeout: Duration, repeat_interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                bus,
                timeout,
                repeat_interval,
                paused: AtomicBool::new(true),
                stalled: AtomicBool::new(false),
                recovery_pending: AtomicBool::new(false),
                timing: Mutex::new(Timing {
                    last_heartbeat: Instant::now(),
                    last_alert: None,
                    alert_count: 0,
                }),
                signal: Mutex::new(()),
            }),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Stall timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.shared.timeout
    }

    /// Spawn the polling task. Must be called from within a tokio runtime.
    /// A second call while running is a no-op.
    pub fn start(&self) {
        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("watchdog already running");
            return;
        }
        if self.cancel.is_cancelled() {
            warn!("watchdog was stopped; not restarting");
            return;
        }

        let poll = poll_interval(self.shared.timeout);
        info!(
            timeout_ms = self.shared.timeout.as_millis(),
            poll_ms = poll.as_millis(),
            "watchdog started paused, waiting for first heartbeat"
        );

        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        *slot = Some(tokio::spawn(
            Self::run(shared, cancel, poll).instrument(info_span!("watchdog")),
        ));
    }

    async fn run(shared: Arc<Shared>, cancel: CancellationToken, poll: Duration) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("watchdog cancelled");
                    return;
                }
                () = tokio::time::sleep(poll) => {}
            }

            shared.poll(&cancel);
        }
    }

    /// Record agent progress.
    ///
    /// Activates a paused watchdog, resets the stall window, and publishes
    /// `execution_running` if a stall had been signalled.
    pub fn heartbeat(&self) {
        let was_stalled = self.shared.reset_timing();
        if self.shared.paused.swap(false, Ordering::SeqCst) {
            info!("watchdog activated by heartbeat");
        }
        if was_stalled {
            self.shared.signal_recovery();
        } else {
            debug!("heartbeat");
        }
    }

    /// Suspend stall detection.
    pub fn pause(&self) {
        if !self.shared.paused.swap(true, Ordering::SeqCst) {
            debug!("watchdog paused");
        }
    }

    /// Resume stall detection with a fresh window. No-op unless paused.
    ///
    /// A stall signalled before the pause is treated as recovered.
    pub fn resume(&self) {
        if self.shared.paused.load(Ordering::SeqCst) {
            let was_stalled = self.shared.reset_timing();
            self.shared.paused.store(false, Ordering::SeqCst);
            debug!("watchdog resumed");
            if was_stalled {
                self.shared.signal_recovery();
            }
        }
    }

    /// Whether monitoring is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Whether a stall has been signalled and not yet recovered.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.shared.stalled.load(Ordering::SeqCst)
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> WatchdogStatus {
        let timing = self.shared.timing();
        let idle = timing.last_heartbeat.elapsed();
        WatchdogStatus {
            paused: self.is_paused(),
            stalled: self.is_stalled(),
            idle_ms: u64::try_from(idle.as_millis()).unwrap_or(u64::MAX),
            alert_count: timing.alert_count,
        }
    }

    /// Stop the polling task and wait (bounded) for it to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            match tokio::time::timeout(STOP_TIMEOUT, task).await {
                Ok(Ok(())) => info!("watchdog stopped"),
                Ok(Err(err)) => warn!(%err, "watchdog task ended abnormally"),
                Err(_) => warn!("watchdog did not stop within timeout"),
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
