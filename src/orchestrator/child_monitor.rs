//! Output-silence monitor for spawned child processes.
//!
//! [`ObservedChild`] wraps a `tokio::process::Child` whose stdout and stderr
//! are piped. While the child runs, every chunk of output refreshes a shared
//! "last output" instant. When the child stays silent longer than the stall
//! timeout it is assumed to be blocked on stdin: one `stdin_request` event
//! is published per silence episode, and `execution_running` follows once
//! output resumes.

use std::process::ExitStatus;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::models::{AgentEvent, Severity};
use crate::orchestrator::classifier::{EXECUTION_RUNNING, STDIN_REQUEST};
use crate::orchestrator::watchdog::poll_interval;
use crate::{AppError, Result};

/// Source tag on events published by the child monitor.
pub const CHILD_MONITOR_SOURCE: &str = "child-monitor";

type LastOutput = Arc<Mutex<Instant>>;

/// Collected result of an observed child.
#[derive(Debug)]
pub struct ChildOutput {
    /// Exit status.
    pub status: ExitStatus,
    /// Everything written to stdout.
    pub stdout: Vec<u8>,
    /// Everything written to stderr.
    pub stderr: Vec<u8>,
}

/// A child process watched for output silence.
pub struct ObservedChild {
    child: Child,
    bus: Arc<EventBus>,
    stall_timeout: Duration,
    program: String,
    deadline: Option<Duration>,
}

impl ObservedChild {
    /// Observe `child`, publishing silence events on `bus`.
    #[must_use]
    pub fn new(child: Child, bus: Arc<EventBus>, stall_timeout: Duration) -> Self {
        Self {
            child,
            bus,
            stall_timeout,
            program: String::from("child"),
            deadline: None,
        }
    }

    /// Label reported in event payloads.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Kill the child if it is still running after `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// OS process id, if the child has not been reaped.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the child to exit while draining and observing its output.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the deadline expires (the child is
    /// killed) or a reader task fails, and `AppError::Io` if waiting on the
    /// child fails.
    pub async fn wait_with_output(self) -> Result<ChildOutput> {
        let Self {
            mut child,
            bus,
            stall_timeout,
            program,
            deadline,
        } = self;

        let pid = child.id();
        let last_output: LastOutput = Arc::new(Mutex::new(Instant::now()));
        let stdout_task = child
            .stdout
            .take()
            .map(|stream| spawn_reader(stream, Arc::clone(&last_output)));
        let stderr_task = child
            .stderr
            .take()
            .map(|stream| spawn_reader(stream, Arc::clone(&last_output)));

        let poll = poll_interval(stall_timeout);
        let started = Instant::now();
        let mut silent = false;

        debug!(?pid, program, "observing child process");

        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                () = tokio::time::sleep(poll) => {}
            }

            if let Some(limit) = deadline {
                if started.elapsed() > limit {
                    warn!(?pid, program, limit_ms = limit.as_millis(), "child exceeded deadline, killing");
                    if let Err(err) = child.kill().await {
                        warn!(?pid, %err, "failed to kill child");
                    }
                    abort(stdout_task);
                    abort(stderr_task);
                    return Err(AppError::Process(format!(
                        "{program} exceeded deadline of {} ms",
                        limit.as_millis()
                    )));
                }
            }

            let idle = last_output
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .elapsed();
            if idle > stall_timeout {
                if !silent {
                    silent = true;
                    warn!(?pid, program, idle_ms = idle.as_millis(), "child silent, possibly waiting for stdin");
                    bus.publish(&silence_event(pid, &program));
                }
            } else if silent {
                silent = false;
                info!(?pid, program, "child output resumed");
                bus.publish(&AgentEvent::simple(EXECUTION_RUNNING, CHILD_MONITOR_SOURCE));
            }
        };

        let stdout = collect(stdout_task).await?;
        let stderr = collect(stderr_task).await?;
        debug!(?pid, program, %status, "child exited");

        Ok(ChildOutput {
            status,
            stdout,
            stderr,
        })
    }
}

fn silence_event(pid: Option<u32>, program: &str) -> AgentEvent {
    let mut payload = serde_json::Map::new();
    payload.insert("pid".into(), pid.map_or(serde_json::Value::Null, Into::into));
    payload.insert("program".into(), program.into());
    AgentEvent::new(STDIN_REQUEST, CHILD_MONITOR_SOURCE, payload, Severity::Warning)
}

fn spawn_reader<R>(mut stream: R, last_output: LastOutput) -> JoinHandle<std::io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut collected = Vec::new();
        let mut chunk = [0_u8; 4096];
        loop {
            let read = stream.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            collected.extend_from_slice(&chunk[..read]);
            *last_output.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        }
        Ok(collected)
    })
}

fn abort(task: Option<JoinHandle<std::io::Result<Vec<u8>>>>) {
    if let Some(task) = task {
        task.abort();
    }
}

async fn collect(task: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>> {
    match task {
        None => Ok(Vec::new()),
        Some(task) => task
            .await
            .map_err(|err| AppError::Process(format!("output reader failed: {err}")))?
            .map_err(AppError::from),
    }
}
