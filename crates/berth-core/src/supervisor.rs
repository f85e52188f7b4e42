//! Per-environment process supervision.
//!
//! Each running environment gets one supervisor: a background thread that
//! polls the host's process-handle collaborator and drives a small state
//! machine. Supervisors are independent; one blocking or dying never
//! affects another. Cancellation is cooperative — the stop flag is checked
//! once per poll interval, so termination latency is bounded by one
//! interval.

use crate::CoreError;
use berth_runtime::{EnvironmentSlot, ProcessHandles};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Default poll interval for process-handle checks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Observable state of one supervised process.
///
/// `Unknown` is reachable only from `Starting`/`Stopping` on a supervision
/// failure and is terminal except for an explicit stop request, which
/// always drives to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessState {
    Starting,
    Started,
    Stopping,
    Stopped,
    Unknown,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

struct Supervision {
    state: ProcessState,
    stop_requested: bool,
}

struct Shared {
    slot: EnvironmentSlot,
    handles: Arc<dyn ProcessHandles>,
    supervision: Mutex<Supervision>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Supervision> {
        self.supervision.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Supervises one external process for one environment.
///
/// Created in `Starting`; the background thread promotes to `Started` once
/// a live handle appears (unless a stop was requested meanwhile) and ends
/// supervision with `Stopped` when the handle disappears.
pub struct ProcessSupervisor {
    shared: Arc<Shared>,
    _thread: thread::JoinHandle<()>,
}

impl ProcessSupervisor {
    pub fn spawn(slot: EnvironmentSlot, handles: Arc<dyn ProcessHandles>) -> Self {
        Self::spawn_with_interval(slot, handles, POLL_INTERVAL)
    }

    pub fn spawn_with_interval(
        slot: EnvironmentSlot,
        handles: Arc<dyn ProcessHandles>,
        interval: Duration,
    ) -> Self {
        let shared = Arc::new(Shared {
            slot,
            handles,
            supervision: Mutex::new(Supervision {
                state: ProcessState::Starting,
                stop_requested: false,
            }),
        });

        let worker = Arc::clone(&shared);
        let thread = thread::spawn(move || {
            debug!("supervision started for {}", worker.slot);
            run(&worker, interval);
            debug!("supervision ended for {}", worker.slot);
        });

        Self {
            shared,
            _thread: thread,
        }
    }

    pub fn slot(&self) -> &EnvironmentSlot {
        &self.shared.slot
    }

    pub fn state(&self) -> ProcessState {
        self.shared.lock().state
    }

    /// Whether supervision is still driving a process (not yet `Stopped`
    /// or `Unknown`).
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            ProcessState::Starting | ProcessState::Started | ProcessState::Stopping
        )
    }

    /// Request the supervised process to stop.
    ///
    /// Idempotent: stopping an already-stopped supervisor is a no-op, and
    /// an explicit stop always drives `Unknown` to `Stopped`. On a
    /// termination failure the supervisor parks in `Unknown` and the error
    /// is returned; it is never auto-retried.
    pub fn stop(&self, force: bool) -> Result<(), CoreError> {
        {
            let mut supervision = self.shared.lock();
            match supervision.state {
                ProcessState::Stopped => return Ok(()),
                ProcessState::Unknown => {
                    supervision.state = ProcessState::Stopped;
                    return Ok(());
                }
                _ => {
                    supervision.stop_requested = true;
                    supervision.state = ProcessState::Stopping;
                }
            }
        }

        match self
            .shared
            .handles
            .request_termination(&self.shared.slot, force)
        {
            Ok(()) => {
                self.shared.lock().state = ProcessState::Stopped;
                Ok(())
            }
            Err(e) => {
                warn!("termination failed for {}: {e}", self.shared.slot);
                self.shared.lock().state = ProcessState::Unknown;
                Err(e.into())
            }
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        // Let the poll thread wind down on its own within one interval.
        self.shared.lock().stop_requested = true;
    }
}

fn run(shared: &Shared, interval: Duration) {
    loop {
        let current = {
            let supervision = shared.lock();
            if supervision.stop_requested {
                return;
            }
            supervision.state
        };

        match current {
            ProcessState::Starting => {
                if shared.handles.has_live_handle(&shared.slot) {
                    let mut supervision = shared.lock();
                    // A stop issued while we polled wins: Started is never
                    // entered after a stop request.
                    if supervision.stop_requested {
                        return;
                    }
                    if supervision.state == ProcessState::Starting {
                        supervision.state = ProcessState::Started;
                        debug!("{} is started", shared.slot);
                    }
                }
            }
            ProcessState::Started => {
                if !shared.handles.has_live_handle(&shared.slot) {
                    let mut supervision = shared.lock();
                    if supervision.state == ProcessState::Started {
                        supervision.state = ProcessState::Stopped;
                        debug!("{} exited externally", shared.slot);
                    }
                    return;
                }
            }
            _ => return,
        }

        thread::sleep(interval);
    }
}
