//! Background activity threads owned by the orchestrator.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::LIFECYCLE_TARGET;
use super::errors::LaunchError;
use super::shutdown::ShutdownLatch;

const JOIN_POLL: Duration = Duration::from_millis(25);

struct Activity {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Threads spawned during startup, joined or detached at the end.
#[derive(Default)]
pub(crate) struct BackgroundActivities {
    running: Vec<Activity>,
}

impl BackgroundActivities {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Starts `body` on a named thread.
    pub(crate) fn spawn<F>(&mut self, name: &'static str, body: F) -> Result<(), LaunchError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(format!("federationd-{name}"))
            .spawn(body)
            .map_err(|source| LaunchError::Spawn {
                activity: name,
                source,
            })?;
        debug!(target: LIFECYCLE_TARGET, activity = name, "background activity started");
        self.running.push(Activity { name, handle });
        Ok(())
    }

    /// Joins every activity that finishes within `timeout`.
    ///
    /// Activities still running at the deadline are detached.
    pub(crate) fn join(self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut pending = self.running;
        while !pending.is_empty() && Instant::now() < deadline {
            let (finished, still_running): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|activity| activity.handle.is_finished());
            for activity in finished {
                if activity.handle.join().is_err() {
                    warn!(
                        target: LIFECYCLE_TARGET,
                        activity = activity.name,
                        "background activity panicked"
                    );
                }
            }
            pending = still_running;
            if !pending.is_empty() {
                thread::sleep(JOIN_POLL);
            }
        }
        for activity in pending {
            warn!(
                target: LIFECYCLE_TARGET,
                activity = activity.name,
                timeout_ms = timeout.as_millis(),
                "background activity still running at shutdown deadline; detaching"
            );
        }
    }

    /// Fires `latch` so cooperative activities wind down, then detaches all
    /// threads without waiting.
    pub(crate) fn abandon(self, latch: &ShutdownLatch) {
        latch.trigger();
        for activity in self.running {
            debug!(
                target: LIFECYCLE_TARGET,
                activity = activity.name,
                "detaching background activity"
            );
        }
    }
}
