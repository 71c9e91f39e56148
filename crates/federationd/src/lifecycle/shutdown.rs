//! Signal-triggered shutdown: the one-shot latch, the signal source, and the
//! handler that stops the service exactly once.

use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{debug, info};

use crate::health::HealthReporter;
use crate::service::ResourceService;

use super::LIFECYCLE_TARGET;

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The signal source stopped delivering signals.
    #[error("signal source closed")]
    Closed,
}

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until the next termination request arrives.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Shutdown listener for `SIGINT` and `SIGTERM`.
pub struct SystemShutdownSignal {
    signals: Mutex<Signals>,
}

impl SystemShutdownSignal {
    /// Registers the process-wide signal handlers.
    ///
    /// Once registered, the signals no longer terminate the process by
    /// default; delivery is observed through [`ShutdownSignal::wait`].
    pub fn install() -> Result<Self, ShutdownError> {
        let signals =
            Signals::new([SIGINT, SIGTERM]).map_err(|source| ShutdownError::Install { source })?;
        Ok(Self {
            signals: Mutex::new(signals),
        })
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals = self.signals.lock().unwrap_or_else(PoisonError::into_inner);
        match signals.forever().next() {
            Some(signal) => {
                info!(
                    target: LIFECYCLE_TARGET,
                    signal,
                    "termination signal received"
                );
                Ok(())
            }
            None => Err(ShutdownError::Closed),
        }
    }
}

/// Process-wide one-shot shutdown event.
///
/// The first [`trigger`](Self::trigger) wins; every later call reports that
/// shutdown was already under way. Waiters are released by the first trigger.
#[derive(Debug, Default)]
pub struct ShutdownLatch {
    triggered: Mutex<bool>,
    released: Condvar,
}

impl ShutdownLatch {
    /// Builds an untriggered latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the latch. Returns `true` only for the call that fired it.
    pub fn trigger(&self) -> bool {
        let mut triggered = self.triggered.lock().unwrap_or_else(PoisonError::into_inner);
        if *triggered {
            return false;
        }
        *triggered = true;
        self.released.notify_all();
        true
    }

    /// Whether the latch has fired.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.triggered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the latch fires.
    pub fn wait(&self) {
        let mut triggered = self.triggered.lock().unwrap_or_else(PoisonError::into_inner);
        while !*triggered {
            triggered = self
                .released
                .wait(triggered)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks for at most `timeout`. Returns `true` when the latch fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut triggered = self.triggered.lock().unwrap_or_else(PoisonError::into_inner);
        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .released
                .wait_timeout(triggered, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            triggered = guard;
        }
        true
    }
}

/// Terminates the process once shutdown handling has finished.
pub trait ProcessExit: Send + Sync {
    /// Ends the process with a success status.
    fn exit_success(&self);
}

/// Exits through [`std::process::exit`] without draining other threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExit;

impl ProcessExit for SystemExit {
    fn exit_success(&self) {
        std::process::exit(0);
    }
}

/// Stops the service on the first termination signal.
pub(crate) struct ShutdownHandler<S: ?Sized, X> {
    service: Arc<S>,
    latch: Arc<ShutdownLatch>,
    exit: X,
    reporter: Arc<dyn HealthReporter>,
}

impl<S, X> ShutdownHandler<S, X>
where
    S: ResourceService + ?Sized,
    X: ProcessExit,
{
    pub(crate) fn new(
        service: Arc<S>,
        latch: Arc<ShutdownLatch>,
        exit: X,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            service,
            latch,
            exit,
            reporter,
        }
    }

    /// Handles one termination signal. Returns `false` when shutdown had
    /// already begun and the signal was ignored.
    pub(crate) fn on_signal(&self) -> bool {
        if !self.latch.trigger() {
            debug!(
                target: LIFECYCLE_TARGET,
                "shutdown already in progress; ignoring signal"
            );
            return false;
        }
        self.reporter.shutdown_requested();
        if let Err(error) = self.service.stop() {
            self.reporter.stop_failed(&error);
        }
        self.reporter.shutdown_completed();
        self.exit.exit_success();
        true
    }

    /// Waits for signals until one has been handled.
    pub(crate) fn run<G>(&self, signal: &G) -> Result<(), ShutdownError>
    where
        G: ShutdownSignal + ?Sized,
    {
        loop {
            signal.wait()?;
            if self.on_signal() {
                return Ok(());
            }
        }
    }
}
