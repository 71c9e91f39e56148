//! Test double for [`HealthReporter`] that records lifecycle events for
//! assertions.

use std::sync::Mutex;

use crate::dispatch::WatchSummary;
use crate::health::HealthReporter;
use crate::lifecycle::LaunchError;
use crate::service::ServiceError;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HealthEvent {
    StartupStarting,
    SecurityReady,
    ServiceReady,
    StartupFailed(String),
    WatchClosed(String),
    Serving,
    ServeFailed(String),
    ShutdownRequested,
    StopFailed(String),
    ShutdownCompleted,
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    pub fn contains(&self, predicate: impl Fn(&HealthEvent) -> bool) -> bool {
        self.events().iter().any(predicate)
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn startup_starting(&self, _port: u16) {
        self.record(HealthEvent::StartupStarting);
    }

    fn security_ready(&self, _root_cas: usize) {
        self.record(HealthEvent::SecurityReady);
    }

    fn service_ready(&self, _port: u16, _connection_context: &str) {
        self.record(HealthEvent::ServiceReady);
    }

    fn startup_failed(&self, error: &LaunchError) {
        self.record(HealthEvent::StartupFailed(error.to_string()));
    }

    fn watch_closed(&self, watch_id: &str, _summary: &WatchSummary) {
        self.record(HealthEvent::WatchClosed(watch_id.to_owned()));
    }

    fn serving(&self) {
        self.record(HealthEvent::Serving);
    }

    fn serve_failed(&self, error: &ServiceError) {
        self.record(HealthEvent::ServeFailed(error.to_string()));
    }

    fn shutdown_requested(&self) {
        self.record(HealthEvent::ShutdownRequested);
    }

    fn stop_failed(&self, error: &ServiceError) {
        self.record(HealthEvent::StopFailed(error.to_string()));
    }

    fn shutdown_completed(&self) {
        self.record(HealthEvent::ShutdownCompleted);
    }
}
