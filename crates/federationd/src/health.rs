//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use crate::dispatch::WatchSummary;
use crate::lifecycle::LaunchError;
use crate::service::ServiceError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before the security configuration is built.
    fn startup_starting(&self, port: u16);

    /// Invoked once the security configuration is available.
    fn security_ready(&self, root_cas: usize);

    /// Invoked after the resource service is instantiated.
    fn service_ready(&self, port: u16, connection_context: &str);

    /// Invoked when startup aborts.
    fn startup_failed(&self, error: &LaunchError);

    /// Invoked when the initial watch subscription closes gracefully.
    fn watch_closed(&self, watch_id: &str, summary: &WatchSummary);

    /// Invoked before the foreground serve loop runs.
    fn serving(&self);

    /// Invoked when the serve loop returns an error.
    fn serve_failed(&self, error: &ServiceError);

    /// Invoked when the first termination signal is handled.
    fn shutdown_requested(&self);

    /// Invoked when stopping the service fails during shutdown.
    fn stop_failed(&self, error: &ServiceError);

    /// Invoked after shutdown handling, just before the process exits.
    fn shutdown_completed(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn startup_starting(&self, port: u16) {
        (**self).startup_starting(port);
    }

    fn security_ready(&self, root_cas: usize) {
        (**self).security_ready(root_cas);
    }

    fn service_ready(&self, port: u16, connection_context: &str) {
        (**self).service_ready(port, connection_context);
    }

    fn startup_failed(&self, error: &LaunchError) {
        (**self).startup_failed(error);
    }

    fn watch_closed(&self, watch_id: &str, summary: &WatchSummary) {
        (**self).watch_closed(watch_id, summary);
    }

    fn serving(&self) {
        (**self).serving();
    }

    fn serve_failed(&self, error: &ServiceError) {
        (**self).serve_failed(error);
    }

    fn shutdown_requested(&self) {
        (**self).shutdown_requested();
    }

    fn stop_failed(&self, error: &ServiceError) {
        (**self).stop_failed(error);
    }

    fn shutdown_completed(&self) {
        (**self).shutdown_completed();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn startup_starting(&self, port: u16) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "startup_starting",
            port,
            "starting federation daemon"
        );
    }

    fn security_ready(&self, root_cas: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "security_ready",
            root_cas,
            "transport security configured"
        );
    }

    fn service_ready(&self, port: u16, connection_context: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "service_ready",
            port,
            connection_context,
            "resource service created"
        );
    }

    fn startup_failed(&self, error: &LaunchError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "startup_failed",
            error = %error,
            "daemon startup failed"
        );
    }

    fn watch_closed(&self, watch_id: &str, summary: &WatchSummary) {
        if summary.is_empty() {
            tracing::info!(
                target: HEALTH_TARGET,
                event = "watch_closed",
                watch_id,
                "remote stream closed before any events were observed; continuing"
            );
        } else {
            tracing::info!(
                target: HEALTH_TARGET,
                event = "watch_closed",
                watch_id,
                delivered = summary.delivered,
                handler_failures = summary.handler_failures,
                rejected = summary.rejected,
                "remote stream closed; continuing"
            );
        }
    }

    fn serving(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "serving",
            "entering serve loop"
        );
    }

    fn serve_failed(&self, error: &ServiceError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "serve_failed",
            error = %error,
            "serve loop returned an error; waiting for a termination signal"
        );
    }

    fn shutdown_requested(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_requested",
            "stopping resource service"
        );
    }

    fn stop_failed(&self, error: &ServiceError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "stop_failed",
            error = %error,
            "failed to stop resource service"
        );
    }

    fn shutdown_completed(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_completed",
            "shutdown handled; exiting"
        );
    }
}
