//! Defines the error surface for daemon startup.
//!
//! Every variant is fatal: the orchestrator returns it and the binary exits
//! with a failure status. Recoverable failures (mutation writes, serve loop
//! errors, handler errors) never reach this type.

use std::io;

use thiserror::Error;

use crate::dispatch::WatchError;
use crate::security::SecurityError;
use crate::service::ServiceError;

use super::shutdown::ShutdownError;

/// Errors that abort daemon startup.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Transport security configuration could not be built.
    #[error("failed to prepare transport security: {source}")]
    Security {
        /// Underlying security error.
        #[source]
        source: SecurityError,
    },
    /// The resource service could not be instantiated.
    #[error("failed to create resource service: {source}")]
    Service {
        /// Underlying service error.
        #[source]
        source: ServiceError,
    },
    /// Signal handling could not be installed.
    #[error("failed to install shutdown handling: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// A background activity thread could not be started.
    #[error("failed to spawn {activity} thread: {source}")]
    Spawn {
        /// Name of the activity.
        activity: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The initial remote watch failed.
    #[error("remote watch failed: {source}")]
    Watch {
        /// Underlying watch error.
        #[source]
        source: WatchError,
    },
}

impl From<SecurityError> for LaunchError {
    fn from(source: SecurityError) -> Self {
        Self::Security { source }
    }
}

impl From<ServiceError> for LaunchError {
    fn from(source: ServiceError) -> Self {
        Self::Service { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}

impl From<WatchError> for LaunchError {
    fn from(source: WatchError) -> Self {
        Self::Watch { source }
    }
}
