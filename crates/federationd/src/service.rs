//! Contract between the lifecycle core and the resource service.
//!
//! The core never touches registry storage or the watch transport directly.
//! It drives any implementation of [`ResourceService`], relying on the service
//! being internally safe for concurrent use: the mutation loop writes while
//! the watch subscription delivers events and the shutdown handler calls
//! [`ResourceService::stop`] from another thread.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;

use federation_types::FederatedResource;

use crate::observer::ResourceObserver;
use crate::security::SecurityConfig;

/// Errors reported by resource service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Binding the listening socket failed.
    #[error("failed to bind resource service on {addr}: {source}")]
    Bind {
        /// Address the service attempted to bind.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Preparing the listener for the serve loop failed.
    #[error("failed to prepare listener: {source}")]
    Listener {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The serve loop was entered twice.
    #[error("resource service is already serving")]
    AlreadyServing,
    /// `stop` was called after the service had already stopped.
    #[error("resource service is already stopped")]
    AlreadyStopped,
    /// A delete named a key that is not present.
    #[error("resource '{key}' does not exist")]
    NotFound {
        /// Key passed to the delete.
        key: String,
    },
    /// A second subscription reused a live watch id.
    #[error("watch '{watch_id}' is already active")]
    AlreadyWatching {
        /// Duplicate watch identifier.
        watch_id: String,
    },
    /// Connecting to the upstream provider failed.
    #[error("failed to connect to upstream '{address}': {source}")]
    Upstream {
        /// Configured upstream address.
        address: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The remote stream broke before an orderly end.
    #[error("remote stream for watch '{watch_id}' failed: {source}")]
    Stream {
        /// Watch whose stream failed.
        watch_id: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Shared service state was poisoned by a panicking thread.
    #[error("resource service state '{what}' is poisoned")]
    Poisoned {
        /// Name of the poisoned state.
        what: &'static str,
    },
}

/// Write side of the resource registry.
pub trait ResourceRegistry: Send + Sync {
    /// Creates the resource or replaces it wholesale.
    fn upsert(&self, key: &str, resource: &FederatedResource) -> Result<(), ServiceError>;

    /// Removes the resource stored under `key`.
    fn delete(&self, key: &str) -> Result<(), ServiceError>;
}

impl<T> ResourceRegistry for Arc<T>
where
    T: ResourceRegistry + ?Sized,
{
    fn upsert(&self, key: &str, resource: &FederatedResource) -> Result<(), ServiceError> {
        (**self).upsert(key, resource)
    }

    fn delete(&self, key: &str) -> Result<(), ServiceError> {
        (**self).delete(key)
    }
}

/// Full resource service consumed by the lifecycle orchestrator.
pub trait ResourceService: ResourceRegistry {
    /// Subscribes `observer` to remote resource changes under `watch_id`.
    ///
    /// Blocks until the subscription ends. `Ok(())` means the remote stream
    /// closed in an orderly fashion; any error is a transport failure.
    fn watch_remote_resources(
        &self,
        watch_id: &str,
        observer: &dyn ResourceObserver,
    ) -> Result<(), ServiceError>;

    /// Runs the blocking foreground serve loop.
    fn start(&self) -> Result<(), ServiceError>;

    /// Asks the serve loop to finish.
    fn stop(&self) -> Result<(), ServiceError>;
}

/// Instantiates the resource service during startup.
pub trait ServiceFactory {
    /// Concrete service produced by the factory.
    type Service: ResourceService + 'static;

    /// Builds a service bound to `port` using the supplied security settings.
    fn create(
        &self,
        port: u16,
        security: &SecurityConfig,
        connection_context: &str,
    ) -> Result<Self::Service, ServiceError>;
}
