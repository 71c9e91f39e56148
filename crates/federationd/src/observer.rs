//! Handlers invoked for remotely observed resource changes.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use federation_types::{FederatedResource, ProviderId};

const REMOTE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::remote");

/// Failure reported by a [`ResourceObserver`] handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ObserverError {
    message: String,
}

impl ObserverError {
    /// Builds an error carrying a human-readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Human-readable failure description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Capability set for reacting to remote resource changes.
///
/// Any type exposing the three handlers qualifies; the dispatcher routes each
/// event to exactly one of them based on its kind.
pub trait ResourceObserver: Send + Sync {
    /// A provider created a resource.
    fn on_create(
        &self,
        provider: &ProviderId,
        resource: &FederatedResource,
    ) -> Result<(), ObserverError>;

    /// A provider replaced a resource.
    fn on_update(
        &self,
        provider: &ProviderId,
        resource: &FederatedResource,
    ) -> Result<(), ObserverError>;

    /// A provider deleted a resource.
    fn on_delete(
        &self,
        provider: &ProviderId,
        resource: &FederatedResource,
    ) -> Result<(), ObserverError>;
}

impl<T> ResourceObserver for Arc<T>
where
    T: ResourceObserver + ?Sized,
{
    fn on_create(
        &self,
        provider: &ProviderId,
        resource: &FederatedResource,
    ) -> Result<(), ObserverError> {
        (**self).on_create(provider, resource)
    }

    fn on_update(
        &self,
        provider: &ProviderId,
        resource: &FederatedResource,
    ) -> Result<(), ObserverError> {
        (**self).on_update(provider, resource)
    }

    fn on_delete(
        &self,
        provider: &ProviderId,
        resource: &FederatedResource,
    ) -> Result<(), ObserverError> {
        (**self).on_delete(provider, resource)
    }
}

/// Observer that records every remote change with `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl LoggingObserver {
    /// Builds a new observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ResourceObserver for LoggingObserver {
    fn on_create(
        &self,
        provider: &ProviderId,
        resource: &FederatedResource,
    ) -> Result<(), ObserverError> {
        info!(
            target: REMOTE_TARGET,
            provider = %provider,
            fqdn = resource.fqdn(),
            name = resource.name(),
            "remote resource created"
        );
        Ok(())
    }

    fn on_update(
        &self,
        provider: &ProviderId,
        resource: &FederatedResource,
    ) -> Result<(), ObserverError> {
        info!(
            target: REMOTE_TARGET,
            provider = %provider,
            fqdn = resource.fqdn(),
            name = resource.name(),
            "remote resource updated"
        );
        Ok(())
    }

    fn on_delete(
        &self,
        provider: &ProviderId,
        resource: &FederatedResource,
    ) -> Result<(), ObserverError> {
        info!(
            target: REMOTE_TARGET,
            provider = %provider,
            fqdn = resource.fqdn(),
            "remote resource deleted"
        );
        Ok(())
    }
}
