//! Bridges one remote watch stream to the application's resource handlers.
//!
//! [`route_event`] decides which handler an inbound event reaches. The
//! [`RemoteWatchDispatcher`] owns a single subscription: it tracks the
//! subscription state, serialises handler calls, keeps handler failures from
//! ending the stream, and classifies how the stream terminated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::{info, warn};

use federation_types::{EventKind, FederatedResource, ProviderId, UnknownEventKind, WatchEvent};

use crate::observer::{ObserverError, ResourceObserver};
use crate::service::{ResourceService, ServiceError};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Errors raised while routing a single event.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The event named a kind this build does not understand.
    #[error(transparent)]
    UnknownKind(#[from] UnknownEventKind),
    /// The selected handler reported a failure.
    #[error("{kind} handler failed for '{fqdn}' from provider '{provider}': {source}")]
    Handler {
        /// Kind of the event being handled.
        kind: EventKind,
        /// Provider that authored the change.
        provider: ProviderId,
        /// Key of the affected resource.
        fqdn: String,
        /// Failure reported by the handler.
        #[source]
        source: ObserverError,
    },
}

/// Routes `event` to the handler matching its kind.
///
/// Returns the kind that was handled so callers can account for it.
pub fn route_event(
    observer: &dyn ResourceObserver,
    event: &WatchEvent,
) -> Result<EventKind, RouteError> {
    let kind = event.kind()?;
    let provider = event.provider_id();
    let resource = event.resource();
    let outcome = match kind {
        EventKind::Created => observer.on_create(provider, resource),
        EventKind::Updated => observer.on_update(provider, resource),
        EventKind::Deleted => observer.on_delete(provider, resource),
    };
    outcome
        .map(|()| kind)
        .map_err(|source| RouteError::Handler {
            kind,
            provider: provider.clone(),
            fqdn: resource.fqdn().to_owned(),
            source,
        })
}

/// Lifecycle of a watch subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// `subscribe` has not been called.
    Unsubscribed,
    /// `subscribe` is registering with the service.
    Subscribing,
    /// The stream is live; only this state accepts events.
    Active,
    /// The stream ended in an orderly fashion.
    Closed,
    /// The stream ended with a transport failure.
    Failed,
}

/// Counters describing a subscription that closed gracefully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    /// Events handed to a handler that succeeded.
    pub delivered: u64,
    /// Events whose handler reported an error.
    pub handler_failures: u64,
    /// Events dropped because the subscription was not active.
    pub rejected: u64,
}

impl WatchSummary {
    /// Whether the stream carried no events at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.delivered == 0 && self.handler_failures == 0 && self.rejected == 0
    }
}

/// Errors returned by [`RemoteWatchDispatcher::subscribe`].
#[derive(Debug, Error)]
pub enum WatchError {
    /// The dispatcher already owns a subscription.
    #[error("watch '{watch_id}' cannot subscribe from state {state:?}")]
    AlreadySubscribed {
        /// Identifier of the existing watch.
        watch_id: String,
        /// State the dispatcher was in.
        state: SubscriptionState,
    },
    /// The stream terminated with a transport failure.
    #[error("watch '{watch_id}' failed: {source}")]
    Stream {
        /// Identifier of the failed watch.
        watch_id: String,
        /// Error reported by the service.
        #[source]
        source: ServiceError,
    },
}

/// Owns the single subscription identified by a watch id.
pub struct RemoteWatchDispatcher<O> {
    watch_id: String,
    observer: O,
    state: Mutex<SubscriptionState>,
    delivery: Mutex<()>,
    delivered: AtomicU64,
    handler_failures: AtomicU64,
    rejected: AtomicU64,
}

impl<O> RemoteWatchDispatcher<O>
where
    O: ResourceObserver,
{
    /// Builds an unsubscribed dispatcher that will feed `observer`.
    pub fn new(watch_id: impl Into<String>, observer: O) -> Self {
        Self {
            watch_id: watch_id.into(),
            observer,
            state: Mutex::new(SubscriptionState::Unsubscribed),
            delivery: Mutex::new(()),
            delivered: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Identifier of the subscription.
    #[must_use]
    pub fn watch_id(&self) -> &str {
        &self.watch_id
    }

    /// Current subscription state.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to `service` and blocks until the remote stream ends.
    ///
    /// A graceful end returns the delivery summary; a transport failure is
    /// returned as [`WatchError::Stream`].
    pub fn subscribe<S>(&self, service: &S) -> Result<WatchSummary, WatchError>
    where
        S: ResourceService + ?Sized,
    {
        self.begin()?;
        info!(
            target: DISPATCH_TARGET,
            watch_id = %self.watch_id,
            "remote watch subscribing"
        );
        self.transition(SubscriptionState::Active);
        match service.watch_remote_resources(&self.watch_id, self) {
            Ok(()) => {
                self.transition(SubscriptionState::Closed);
                let summary = self.summary();
                info!(
                    target: DISPATCH_TARGET,
                    watch_id = %self.watch_id,
                    delivered = summary.delivered,
                    handler_failures = summary.handler_failures,
                    rejected = summary.rejected,
                    "remote stream closed"
                );
                Ok(summary)
            }
            Err(source) => {
                self.transition(SubscriptionState::Failed);
                warn!(
                    target: DISPATCH_TARGET,
                    watch_id = %self.watch_id,
                    error = %source,
                    "remote stream failed"
                );
                Err(WatchError::Stream {
                    watch_id: self.watch_id.clone(),
                    source,
                })
            }
        }
    }

    /// Counters accumulated so far.
    #[must_use]
    pub fn summary(&self) -> WatchSummary {
        WatchSummary {
            delivered: self.delivered.load(Ordering::SeqCst),
            handler_failures: self.handler_failures.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
        }
    }

    fn begin(&self) -> Result<(), WatchError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != SubscriptionState::Unsubscribed {
            return Err(WatchError::AlreadySubscribed {
                watch_id: self.watch_id.clone(),
                state: *state,
            });
        }
        *state = SubscriptionState::Subscribing;
        Ok(())
    }

    fn transition(&self, next: SubscriptionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn deliver<F>(
        &self,
        kind: EventKind,
        provider: &ProviderId,
        resource: &FederatedResource,
        handler: F,
    ) -> Result<(), ObserverError>
    where
        F: FnOnce(&O) -> Result<(), ObserverError>,
    {
        // Held for the whole handler call so events run one at a time.
        let _serial = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        let state = self.state();
        if state != SubscriptionState::Active {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            warn!(
                target: DISPATCH_TARGET,
                watch_id = %self.watch_id,
                ?state,
                operation = kind.as_str(),
                provider = %provider,
                fqdn = resource.fqdn(),
                "event dropped; subscription is not active"
            );
            return Ok(());
        }
        match handler(&self.observer) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::SeqCst);
            }
            Err(error) => {
                self.handler_failures.fetch_add(1, Ordering::SeqCst);
                warn!(
                    target: DISPATCH_TARGET,
                    watch_id = %self.watch_id,
                    operation = kind.as_str(),
                    provider = %provider,
                    fqdn = resource.fqdn(),
                    error = %error,
                    "resource handler failed; continuing with next event"
                );
            }
        }
        Ok(())
    }
}

impl<O> ResourceObserver for RemoteWatchDispatcher<O>
where
    O: ResourceObserver,
{
    fn on_create(
        &self,
        provider: &ProviderId,
        resource: &FederatedResource,
    ) -> Result<(), ObserverError> {
        self.deliver(EventKind::Created, provider, resource, |observer| {
            observer.on_create(provider, resource)
        })
    }

    fn on_update(
        &self,
        provider: &ProviderId,
        resource: &FederatedResource,
    ) -> Result<(), ObserverError> {
        self.deliver(EventKind::Updated, provider, resource, |observer| {
            observer.on_update(provider, resource)
        })
    }

    fn on_delete(
        &self,
        provider: &ProviderId,
        resource: &FederatedResource,
    ) -> Result<(), ObserverError> {
        self.deliver(EventKind::Deleted, provider, resource, |observer| {
            observer.on_delete(provider, resource)
        })
    }
}
