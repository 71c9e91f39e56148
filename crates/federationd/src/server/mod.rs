//! Shipped resource service.
//!
//! [`FederationServer`] keeps the local registry in memory and publishes every
//! change to connected consumers as JSON-lines [`WatchEvent`]s. A consumer
//! first receives the current registry contents as `created` events, then live
//! changes. When an upstream peer is configured, remote watches follow that
//! peer's stream the same way.

mod feed;
mod listener;

use std::collections::{BTreeMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use federation_types::{EventKind, FederatedResource, ProviderId, WatchEvent};

use crate::dispatch::{RouteError, route_event};
use crate::observer::ResourceObserver;
use crate::security::SecurityConfig;
use crate::service::{ResourceRegistry, ResourceService, ServiceError, ServiceFactory};

use feed::{
    CONSUMER_BACKLOG, LineRead, LineReader, POLL_INTERVAL, WRITE_TIMEOUT, decode_event,
    stream_to_consumer,
};
use listener::run_accept_loop;

pub(crate) const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Registry contents plus the consumers following them.
struct Hub {
    provider: ProviderId,
    resources: BTreeMap<String, FederatedResource>,
    consumers: Vec<SyncSender<WatchEvent>>,
}

impl Hub {
    fn publish(&mut self, kind: EventKind, resource: FederatedResource) {
        let event = WatchEvent::new(kind, self.provider.clone(), resource);
        self.consumers
            .retain(|consumer| match consumer.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        target: SERVER_TARGET,
                        backlog = CONSUMER_BACKLOG,
                        "consumer backlog full; dropping consumer"
                    );
                    false
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }

    /// Registers a consumer and returns the snapshot it must see first.
    fn attach(&mut self) -> (Vec<WatchEvent>, Receiver<WatchEvent>) {
        let (sender, receiver) = mpsc::sync_channel(CONSUMER_BACKLOG);
        let snapshot = self
            .resources
            .values()
            .map(|resource| {
                WatchEvent::new(EventKind::Created, self.provider.clone(), resource.clone())
            })
            .collect();
        self.consumers.push(sender);
        (snapshot, receiver)
    }
}

/// In-memory resource service that federates over TCP.
pub struct FederationServer {
    local_addr: SocketAddr,
    upstream: Option<String>,
    hub: Arc<Mutex<Hub>>,
    watches: Mutex<HashSet<String>>,
    listener: Mutex<Option<TcpListener>>,
    stopped: Arc<AtomicBool>,
}

impl FederationServer {
    /// Binds the consumer listener on `addr`.
    ///
    /// `connection_context` becomes the provider identity on every published
    /// event. Consumers connect over plain TCP; `security` only names the
    /// identity the listener is announced with.
    pub fn bind(
        addr: SocketAddr,
        security: &SecurityConfig,
        connection_context: &str,
        upstream: Option<String>,
    ) -> Result<Self, ServiceError> {
        let listener = TcpListener::bind(addr).map_err(|source| ServiceError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServiceError::Listener { source })?;
        info!(
            target: SERVER_TARGET,
            %local_addr,
            root_cas = security.root_ca_count(),
            certificate = %security.certificate_path().display(),
            key = %security.key_path().display(),
            connection_context,
            "federation server bound"
        );
        Ok(Self {
            local_addr,
            upstream,
            hub: Arc::new(Mutex::new(Hub {
                provider: ProviderId::new(connection_context),
                resources: BTreeMap::new(),
                consumers: Vec::new(),
            })),
            watches: Mutex::new(HashSet::new()),
            listener: Mutex::new(Some(listener)),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Address consumers connect to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current value stored under `key`.
    pub fn resource(&self, key: &str) -> Result<Option<FederatedResource>, ServiceError> {
        Ok(self.hub()?.resources.get(key).cloned())
    }

    fn hub(&self) -> Result<MutexGuard<'_, Hub>, ServiceError> {
        self.hub
            .lock()
            .map_err(|_| ServiceError::Poisoned { what: "registry" })
    }

    fn register_watch(&self, watch_id: &str) -> Result<(), ServiceError> {
        let mut watches = self
            .watches
            .lock()
            .map_err(|_| ServiceError::Poisoned { what: "watches" })?;
        if !watches.insert(watch_id.to_owned()) {
            return Err(ServiceError::AlreadyWatching {
                watch_id: watch_id.to_owned(),
            });
        }
        Ok(())
    }

    fn release_watch(&self, watch_id: &str) {
        match self.watches.lock() {
            Ok(mut watches) => {
                watches.remove(watch_id);
            }
            Err(_) => warn!(
                target: SERVER_TARGET,
                watch_id,
                "watch registry poisoned; leaving entry in place"
            ),
        }
    }

    fn follow_upstream(
        &self,
        address: &str,
        watch_id: &str,
        observer: &dyn ResourceObserver,
    ) -> Result<(), ServiceError> {
        let stream = TcpStream::connect(address).map_err(|source| ServiceError::Upstream {
            address: address.to_owned(),
            source,
        })?;
        let stream_error = |source| ServiceError::Stream {
            watch_id: watch_id.to_owned(),
            source,
        };
        stream
            .set_read_timeout(Some(POLL_INTERVAL))
            .map_err(stream_error)?;
        info!(target: SERVER_TARGET, watch_id, upstream = address, "following upstream");

        let mut reader = LineReader::new(stream);
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                info!(target: SERVER_TARGET, watch_id, "service stopped; closing remote stream");
                return Ok(());
            }
            match reader.next_line().map_err(stream_error)? {
                LineRead::Line(line) => deliver_line(watch_id, &line, observer),
                LineRead::Idle => {}
                LineRead::Eof => {
                    info!(target: SERVER_TARGET, watch_id, "upstream closed the stream");
                    return Ok(());
                }
            }
        }
    }
}

fn deliver_line(watch_id: &str, line: &[u8], observer: &dyn ResourceObserver) {
    let event = match decode_event(line) {
        Ok(Some(event)) => event,
        Ok(None) => return,
        Err(error) => {
            warn!(target: SERVER_TARGET, watch_id, error = %error, "malformed event skipped");
            return;
        }
    };
    match route_event(observer, &event) {
        Ok(kind) => debug!(
            target: SERVER_TARGET,
            watch_id,
            operation = kind.as_str(),
            fqdn = event.resource().fqdn(),
            "event routed"
        ),
        Err(RouteError::UnknownKind(error)) => warn!(
            target: SERVER_TARGET,
            watch_id,
            provider = %event.provider_id(),
            error = %error,
            "event ignored"
        ),
        Err(error) => warn!(
            target: SERVER_TARGET,
            watch_id,
            error = %error,
            "event handler failed"
        ),
    }
}

fn serve_consumer(stream: TcpStream, hub: &Mutex<Hub>, stopped: &AtomicBool) {
    if let Err(error) = stream.set_write_timeout(Some(WRITE_TIMEOUT)) {
        warn!(target: SERVER_TARGET, error = %error, "failed to bound consumer writes; dropping consumer");
        return;
    }
    let (snapshot, events) = match hub.lock() {
        Ok(mut hub) => hub.attach(),
        Err(_) => {
            warn!(target: SERVER_TARGET, "registry poisoned; dropping consumer");
            return;
        }
    };
    let mut writer = stream;
    stream_to_consumer(&mut writer, snapshot, &events, stopped);
}

impl ResourceRegistry for FederationServer {
    fn upsert(&self, key: &str, resource: &FederatedResource) -> Result<(), ServiceError> {
        let mut hub = self.hub()?;
        let kind = match hub.resources.insert(key.to_owned(), resource.clone()) {
            Some(_) => EventKind::Updated,
            None => EventKind::Created,
        };
        hub.publish(kind, resource.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), ServiceError> {
        let mut hub = self.hub()?;
        let removed = hub.resources.remove(key).ok_or_else(|| ServiceError::NotFound {
            key: key.to_owned(),
        })?;
        hub.publish(EventKind::Deleted, removed);
        Ok(())
    }
}

impl ResourceService for FederationServer {
    fn watch_remote_resources(
        &self,
        watch_id: &str,
        observer: &dyn ResourceObserver,
    ) -> Result<(), ServiceError> {
        self.register_watch(watch_id)?;
        let result = match self.upstream.as_deref() {
            Some(address) => self.follow_upstream(address, watch_id, observer),
            None => {
                info!(
                    target: SERVER_TARGET,
                    watch_id,
                    "no upstream configured; remote stream is empty"
                );
                Ok(())
            }
        };
        self.release_watch(watch_id);
        result
    }

    fn start(&self) -> Result<(), ServiceError> {
        let listener = self
            .listener
            .lock()
            .map_err(|_| ServiceError::Poisoned { what: "listener" })?
            .take()
            .ok_or(ServiceError::AlreadyServing)?;
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }
        listener
            .set_nonblocking(true)
            .map_err(|source| ServiceError::Listener { source })?;
        let hub = Arc::clone(&self.hub);
        let stopped = Arc::clone(&self.stopped);
        run_accept_loop(&listener, &self.stopped, move |stream| {
            serve_consumer(stream, &hub, &stopped);
        });
        Ok(())
    }

    fn stop(&self) -> Result<(), ServiceError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyStopped);
        }
        self.hub()?.consumers.clear();
        info!(target: SERVER_TARGET, "federation server stopping");
        Ok(())
    }
}

/// Creates [`FederationServer`] instances listening on all interfaces.
#[derive(Debug, Default, Clone)]
pub struct FederationServerFactory {
    upstream: Option<String>,
}

impl FederationServerFactory {
    /// Builds a factory whose servers follow `upstream` when set.
    #[must_use]
    pub const fn new(upstream: Option<String>) -> Self {
        Self { upstream }
    }
}

impl ServiceFactory for FederationServerFactory {
    type Service = FederationServer;

    fn create(
        &self,
        port: u16,
        security: &SecurityConfig,
        connection_context: &str,
    ) -> Result<Self::Service, ServiceError> {
        FederationServer::bind(
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            security,
            connection_context,
            self.upstream.clone(),
        )
    }
}
