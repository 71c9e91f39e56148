//! Scripted resource service used by lifecycle, dispatch and mutation
//! scenarios.

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use federation_types::{FederatedResource, WatchEvent};

use crate::dispatch::route_event;
use crate::observer::ResourceObserver;
use crate::security::SecurityConfig;
use crate::service::{ResourceRegistry, ResourceService, ServiceError, ServiceFactory};

/// One call made against the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    Upsert { key: String, name: String },
    Delete { key: String },
    Watch { watch_id: String },
    Start,
    Stop,
}

#[derive(Default)]
struct Script {
    watch_events: Vec<WatchEvent>,
    watch_failure: Option<String>,
}

#[derive(Default)]
struct Inner {
    calls: Mutex<Vec<ServiceCall>>,
    resources: Mutex<BTreeMap<String, FederatedResource>>,
    script: Mutex<Script>,
    failing_upserts: AtomicUsize,
    serve_fails: AtomicBool,
    stop_fails: AtomicBool,
    stopped: Mutex<bool>,
    stopped_changed: Condvar,
    watch_held: Mutex<bool>,
    watch_released: Condvar,
}

/// Upper bound on how long a held watch blocks if nobody releases it.
const WATCH_HOLD_LIMIT: Duration = Duration::from_secs(10);

/// Cloneable handle; clones share all state.
#[derive(Clone, Default)]
pub struct ScriptedService {
    inner: Arc<Inner>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events replayed to the observer of the next watch.
    pub fn script_watch_events(&self, events: Vec<WatchEvent>) {
        self.inner.script.lock().expect("script mutex poisoned").watch_events = events;
    }

    /// Makes the watch end with a transport failure after replaying events.
    pub fn fail_watch(&self, message: &str) {
        self.inner.script.lock().expect("script mutex poisoned").watch_failure =
            Some(message.to_owned());
    }

    /// Keeps the next watch open until [`Self::release_watch`] is called.
    pub fn hold_watch(&self) {
        *self.inner.watch_held.lock().expect("watch mutex poisoned") = true;
    }

    pub fn release_watch(&self) {
        *self.inner.watch_held.lock().expect("watch mutex poisoned") = false;
        self.inner.watch_released.notify_all();
    }

    fn wait_while_held(&self) {
        let deadline = Instant::now() + WATCH_HOLD_LIMIT;
        let mut held = self.inner.watch_held.lock().expect("watch mutex poisoned");
        while *held {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            held = self
                .inner
                .watch_released
                .wait_timeout(held, deadline - now)
                .expect("watch mutex poisoned")
                .0;
        }
    }

    /// Makes the next `count` upserts fail.
    pub fn fail_next_upserts(&self, count: usize) {
        self.inner.failing_upserts.store(count, Ordering::SeqCst);
    }

    pub fn fail_serve(&self) {
        self.inner.serve_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_stop(&self) {
        self.inner.stop_fails.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.inner.calls.lock().expect("calls mutex poisoned").clone()
    }

    pub fn count(&self, predicate: impl Fn(&ServiceCall) -> bool) -> usize {
        self.calls().iter().filter(|&call| predicate(call)).count()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner
            .resources
            .lock()
            .expect("resources mutex poisoned")
            .contains_key(key)
    }

    /// Polls until `predicate` holds for the recorded calls.
    pub fn wait_for(
        &self,
        timeout: Duration,
        predicate: impl Fn(&[ServiceCall]) -> bool,
    ) -> Result<(), String> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate(&self.calls()) {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Err(format!("condition not met; calls: {:?}", self.calls()))
    }

    fn record(&self, call: ServiceCall) {
        self.inner
            .calls
            .lock()
            .expect("calls mutex poisoned")
            .push(call);
    }
}

fn scripted_failure(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionReset, message.to_owned())
}

impl ResourceRegistry for ScriptedService {
    fn upsert(&self, key: &str, resource: &FederatedResource) -> Result<(), ServiceError> {
        self.record(ServiceCall::Upsert {
            key: key.to_owned(),
            name: resource.name().to_owned(),
        });
        let failing = self
            .inner
            .failing_upserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ServiceError::Poisoned { what: "scripted registry" });
        }
        self.inner
            .resources
            .lock()
            .expect("resources mutex poisoned")
            .insert(key.to_owned(), resource.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), ServiceError> {
        self.record(ServiceCall::Delete { key: key.to_owned() });
        self.inner
            .resources
            .lock()
            .expect("resources mutex poisoned")
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound { key: key.to_owned() })
    }
}

impl ResourceService for ScriptedService {
    fn watch_remote_resources(
        &self,
        watch_id: &str,
        observer: &dyn ResourceObserver,
    ) -> Result<(), ServiceError> {
        self.record(ServiceCall::Watch {
            watch_id: watch_id.to_owned(),
        });
        self.wait_while_held();
        let (events, failure) = {
            let script = self.inner.script.lock().expect("script mutex poisoned");
            (script.watch_events.clone(), script.watch_failure.clone())
        };
        for event in &events {
            // Unknown kinds and handler failures never end the stream.
            let _ = route_event(observer, event);
        }
        match failure {
            Some(message) => Err(ServiceError::Stream {
                watch_id: watch_id.to_owned(),
                source: scripted_failure(&message),
            }),
            None => Ok(()),
        }
    }

    fn start(&self) -> Result<(), ServiceError> {
        self.record(ServiceCall::Start);
        if self.inner.serve_fails.load(Ordering::SeqCst) {
            return Err(ServiceError::Listener {
                source: scripted_failure("scripted serve failure"),
            });
        }
        let mut stopped = self.inner.stopped.lock().expect("stop mutex poisoned");
        while !*stopped {
            stopped = self
                .inner
                .stopped_changed
                .wait(stopped)
                .expect("stop mutex poisoned");
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), ServiceError> {
        self.record(ServiceCall::Stop);
        {
            let mut stopped = self.inner.stopped.lock().expect("stop mutex poisoned");
            *stopped = true;
            self.inner.stopped_changed.notify_all();
        }
        if self.inner.stop_fails.load(Ordering::SeqCst) {
            return Err(ServiceError::AlreadyStopped);
        }
        Ok(())
    }
}

/// Factory handing out a shared [`ScriptedService`].
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    service: ScriptedService,
    fail: Arc<AtomicBool>,
    created: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new(service: ScriptedService) -> Self {
        Self {
            service,
            ..Self::default()
        }
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ServiceFactory for ScriptedFactory {
    type Service = ScriptedService;

    fn create(
        &self,
        port: u16,
        _security: &SecurityConfig,
        _connection_context: &str,
    ) -> Result<Self::Service, ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Bind {
                addr: SocketAddr::from(([0, 0, 0, 0], port)),
                source: io::Error::new(io::ErrorKind::AddrInUse, "scripted bind failure"),
            });
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.service.clone())
    }
}
