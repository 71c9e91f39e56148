//! Lifecycle core of the federation daemon.
//!
//! The daemon keeps a local resource registry in sync with its peers. At
//! startup it builds transport security from PEM material, creates the
//! resource service, and then runs three activities side by side:
//!
//! - a shutdown waiter that stops the service on the first `SIGINT` or
//!   `SIGTERM` and exits the process with a success status;
//! - a mutation loop that keeps a demo resource moving through create,
//!   update, and delete;
//! - the foreground serve loop, entered only after the initial remote watch
//!   has closed gracefully.
//!
//! Startup failures are fatal and surface as [`LaunchError`]. Failures after
//! startup are logged and never end the process; termination is driven by
//! signals alone.
//!
//! Every collaborator sits behind a trait ([`ResourceService`],
//! [`ResourceObserver`], [`SecurityConfigBuilder`], [`HealthReporter`],
//! [`ShutdownSignal`]) so the orchestration can be exercised without sockets
//! or signals.

mod dispatch;
mod health;
mod lifecycle;
mod mutation;
mod observer;
mod security;
mod server;
mod service;
pub mod telemetry;

pub use dispatch::{
    RemoteWatchDispatcher, RouteError, SubscriptionState, WatchError, WatchSummary, route_event,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use lifecycle::{
    LaunchError, ProcessExit, ShutdownError, ShutdownLatch, ShutdownSignal, SystemExit,
    SystemShutdownSignal, run_federation,
};
pub use mutation::{CycleError, CycleOutcome, MutationLoop, MutationPlan, MutationStep};
pub use observer::{LoggingObserver, ObserverError, ResourceObserver};
pub use security::{PemSecurityConfigBuilder, SecurityConfig, SecurityConfigBuilder, SecurityError};
pub use server::{FederationServer, FederationServerFactory};
pub use service::{ResourceRegistry, ResourceService, ServiceError, ServiceFactory};
pub use telemetry::{TelemetryError, TelemetryHandle};
