//! Daemon lifecycle: startup ordering, background activities, and
//! signal-triggered shutdown.

use std::time::Duration;

mod activities;
mod errors;
pub(crate) mod launch;
pub(crate) mod shutdown;

pub use errors::LaunchError;
pub use launch::run_federation;
pub use shutdown::{
    ProcessExit, ShutdownError, ShutdownLatch, ShutdownSignal, SystemExit, SystemShutdownSignal,
};

pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
