//! Process-wide `tracing` subscriber for the daemon.
//!
//! Events go to stderr with RFC 3339 UTC timestamps, their target, and the
//! name of the emitting thread, so lines from the `federationd-*` activity
//! threads can be told apart.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{EnvFilter, fmt};

use federation_config::{Config, LogFormat};

static INSTALLED: OnceCell<()> = OnceCell::new();

type BoxedSubscriber = Box<dyn Subscriber + Send + Sync>;

/// Proof that the global subscriber is in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured filter expression did not parse.
    #[error("invalid log filter '{expression}': {source}")]
    Filter {
        /// Expression taken from the configuration.
        expression: String,
        /// Parser diagnostic.
        #[source]
        source: ParseError,
    },
    /// Another global subscriber was installed first.
    #[error("failed to install telemetry subscriber: {source}")]
    Subscriber {
        /// Error reported by `tracing`.
        #[source]
        source: SetGlobalDefaultError,
    },
}

/// Installs the global subscriber described by `config`.
///
/// Only the first successful call has an effect; later calls return a new
/// handle and leave the installed subscriber untouched.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| {
            let subscriber = build_subscriber(config.log_filter(), config.log_format())?;
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|source| TelemetryError::Subscriber { source })
        })
        .map(|_| TelemetryHandle)
}

fn build_subscriber(expression: &str, format: LogFormat) -> Result<BoxedSubscriber, TelemetryError> {
    let filter = EnvFilter::try_new(expression).map_err(|source| TelemetryError::Filter {
        expression: expression.to_owned(),
        source,
    })?;
    let ansi = format.allows_ansi() && io::stderr().is_terminal();
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(ansi)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    Ok(match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    })
}
