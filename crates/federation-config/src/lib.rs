//! Configuration for the federation daemon.
//!
//! Values are resolved from command-line flags first, then from
//! `FEDERATION_*` environment variables, then from the defaults in
//! [`defaults`]. Parsing is delegated to `clap`; [`Config::validate`] then
//! rejects combinations that parse but cannot run.

mod defaults;
mod logging;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

pub use defaults::{
    DEFAULT_CONNECTION_CONTEXT, DEFAULT_DEMO_FQDN, DEFAULT_DEMO_NAME, DEFAULT_DEMO_UPDATED_NAME,
    DEFAULT_LOG_FILTER, DEFAULT_MUTATION_INTERVAL_MS, DEFAULT_PORT, DEFAULT_WATCH_ID,
};
pub use logging::LogFormat;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Flags or environment values could not be parsed.
    ///
    /// This also carries `--help` and `--version` requests, which callers
    /// usually hand back to `clap` via [`clap::Error::exit`].
    #[error(transparent)]
    Parse(#[from] clap::Error),
    /// The listening port was zero.
    #[error("port must be non-zero")]
    ZeroPort,
    /// The mutation interval was zero.
    #[error("mutation interval must be at least one millisecond")]
    ZeroInterval,
    /// A required text setting was empty.
    #[error("{field} must not be empty")]
    Empty {
        /// Name of the offending setting.
        field: &'static str,
    },
}

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "federationd",
    version,
    about = "Federated resource lifecycle daemon"
)]
pub struct Config {
    /// Root CA certificate files trusted for peer authentication.
    #[arg(
        long = "root-ca",
        env = "FEDERATION_ROOT_CA",
        value_delimiter = ',',
        required = true,
        num_args = 1..
    )]
    root_cas: Vec<PathBuf>,
    /// Certificate presented to peers.
    #[arg(long = "cert", env = "FEDERATION_CERT")]
    certificate: PathBuf,
    /// Private key matching the certificate.
    #[arg(long = "key", env = "FEDERATION_KEY")]
    key: PathBuf,
    /// Port the resource service listens on.
    #[arg(long, env = "FEDERATION_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Connection context label; also identifies this provider to peers.
    #[arg(
        long,
        env = "FEDERATION_CONNECTION_CONTEXT",
        default_value = DEFAULT_CONNECTION_CONTEXT
    )]
    connection_context: String,
    /// Peer (`host:port`) whose resource changes are watched.
    #[arg(long, env = "FEDERATION_UPSTREAM")]
    upstream: Option<String>,
    /// Identifier of the remote watch subscription.
    #[arg(long, env = "FEDERATION_WATCH_ID", default_value = DEFAULT_WATCH_ID)]
    watch_id: String,
    /// Delay between the writes of one mutation cycle, in milliseconds.
    #[arg(
        long,
        env = "FEDERATION_MUTATION_INTERVAL_MS",
        default_value_t = DEFAULT_MUTATION_INTERVAL_MS
    )]
    mutation_interval_ms: u64,
    /// Key of the resource cycled by the mutation loop.
    #[arg(long, env = "FEDERATION_DEMO_FQDN", default_value = DEFAULT_DEMO_FQDN)]
    demo_fqdn: String,
    /// Display name written when the demo resource is created.
    #[arg(long, env = "FEDERATION_DEMO_NAME", default_value = DEFAULT_DEMO_NAME)]
    demo_name: String,
    /// Display name written when the demo resource is updated.
    #[arg(
        long,
        env = "FEDERATION_DEMO_UPDATED_NAME",
        default_value = DEFAULT_DEMO_UPDATED_NAME
    )]
    demo_updated_name: String,
    /// `tracing` filter expression.
    #[arg(long, env = "FEDERATION_LOG_FILTER", default_value = DEFAULT_LOG_FILTER)]
    log_filter: String,
    /// Log output format (`json` or `compact`).
    #[arg(long, env = "FEDERATION_LOG_FORMAT", default_value_t = LogFormat::default())]
    log_format: LogFormat,
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::try_parse()?.validate()
    }

    /// Loads configuration from an explicit argument list and the environment.
    ///
    /// The first item is treated as the binary name.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args)?.validate()
    }

    /// Rejects settings that parse but cannot drive the daemon.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.mutation_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        for (field, value) in [
            ("connection context", &self.connection_context),
            ("watch id", &self.watch_id),
            ("demo fqdn", &self.demo_fqdn),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty { field });
            }
        }
        Ok(self)
    }

    /// Root CA certificate sources.
    #[must_use]
    pub fn root_cas(&self) -> &[PathBuf] {
        &self.root_cas
    }

    /// Local certificate path.
    #[must_use]
    pub fn certificate(&self) -> &Path {
        &self.certificate
    }

    /// Local private key path.
    #[must_use]
    pub fn key(&self) -> &Path {
        &self.key
    }

    /// Listening port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connection context label.
    #[must_use]
    pub fn connection_context(&self) -> &str {
        &self.connection_context
    }

    /// Upstream peer address, when configured.
    #[must_use]
    pub fn upstream(&self) -> Option<&str> {
        self.upstream.as_deref()
    }

    /// Watch subscription identifier.
    #[must_use]
    pub fn watch_id(&self) -> &str {
        &self.watch_id
    }

    /// Fixed delay between mutation writes.
    #[must_use]
    pub fn mutation_interval(&self) -> Duration {
        Duration::from_millis(self.mutation_interval_ms)
    }

    /// Key of the demo resource.
    #[must_use]
    pub fn demo_fqdn(&self) -> &str {
        &self.demo_fqdn
    }

    /// Display name used on create.
    #[must_use]
    pub fn demo_name(&self) -> &str {
        &self.demo_name
    }

    /// Display name used on update.
    #[must_use]
    pub fn demo_updated_name(&self) -> &str {
        &self.demo_updated_name
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
