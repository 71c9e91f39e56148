//! Default values shared by the configuration surface and the daemon.

/// Port the resource service listens on when none is configured.
pub const DEFAULT_PORT: u16 = 8000;

/// Label describing the connection context; also names this provider to peers.
pub const DEFAULT_CONNECTION_CONTEXT: &str = "federation";

/// Identifier of the single remote watch subscription.
pub const DEFAULT_WATCH_ID: &str = "w1";

/// Fixed delay between the writes of one mutation cycle.
pub const DEFAULT_MUTATION_INTERVAL_MS: u64 = 1_000;

/// Key of the resource cycled by the mutation loop.
pub const DEFAULT_DEMO_FQDN: &str = "svc.srv.foo.com";

/// Display name written on the create step.
pub const DEFAULT_DEMO_NAME: &str = "svc";

/// Display name written on the update step.
pub const DEFAULT_DEMO_UPDATED_NAME: &str = "svc_blue";

/// `tracing` filter applied when none is configured.
pub const DEFAULT_LOG_FILTER: &str = "info";
