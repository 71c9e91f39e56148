use std::fmt::Display;
use std::process::ExitCode;

use federation_config::{Config, ConfigError};

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(ConfigError::Parse(error)) => error.exit(),
        Err(error) => return report_early_failure(&error),
    };

    if let Err(error) = federationd::telemetry::initialise(&config) {
        return report_early_failure(&error);
    }

    match federationd::run_federation(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(
                target: concat!(env!("CARGO_PKG_NAME"), "::main"),
                error = %error,
                "federation daemon failed to start"
            );
            ExitCode::FAILURE
        }
    }
}

#[expect(
    clippy::print_stderr,
    reason = "no subscriber is installed before telemetry initialises"
)]
fn report_early_failure(error: &dyn Display) -> ExitCode {
    eprintln!("federationd: {error}");
    ExitCode::FAILURE
}
