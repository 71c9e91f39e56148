//! Log output formats accepted by `--log-format`.

use strum::{Display, EnumString};

/// How the daemon renders `tracing` events on stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event with fields flattened to the top level.
    #[default]
    Json,
    /// Single-line text intended for people watching a terminal.
    Compact,
}

impl LogFormat {
    /// Whether ANSI colour codes may be emitted when stderr is a terminal.
    ///
    /// JSON output is always plain so log shippers never see escape codes.
    #[must_use]
    pub const fn allows_ansi(self) -> bool {
        matches!(self, Self::Compact)
    }
}
