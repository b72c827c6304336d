//! Process-wide log output for binaries and tests embedding Chronicle
//!
//! The crates only emit `tracing` events under the `chronicle::*` targets
//! (`chronicle::db`, `chronicle::wal`, `chronicle::recovery`,
//! `chronicle::events`, `chronicle::content`, `chronicle::projection`).
//! Nothing is printed until a subscriber is installed.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable read for filter directives, e.g.
/// `CHRONICLE_LOG=chronicle::wal=debug,info`
pub const LOG_ENV: &str = "CHRONICLE_LOG";

/// Filter used when [`LOG_ENV`] is unset or invalid
pub const DEFAULT_FILTER: &str = "chronicle=info";

/// Install a stderr `fmt` subscriber
///
/// Returns false when another global subscriber was installed first;
/// calling this twice is harmless.
pub fn init() -> bool {
    init_with_filter(
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    )
}

/// Install a stderr `fmt` subscriber with explicit directives
pub fn init_with_directives(directives: &str) -> bool {
    init_with_filter(EnvFilter::new(directives))
}

fn init_with_filter(filter: EnvFilter) -> bool {
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}
