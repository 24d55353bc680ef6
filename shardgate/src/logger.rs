//! Logging.

use std::io::IsTerminal;

use shardgate_config::LogFormat;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. Level comes from `RUST_LOG`,
/// INFO by default. Safe to call more than once.
pub fn init(format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_ansi(std::io::stderr().is_terminal())
                    .with_file(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    // Already installed.
    let _ = result;
}
