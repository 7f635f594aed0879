//! Subscriber installation.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Output format of the process log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per record, event fields flattened to the top level.
    #[default]
    Json,
    /// Human-readable lines.
    Text,
}

/// Builds the filter: `RUST_LOG` wins when set and valid, `level` otherwise.
#[must_use]
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Installs the global `fmt` subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(level));

    match format {
        LogFormat::Json => builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        LogFormat::Text => builder.with_target(true).try_init(),
    }
    .map_err(|err| anyhow::anyhow!("failed to install log subscriber: {err}"))
}
