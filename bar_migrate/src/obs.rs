//! Logging setup for the command-line tool.

use anyhow::Context;

/// Environment variable that overrides the configured log filter.
pub const LOG_ENV: &str = "BAR_MIGRATE_LOG";

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Install the global subscriber. Logs go to stderr so stdout carries only the summary.
///
/// The filter comes from [`LOG_ENV`] when set, `log_level` otherwise, and accepts full
/// `EnvFilter` directives (`"info,bar_migrate::target=debug"`).
pub fn init_tracing(log_level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| log_level.to_string());
    let env_filter =
        tracing_subscriber::EnvFilter::try_new(&filter).context("invalid log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let installed = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("cannot install log subscriber: {e}"))
}
