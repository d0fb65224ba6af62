//! Log output for the gateway binary.
//!
//! Operators watch the console at the level they pick. Every run also
//! rewrites `shoal-last-run.log`, which records the gateway's own crates at
//! TRACE so a session or proxy problem can be replayed after the fact,
//! while HTTP plumbing crates stay at INFO to keep the file readable.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the per-run trace log.
pub const LAST_RUN_LOG: &str = "shoal-last-run.log";

const DEFAULT_LOGS_DIR: &str = "logs";

/// Directives for the trace file: gateway crates in full, dependencies at
/// INFO.
const FILE_DIRECTIVES: &str = "info,shoal_core=trace,shoal_search=trace,shoal_web=trace";

/// Installs the global subscriber and returns the trace file path.
///
/// `RUST_LOG`, when set, replaces `console_level` for the console only.
/// `logs_dir` defaults to `./logs`.
///
/// # Errors
/// - `io::Error` - Logs directory or trace file could not be created
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> io::Result<PathBuf> {
    let dir = logs_dir.unwrap_or_else(|| Path::new(DEFAULT_LOGS_DIR));
    fs::create_dir_all(dir)?;
    let log_path = dir.join(LAST_RUN_LOG);
    let log_file = File::create(&log_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.as_str().to_ascii_lowercase()));
    let console = fmt::layer().compact().with_filter(console_filter);

    let file = fmt::layer()
        .with_ansi(false)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(log_file)
        .with_filter(EnvFilter::new(FILE_DIRECTIVES));

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .init();

    tracing::debug!(log = %log_path.display(), console = %console_level, "Logging started");
    Ok(log_path)
}

/// Console verbosity accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self
            .to_possible_value()
            .map(|value| value.get_name().to_string())
            .unwrap_or_default();
        f.write_str(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_levels_map_to_tracing_levels() {
        assert_eq!(Level::from(CliLogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(CliLogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_cli_level_display_matches_flag_value() {
        assert_eq!(CliLogLevel::Info.to_string(), "info");
        assert_eq!(
            CliLogLevel::from_str("debug", true).unwrap(),
            CliLogLevel::Debug
        );
    }
}
