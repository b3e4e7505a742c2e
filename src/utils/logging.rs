//! Logging initialization for ConvoClaw.
//!
//! Supports three formats:
//! - `pretty`: multi-line human-readable output
//! - `component`: compact single-line text, grep-friendly; use the
//!   [`log_component!`](crate::log_component) macro to add a `component`
//!   field for per-subsystem filtering
//! - `json`: structured JSON lines for log aggregators

use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{ConvoError, Result};

/// Initialize the global tracing subscriber from config.
///
/// Call this once at startup before any tracing events are emitted.
/// `RUST_LOG` wins over `cfg.level` when set.
///
/// # Errors
///
/// Fails if the log file cannot be opened or a global subscriber is
/// already installed.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let writer = match &cfg.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(cfg.file.is_none())
        .with_target(true);

    let installed = match cfg.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Component => builder.compact().try_init(),
    };
    installed.map_err(|e| ConvoError::Config(format!("failed to initialize logging: {}", e)))
}

/// Emit a component-tagged tracing event.
///
/// Works with any tracing level (`trace`, `debug`, `info`, `warn`, `error`).
/// The `component` field makes it easy to grep logs by subsystem:
///
/// ```
/// # use convoclaw::log_component;
/// log_component!(info, "compaction", "summary applied");
/// log_component!(warn, "sanitizer", "response discarded", leftover = 42usize);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unwritable_log_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = LoggingConfig {
            // A directory cannot be opened for appending
            file: Some(temp_dir.path().to_string_lossy().into_owned()),
            ..Default::default()
        };
        assert!(matches!(init_logging(&cfg), Err(ConvoError::Io(_))));
    }

    #[test]
    fn test_second_init_reports_error() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = LoggingConfig {
            format: LogFormat::Json,
            file: Some(
                temp_dir
                    .path()
                    .join("convoclaw.log")
                    .to_string_lossy()
                    .into_owned(),
            ),
            level: "debug".to_string(),
        };
        // Whichever call loses the race for the global subscriber must fail
        // cleanly rather than panic.
        let first = init_logging(&cfg);
        let second = init_logging(&cfg);
        assert!(first.is_err() || second.is_err());
    }
}
