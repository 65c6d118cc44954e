//! Logging configuration and initialization
//!
//! Structured logging with tracing, supporting console output, file logging
//! and JSON format. Records emitted through the `log` facade by the GPU
//! resource code are forwarded into the same subscriber.

use std::path::PathBuf;

use serde::Deserialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "SPECTACULUM_LOG";
/// Environment variable selecting the output format ("json")
pub const LOG_FORMAT_ENV: &str = "SPECTACULUM_LOG_FORMAT";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Enable console output (default: true)
    #[serde(rename = "consoleEnabled")]
    pub console_enabled: bool,
    /// Enable file logging (default: false)
    #[serde(rename = "fileEnabled")]
    pub file_enabled: bool,
    /// Path of the log file (default: spectaculum.log in the working directory)
    #[serde(rename = "filePath")]
    pub file_path: Option<PathBuf>,
    /// Use JSON format for console logs (default: false)
    #[serde(rename = "jsonFormat")]
    pub json_format: bool,
    /// Default log level filter (default: "info")
    #[serde(rename = "defaultLevel")]
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_enabled: false,
            file_path: None,
            json_format: false,
            default_level: "info".to_string(),
        }
    }
}

/// Whether JSON output is selected, given the value of `SPECTACULUM_LOG_FORMAT`
fn json_requested(format_env: Option<&str>, config_default: bool) -> bool {
    match format_env {
        Some(value) => value.eq_ignore_ascii_case("json"),
        None => config_default,
    }
}

/// Initialize the logging system with the given configuration
///
/// Returns a guard that must be kept alive for the duration of the program
/// so that file logging is flushed.
///
/// # Environment Variables
///
/// - `SPECTACULUM_LOG`: log level filter (e.g., "debug", "info,spectaculum=trace")
/// - `RUST_LOG`: used when `SPECTACULUM_LOG` is not set
/// - `SPECTACULUM_LOG_FORMAT`: set to "json" for JSON output
///
/// # Example
///
/// ```no_run
/// use spectaculum::telemetry::{init_logging, LogConfig};
///
/// let config = LogConfig::default();
/// let _guard = init_logging(&config).expect("Failed to initialize logging");
/// // Keep _guard alive for the program duration
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Option<LogGuard>, Box<dyn std::error::Error + Send + Sync>> {
    // SPECTACULUM_LOG first, then RUST_LOG, then the configured default
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .or_else(|_| EnvFilter::try_new(&config.default_level))?;

    let format_env = std::env::var(LOG_FORMAT_ENV).ok();
    let use_json = json_requested(format_env.as_deref(), config.json_format);

    let mut file_guard: Option<WorkerGuard> = None;

    let file_layer = if config.file_enabled {
        let log_path = config
            .file_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("spectaculum.log"));
        let file = std::fs::File::create(&log_path)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        file_guard = Some(guard);
        eprintln!("Logging to file: {}", log_path.display());

        Some(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false), // No ANSI colors in file
        )
    } else {
        None
    };

    let json_layer = (config.console_enabled && use_json).then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    let console_layer = (config.console_enabled && !use_json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(json_layer)
        .with(console_layer)
        .try_init()?;

    tracing::info!(
        target: "spectaculum",
        version = env!("CARGO_PKG_VERSION"),
        json_format = use_json,
        file_enabled = config.file_enabled,
        "Logging initialized"
    );

    Ok(file_guard)
}

/// Initialize logging from environment with default configuration
pub fn init_logging_default() -> Result<Option<LogGuard>, Box<dyn std::error::Error + Send + Sync>> {
    init_logging(&LogConfig::default())
}

// Re-export WorkerGuard so callers can store it
pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert!(config.console_enabled);
        assert!(!config.file_enabled);
        assert!(!config.json_format);
        assert_eq!(config.default_level, "info");
    }

    #[test]
    fn test_json_format_selection() {
        assert!(json_requested(Some("json"), false));
        assert!(json_requested(Some("JSON"), false));
        assert!(!json_requested(Some("pretty"), true));
        assert!(json_requested(None, true));
        assert!(!json_requested(None, false));
    }
}
