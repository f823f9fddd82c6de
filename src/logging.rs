//! Taskflow Logging System
//!
//! Structured logging with configurable levels and output formats, built on
//! `tracing`. Log output goes to stderr (or a file) so that stdout stays
//! reserved for command results.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Logging configuration options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Minimum log level to output
    pub level: Level,
    /// Enable colored output
    pub color: bool,
    /// Show timestamps
    pub show_timestamps: bool,
    /// Show target/module name
    pub show_target: bool,
    /// Enable JSON format for machine parsing
    pub json_format: bool,
    /// Enable span events for tracing
    pub enable_spans: bool,
    /// Write to this file instead of stderr
    pub file_output: Option<PathBuf>,
}

/// Library callers that never pick a mode get structured JSON.
impl Default for LoggingConfig {
    fn default() -> Self {
        Self::for_mode(ApplicationMode::Embedded)
    }
}

impl LoggingConfig {
    /// Create config for different application modes
    pub fn for_mode(mode: ApplicationMode) -> Self {
        match mode {
            ApplicationMode::Cli => Self {
                level: Level::WARN,
                color: true,
                show_timestamps: false,
                show_target: false,
                json_format: false,
                enable_spans: false,
                file_output: None,
            },
            ApplicationMode::Embedded => Self {
                level: Level::INFO,
                color: false, // Host application owns the terminal
                show_timestamps: true,
                show_target: true,
                json_format: true,
                enable_spans: false,
                file_output: None,
            },
        }
    }

    /// Create config from CLI arguments
    pub fn from_args(quiet: bool, verbose: bool, json: bool) -> Self {
        let level = if verbose {
            Level::DEBUG
        } else if quiet {
            Level::ERROR
        } else {
            Level::WARN
        };

        Self {
            color: !quiet && !json && io::stderr().is_terminal(),
            show_timestamps: verbose || json,
            show_target: verbose,
            json_format: json,
            enable_spans: verbose,
            ..Self::for_mode(ApplicationMode::Cli)
        }
        .with_level(level)
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_file_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_output = Some(path.into());
        self
    }
}

/// Application modes with different logging requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationMode {
    /// CLI mode - quiet by default, human-readable
    Cli,
    /// Library embedded in another service - structured JSON
    Embedded,
}

/// Initialize the logging system
pub fn init_logging(config: LoggingConfig) -> io::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("taskflow={}", config.level)));

    let registry = Registry::default().with(env_filter);

    if let Some(log_file) = config.file_output {
        let directory = match log_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = log_file.file_name().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file name")
        })?;
        std::fs::create_dir_all(&directory)?;
        let file_appender = tracing_appender::rolling::never(directory, file_name);

        if config.json_format {
            let json_layer = fmt::layer()
                .json()
                .with_current_span(config.enable_spans)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(file_appender);
            json_layer.with_subscriber(registry).try_init().map_err(io::Error::other)?;
        } else {
            let fmt_layer = fmt::layer()
                .with_target(config.show_target)
                .with_level(true)
                .with_ansi(false)
                .with_writer(file_appender);

            if config.show_timestamps {
                fmt_layer
                    .with_timer(fmt::time::ChronoUtc::rfc_3339())
                    .with_subscriber(registry)
                    .try_init()
                    .map_err(io::Error::other)?;
            } else {
                fmt_layer.with_subscriber(registry).try_init().map_err(io::Error::other)?;
            }
        }
    } else if config.json_format {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(config.enable_spans)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(io::stderr);
        json_layer.with_subscriber(registry).try_init().map_err(io::Error::other)?;
    } else {
        let fmt_layer = fmt::layer()
            .with_target(config.show_target)
            .with_level(true)
            .with_ansi(config.color)
            .with_writer(io::stderr);

        if config.show_timestamps {
            fmt_layer
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_subscriber(registry)
                .try_init()
                .map_err(io::Error::other)?;
        } else {
            fmt_layer.with_subscriber(registry).try_init().map_err(io::Error::other)?;
        }
    }

    Ok(())
}

/// Build a config from TASKFLOW_LOG_* environment variables.
///
/// `TASKFLOW_LOG_LEVEL` overrides the level implied by the verbose/quiet
/// switches; `TASKFLOW_LOG_FILE` redirects output to a file.
pub fn config_from_env() -> LoggingConfig {
    let json = env_flag("TASKFLOW_LOG_JSON");
    let verbose = env_flag("TASKFLOW_LOG_VERBOSE");
    let quiet = env_flag("TASKFLOW_LOG_QUIET");

    let mut config = LoggingConfig::from_args(quiet, verbose, json);

    if let Some(level) = std::env::var("TASKFLOW_LOG_LEVEL")
        .ok()
        .and_then(|raw| parse_level(&raw))
    {
        config = config.with_level(level);
    }

    if let Ok(path) = std::env::var("TASKFLOW_LOG_FILE") {
        if !path.trim().is_empty() {
            config = config.with_file_output(path);
        }
    }

    config
}

/// Initialize logging from environment variables
pub fn init_from_env() -> io::Result<()> {
    init_logging(config_from_env())
}

fn env_flag(name: &str) -> bool {
    matches!(std::env::var(name).as_deref(), Ok("true") | Ok("1"))
}

fn parse_level(raw: &str) -> Option<Level> {
    match raw.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Log macros for common taskflow operations
#[macro_export]
macro_rules! log_task_operation {
    ($operation:expr, $task_id:expr) => {
        tracing::info!(operation = $operation, task_id = $task_id, "Task operation");
    };
    ($operation:expr, $task_id:expr, $details:expr) => {
        tracing::info!(
            operation = $operation,
            task_id = $task_id,
            details = %$details,
            "Task operation"
        );
    };
}

/// One status change, tagged with whether it was requested explicitly or
/// produced by derivation.
#[macro_export]
macro_rules! log_status_transition {
    ($task_id:expr, $previous:expr, $new:expr, $source:expr) => {
        tracing::info!(
            task_id = $task_id,
            previous_status = %$previous,
            new_status = %$new,
            source = $source,
            "Status transition"
        );
    };
}

/// Utility macro for structured error logging
#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Operation failed"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 5] = [
        "TASKFLOW_LOG_LEVEL",
        "TASKFLOW_LOG_JSON",
        "TASKFLOW_LOG_VERBOSE",
        "TASKFLOW_LOG_QUIET",
        "TASKFLOW_LOG_FILE",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_from_args_levels() {
        assert_eq!(LoggingConfig::from_args(false, true, false).level, Level::DEBUG);
        assert_eq!(LoggingConfig::from_args(true, false, false).level, Level::ERROR);
        assert_eq!(LoggingConfig::from_args(false, false, false).level, Level::WARN);

        let json = LoggingConfig::from_args(false, false, true);
        assert!(json.json_format);
        assert!(!json.color);
        assert!(json.show_timestamps);
    }

    #[test]
    fn test_default_is_embedded_json() {
        let config = LoggingConfig::default();
        assert_eq!(config, LoggingConfig::for_mode(ApplicationMode::Embedded));
        assert!(config.json_format);
        assert!(!config.color);
        assert_eq!(config.level, Level::INFO);

        let cli = LoggingConfig::for_mode(ApplicationMode::Cli);
        assert!(!cli.json_format);
        assert_eq!(cli.level, Level::WARN);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("TRACE"), Some(Level::TRACE));
        assert_eq!(parse_level(" warn "), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        clear_env();
        assert_eq!(config_from_env(), LoggingConfig::from_args(false, false, false));

        std::env::set_var("TASKFLOW_LOG_VERBOSE", "true");
        std::env::set_var("TASKFLOW_LOG_LEVEL", "trace");
        std::env::set_var("TASKFLOW_LOG_FILE", "/tmp/taskflow.log");
        let config = config_from_env();
        assert_eq!(config.level, Level::TRACE);
        assert!(config.enable_spans);
        assert_eq!(config.file_output, Some(PathBuf::from("/tmp/taskflow.log")));

        clear_env();
    }
}
