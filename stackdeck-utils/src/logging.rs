//! Logging setup for applications embedding stackdeck
//!
//! The filter is read from `STACKDECK_LOG` when set, otherwise taken from
//! the [`LogConfig`] preset. The variable is checked when the subscriber is
//! installed, so it overrides every preset alike.

use std::fs::File;
use std::sync::Mutex;

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::{paths, Result, StackdeckError};

/// Environment variable holding the log filter
const LOG_ENV: &str = "STACKDECK_LOG";

const DEFAULT_LOG_FILE: &str = "stackdeck.log";

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    /// `log/stackdeck.log` in the state directory; use when the host UI
    /// owns the terminal
    File,
    Both,
}

impl LogOutput {
    fn stderr(self) -> bool {
        matches!(self, Self::Stderr | Self::Both)
    }

    fn file(self) -> bool {
        matches!(self, Self::File | Self::Both)
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub output: LogOutput,
    /// `EnvFilter` directives, e.g. `"info,stackdeck_terminal=debug"`;
    /// `STACKDECK_LOG` takes precedence
    pub filter: String,
    /// Log span enter/exit
    pub span_events: bool,
    /// Include source file and line
    pub file_line: bool,
    /// Log file name inside the log directory
    pub file_name: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "info".into(),
            span_events: false,
            file_line: false,
            file_name: None,
        }
    }
}

impl LogConfig {
    /// Multiplexer embedded in the desktop UI: warnings to the log file
    pub fn embedded() -> Self {
        Self {
            output: LogOutput::File,
            filter: "warn".into(),
            ..Self::default()
        }
    }

    /// Verbose stderr output for development
    pub fn development() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "debug".into(),
            span_events: true,
            file_line: true,
            file_name: None,
        }
    }

    /// Directives in effect: `env` when set and non-blank, else the preset
    fn directives(&self, env: Option<String>) -> String {
        env.filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| self.filter.clone())
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        }
    }
}

/// Initialize logging with the default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LogConfig::default())
}

/// Install the global subscriber described by `config`
///
/// Fails if the filter does not parse or a subscriber is already set.
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let directives = config.directives(std::env::var(LOG_ENV).ok());
    let filter = EnvFilter::try_new(&directives)
        .map_err(|e| StackdeckError::config(format!("Invalid log filter: {}", e)))?;

    let stderr_layer = config.output.stderr().then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(config.span_events())
            .with_file(config.file_line)
            .with_line_number(config.file_line)
    });

    let file_layer = if config.output.file() {
        let file = open_log_file(config.file_name.as_deref().unwrap_or(DEFAULT_LOG_FILE))?;
        Some(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_span_events(config.span_events())
                .with_file(config.file_line)
                .with_line_number(config.file_line),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| StackdeckError::internal(format!("Failed to init logging: {}", e)))
}

/// Open the log file for appending, creating the log directory first
fn open_log_file(file_name: &str) -> Result<File> {
    let log_dir = paths::log_dir();
    std::fs::create_dir_all(&log_dir).map_err(|e| StackdeckError::FileWrite {
        path: log_dir.clone(),
        source: e,
    })?;

    let log_path = log_dir.join(file_name);
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| StackdeckError::FileWrite {
            path: log_path,
            source: e,
        })
}
