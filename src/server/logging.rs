//! Logging initialization and configuration.

use std::fs::OpenOptions;
use std::io::{self, IsTerminal};
use std::sync::Arc;

use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use super::config::{LogFormat, LoggingConfig};

/// Initialize the global tracing subscriber based on configuration.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LoggingError::InvalidFilter(e.to_string()))?;

    let (writer, terminal) = match config.output.as_str() {
        "stdout" => (BoxMakeWriter::new(io::stdout), io::stdout().is_terminal()),
        "stderr" => (BoxMakeWriter::new(io::stderr), io::stderr().is_terminal()),
        path => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| LoggingError::FileOpen(path.to_string(), e))?;
            (BoxMakeWriter::new(Arc::new(file)), false)
        }
    };

    let ansi = config.color && terminal && config.format == LogFormat::Text;
    let layer = fmt::layer()
        .with_ansi(ansi)
        .with_target(config.target)
        .with_span_events(FmtSpan::NONE)
        .with_writer(writer);

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match (config.format, config.timestamps) {
        (LogFormat::Text, true) => layer.boxed(),
        (LogFormat::Text, false) => layer.without_time().boxed(),
        (LogFormat::Json, true) => layer.json().boxed(),
        (LogFormat::Json, false) => layer.json().without_time().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}

/// Errors that can occur during logging initialization.
#[derive(Debug)]
pub enum LoggingError {
    /// Invalid log filter string.
    InvalidFilter(String),
    /// Failed to open log file.
    FileOpen(String, io::Error),
    /// A global subscriber is already installed.
    Init(String),
}

impl std::fmt::Display for LoggingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggingError::InvalidFilter(msg) => write!(f, "Invalid log filter: {}", msg),
            LoggingError::FileOpen(path, e) => {
                write!(f, "Failed to open log file '{}': {}", path, e)
            }
            LoggingError::Init(msg) => write!(f, "Failed to install log subscriber: {}", msg),
        }
    }
}

impl std::error::Error for LoggingError {}
