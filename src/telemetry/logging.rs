//! Logging configuration and initialization.
//!
//! One `EnvFilter` plus one output layer: JSON or pretty, to a file or
//! stderr.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// JSON structured logging (default for production).
    #[default]
    Json,
    /// Human-readable pretty printing (for development).
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format (JSON or Pretty).
    pub format: LogFormat,
    /// Log level filter (e.g., "info", "next_batch=debug").
    pub level: String,
    /// File that receives log output, truncated on init. If None, logs go
    /// to stderr.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Subscriber stack the output layer is attached to.
type FilteredRegistry = Layered<EnvFilter, Registry>;

/// Initialize the global tracing subscriber.
///
/// Both formats write to `output_path` when set, stderr otherwise. Call once
/// at application startup; a second call returns
/// `LogError::AlreadyInitialized`.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let writer = make_writer(config.output_path.as_deref())?;
    let ansi = config.output_path.is_none();

    let layer: Box<dyn Layer<FilteredRegistry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_ansi(ansi).with_writer(writer).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)
}

fn make_writer(path: Option<&Path>) -> Result<BoxMakeWriter, LogError> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| LogError::FileOpen(format!("{}: {e}", path.display())))?;
            Ok(BoxMakeWriter::new(Mutex::new(file)))
        }
        None => Ok(BoxMakeWriter::new(std::io::stderr)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn invalid_filter_is_rejected_before_install() {
        let config = LogConfig {
            level: "next_batch=notalevel".to_string(),
            ..LogConfig::default()
        };
        assert!(matches!(init_logging(&config), Err(LogError::InvalidFilter(_))));
    }

    #[test]
    fn unwritable_path_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("batch.log");
        let err = make_writer(Some(&path)).err().unwrap();
        assert!(matches!(&err, LogError::FileOpen(msg) if msg.contains("batch.log")));
    }

    #[test]
    fn pretty_format_honors_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pretty.log");
        let config = LogConfig {
            format: LogFormat::Pretty,
            level: "next_batch=debug".to_string(),
            output_path: Some(path.clone()),
        };

        // Only test in this binary that installs a global subscriber.
        init_logging(&config).unwrap();
        tracing::info!(target: "next_batch", "pretty sink ready");
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("pretty sink ready"));
    }
}
