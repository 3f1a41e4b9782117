//! Structured Logging for the Transparency Service
//!
//! Provides production-ready structured logging with:
//! - JSON output for log aggregation services
//! - Env-filter directives layered on the configured level
//!
//! # Usage
//!
//! ```rust,ignore
//! use scitt_log::logging::{init_logging, LogLevel};
//!
//! // Initialize at startup
//! init_logging(LogLevel::Info, true)?; // JSON mode for production
//!
//! // Log events
//! info!(target: "scitt::registration", entry_index, "statement registered");
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging errors
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` directives override the configured level when set.
pub fn init_logging(level: LogLevel, json: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::from(level).to_string()));

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };
    result.map_err(|e| LoggingError::Init(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("WARN"), LogLevel::Warn);
        assert_eq!(LogLevel::from("nonsense"), LogLevel::Info);
    }

    #[test]
    fn test_level_conversion() {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }
}
