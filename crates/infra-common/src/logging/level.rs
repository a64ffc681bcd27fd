use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::errors::{Error, Result};

/// SDK log verbosity, from silent to everything
///
/// `Fatal` and `Error` both map to tracing's `ERROR`, `Trace` and `All`
/// both map to `TRACE`.
///
/// # Examples
///
/// ```rust
/// use voxlink_infra_common::LogLevel;
/// use tracing::level_filters::LevelFilter;
///
/// assert_eq!(LogLevel::Warning.to_level_filter(), LevelFilter::WARN);
/// assert!(LogLevel::Debug > LogLevel::Info);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Turn off logging
    Off,
    /// Unrecoverable failures
    Fatal,
    /// Errors that stop an operation
    Error,
    /// Unexpected but tolerated conditions
    #[serde(alias = "warn")]
    Warning,
    /// Lifecycle events
    Info,
    /// Diagnostic detail
    Debug,
    /// Very verbose diagnostics
    Trace,
    /// Everything
    All,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Error
    }
}

impl LogLevel {
    /// Convert to the equivalent tracing filter
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Fatal | LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace | LogLevel::All => LevelFilter::TRACE,
        }
    }

    /// Directive keyword understood by `EnvFilter`
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Fatal | LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace | LogLevel::All => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Off => "off",
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
            LogLevel::All => "all",
        };
        f.write_str(name)
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "fatal" => Ok(LogLevel::Fatal),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            "all" => Ok(LogLevel::All),
            other => Err(Error::config(format!("Invalid log level: {}", other))),
        }
    }
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<LogLevel> {
    level.parse()
}
