use std::collections::BTreeMap;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt};

use super::level::LogLevel;
use crate::errors::{Error, Result};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level applied to every target without an override
    pub level: LogLevel,
    /// Per-target overrides, keyed by tracing target prefix
    pub targets: BTreeMap<String, LogLevel>,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Whether to log spans
    pub log_spans: bool,
    /// Let `RUST_LOG` replace the configured filter when it is set
    pub env_override: bool,
    /// Application name to include in logs
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Error,
            targets: BTreeMap::new(),
            json: false,
            file_info: false,
            log_spans: false,
            env_override: true,
            app_name: "voxlink".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    pub fn new(level: LogLevel, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Override the level for one tracing target
    pub fn with_target(mut self, target: impl Into<String>, level: LogLevel) -> Self {
        self.targets.insert(target.into(), level);
        self
    }

    /// Enable JSON formatting
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Enable file and line information in logs
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Enable span logging
    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }

    /// Ignore `RUST_LOG` and always use the configured levels
    pub fn without_env_override(mut self) -> Self {
        self.env_override = false;
        self
    }

    /// Render the configuration as an `EnvFilter` directive string
    ///
    /// ```rust
    /// use voxlink_infra_common::{LogLevel, LoggingConfig};
    ///
    /// let config = LoggingConfig::new(LogLevel::Info, "demo")
    ///     .with_target("voxlink_client_core::call", LogLevel::Trace);
    /// assert_eq!(config.filter_directives(), "info,voxlink_client_core::call=trace");
    /// ```
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.level.directive().to_string()];
        for (target, level) in &self.targets {
            directives.push(format!("{}={}", target, level.directive()));
        }
        directives.join(",")
    }

    /// Build the filter this configuration describes
    pub fn env_filter(&self) -> Result<EnvFilter> {
        if self.env_override {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return Ok(filter);
            }
        }
        EnvFilter::try_new(self.filter_directives())
            .map_err(|e| Error::config(format!("Invalid log filter: {}", e)))
    }
}

/// Set up the logging system with the provided configuration
///
/// Fails with [`Error::Logging`] when a global subscriber is already set.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let filter = config.env_filter()?;

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        subscriber.with_writer(std::io::stdout).json().try_init()
    } else {
        subscriber.try_init()
    };

    installed.map_err(|e| Error::logging(e.to_string()))?;
    tracing::debug!(app = %config.app_name, filter = %config.filter_directives(), "logging initialised");
    Ok(())
}

/// Log a welcome message with version info
pub fn log_welcome(app_name: &str, version: &str) {
    tracing::info!("Starting {} v{}", app_name, version);
}
