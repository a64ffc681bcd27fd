//! Process-scoped SDK configuration
//!
//! [`SdkConfig`] holds the settings that apply to every call: the edge
//! location, whether Insights telemetry is sent, and log levels. It is owned
//! by [`VoiceSdk`](crate::VoiceSdk). Edge and Insights are read when the
//! first network operation starts and are locked afterwards.
//!
//! # Usage Examples
//!
//! ```rust
//! use voxlink_client_core::{LogLevel, LogModule, SdkConfig};
//!
//! let config = SdkConfig::from_toml_str(r#"
//!     edge = "dublin"
//!     insights = false
//!     log_level = "info"
//!
//!     [modules]
//!     signaling = "trace"
//! "#).unwrap();
//!
//! assert_eq!(config.edge, "dublin");
//! assert_eq!(config.log_level_for(LogModule::Signaling), LogLevel::Trace);
//! assert_eq!(config.log_level_for(LogModule::Core), LogLevel::Info);
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use voxlink_infra_common::{LogLevel, LoggingConfig};

use crate::error::{ClientError, ClientResult};

/// Edge used when none is configured
pub const DEFAULT_EDGE: &str = "roaming";

/// SDK area a log level applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogModule {
    /// Call state machine, quality warnings and the facade
    Core,
    /// Delegate queues and host integration
    Platform,
    /// Invites, push registration and token handling
    Signaling,
    /// Media engine and statistics
    #[serde(rename = "webrtc")]
    WebRtc,
}

impl LogModule {
    pub const ALL: [LogModule; 4] = [
        LogModule::Core,
        LogModule::Platform,
        LogModule::Signaling,
        LogModule::WebRtc,
    ];

    /// Tracing targets covered by this module
    pub fn targets(self) -> &'static [&'static str] {
        match self {
            LogModule::Core => &[
                "voxlink_client_core::call",
                "voxlink_client_core::client",
                "voxlink_client_core::quality",
            ],
            LogModule::Platform => &["voxlink_client_core::queue", "voxlink_infra_common"],
            LogModule::Signaling => &[
                "voxlink_client_core::invite",
                "voxlink_client_core::registration",
                "voxlink_client_core::token",
            ],
            LogModule::WebRtc => &["voxlink_client_core::engine", "voxlink_client_core::stats"],
        }
    }
}

impl fmt::Display for LogModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogModule::Core => "core",
            LogModule::Platform => "platform",
            LogModule::Signaling => "signaling",
            LogModule::WebRtc => "webrtc",
        };
        f.write_str(name)
    }
}

/// Per-module overrides of the global log level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleLogLevels {
    pub core: Option<LogLevel>,
    pub platform: Option<LogLevel>,
    pub signaling: Option<LogLevel>,
    pub webrtc: Option<LogLevel>,
}

impl ModuleLogLevels {
    pub fn get(&self, module: LogModule) -> Option<LogLevel> {
        match module {
            LogModule::Core => self.core,
            LogModule::Platform => self.platform,
            LogModule::Signaling => self.signaling,
            LogModule::WebRtc => self.webrtc,
        }
    }

    pub fn set(&mut self, module: LogModule, level: LogLevel) {
        let slot = match module {
            LogModule::Core => &mut self.core,
            LogModule::Platform => &mut self.platform,
            LogModule::Signaling => &mut self.signaling,
            LogModule::WebRtc => &mut self.webrtc,
        };
        *slot = Some(level);
    }
}

/// Process-wide SDK settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Edge location, `roaming` picks the lowest latency edge
    pub edge: String,
    /// Send call quality telemetry
    pub insights: bool,
    /// Level for modules without an override
    pub log_level: LogLevel,
    pub modules: ModuleLogLevels,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            edge: DEFAULT_EDGE.to_string(),
            insights: true,
            log_level: LogLevel::Error,
            modules: ModuleLogLevels::default(),
        }
    }
}

impl SdkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_edge(mut self, edge: impl Into<String>) -> Self {
        self.edge = edge.into();
        self
    }

    pub fn with_insights(mut self, enabled: bool) -> Self {
        self.insights = enabled;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_module_log_level(mut self, module: LogModule, level: LogLevel) -> Self {
        self.modules.set(module, level);
        self
    }

    /// Effective level of one module
    pub fn log_level_for(&self, module: LogModule) -> LogLevel {
        self.modules.get(module).unwrap_or(self.log_level)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> ClientResult<Self> {
        let config: SdkConfig = toml::from_str(source)
            .map_err(|e| ClientError::invalid_config("sdk_config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            ClientError::invalid_config("sdk_config", format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> ClientResult<()> {
        validate_edge(&self.edge)
    }

    /// Logging setup matching these levels
    pub fn logging_config(&self) -> LoggingConfig {
        let mut logging = LoggingConfig::new(self.log_level, "voxlink");
        for module in LogModule::ALL {
            if let Some(level) = self.modules.get(module) {
                for target in module.targets() {
                    logging = logging.with_target(*target, level);
                }
            }
        }
        logging
    }
}

/// Edge names are host labels or full host names
pub fn validate_edge(edge: &str) -> ClientResult<()> {
    let valid = !edge.is_empty()
        && !edge.starts_with(|c: char| c == '.' || c == '-')
        && !edge.ends_with(|c: char| c == '.' || c == '-')
        && edge
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(ClientError::invalid_config("edge", format!("invalid edge name {:?}", edge)))
    }
}
