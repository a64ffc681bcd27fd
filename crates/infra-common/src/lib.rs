//! Shared infrastructure for the voxlink crates.
//!
//! Currently this is the logging layer: SDK log levels, per-target
//! filtering and `tracing-subscriber` installation. Higher layers map their
//! own module names onto tracing targets and hand the result to
//! [`logging::setup_logging`].

pub mod errors;
pub mod logging;

pub use errors::{Error, Result};
pub use logging::{LogLevel, LoggingConfig, log_welcome, parse_log_level, setup_logging};
