//! Logging configuration and subscriber setup.
//!
//! The SDK exposes an eight step verbosity scale ([`LogLevel`]) that is
//! coarser at the top (`Fatal`) and wider at the bottom (`All`) than the
//! tracing levels. Levels can be set globally and per tracing target; the
//! combination is rendered into an `EnvFilter` directive string.

mod level;
mod setup;

pub use level::{LogLevel, parse_log_level};
pub use setup::{LoggingConfig, log_welcome, setup_logging};
