//! The client facade and its configuration
//!
//! - [`VoiceSdk`] - entry point: connect, push registration, notifications
//! - [`config`] - process-scoped settings (edge, insights, log levels)
//! - [`options`] - immutable per-call options and their builders
//! - [`types`] - small shared value types

pub mod config;
pub mod options;
pub mod types;
mod sdk;

pub use sdk::VoiceSdk;
