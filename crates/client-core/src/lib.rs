//! # Voxlink Client Core - Programmable Voice Client
//!
//! This crate is the application-facing half of a programmable voice client.
//! It owns everything an application sees: the [`Call`] lifecycle, incoming
//! [`CallInvite`]s delivered through push notifications, network quality
//! warnings, per-call options, the error taxonomy and delegate queues.
//!
//! Signaling and media live behind the [`VoiceEngine`] trait. The engine
//! reports progress back through [`CallSignals`] and this crate turns those
//! reports into state transitions and delegate callbacks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use voxlink_client_core::{Call, CallDelegate, VoiceEngine, VoiceError, VoiceSdk};
//!
//! struct Logger;
//!
//! #[async_trait]
//! impl CallDelegate for Logger {
//!     async fn call_did_connect(&self, call: &Call) {
//!         println!("{} connected", call.uuid());
//!     }
//!     async fn call_did_fail_to_connect(&self, call: &Call, error: VoiceError) {
//!         println!("{} failed: {}", call.uuid(), error);
//!     }
//!     async fn call_did_disconnect(&self, call: &Call, error: Option<VoiceError>) {
//!         println!("{} ended: {:?}", call.uuid(), error);
//!     }
//! }
//!
//! fn run(engine: Arc<dyn VoiceEngine>, token: &str) {
//!     let sdk = VoiceSdk::new(engine);
//!     let call = sdk.connect(token, Arc::new(Logger));
//!     call.set_muted(true);
//!     call.disconnect();
//! }
//! ```
//!
//! ## Threading
//!
//! Delegate callbacks run on a [`DelegateQueue`], a serial executor chosen
//! per call through [`CallOptions`]. Callbacks for one call are never
//! reordered. Calls and invites are shared handles and may be cloned freely.
//!
//! ## Modules
//!
//! - [`call`] - call handle and lifecycle state machine
//! - [`invite`] - incoming call invites and push payload parsing
//! - [`quality`] - network quality warning aggregation
//! - [`client`] - the [`VoiceSdk`] facade, options and configuration
//! - [`engine`] - the seam to the signaling and media stack
//! - [`error`] - public error codes and crate errors

pub mod call;
pub mod client;
pub mod engine;
pub mod error;
pub mod events;
pub mod invite;
pub mod quality;
pub mod queue;
pub mod registration;
pub mod stats;
pub mod token;

pub use call::{Call, CallSignals, CallState, ReconnectCause};
pub use client::VoiceSdk;
pub use client::config::{LogModule, SdkConfig};
pub use client::options::{
    AcceptOptions, AcceptOptionsBuilder, AudioCodec, CallOptions, CallOptionsBuilder, ConnectOptions,
    ConnectOptionsBuilder, IceOptions, IceServer, IceTransportPolicy,
};
pub use client::types::{CallDirection, CallId, FeedbackIssue, FeedbackScore};
pub use engine::{AcceptCallRequest, EngineContext, OutgoingCallRequest, RegistrationRequest, VoiceEngine};
pub use error::{ClientError, ClientResult, ErrorCategory, ErrorCode, VoiceError};
pub use events::{CallDelegate, CallEvent, NotificationDelegate};
pub use invite::{CallInvite, CallerInfo, CancelledCallInvite, InviteStatus};
pub use quality::{QualitySample, QualityWarning, WarningSet};
pub use queue::DelegateQueue;
pub use stats::StatsReport;
pub use token::AccessToken;
pub use voxlink_infra_common::LogLevel;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
