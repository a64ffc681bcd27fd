//! Boundary to the media and signaling engine
//!
//! Everything below the facade (ICE, DTLS, SRTP, codecs, reconnection logic,
//! push transport) lives behind [`VoiceEngine`]. The facade hands the engine
//! a request plus a [`CallSignals`] handle; the engine reports progress by
//! calling methods on that handle from any thread.
//!
//! Synchronous methods must not block. They are invoked without any call
//! lock held, so an engine may report signals from inside them.
//!
//! Engines should log under the [`ENGINE_LOG_TARGET`] tracing target so
//! `LogModule::WebRtc` controls their verbosity.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::call::CallSignals;
use crate::client::options::CallOptions;
use crate::client::types::{CallId, FeedbackIssue, FeedbackScore};
use crate::error::VoiceError;
use crate::stats::StatsReport;
use crate::token::AccessToken;

/// Tracing target for engine implementations
pub const ENGINE_LOG_TARGET: &str = "voxlink_client_core::engine";

/// Settings every request carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineContext {
    pub edge: String,
    pub insights: bool,
}

/// Place an outgoing call
#[derive(Debug, Clone)]
pub struct OutgoingCallRequest {
    pub call_id: CallId,
    pub access_token: AccessToken,
    pub params: BTreeMap<String, String>,
    pub options: CallOptions,
    pub context: EngineContext,
}

/// Answer an invite
#[derive(Debug, Clone)]
pub struct AcceptCallRequest {
    pub call_id: CallId,
    pub call_sid: String,
    pub options: CallOptions,
    pub context: EngineContext,
}

/// Bind or unbind a device for incoming call pushes
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub access_token: AccessToken,
    pub device_token: Vec<u8>,
    pub context: EngineContext,
}

/// The opaque calling engine
#[async_trait]
pub trait VoiceEngine: Send + Sync {
    /// Begin an outgoing call; an error fails the call before it connects
    fn start_call(&self, request: OutgoingCallRequest, signals: CallSignals) -> Result<(), VoiceError>;

    /// Answer an invite; an error fails the call before it connects
    fn accept_invite(&self, request: AcceptCallRequest, signals: CallSignals) -> Result<(), VoiceError>;

    fn reject_invite(&self, call_sid: &str);

    fn hangup(&self, call_id: CallId);

    fn set_muted(&self, call_id: CallId, muted: bool);

    fn set_on_hold(&self, call_id: CallId, on_hold: bool);

    fn send_digits(&self, call_id: CallId, digits: &str);

    async fn get_stats(&self, call_id: CallId) -> Result<Vec<StatsReport>, VoiceError>;

    fn post_feedback(&self, call_id: CallId, score: FeedbackScore, issue: FeedbackIssue);

    async fn register(&self, request: RegistrationRequest) -> Result<(), VoiceError>;

    async fn unregister(&self, request: RegistrationRequest) -> Result<(), VoiceError>;
}
