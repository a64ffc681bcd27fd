//! Shared fixtures: a scripted engine, recording delegates, tokens and payloads

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use parking_lot::Mutex;
use serde_json::{Value, json};

use voxlink_client_core::{
    AcceptCallRequest, Call, CallDelegate, CallId, CallInvite, CallSignals, CancelledCallInvite,
    FeedbackIssue, FeedbackScore, NotificationDelegate, OutgoingCallRequest, RegistrationRequest,
    StatsReport, VoiceEngine, VoiceError, VoiceSdk, WarningSet,
};

/// Engine double that records every request and keeps the signal handles
#[derive(Default)]
pub struct MockEngine {
    pub signals: Mutex<HashMap<CallId, CallSignals>>,
    pub outgoing: Mutex<Vec<OutgoingCallRequest>>,
    pub accepted: Mutex<Vec<AcceptCallRequest>>,
    pub rejected: Mutex<Vec<String>>,
    pub hangups: Mutex<Vec<CallId>>,
    pub mute_requests: Mutex<Vec<(CallId, bool)>>,
    pub hold_requests: Mutex<Vec<(CallId, bool)>>,
    pub digits: Mutex<Vec<(CallId, String)>>,
    pub feedback: Mutex<Vec<(CallId, FeedbackScore, FeedbackIssue)>>,
    pub registrations: Mutex<Vec<RegistrationRequest>>,
    pub unregistrations: Mutex<Vec<RegistrationRequest>>,
    pub stats: Mutex<Vec<StatsReport>>,
    pub fail_start: Mutex<Option<VoiceError>>,
    pub fail_registration: Mutex<Option<VoiceError>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Signal handle the facade handed over for `call`
    pub fn signals_for(&self, call: &Call) -> CallSignals {
        self.signals
            .lock()
            .get(&call.uuid())
            .cloned()
            .expect("engine never saw this call")
    }
}

#[async_trait]
impl VoiceEngine for MockEngine {
    fn start_call(&self, request: OutgoingCallRequest, signals: CallSignals) -> Result<(), VoiceError> {
        if let Some(error) = self.fail_start.lock().clone() {
            return Err(error);
        }
        self.signals.lock().insert(request.call_id, signals);
        self.outgoing.lock().push(request);
        Ok(())
    }

    fn accept_invite(&self, request: AcceptCallRequest, signals: CallSignals) -> Result<(), VoiceError> {
        if let Some(error) = self.fail_start.lock().clone() {
            return Err(error);
        }
        self.signals.lock().insert(request.call_id, signals);
        self.accepted.lock().push(request);
        Ok(())
    }

    fn reject_invite(&self, call_sid: &str) {
        self.rejected.lock().push(call_sid.to_string());
    }

    fn hangup(&self, call_id: CallId) {
        self.hangups.lock().push(call_id);
    }

    fn set_muted(&self, call_id: CallId, muted: bool) {
        self.mute_requests.lock().push((call_id, muted));
    }

    fn set_on_hold(&self, call_id: CallId, on_hold: bool) {
        self.hold_requests.lock().push((call_id, on_hold));
    }

    fn send_digits(&self, call_id: CallId, digits: &str) {
        self.digits.lock().push((call_id, digits.to_string()));
    }

    async fn get_stats(&self, _call_id: CallId) -> Result<Vec<StatsReport>, VoiceError> {
        Ok(self.stats.lock().clone())
    }

    fn post_feedback(&self, call_id: CallId, score: FeedbackScore, issue: FeedbackIssue) {
        self.feedback.lock().push((call_id, score, issue));
    }

    async fn register(&self, request: RegistrationRequest) -> Result<(), VoiceError> {
        if let Some(error) = self.fail_registration.lock().clone() {
            return Err(error);
        }
        self.registrations.lock().push(request);
        Ok(())
    }

    async fn unregister(&self, request: RegistrationRequest) -> Result<(), VoiceError> {
        if let Some(error) = self.fail_registration.lock().clone() {
            return Err(error);
        }
        self.unregistrations.lock().push(request);
        Ok(())
    }
}

/// What a [`RecordingDelegate`] saw, with errors reduced to their codes
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Ringing,
    Connected,
    FailedToConnect(u32),
    Disconnected(Option<u32>),
    Reconnecting(u32),
    Reconnected,
    Warnings { current: WarningSet, previous: WarningSet },
}

#[derive(Default)]
pub struct RecordingDelegate {
    pub events: Mutex<Vec<Recorded>>,
    pub threads: Mutex<Vec<String>>,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    fn record(&self, event: Recorded) {
        let thread = std::thread::current().name().unwrap_or_default().to_string();
        self.threads.lock().push(thread);
        self.events.lock().push(event);
    }
}

#[async_trait]
impl CallDelegate for RecordingDelegate {
    async fn call_did_start_ringing(&self, _call: &Call) {
        self.record(Recorded::Ringing);
    }

    async fn call_did_connect(&self, _call: &Call) {
        self.record(Recorded::Connected);
    }

    async fn call_did_fail_to_connect(&self, _call: &Call, error: VoiceError) {
        self.record(Recorded::FailedToConnect(error.code()));
    }

    async fn call_did_disconnect(&self, _call: &Call, error: Option<VoiceError>) {
        self.record(Recorded::Disconnected(error.map(|e| e.code())));
    }

    async fn call_is_reconnecting(&self, _call: &Call, error: VoiceError) {
        self.record(Recorded::Reconnecting(error.code()));
    }

    async fn call_did_reconnect(&self, _call: &Call) {
        self.record(Recorded::Reconnected);
    }

    async fn call_did_receive_quality_warnings(&self, _call: &Call, current: WarningSet, previous: WarningSet) {
        self.record(Recorded::Warnings { current, previous });
    }
}

#[derive(Default)]
pub struct NotificationRecorder {
    pub invites: Mutex<Vec<CallInvite>>,
    pub cancelled: Mutex<Vec<(CancelledCallInvite, VoiceError)>>,
    pub cancel_threads: Mutex<Vec<String>>,
}

impl NotificationRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn invite(&self, index: usize) -> CallInvite {
        self.invites.lock()[index].clone()
    }
}

impl NotificationDelegate for NotificationRecorder {
    fn call_invite_received(&self, invite: CallInvite) {
        self.invites.lock().push(invite);
    }

    fn cancelled_call_invite_received(&self, cancelled: CancelledCallInvite, error: VoiceError) {
        let thread = std::thread::current().name().unwrap_or_default().to_string();
        self.cancel_threads.lock().push(thread);
        self.cancelled.lock().push((cancelled, error));
    }
}

/// HS256 token with the given claims, signed with a key only the backend would know
pub fn token_with_claims(claims: Value) -> String {
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"backend-secret")).unwrap()
}

/// A token valid for the next hour
pub fn access_token(identity: &str) -> String {
    let now = Utc::now().timestamp();
    token_with_claims(json!({
        "iss": "SK0001",
        "sub": "AC0001",
        "iat": now - 60,
        "exp": now + 3600,
        "grants": {
            "identity": identity,
            "voice": {
                "incoming": {"allow": true},
                "outgoing": {"application_sid": "AP0001"}
            }
        }
    }))
}

/// A token that expired a minute ago
pub fn expired_token(identity: &str) -> String {
    let now = Utc::now().timestamp();
    token_with_claims(json!({
        "iss": "SK0001",
        "sub": "AC0001",
        "iat": now - 3600,
        "exp": now - 60,
        "grants": {"identity": identity, "voice": {}}
    }))
}

pub fn call_payload(call_sid: &str) -> Value {
    json!({
        "twi_message_type": "twilio.voice.call",
        "twi_call_sid": call_sid,
        "twi_from": "client:alice",
        "twi_to": "client:bob",
        "twi_params": "ticket=42&topic=billing%20question",
        "twi_stir_status": "TN-Validation-Passed-A"
    })
}

pub fn cancel_payload(call_sid: &str) -> Value {
    json!({
        "twi_message_type": "twilio.voice.cancel",
        "twi_call_sid": call_sid,
        "twi_from": "client:alice",
        "twi_to": "client:bob"
    })
}

/// Client whose engine is the returned mock
pub fn sdk() -> (VoiceSdk, Arc<MockEngine>) {
    let engine = MockEngine::new();
    (VoiceSdk::new(engine.clone()), engine)
}
