use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Call, CallInner, EngineSignal};
use crate::client::types::CallId;
use crate::error::{ErrorCode, VoiceError};
use crate::quality::QualitySample;

/// Which path a connected call lost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconnectCause {
    /// Signaling connection dropped (53001)
    Signaling,
    /// Media path failed (53405)
    Media,
}

impl ReconnectCause {
    pub fn error_code(self) -> ErrorCode {
        match self {
            ReconnectCause::Signaling => ErrorCode::SignalingConnectionDisconnected,
            ReconnectCause::Media => ErrorCode::MediaConnectionError,
        }
    }

    pub fn error(self) -> VoiceError {
        VoiceError::new(self.error_code())
    }
}

/// Strong link from the engine to a live call
///
/// Every [`CallSignals`] clone of a call shares one link. The call keeps only
/// a weak reference back to it and releases the link once it disconnects.
pub(crate) struct SignalLink {
    call: Mutex<Option<Arc<CallInner>>>,
}

impl SignalLink {
    pub(crate) fn new(call: Option<Arc<CallInner>>) -> Self {
        Self { call: Mutex::new(call) }
    }

    pub(crate) fn release(&self) {
        self.call.lock().take();
    }

    fn get(&self) -> Option<Arc<CallInner>> {
        self.call.lock().clone()
    }
}

/// Engine side handle for reporting progress of one call
///
/// Keeps the call alive until it reaches `Disconnected`, so a call the
/// application stopped holding still reports its remaining signals to the
/// delegate. Signals after that, and signals that make no sense in the
/// current state, are logged and ignored.
#[derive(Clone)]
pub struct CallSignals {
    call_id: CallId,
    link: Arc<SignalLink>,
}

impl CallSignals {
    pub(crate) fn new(call_id: CallId, link: Arc<SignalLink>) -> Self {
        Self { call_id, link }
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// The call, until it has disconnected
    pub fn call(&self) -> Option<Call> {
        self.link.get().map(Call::from_inner)
    }

    fn with_call(&self, what: &str, f: impl FnOnce(&Arc<CallInner>)) {
        match self.link.get() {
            Some(inner) => f(&inner),
            None => debug!(call = %self.call_id, signal = what, "call ended, signal discarded"),
        }
    }

    /// The backend assigned a call sid
    pub fn sid_assigned(&self, sid: impl Into<String>) {
        let sid = sid.into();
        self.with_call("sid", |inner| inner.assign_sid(sid));
    }

    pub fn ringing(&self) {
        self.with_call("ringing", |inner| inner.handle_signal(EngineSignal::Ringing));
    }

    pub fn connected(&self) {
        self.with_call("connected", |inner| inner.handle_signal(EngineSignal::Connected));
    }

    /// Setup failed; after the call connected this is treated as a disconnect
    pub fn connect_failed(&self, error: VoiceError) {
        self.with_call("connect_failed", |inner| {
            inner.handle_signal(EngineSignal::ConnectFailed(error))
        });
    }

    /// The call ended remotely or because of an error
    pub fn disconnected(&self, error: Option<VoiceError>) {
        self.with_call("disconnected", |inner| {
            inner.handle_signal(EngineSignal::Disconnected(error))
        });
    }

    /// A path was lost; before the call connected this ends it
    pub fn reconnecting(&self, cause: ReconnectCause) {
        self.with_call("reconnecting", |inner| {
            inner.handle_signal(EngineSignal::Reconnecting(cause.error()))
        });
    }

    pub fn reconnected(&self) {
        self.with_call("reconnected", |inner| inner.handle_signal(EngineSignal::Reconnected));
    }

    /// Periodic quality measurement
    pub fn quality_sample(&self, sample: QualitySample) {
        self.with_call("quality", |inner| inner.record_quality(sample));
    }
}

impl fmt::Debug for CallSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSignals")
            .field("call_id", &self.call_id)
            .field("alive", &self.link.call.lock().is_some())
            .finish()
    }
}
