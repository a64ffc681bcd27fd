//! Calls
//!
//! A [`Call`] is a cheap, cloneable handle to one call. It is created in
//! `Connecting` by [`VoiceSdk::connect`](crate::VoiceSdk::connect) or
//! [`CallInvite::accept`](crate::CallInvite::accept) and always ends in
//! `Disconnected`. The engine drives it through [`CallSignals`]; the
//! application drives it through the methods on `Call`.
//!
//! # Threading
//!
//! All delegate callbacks of a call run on its delegate queue. Calling
//! methods on the same call from several threads at once is not supported:
//! the handle stays memory safe, but the order of the resulting callbacks
//! relative to those calls is undefined. Use the call from its delegate
//! queue, or from a single application thread.
//!
//! # Mute, hold and digits
//!
//! `set_muted`, `set_on_hold` and `send_digits` only act while the call is
//! `Connected`. In every other state, `Reconnecting` included, they return
//! `false` and leave the call untouched. Nothing is queued for later.

pub mod state;
mod signals;

pub use signals::{CallSignals, ReconnectCause};

use signals::SignalLink;
pub use state::{CallLifecycle, CallState, CallTransition, InvalidTransition, StateChange};

use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::client::options::CallOptions;
use crate::client::types::{CallDirection, CallId, FeedbackIssue, FeedbackScore, validate_digits};
use crate::engine::VoiceEngine;
use crate::error::{ClientResult, VoiceError};
use crate::events::{CallDelegate, CallEvent};
use crate::quality::{QualitySample, QualityWarningAggregator, WarningSet};
use crate::queue::DelegateQueue;
use crate::stats::StatsReport;

/// Handle to a call
#[derive(Clone)]
pub struct Call {
    inner: Arc<CallInner>,
}

pub(crate) struct CallInner {
    uuid: CallId,
    from: Option<String>,
    to: String,
    direction: CallDirection,
    created_at: DateTime<Utc>,
    options: CallOptions,
    queue: DelegateQueue,
    delegate: Arc<dyn CallDelegate>,
    engine: Arc<dyn VoiceEngine>,
    session: Mutex<CallSession>,
}

struct CallSession {
    lifecycle: CallLifecycle,
    sid: Option<String>,
    muted: bool,
    on_hold: bool,
    quality: QualityWarningAggregator,
    signal_link: Weak<SignalLink>,
}

impl CallSession {
    /// Drop the engine's hold on the call once it has ended
    fn release_signals(&self) {
        if let Some(link) = self.signal_link.upgrade() {
            link.release();
        }
    }
}

/// Everything needed to create a call
pub(crate) struct NewCall {
    pub uuid: CallId,
    pub from: Option<String>,
    pub to: String,
    pub sid: Option<String>,
    pub direction: CallDirection,
    pub options: CallOptions,
    pub delegate: Arc<dyn CallDelegate>,
    pub engine: Arc<dyn VoiceEngine>,
}

/// Engine reports, already decoded from [`CallSignals`]
#[derive(Debug)]
pub(crate) enum EngineSignal {
    Ringing,
    Connected,
    ConnectFailed(VoiceError),
    Disconnected(Option<VoiceError>),
    Reconnecting(VoiceError),
    Reconnected,
}

impl Call {
    pub(crate) fn new(new: NewCall) -> Self {
        let queue = new.options.delegate_queue();
        debug!(call = %new.uuid, direction = %new.direction, queue = queue.label(), "call created");
        Self {
            inner: Arc::new(CallInner {
                uuid: new.uuid,
                from: new.from,
                to: new.to,
                direction: new.direction,
                created_at: Utc::now(),
                options: new.options,
                queue,
                delegate: new.delegate,
                engine: new.engine,
                session: Mutex::new(CallSession {
                    lifecycle: CallLifecycle::new(),
                    sid: new.sid,
                    muted: false,
                    on_hold: false,
                    quality: QualityWarningAggregator::new(),
                    signal_link: Weak::new(),
                }),
            }),
        }
    }

    fn from_inner(inner: Arc<CallInner>) -> Self {
        Self { inner }
    }

    /// Handle the engine uses to report progress
    pub(crate) fn signals(&self) -> CallSignals {
        let mut session = self.inner.session.lock();
        let link = match session.signal_link.upgrade() {
            Some(link) => link,
            None => {
                let held = (!session.lifecycle.state().is_terminal()).then(|| self.inner.clone());
                let link = Arc::new(SignalLink::new(held));
                session.signal_link = Arc::downgrade(&link);
                link
            }
        };
        CallSignals::new(self.inner.uuid, link)
    }

    /// Local identifier, also used to correlate with the system call UI
    pub fn uuid(&self) -> CallId {
        self.inner.uuid
    }

    /// Server side identifier, known once signaling has progressed
    pub fn sid(&self) -> Option<String> {
        self.inner.session.lock().sid.clone()
    }

    pub fn from(&self) -> Option<&str> {
        self.inner.from.as_deref()
    }

    pub fn to(&self) -> &str {
        &self.inner.to
    }

    pub fn direction(&self) -> CallDirection {
        self.inner.direction
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn state(&self) -> CallState {
        self.inner.session.lock().lifecycle.state()
    }

    /// Every state the call has been in, oldest first
    pub fn state_history(&self) -> Vec<CallState> {
        self.inner.session.lock().lifecycle.history().to_vec()
    }

    /// Seconds spent connected, once the call has ended
    pub fn duration_secs(&self) -> Option<i64> {
        self.inner.session.lock().lifecycle.duration_secs()
    }

    pub fn is_muted(&self) -> bool {
        self.inner.session.lock().muted
    }

    pub fn is_on_hold(&self) -> bool {
        self.inner.session.lock().on_hold
    }

    /// Quality warnings currently raised
    pub fn quality_warnings(&self) -> WarningSet {
        self.inner.session.lock().quality.current().clone()
    }

    pub fn options(&self) -> &CallOptions {
        &self.inner.options
    }

    pub fn delegate_queue(&self) -> &DelegateQueue {
        &self.inner.queue
    }

    /// End the call
    ///
    /// Safe to call any number of times from any state. The first call that
    /// finds the call alive produces one `call_did_disconnect(None)`; the
    /// rest do nothing.
    pub fn disconnect(&self) {
        {
            let mut session = self.inner.session.lock();
            if let Err(e) = session.lifecycle.apply_transition(CallTransition::Disconnect) {
                debug!(call = %self.inner.uuid, state = %e.current_state, "disconnect ignored");
                return;
            }
            info!(call = %self.inner.uuid, "call disconnected locally");
            self.inner.deliver(CallEvent::Disconnected(None));
            session.release_signals();
        }
        self.inner.engine.hangup(self.inner.uuid);
    }

    /// Mute or unmute the microphone; returns whether the request applied
    pub fn set_muted(&self, muted: bool) -> bool {
        {
            let mut session = self.inner.session.lock();
            if !self.inner.accepts_media_controls(&session, "set_muted") {
                return false;
            }
            if session.muted == muted {
                return true;
            }
            session.muted = muted;
            if muted {
                let update = session.quality.on_muted();
                if update.changed() {
                    self.inner.deliver(CallEvent::QualityWarningsChanged(update));
                }
            }
        }
        debug!(call = %self.inner.uuid, muted, "mute changed");
        self.inner.engine.set_muted(self.inner.uuid, muted);
        true
    }

    /// Hold or resume the call; returns whether the request applied
    pub fn set_on_hold(&self, on_hold: bool) -> bool {
        {
            let mut session = self.inner.session.lock();
            if !self.inner.accepts_media_controls(&session, "set_on_hold") {
                return false;
            }
            if session.on_hold == on_hold {
                return true;
            }
            session.on_hold = on_hold;
        }
        debug!(call = %self.inner.uuid, on_hold, "hold changed");
        self.inner.engine.set_on_hold(self.inner.uuid, on_hold);
        true
    }

    /// Send DTMF tones: `0`-`9`, `*`, `#`, and `w` for a half second pause
    ///
    /// Invalid characters are an error in any state. Otherwise returns
    /// whether the digits were handed to the engine.
    pub fn send_digits(&self, digits: &str) -> ClientResult<bool> {
        validate_digits(digits)?;
        if digits.is_empty() {
            return Ok(false);
        }
        {
            let session = self.inner.session.lock();
            if !self.inner.accepts_media_controls(&session, "send_digits") {
                return Ok(false);
            }
        }
        self.inner.engine.send_digits(self.inner.uuid, digits);
        Ok(true)
    }

    /// Fetch statistics for every peer connection of the call
    pub async fn stats(&self) -> Result<Vec<StatsReport>, VoiceError> {
        self.inner.engine.get_stats(self.inner.uuid).await
    }

    /// Fetch statistics and hand them to `completion`
    ///
    /// The completion runs on a tokio task when called inside a runtime,
    /// otherwise on the call's delegate queue. Its timing relative to state
    /// callbacks is unspecified.
    pub fn get_stats<F>(&self, completion: F)
    where
        F: FnOnce(Result<Vec<StatsReport>, VoiceError>) + Send + 'static,
    {
        let call = self.clone();
        let job = async move {
            let result = call.stats().await;
            completion(result);
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(job);
            }
            Err(_) => self.inner.queue.dispatch(job),
        }
    }

    /// Report the caller's rating; allowed in any state
    pub fn post_feedback(&self, score: FeedbackScore, issue: FeedbackIssue) {
        debug!(call = %self.inner.uuid, ?score, ?issue, "posting feedback");
        self.inner.engine.post_feedback(self.inner.uuid, score, issue);
    }

    /// Whether both handles refer to the same call
    pub fn same_call(&self, other: &Call) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Call {
    fn eq(&self, other: &Self) -> bool {
        self.same_call(other)
    }
}

impl Eq for Call {}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("uuid", &self.inner.uuid)
            .field("direction", &self.inner.direction)
            .field("to", &self.inner.to)
            .field("state", &self.state())
            .finish()
    }
}

impl CallInner {
    pub(crate) fn uuid(&self) -> CallId {
        self.uuid
    }

    fn accepts_media_controls(&self, session: &CallSession, operation: &str) -> bool {
        let state = session.lifecycle.state();
        if state.is_connected() {
            return true;
        }
        debug!(call = %self.uuid, %state, operation, "ignored outside connected state");
        false
    }

    /// Queue a delegate callback
    ///
    /// Called with the session lock held so callbacks are queued in the
    /// same order as the state changes that caused them.
    fn deliver(self: &Arc<Self>, event: CallEvent) {
        debug!(call = %self.uuid, event = event.name(), "queueing delegate callback");
        let call = Call::from_inner(self.clone());
        let delegate = self.delegate.clone();
        self.queue.dispatch(async move {
            event.deliver(delegate.as_ref(), &call).await;
        });
    }

    pub(crate) fn handle_signal(self: &Arc<Self>, signal: EngineSignal) {
        let mut session = self.session.lock();
        let state = session.lifecycle.state();

        let (transition, event) = match signal {
            EngineSignal::Ringing => (CallTransition::StartRinging, CallEvent::Ringing),
            EngineSignal::Connected => (CallTransition::Connect, CallEvent::Connected),
            EngineSignal::ConnectFailed(error) if state.is_pre_connect() => {
                (CallTransition::FailToConnect, CallEvent::FailedToConnect(error))
            }
            EngineSignal::ConnectFailed(error) => {
                (CallTransition::Disconnect, CallEvent::Disconnected(Some(error)))
            }
            EngineSignal::Disconnected(error) => {
                (CallTransition::Disconnect, CallEvent::Disconnected(error))
            }
            EngineSignal::Reconnecting(error) if state.is_pre_connect() => {
                (CallTransition::Disrupt, CallEvent::FailedToConnect(error))
            }
            EngineSignal::Reconnecting(error) => {
                (CallTransition::Disrupt, CallEvent::Reconnecting(error))
            }
            EngineSignal::Reconnected => (CallTransition::Recover, CallEvent::Reconnected),
        };

        match session.lifecycle.apply_transition(transition) {
            Ok(change) if change.is_noop() => {
                debug!(call = %self.uuid, %state, event = event.name(), "already in state, signal absorbed");
            }
            Ok(change) => {
                info!(call = %self.uuid, from = %change.previous, to = %change.current, "call state changed");
                self.deliver(event);
                if change.current.is_terminal() {
                    session.release_signals();
                }
            }
            Err(e) => {
                warn!(call = %self.uuid, error = %e, event = event.name(), "ignoring engine signal");
            }
        }
    }

    pub(crate) fn assign_sid(&self, sid: String) {
        let mut session = self.session.lock();
        if session.lifecycle.state().is_terminal() {
            debug!(call = %self.uuid, "sid reported after disconnect");
        }
        match &session.sid {
            Some(existing) if *existing != sid => {
                warn!(call = %self.uuid, %existing, new = %sid, "call sid changed");
            }
            _ => {}
        }
        session.sid = Some(sid);
    }

    pub(crate) fn record_quality(self: &Arc<Self>, sample: QualitySample) {
        let mut session = self.session.lock();
        let state = session.lifecycle.state();
        if !matches!(state, CallState::Connected | CallState::Reconnecting) {
            debug!(call = %self.uuid, %state, "quality sample ignored");
            return;
        }
        let muted = session.muted;
        let update = session.quality.evaluate(&sample, muted);
        if update.changed() {
            info!(
                call = %self.uuid,
                raised = ?update.raised(),
                cleared = ?update.cleared(),
                "quality warnings changed"
            );
            self.deliver(CallEvent::QualityWarningsChanged(update));
        }
    }

    /// End the call with an error, as the engine would
    pub(crate) fn fail(self: &Arc<Self>, error: VoiceError) {
        self.handle_signal(EngineSignal::ConnectFailed(error));
    }
}

impl Call {
    pub(crate) fn fail(&self, error: VoiceError) {
        warn!(call = %self.inner.uuid, error = %error, "call failed before reaching the engine");
        self.inner.fail(error);
    }
}
