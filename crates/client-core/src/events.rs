//! Delegate traits and call events
//!
//! Applications observe calls and incoming push notifications through two
//! traits:
//!
//! - [`CallDelegate`] receives one callback per call state change, quality
//!   warning change and reconnect excursion. All callbacks of a call run on
//!   the [`DelegateQueue`](crate::DelegateQueue) chosen when the call was
//!   created, one at a time and in the order the changes happened.
//! - [`NotificationDelegate`] receives invites and cancellations produced by
//!   [`VoiceSdk::handle_notification`](crate::VoiceSdk::handle_notification).
//!
//! # Callback Contract
//!
//! - A call gets exactly one terminal callback: `call_did_fail_to_connect`
//!   if it never connected, `call_did_disconnect` otherwise (including a
//!   local `disconnect()` before the call connected).
//! - Every `call_is_reconnecting` is followed by exactly one of
//!   `call_did_reconnect` or `call_did_disconnect`.
//! - `call_did_receive_quality_warnings` only fires when the warning set
//!   changed.
//!
//! # Usage Examples
//!
//! ```rust
//! use async_trait::async_trait;
//! use voxlink_client_core::{Call, CallDelegate, VoiceError};
//!
//! struct Logger;
//!
//! #[async_trait]
//! impl CallDelegate for Logger {
//!     async fn call_did_connect(&self, call: &Call) {
//!         println!("call {} connected", call.uuid());
//!     }
//!
//!     async fn call_did_fail_to_connect(&self, call: &Call, error: VoiceError) {
//!         println!("call {} failed: {}", call.uuid(), error);
//!     }
//!
//!     async fn call_did_disconnect(&self, call: &Call, error: Option<VoiceError>) {
//!         println!("call {} ended: {:?}", call.uuid(), error);
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::call::Call;
use crate::error::VoiceError;
use crate::invite::{CallInvite, CancelledCallInvite};
use crate::quality::{WarningSet, WarningUpdate};

/// Observer of a single call
#[async_trait]
pub trait CallDelegate: Send + Sync {
    /// The callee is being alerted
    async fn call_did_start_ringing(&self, _call: &Call) {}

    /// Media is flowing
    async fn call_did_connect(&self, call: &Call);

    /// The call ended before it connected
    async fn call_did_fail_to_connect(&self, call: &Call, error: VoiceError);

    /// The call ended; `error` is `None` for a normal hangup
    async fn call_did_disconnect(&self, call: &Call, error: Option<VoiceError>);

    /// The call lost its signaling (53001) or media (53405) path and is recovering
    async fn call_is_reconnecting(&self, _call: &Call, _error: VoiceError) {}

    /// A reconnect excursion ended successfully
    async fn call_did_reconnect(&self, _call: &Call) {}

    /// The active quality warnings changed
    async fn call_did_receive_quality_warnings(
        &self,
        _call: &Call,
        _current: WarningSet,
        _previous: WarningSet,
    ) {
    }
}

/// Observer of push notification results
pub trait NotificationDelegate: Send + Sync {
    /// Runs synchronously inside `handle_notification`
    fn call_invite_received(&self, invite: CallInvite);

    /// Runs on the queue passed to `handle_notification`
    fn cancelled_call_invite_received(&self, cancelled: CancelledCallInvite, error: VoiceError);
}

/// A change reported to a [`CallDelegate`]
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    Ringing,
    Connected,
    FailedToConnect(VoiceError),
    Disconnected(Option<VoiceError>),
    Reconnecting(VoiceError),
    Reconnected,
    QualityWarningsChanged(WarningUpdate),
}

impl CallEvent {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            CallEvent::Ringing => "ringing",
            CallEvent::Connected => "connected",
            CallEvent::FailedToConnect(_) => "failed_to_connect",
            CallEvent::Disconnected(_) => "disconnected",
            CallEvent::Reconnecting(_) => "reconnecting",
            CallEvent::Reconnected => "reconnected",
            CallEvent::QualityWarningsChanged(_) => "quality_warnings",
        }
    }

    /// Whether no further state callbacks can follow
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallEvent::FailedToConnect(_) | CallEvent::Disconnected(_))
    }

    /// Invoke the matching delegate method
    pub async fn deliver(self, delegate: &dyn CallDelegate, call: &Call) {
        match self {
            CallEvent::Ringing => delegate.call_did_start_ringing(call).await,
            CallEvent::Connected => delegate.call_did_connect(call).await,
            CallEvent::FailedToConnect(error) => delegate.call_did_fail_to_connect(call, error).await,
            CallEvent::Disconnected(error) => delegate.call_did_disconnect(call, error).await,
            CallEvent::Reconnecting(error) => delegate.call_is_reconnecting(call, error).await,
            CallEvent::Reconnected => delegate.call_did_reconnect(call).await,
            CallEvent::QualityWarningsChanged(update) => {
                delegate
                    .call_did_receive_quality_warnings(call, update.current, update.previous)
                    .await
            }
        }
    }
}
