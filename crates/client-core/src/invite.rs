//! Incoming call invites
//!
//! A push notification for an incoming call becomes a [`CallInvite`]. An
//! invite is single use: exactly one of [`accept`](CallInvite::accept) or
//! [`reject`](CallInvite::reject) succeeds, and a cancellation that arrives
//! first makes both fail. A cancellation that arrives after the invite was
//! resolved is ignored.
//!
//! # Payload Format
//!
//! | Key | Meaning |
//! |---|---|
//! | `twi_message_type` | `twilio.voice.call` or `twilio.voice.cancel` |
//! | `twi_call_sid` | call sid, required |
//! | `twi_to` | callee, required |
//! | `twi_from` | caller, optional |
//! | `twi_params` | custom parameters as a URL encoded query string |
//! | `twi_stir_status` | SHAKEN/STIR attestation of the caller |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::call::{Call, NewCall};
use crate::client::options::AcceptOptions;
use crate::client::types::CallDirection;
use crate::engine::{AcceptCallRequest, EngineContext, VoiceEngine};
use crate::error::{ClientError, ClientResult};
use crate::events::CallDelegate;

pub const MESSAGE_TYPE_KEY: &str = "twi_message_type";
pub const CALL_SID_KEY: &str = "twi_call_sid";
pub const FROM_KEY: &str = "twi_from";
pub const TO_KEY: &str = "twi_to";
pub const PARAMS_KEY: &str = "twi_params";
pub const STIR_STATUS_KEY: &str = "twi_stir_status";

/// Message type of an incoming call notification
pub const CALL_MESSAGE_TYPE: &str = "twilio.voice.call";
/// Message type of a cancellation notification
pub const CANCEL_MESSAGE_TYPE: &str = "twilio.voice.cancel";

/// Attestation level that counts as a verified caller
pub const VERIFIED_STIR_STATUS: &str = "TN-Validation-Passed-A";

/// Where an invite is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InviteStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl InviteStatus {
    pub fn is_pending(self) -> bool {
        matches!(self, InviteStatus::Pending)
    }
}

/// SHAKEN/STIR caller verification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerInfo {
    /// `Some(true)` for full attestation, `Some(false)` for a lesser or
    /// failed validation, `None` when absent or unrecognized
    pub verified: Option<bool>,
    pub stir_status: Option<String>,
}

impl CallerInfo {
    fn from_stir_status(status: Option<String>) -> Self {
        Self {
            verified: match status.as_deref() {
                Some(VERIFIED_STIR_STATUS) => Some(true),
                Some(s) if s.starts_with("TN-Validation-") => Some(false),
                _ => None,
            },
            stir_status: status,
        }
    }
}

/// Fields common to call and cancel notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InviteFields {
    pub call_sid: String,
    pub from: Option<String>,
    pub to: String,
    pub custom_parameters: BTreeMap<String, String>,
    pub caller_info: CallerInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NotificationPayload {
    Call(InviteFields),
    Cancel(InviteFields),
}

impl NotificationPayload {
    pub(crate) fn parse(payload: &Value) -> ClientResult<Self> {
        let map = payload
            .as_object()
            .ok_or_else(|| ClientError::invalid_payload("payload is not an object"))?;

        let text = |key: &str| -> ClientResult<Option<String>> {
            match map.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(_) => Err(ClientError::invalid_payload(format!("{} is not a string", key))),
            }
        };
        let required = |key: &str| -> ClientResult<String> {
            text(key)?
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ClientError::invalid_payload(format!("missing {}", key)))
        };

        let message_type = required(MESSAGE_TYPE_KEY)?;
        let fields = InviteFields {
            call_sid: required(CALL_SID_KEY)?,
            from: text(FROM_KEY)?.filter(|s| !s.is_empty()),
            to: required(TO_KEY)?,
            custom_parameters: text(PARAMS_KEY)?
                .map(|params| parse_custom_parameters(&params))
                .unwrap_or_default(),
            caller_info: CallerInfo::from_stir_status(text(STIR_STATUS_KEY)?),
        };

        match message_type.as_str() {
            CALL_MESSAGE_TYPE => Ok(NotificationPayload::Call(fields)),
            CANCEL_MESSAGE_TYPE => Ok(NotificationPayload::Cancel(fields)),
            other => Err(ClientError::invalid_payload(format!(
                "unsupported message type {:?}",
                other
            ))),
        }
    }
}

/// Decode `key=value&...` with percent and plus decoding
pub fn parse_custom_parameters(query: &str) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// An offer of an incoming call
#[derive(Clone)]
pub struct CallInvite {
    inner: Arc<InviteInner>,
}

struct InviteInner {
    fields: InviteFields,
    uuid: Uuid,
    received_at: DateTime<Utc>,
    status: Mutex<InviteState>,
    engine: Arc<dyn VoiceEngine>,
    context: EngineContext,
}

struct InviteState {
    status: InviteStatus,
    resolved_at: Option<DateTime<Utc>>,
}

impl CallInvite {
    pub(crate) fn new(fields: InviteFields, engine: Arc<dyn VoiceEngine>, context: EngineContext) -> Self {
        Self {
            inner: Arc::new(InviteInner {
                fields,
                uuid: Uuid::new_v4(),
                received_at: Utc::now(),
                status: Mutex::new(InviteState {
                    status: InviteStatus::Pending,
                    resolved_at: None,
                }),
                engine,
                context,
            }),
        }
    }

    /// Whether `payload` is a well formed incoming call notification
    pub fn is_valid(payload: &Value) -> bool {
        matches!(NotificationPayload::parse(payload), Ok(NotificationPayload::Call(_)))
    }

    pub fn from(&self) -> Option<&str> {
        self.inner.fields.from.as_deref()
    }

    pub fn to(&self) -> &str {
        &self.inner.fields.to
    }

    pub fn call_sid(&self) -> &str {
        &self.inner.fields.call_sid
    }

    pub fn custom_parameters(&self) -> &BTreeMap<String, String> {
        &self.inner.fields.custom_parameters
    }

    pub fn caller_info(&self) -> &CallerInfo {
        &self.inner.fields.caller_info
    }

    /// Uuid the accepted call carries unless the accept options override it
    pub fn uuid(&self) -> Uuid {
        self.inner.uuid
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.inner.received_at
    }

    pub fn status(&self) -> InviteStatus {
        self.inner.status.lock().status
    }

    /// When the invite stopped being pending
    pub(crate) fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.inner.status.lock().resolved_at
    }

    /// Accept with default options
    pub fn accept(&self, delegate: Arc<dyn CallDelegate>) -> ClientResult<Call> {
        self.accept_with_options(AcceptOptions::new(self), delegate)
    }

    /// Accept the invite, returning a call in `Connecting`
    pub fn accept_with_options(
        &self,
        options: AcceptOptions,
        delegate: Arc<dyn CallDelegate>,
    ) -> ClientResult<Call> {
        if options.call_sid() != self.call_sid() {
            return Err(ClientError::invalid_config(
                "accept_options",
                format!("built for {} but used with {}", options.call_sid(), self.call_sid()),
            ));
        }
        self.resolve(InviteStatus::Accepted)?;
        info!(call_sid = %self.call_sid(), uuid = %options.uuid(), "call invite accepted");

        let call = Call::new(NewCall {
            uuid: options.uuid(),
            from: self.inner.fields.from.clone(),
            to: self.inner.fields.to.clone(),
            sid: Some(self.inner.fields.call_sid.clone()),
            direction: CallDirection::Incoming,
            options: options.call_options().clone(),
            delegate,
            engine: self.inner.engine.clone(),
        });

        let request = AcceptCallRequest {
            call_id: call.uuid(),
            call_sid: self.inner.fields.call_sid.clone(),
            options: options.call_options().clone(),
            context: self.inner.context.clone(),
        };
        if let Err(error) = self.inner.engine.accept_invite(request, call.signals()) {
            call.fail(error);
        }
        Ok(call)
    }

    /// Decline the invite
    pub fn reject(&self) -> ClientResult<()> {
        self.resolve(InviteStatus::Rejected)?;
        info!(call_sid = %self.call_sid(), "call invite rejected");
        self.inner.engine.reject_invite(self.call_sid());
        Ok(())
    }

    fn resolve(&self, outcome: InviteStatus) -> ClientResult<()> {
        let mut state = self.inner.status.lock();
        match state.status {
            InviteStatus::Pending => {
                state.status = outcome;
                state.resolved_at = Some(Utc::now());
                Ok(())
            }
            InviteStatus::Cancelled => Err(ClientError::InviteCancelled {
                call_sid: self.call_sid().to_string(),
            }),
            status => Err(ClientError::InviteAlreadyHandled {
                call_sid: self.call_sid().to_string(),
                status,
            }),
        }
    }

    /// Mark a pending invite cancelled; returns false if it was already resolved
    pub(crate) fn cancel(&self) -> bool {
        match self.resolve(InviteStatus::Cancelled) {
            Ok(()) => true,
            Err(_) => {
                debug!(call_sid = %self.call_sid(), status = ?self.status(), "cancel after resolution ignored");
                false
            }
        }
    }
}

impl fmt::Debug for CallInvite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallInvite")
            .field("call_sid", &self.inner.fields.call_sid)
            .field("from", &self.inner.fields.from)
            .field("to", &self.inner.fields.to)
            .field("uuid", &self.inner.uuid)
            .field("status", &self.status())
            .finish()
    }
}

/// A withdrawn invite; informational only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledCallInvite {
    fields: InviteFields,
}

impl CancelledCallInvite {
    pub(crate) fn new(fields: InviteFields) -> Self {
        Self { fields }
    }

    pub fn from(&self) -> Option<&str> {
        self.fields.from.as_deref()
    }

    pub fn to(&self) -> &str {
        &self.fields.to
    }

    pub fn call_sid(&self) -> &str {
        &self.fields.call_sid
    }

    pub fn custom_parameters(&self) -> &BTreeMap<String, String> {
        &self.fields.custom_parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_payload() -> Value {
        json!({
            "twi_message_type": "twilio.voice.call",
            "twi_call_sid": "CA0001",
            "twi_from": "client:alice",
            "twi_to": "client:bob",
            "twi_params": "reason=support%20ticket&priority=high&empty=",
            "twi_stir_status": "TN-Validation-Passed-A"
        })
    }

    #[test]
    fn test_parse_call_payload() {
        let NotificationPayload::Call(fields) = NotificationPayload::parse(&call_payload()).unwrap() else {
            panic!("expected call payload");
        };
        assert_eq!(fields.call_sid, "CA0001");
        assert_eq!(fields.from.as_deref(), Some("client:alice"));
        assert_eq!(fields.custom_parameters["reason"], "support ticket");
        assert_eq!(fields.custom_parameters["empty"], "");
        assert_eq!(fields.caller_info.verified, Some(true));
    }

    #[test]
    fn test_parse_cancel_payload() {
        let mut payload = call_payload();
        payload["twi_message_type"] = json!("twilio.voice.cancel");
        assert!(matches!(
            NotificationPayload::parse(&payload),
            Ok(NotificationPayload::Cancel(_))
        ));
        assert!(!CallInvite::is_valid(&payload));
    }

    #[test]
    fn test_invalid_payloads() {
        assert!(CallInvite::is_valid(&call_payload()));
        assert!(!CallInvite::is_valid(&json!("twilio.voice.call")));

        for key in [MESSAGE_TYPE_KEY, CALL_SID_KEY, TO_KEY] {
            let mut payload = call_payload();
            payload.as_object_mut().unwrap().remove(key);
            assert!(!CallInvite::is_valid(&payload), "{} should be required", key);
        }

        let mut payload = call_payload();
        payload["twi_message_type"] = json!("twilio.voice.hangup");
        assert!(!CallInvite::is_valid(&payload));

        let mut payload = call_payload();
        payload["twi_call_sid"] = json!(42);
        assert!(!CallInvite::is_valid(&payload));
    }

    #[test]
    fn test_from_is_optional() {
        let mut payload = call_payload();
        payload.as_object_mut().unwrap().remove(FROM_KEY);
        let NotificationPayload::Call(fields) = NotificationPayload::parse(&payload).unwrap() else {
            panic!("expected call payload");
        };
        assert_eq!(fields.from, None);
    }

    #[test]
    fn test_caller_verification_levels() {
        assert_eq!(CallerInfo::from_stir_status(None).verified, None);
        assert_eq!(
            CallerInfo::from_stir_status(Some("TN-Validation-Passed-B".into())).verified,
            Some(false)
        );
        assert_eq!(
            CallerInfo::from_stir_status(Some("TN-Validation-Failed-A".into())).verified,
            Some(false)
        );
        assert_eq!(CallerInfo::from_stir_status(Some("No-TN-Validation".into())).verified, None);
    }

    #[test]
    fn test_custom_parameters_decoding() {
        let params = parse_custom_parameters("?a=1+2&b=%3D%26&=ignored");
        assert_eq!(params.len(), 2);
        assert_eq!(params["a"], "1 2");
        assert_eq!(params["b"], "=&");
    }
}
