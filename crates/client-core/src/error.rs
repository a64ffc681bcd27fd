//! Error types for the voice client
//!
//! Two families live here:
//!
//! - [`VoiceError`] carries one of the fixed numeric [`ErrorCode`]s. It is what
//!   delegates and registration completions receive, and its codes must stay
//!   bit-exact because the backend reports them verbatim.
//! - [`ClientError`] reports misuse of the local API (bad options, reused
//!   invites, invalid digits and so on). These never reach a delegate.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::call::state::InvalidTransition;
use crate::invite::InviteStatus;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Phase of the call flow an error code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Access token and account problems, raised before any session exists
    Authentication,
    /// Transport and SIP-style responses while setting up or running a call
    CallSession,
    /// Signaling channel and media path failures
    Media,
}

macro_rules! error_codes {
    ($( $(#[$meta:meta])* $name:ident = $code:literal => $desc:literal, $category:ident; )+) => {
        /// Numeric error codes reported by the voice backend
        ///
        /// # Examples
        ///
        /// ```rust
        /// use voxlink_client_core::error::{ErrorCategory, ErrorCode};
        ///
        /// assert_eq!(ErrorCode::MediaConnectionError.code(), 53405);
        /// assert_eq!(ErrorCode::from_code(20104), Some(ErrorCode::AccessTokenExpired));
        /// assert_eq!(ErrorCode::BusyHere.category(), ErrorCategory::CallSession);
        /// ```
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(u32)]
        pub enum ErrorCode {
            $( $(#[$meta])* $name = $code, )+
        }

        impl ErrorCode {
            /// Every known code, in ascending order
            pub const ALL: &'static [ErrorCode] = &[ $( ErrorCode::$name, )+ ];

            /// Look up a code by its numeric value
            pub fn from_code(code: u32) -> Option<Self> {
                match code {
                    $( $code => Some(ErrorCode::$name), )+
                    _ => None,
                }
            }

            /// Default human readable description
            pub fn description(self) -> &'static str {
                match self {
                    $( ErrorCode::$name => $desc, )+
                }
            }

            /// Phase this code belongs to
            pub fn category(self) -> ErrorCategory {
                match self {
                    $( ErrorCode::$name => ErrorCategory::$category, )+
                }
            }
        }
    };
}

error_codes! {
    AccessTokenInvalid = 20101 => "Invalid Access Token", Authentication;
    AccessTokenHeaderInvalid = 20102 => "Invalid Access Token header", Authentication;
    AccessTokenIssuerInvalid = 20103 => "Invalid Access Token issuer/subject", Authentication;
    AccessTokenExpired = 20104 => "Access Token expired or expiration date invalid", Authentication;
    AccessTokenNotYetValid = 20105 => "Access Token not yet valid", Authentication;
    AccessTokenGrantsInvalid = 20106 => "Invalid Access Token grants", Authentication;
    AccessTokenSignatureInvalid = 20107 => "Invalid Access Token signature", Authentication;
    AuthFailure = 20151 => "Auth Failure Error", Authentication;
    ExpirationTimeExceedsMaxTimeAllowed = 20157 => "Expiration Time Exceeds Maximum Time Allowed", Authentication;
    AccessForbidden = 20403 => "The account lacks permission to access the API", Authentication;
    ApplicationNotFound = 21218 => "Invalid Application Sid", Authentication;
    ConnectionError = 31005 => "Connection error", CallSession;
    CallCancelled = 31008 => "Unable to answer because the call has ended", CallSession;
    TransportError = 31009 => "No transport available to send or receive messages", CallSession;
    MalformedRequest = 31100 => "Malformed request", CallSession;
    AuthorizationError = 31201 => "Authorization error", CallSession;
    RegistrationError = 31301 => "Registration error", CallSession;
    UnsupportedCancelMessage = 31302 => "Unsupported Cancel Message Error", CallSession;
    BadRequest = 31400 => "The request could not be understood due to malformed syntax", CallSession;
    Forbidden = 31403 => "The server understood the request, but is refusing to fulfill it", CallSession;
    NotFound = 31404 => "The server has not found anything matching the request", CallSession;
    RequestTimeout = 31408 => "A request timeout occurred", CallSession;
    Conflict = 31409 => "The request could not be processed because of a conflict in the current state of the resource", CallSession;
    UpgradeRequired = 31426 => "HTTP 426 response received, most likely an incompatible TLS version", CallSession;
    TooManyRequests = 31429 => "Too many requests were sent in a given amount of time", CallSession;
    TemporarilyUnavailable = 31480 => "The callee is currently unavailable", CallSession;
    CallDoesNotExist = 31481 => "The call no longer exists", CallSession;
    AddressIncomplete = 31484 => "The phone number is malformed", CallSession;
    BusyHere = 31486 => "The callee is busy", CallSession;
    RequestTerminated = 31487 => "The request has terminated as a result of a bye or cancel", CallSession;
    InternalServerError = 31500 => "The server could not fulfill the request due to some unexpected condition", CallSession;
    BadGateway = 31502 => "The server received an invalid response from a downstream server", CallSession;
    ServiceUnavailable = 31503 => "The server is currently unable to handle the request", CallSession;
    GatewayTimeout = 31504 => "The server did not receive a timely response from an upstream server", CallSession;
    DnsResolutionError = 31530 => "Could not connect to the server due to DNS resolution failure", CallSession;
    BusyEverywhere = 31600 => "All possible destinations are busy", CallSession;
    Decline = 31603 => "The callee does not wish to participate in the call", CallSession;
    DoesNotExistAnywhere = 31604 => "The requested callee does not exist anywhere", CallSession;
    TokenAuthenticationRejected = 51007 => "Token authentication is rejected by authentication service", Authentication;
    SignalingConnectionDisconnected = 53001 => "Signaling connection disconnected", Media;
    MediaClientLocalDescFailed = 53400 => "Client is unable to create or apply a local media description", Media;
    MediaServerLocalDescFailed = 53401 => "Server is unable to create or apply a local media description", Media;
    MediaClientRemoteDescFailed = 53402 => "Client is unable to apply a remote media description", Media;
    MediaServerRemoteDescFailed = 53403 => "Server is unable to apply a remote media description", Media;
    MediaNoSupportedCodec = 53404 => "No supported codec", Media;
    MediaConnectionError = 53405 => "Media connection failed", Media;
    MediaDtlsTransportFailed = 53407 => "Media connection failed due to DTLS handshake failure", Media;
}

impl ErrorCode {
    /// Numeric value as sent by the backend
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Structured error delivered to delegates and completion handlers
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} ({code})")]
pub struct VoiceError {
    /// Backend error code
    pub code: ErrorCode,
    /// Human readable message
    pub message: String,
    /// Extra detail from the engine, when it has any
    pub failure_reason: Option<String>,
}

impl VoiceError {
    /// Create an error with the code's default description
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.description().to_string(),
            failure_reason: None,
        }
    }

    /// Replace the message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attach a failure reason
    pub fn with_failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    /// Numeric code
    pub fn code(&self) -> u32 {
        self.code.code()
    }

    /// Category of the code
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl From<ErrorCode> for VoiceError {
    fn from(code: ErrorCode) -> Self {
        VoiceError::new(code)
    }
}

/// Errors from misuse of the client API
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// An option failed validation
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// The invite was already accepted or rejected
    #[error("Call invite {call_sid} already handled ({status:?})")]
    InviteAlreadyHandled { call_sid: String, status: InviteStatus },

    /// The invite was cancelled by the caller
    #[error("Call invite {call_sid} was cancelled")]
    InviteCancelled { call_sid: String },

    /// DTMF string contains an unsupported character
    #[error("Invalid digit {invalid:?} in {digits:?}")]
    InvalidDigits { digits: String, invalid: char },

    /// A process-wide setting was changed after the first network operation
    #[error("{setting} can no longer be changed once network activity has started")]
    ConfigLocked { setting: String },

    /// A state machine transition was rejected
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// A push payload could not be interpreted
    #[error("Invalid notification payload: {reason}")]
    InvalidPayload { reason: String },

    /// A backend error surfaced through a synchronous API
    #[error(transparent)]
    Voice(#[from] VoiceError),

    /// Infrastructure failure (logging, config parsing)
    #[error(transparent)]
    Infra(#[from] voxlink_infra_common::Error),
}

impl ClientError {
    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid payload error
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }

    /// Create a config locked error
    pub fn config_locked(setting: impl Into<String>) -> Self {
        Self::ConfigLocked {
            setting: setting.into(),
        }
    }
}
