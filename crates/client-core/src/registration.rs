//! Push registration bookkeeping
//!
//! Registering binds an identity (from the access token) to a device push
//! token so incoming calls arrive as push notifications. The binding lives
//! for [`REGISTRATION_TTL_DAYS`] on the backend; re-register before then.
//!
//! # Usage Examples
//!
//! ```rust
//! use voxlink_client_core::registration::{RegistrationInfo, RegistrationStatus, device_token_hex};
//! use chrono::Utc;
//!
//! let info = RegistrationInfo::new("alice", &[0xde, 0xad, 0xbe, 0xef], Utc::now());
//! assert_eq!(info.device_token, "deadbeef");
//! assert_eq!(info.status, RegistrationStatus::Active);
//! assert_eq!((info.expires_at - info.registered_at).num_days(), 365);
//! assert_eq!(device_token_hex(&[0x01, 0xff]), "01ff");
//! ```

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, VoiceError};

/// Lifetime of a push binding
pub const REGISTRATION_TTL_DAYS: i64 = 365;

/// Status of the device's push binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationStatus {
    /// A register or unregister request is in flight
    Pending,
    /// Bound and receiving pushes
    Active,
    /// The last request failed
    Failed,
    /// Explicitly unbound
    Unregistered,
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationStatus::Pending => write!(f, "Pending"),
            RegistrationStatus::Active => write!(f, "Active"),
            RegistrationStatus::Failed => write!(f, "Failed"),
            RegistrationStatus::Unregistered => write!(f, "Unregistered"),
        }
    }
}

/// Details of the current push binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationInfo {
    pub identity: String,
    /// Lower case hex of the device push token
    pub device_token: String,
    pub status: RegistrationStatus,
    pub registered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Error of the last failed request
    pub last_error: Option<VoiceError>,
}

impl RegistrationInfo {
    pub fn new(identity: impl Into<String>, device_token: &[u8], registered_at: DateTime<Utc>) -> Self {
        Self {
            identity: identity.into(),
            device_token: device_token_hex(device_token),
            status: RegistrationStatus::Active,
            registered_at,
            expires_at: registered_at + Duration::days(REGISTRATION_TTL_DAYS),
            last_error: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether `device_token` is the token this binding was made with
    pub fn matches_device(&self, device_token: &[u8]) -> bool {
        self.device_token == device_token_hex(device_token)
    }
}

/// Hex encode a push token the way the backend stores it
pub fn device_token_hex(token: &[u8]) -> String {
    hex::encode(token)
}

/// An empty device token can never be bound
pub fn validate_device_token(token: &[u8]) -> Result<(), VoiceError> {
    if token.is_empty() {
        return Err(VoiceError::new(ErrorCode::RegistrationError).with_failure_reason("empty device token"));
    }
    Ok(())
}
