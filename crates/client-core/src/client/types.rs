//! Small value types shared across the client
//!
//! # Type Categories
//!
//! - **Call identity** - [`CallId`], [`CallDirection`]
//! - **Feedback** - [`FeedbackScore`], [`FeedbackIssue`] for post-call quality reports
//! - **DTMF** - digit validation for [`Call::send_digits`](crate::Call::send_digits)

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};

/// Local identifier of a call, also used to correlate with the system call UI
pub type CallId = Uuid;

/// Which side placed the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    /// Placed with `connect`
    Outgoing,
    /// Created by accepting an invite
    Incoming,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallDirection::Outgoing => write!(f, "outgoing"),
            CallDirection::Incoming => write!(f, "incoming"),
        }
    }
}

/// Caller's rating of the call
///
/// # Examples
///
/// ```rust
/// use voxlink_client_core::FeedbackScore;
///
/// assert_eq!(FeedbackScore::from_points(4), Some(FeedbackScore::FourPoints));
/// assert_eq!(FeedbackScore::FourPoints.points(), Some(4));
/// assert_eq!(FeedbackScore::from_points(6), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum FeedbackScore {
    #[default]
    NotReported,
    OnePoint,
    TwoPoints,
    ThreePoints,
    FourPoints,
    FivePoints,
}

impl FeedbackScore {
    pub fn from_points(points: u8) -> Option<Self> {
        match points {
            1 => Some(Self::OnePoint),
            2 => Some(Self::TwoPoints),
            3 => Some(Self::ThreePoints),
            4 => Some(Self::FourPoints),
            5 => Some(Self::FivePoints),
            _ => None,
        }
    }

    pub fn points(self) -> Option<u8> {
        match self {
            Self::NotReported => None,
            Self::OnePoint => Some(1),
            Self::TwoPoints => Some(2),
            Self::ThreePoints => Some(3),
            Self::FourPoints => Some(4),
            Self::FivePoints => Some(5),
        }
    }
}

/// Problem the caller experienced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FeedbackIssue {
    #[default]
    NotReported,
    DroppedCall,
    AudioLatency,
    OneWayAudio,
    ChoppyAudio,
    NoisyCall,
    Echo,
}

/// Pause inserted for each `w` in a digit string
pub const DTMF_PAUSE: Duration = Duration::from_millis(500);

/// Check a DTMF string: digits, `*`, `#` and `w` (a half second pause)
pub fn validate_digits(digits: &str) -> ClientResult<()> {
    if let Some(invalid) = digits
        .chars()
        .find(|c| !(c.is_ascii_digit() || matches!(c, '*' | '#' | 'w')))
    {
        return Err(ClientError::InvalidDigits {
            digits: digits.to_string(),
            invalid,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_validation() {
        assert!(validate_digits("0123456789*#w").is_ok());
        assert!(validate_digits("").is_ok());
        match validate_digits("12A") {
            Err(ClientError::InvalidDigits { invalid, .. }) => assert_eq!(invalid, 'A'),
            other => panic!("expected InvalidDigits, got {:?}", other),
        }
        assert!(validate_digits("1 2").is_err());
        assert!(validate_digits("W").is_err());
    }

    #[test]
    fn test_feedback_serialization() {
        let json = serde_json::to_string(&FeedbackIssue::OneWayAudio).unwrap();
        assert_eq!(json, "\"one-way-audio\"");
        assert_eq!(FeedbackScore::default(), FeedbackScore::NotReported);
    }
}
