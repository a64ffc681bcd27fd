//! Call state machine implementation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current state of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CallState {
    /// Signaling in progress, nothing heard from the callee yet.
    #[default]
    Connecting,
    /// The callee is being alerted.
    Ringing,
    /// Media is flowing.
    Connected,
    /// A connected call lost its signaling or media path and is recovering.
    Reconnecting,
    /// Terminal. Nothing leaves this state.
    Disconnected,
}

impl CallState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// True before the call ever reached `Connected`.
    pub fn is_pre_connect(&self) -> bool {
        matches!(self, Self::Connecting | Self::Ringing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Whether `next` may directly follow `self` in a recorded history.
    pub fn can_advance_to(&self, next: CallState) -> bool {
        use CallState::*;
        matches!(
            (self, next),
            (Connecting, Ringing)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Ringing, Connected)
                | (Ringing, Disconnected)
                | (Connected, Reconnecting)
                | (Connected, Disconnected)
                | (Reconnecting, Connected)
                | (Reconnecting, Disconnected)
        )
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Connecting => "connecting",
            CallState::Ringing => "ringing",
            CallState::Connected => "connected",
            CallState::Reconnecting => "reconnecting",
            CallState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// State transitions for calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallTransition {
    /// Remote side is alerting.
    StartRinging,
    /// Media path established.
    Connect,
    /// Setup failed before the call connected.
    FailToConnect,
    /// Signaling or media path lost.
    Disrupt,
    /// Lost path restored.
    Recover,
    /// Local or remote hangup, or a fatal error.
    Disconnect,
}

/// Rejected state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid call state transition {attempted:?} from {current_state}")]
pub struct InvalidTransition {
    pub current_state: CallState,
    pub attempted: CallTransition,
}

/// Result of applying a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub previous: CallState,
    pub current: CallState,
}

impl StateChange {
    /// The transition was accepted but left the state as it was.
    pub fn is_noop(&self) -> bool {
        self.previous == self.current
    }
}

impl CallState {
    /// Compute the state a transition leads to.
    ///
    /// A disruption before the call connected does not enter
    /// `Reconnecting`, it ends the call. A second disruption while already
    /// `Reconnecting` is absorbed.
    pub fn apply(self, transition: CallTransition) -> Result<CallState, InvalidTransition> {
        use CallState::*;
        use CallTransition::*;

        let next = match (self, transition) {
            (Connecting, StartRinging) => Ringing,
            (Connecting | Ringing, Connect) => Connected,
            (Connecting | Ringing, FailToConnect) => Disconnected,
            (Connecting | Ringing, Disrupt) => Disconnected,
            (Connected, Disrupt) => Reconnecting,
            (Reconnecting, Disrupt) => Reconnecting,
            (Reconnecting, Recover) => Connected,
            (Connecting | Ringing | Connected | Reconnecting, Disconnect) => Disconnected,
            (current_state, attempted) => {
                return Err(InvalidTransition {
                    current_state,
                    attempted,
                });
            }
        };
        Ok(next)
    }
}

/// State plus the ordered history of states a call went through.
#[derive(Debug, Clone, Serialize)]
pub struct CallLifecycle {
    state: CallState,
    history: Vec<CallState>,
    connected_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl Default for CallLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl CallLifecycle {
    pub fn new() -> Self {
        Self {
            state: CallState::Connecting,
            history: vec![CallState::Connecting],
            connected_at: None,
            ended_at: None,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn history(&self) -> &[CallState] {
        &self.history
    }

    /// Whether the call ever reached `Connected`.
    pub fn was_connected(&self) -> bool {
        self.connected_at.is_some()
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    /// Seconds between first connect and disconnect, if both happened.
    pub fn duration_secs(&self) -> Option<i64> {
        match (self.connected_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end.signed_duration_since(start).num_seconds()),
            _ => None,
        }
    }

    pub fn apply_transition(
        &mut self,
        transition: CallTransition,
    ) -> Result<StateChange, InvalidTransition> {
        let previous = self.state;
        let current = previous.apply(transition)?;
        let change = StateChange { previous, current };
        if change.is_noop() {
            return Ok(change);
        }

        if current == CallState::Connected && self.connected_at.is_none() {
            self.connected_at = Some(Utc::now());
        }
        if current == CallState::Disconnected {
            self.ended_at = Some(Utc::now());
        }
        self.state = current;
        self.history.push(current);
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flow: Connecting → Ringing → Connected → Reconnecting → Connected → Disconnected
    #[test]
    fn test_full_outgoing_flow() {
        let mut call = CallLifecycle::new();
        call.apply_transition(CallTransition::StartRinging).unwrap();
        call.apply_transition(CallTransition::Connect).unwrap();
        call.apply_transition(CallTransition::Disrupt).unwrap();
        call.apply_transition(CallTransition::Recover).unwrap();
        call.apply_transition(CallTransition::Disconnect).unwrap();

        assert_eq!(
            call.history(),
            &[
                CallState::Connecting,
                CallState::Ringing,
                CallState::Connected,
                CallState::Reconnecting,
                CallState::Connected,
                CallState::Disconnected,
            ]
        );
        assert!(call.was_connected());
        assert!(call.duration_secs().is_some());
    }

    #[test]
    fn test_ringing_is_optional() {
        let mut call = CallLifecycle::new();
        call.apply_transition(CallTransition::Connect).unwrap();
        assert_eq!(call.state(), CallState::Connected);
    }

    #[test]
    fn test_disruption_before_connect_disconnects() {
        for start in [CallState::Connecting, CallState::Ringing] {
            assert_eq!(start.apply(CallTransition::Disrupt), Ok(CallState::Disconnected));
        }
    }

    #[test]
    fn test_repeated_disruption_is_absorbed() {
        let mut call = CallLifecycle::new();
        call.apply_transition(CallTransition::Connect).unwrap();
        call.apply_transition(CallTransition::Disrupt).unwrap();
        let change = call.apply_transition(CallTransition::Disrupt).unwrap();
        assert!(change.is_noop());
        assert_eq!(call.history().len(), 3);
    }

    #[test]
    fn test_disconnected_is_absorbing() {
        let transitions = [
            CallTransition::StartRinging,
            CallTransition::Connect,
            CallTransition::FailToConnect,
            CallTransition::Disrupt,
            CallTransition::Recover,
            CallTransition::Disconnect,
        ];
        for transition in transitions {
            let err = CallState::Disconnected.apply(transition).unwrap_err();
            assert_eq!(err.current_state, CallState::Disconnected);
            assert_eq!(err.attempted, transition);
        }
    }

    #[test]
    fn test_connect_failure_only_before_connect() {
        assert!(CallState::Connected.apply(CallTransition::FailToConnect).is_err());
        assert!(CallState::Reconnecting.apply(CallTransition::FailToConnect).is_err());
        assert!(CallState::Ringing.apply(CallTransition::StartRinging).is_err());
        assert!(CallState::Connected.apply(CallTransition::Recover).is_err());
    }

    #[test]
    fn test_every_accepted_change_is_a_valid_edge() {
        let states = [
            CallState::Connecting,
            CallState::Ringing,
            CallState::Connected,
            CallState::Reconnecting,
            CallState::Disconnected,
        ];
        let transitions = [
            CallTransition::StartRinging,
            CallTransition::Connect,
            CallTransition::FailToConnect,
            CallTransition::Disrupt,
            CallTransition::Recover,
            CallTransition::Disconnect,
        ];
        for state in states {
            for transition in transitions {
                if let Ok(next) = state.apply(transition) {
                    assert!(next == state || state.can_advance_to(next), "{state} -> {next}");
                }
            }
        }
    }
}
