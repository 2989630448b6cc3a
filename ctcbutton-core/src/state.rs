//! # Button values
//!
//! The three value types that flow through the loop: what the button shows,
//! what the agent decides, and what the parser could make of a reply.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The button's illumination. Serialized as `0` / `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum DeviceState {
    Off,
    On,
}

impl DeviceState {
    pub fn bit(self) -> u8 {
        match self {
            DeviceState::Off => 0,
            DeviceState::On => 1,
        }
    }

    /// `1 - self`
    pub fn flipped(self) -> Self {
        match self {
            DeviceState::Off => DeviceState::On,
            DeviceState::On => DeviceState::Off,
        }
    }

    /// The agent-facing status object, e.g. `{"status": 1}`
    pub fn status_json(self) -> serde_json::Value {
        serde_json::json!({ "status": self.bit() })
    }
}

impl From<DeviceState> for u8 {
    fn from(state: DeviceState) -> u8 {
        state.bit()
    }
}

impl TryFrom<u8> for DeviceState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DeviceState::Off),
            1 => Ok(DeviceState::On),
            other => Err(format!("device state must be 0 or 1, got {}", other)),
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Off => write!(f, "off"),
            DeviceState::On => write!(f, "on"),
        }
    }
}

/// The agent's binary choice for a round. Serialized as `0` / `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Decision {
    /// `{"action": 0}` - leave the button alone
    Hold,
    /// `{"action": 1}` - press it
    Press,
}

impl Decision {
    pub fn bit(self) -> u8 {
        match self {
            Decision::Hold => 0,
            Decision::Press => 1,
        }
    }

    /// Whether this decision matches what the button showed
    pub fn matches(self, state: DeviceState) -> bool {
        self.bit() == state.bit()
    }
}

impl From<Decision> for u8 {
    fn from(decision: Decision) -> u8 {
        decision.bit()
    }
}

impl TryFrom<u8> for Decision {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Decision::Hold),
            1 => Ok(Decision::Press),
            other => Err(format!("decision must be 0 or 1, got {}", other)),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Hold => write!(f, "hold"),
            Decision::Press => write!(f, "press"),
        }
    }
}

/// What the parser extracted from a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Decision(Decision),
    /// `{"action": -1}` - the agent believes it has worked out the mechanism
    Stop,
    /// No action token found. Never a valid decision.
    Unparseable,
}

impl Action {
    /// Wire value as the agent writes it; `None` for `Unparseable`.
    pub fn code(self) -> Option<i8> {
        match self {
            Action::Decision(d) => Some(d.bit() as i8),
            Action::Stop => Some(-1),
            Action::Unparseable => None,
        }
    }

    pub fn from_code(code: i8) -> Self {
        match code {
            0 => Action::Decision(Decision::Hold),
            1 => Action::Decision(Decision::Press),
            -1 => Action::Stop,
            _ => Action::Unparseable,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Decision(d) => write!(f, "{} ({})", d, d.bit()),
            Action::Stop => write!(f, "stop (-1)"),
            Action::Unparseable => write!(f, "unparseable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_is_involution() {
        assert_eq!(DeviceState::On.flipped(), DeviceState::Off);
        assert_eq!(DeviceState::Off.flipped().flipped(), DeviceState::Off);
    }

    #[test]
    fn test_decision_matches_state_by_bit() {
        assert!(Decision::Press.matches(DeviceState::On));
        assert!(Decision::Hold.matches(DeviceState::Off));
        assert!(!Decision::Hold.matches(DeviceState::On));
    }

    #[test]
    fn test_serialized_as_integers() {
        assert_eq!(serde_json::to_string(&DeviceState::On).unwrap(), "1");
        assert_eq!(serde_json::to_string(&Decision::Hold).unwrap(), "0");
        let state: DeviceState = serde_json::from_str("0").unwrap();
        assert_eq!(state, DeviceState::Off);
        assert!(serde_json::from_str::<DeviceState>("2").is_err());
    }

    #[test]
    fn test_status_json() {
        assert_eq!(DeviceState::On.status_json(), serde_json::json!({"status": 1}));
    }

    #[test]
    fn test_action_codes() {
        assert_eq!(Action::from_code(-1), Action::Stop);
        assert_eq!(Action::from_code(1), Action::Decision(Decision::Press));
        assert_eq!(Action::from_code(7), Action::Unparseable);
        assert_eq!(Action::Unparseable.code(), None);
        assert_eq!(Action::Stop.code(), Some(-1));
    }
}
