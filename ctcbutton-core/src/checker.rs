//! Consistency checker: does the agent's decision agree with what it was shown?

use crate::state::{Decision, DeviceState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The causal loop closed for this round.
    Accept,
    /// The decision contradicted the shown state; retry with `corrective`.
    Reject { corrective: DeviceState },
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// Compare the state shown this attempt against the declared decision.
///
/// On mismatch the corrective state is always `1 - shown`, never re-sampled.
pub fn check(shown: DeviceState, declared: Decision) -> Verdict {
    if declared.matches(shown) {
        Verdict::Accept
    } else {
        Verdict::Reject {
            corrective: shown.flipped(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_decision_accepts() {
        assert_eq!(check(DeviceState::On, Decision::Press), Verdict::Accept);
        assert_eq!(check(DeviceState::Off, Decision::Hold), Verdict::Accept);
    }

    #[test]
    fn test_mismatch_rejects_with_flip() {
        assert_eq!(
            check(DeviceState::On, Decision::Hold),
            Verdict::Reject { corrective: DeviceState::Off }
        );
        assert_eq!(
            check(DeviceState::Off, Decision::Press),
            Verdict::Reject { corrective: DeviceState::On }
        );
    }

    #[test]
    fn test_corrective_state_satisfies_the_rejected_decision() {
        for shown in [DeviceState::Off, DeviceState::On] {
            for declared in [Decision::Hold, Decision::Press] {
                if let Verdict::Reject { corrective } = check(shown, declared) {
                    assert!(check(corrective, declared).is_accept());
                }
            }
        }
    }
}
