//! # History Ledger
//!
//! Two index-aligned histories: one state per round (including the current,
//! not-yet-acted-on one) and one decision per accepted round.
//!
//! Between rounds `states.len() == actions.len() + 1` always holds. A rejected
//! attempt never touches `actions`; it only replaces the last state.

use crate::error::{self, Error, Result};
use crate::state::{Decision, DeviceState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub round: u32,
    pub state: DeviceState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub round: u32,
    pub decision: Decision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LedgerParts")]
pub struct HistoryLedger {
    states: Vec<StateEntry>,
    actions: Vec<ActionEntry>,
}

/// Unchecked wire form; deserialization goes through `from_parts`.
#[derive(Deserialize)]
struct LedgerParts {
    states: Vec<StateEntry>,
    actions: Vec<ActionEntry>,
}

impl TryFrom<LedgerParts> for HistoryLedger {
    type Error = Error;

    fn try_from(parts: LedgerParts) -> Result<Self> {
        Self::from_parts(parts.states, parts.actions)
    }
}

impl HistoryLedger {
    /// Create a ledger holding only round 0's initial state
    pub fn new(initial: DeviceState) -> Self {
        Self {
            states: vec![StateEntry {
                round: 0,
                state: initial,
            }],
            actions: Vec::new(),
        }
    }

    /// Rebuild a ledger from persisted histories, checking pairing.
    pub fn from_parts(states: Vec<StateEntry>, actions: Vec<ActionEntry>) -> Result<Self> {
        if states.is_empty() {
            return Err(Error::ledger_underflow().with_operation("ledger::from_parts"));
        }
        if states.len() != actions.len() + 1 {
            return Err(Error::ledger_invariant(format!(
                "{} states cannot pair with {} actions",
                states.len(),
                actions.len()
            ))
            .with_operation("ledger::from_parts"));
        }
        for (i, entry) in states.iter().enumerate() {
            if entry.round as usize != i {
                return Err(error::round_mismatch("ledger::from_parts", i as u32, entry.round));
            }
        }
        for (i, entry) in actions.iter().enumerate() {
            if entry.round as usize != i {
                return Err(error::round_mismatch("ledger::from_parts", i as u32, entry.round));
            }
        }
        Ok(Self { states, actions })
    }

    pub fn states(&self) -> &[StateEntry] {
        &self.states
    }

    pub fn actions(&self) -> &[ActionEntry] {
        &self.actions
    }

    fn last(&self) -> &StateEntry {
        // never empty: `new` seeds round 0 and rollback refuses to remove it
        &self.states[self.states.len() - 1]
    }

    /// The state currently shown to the agent
    pub fn current_state(&self) -> DeviceState {
        self.last().state
    }

    /// Round of the last state entry
    pub fn current_round(&self) -> u32 {
        self.last().round
    }

    /// Whether the last state already has a decision recorded
    fn last_acted(&self) -> bool {
        self.actions.len() == self.states.len()
    }

    /// Record the decision that was accepted for `round`.
    pub fn record_accepted_action(&mut self, round: u32, decision: Decision) -> Result<()> {
        const OP: &str = "ledger::record_accepted_action";
        let last = self.current_round();
        if round != last {
            return Err(error::round_mismatch(OP, last, round));
        }
        if self.last_acted() {
            return Err(error::state_already_acted(OP, round));
        }
        self.actions.push(ActionEntry { round, decision });
        Ok(())
    }

    /// Append the state for the next round. `round` must be `last + 1`.
    pub fn record_next_state(&mut self, round: u32, state: DeviceState) -> Result<()> {
        const OP: &str = "ledger::record_next_state";
        let last = self.current_round();
        if round != last + 1 {
            return Err(error::round_mismatch(OP, last + 1, round));
        }
        if !self.last_acted() {
            return Err(error::state_not_acted(OP, last));
        }
        self.states.push(StateEntry { round, state });
        Ok(())
    }

    /// Remove the last state entry.
    ///
    /// Fails with `LedgerUnderflow` when only round 0's origin remains, and
    /// with `LedgerInvariant` when the state already has a paired action.
    pub fn rollback_last_state(&mut self) -> Result<StateEntry> {
        const OP: &str = "ledger::rollback_last_state";
        if self.states.len() <= 1 {
            return Err(Error::ledger_underflow()
                .with_operation(OP)
                .with_context("round", self.current_round().to_string()));
        }
        if self.last_acted() {
            return Err(error::state_already_acted(OP, self.current_round()));
        }
        self.states
            .pop()
            .ok_or_else(|| Error::ledger_underflow().with_operation(OP))
    }

    /// Swap the current state for `state` at the same round index.
    ///
    /// This is rollback + re-append in one step, so it is legal on round 0
    /// too: the ledger is never left without an origin entry.
    pub fn replace_current_state(&mut self, state: DeviceState) -> Result<StateEntry> {
        const OP: &str = "ledger::replace_current_state";
        if self.last_acted() {
            return Err(error::state_already_acted(OP, self.current_round()));
        }
        let last = self.states.len() - 1;
        let previous = self.states[last];
        self.states[last].state = state;
        Ok(previous)
    }

    /// Agent-facing rendering of both histories, in round order.
    ///
    /// Each history is a JSON array of single-key objects, `[{"0": 1}, ...]`.
    pub fn render(&self) -> String {
        let states: Vec<serde_json::Value> = self
            .states
            .iter()
            .map(|e| single_entry(e.round, e.state.bit()))
            .collect();
        let actions: Vec<serde_json::Value> = self
            .actions
            .iter()
            .map(|e| single_entry(e.round, e.decision.bit()))
            .collect();

        format!(
            "- Button history: `{}`\n- Your decision history: `{}`",
            serde_json::Value::Array(states),
            serde_json::Value::Array(actions)
        )
    }

    /// Compact one-line history, e.g. `0:on > 1:off`
    pub fn timeline(&self) -> String {
        self.states
            .iter()
            .map(|e| format!("{}:{}", e.round, e.state))
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

fn single_entry(round: u32, bit: u8) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert(round.to_string(), serde_json::Value::from(bit));
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn accept(ledger: &mut HistoryLedger, decision: Decision, next: DeviceState) {
        let round = ledger.current_round();
        ledger.record_accepted_action(round, decision).unwrap();
        ledger.record_next_state(round + 1, next).unwrap();
    }

    #[test]
    fn test_deserialize_checks_pairing() {
        let err = serde_json::from_str::<HistoryLedger>(r#"{"states":[],"actions":[{"round":0,"decision":1}]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("LedgerUnderflow"), "{}", err);

        let unpaired = r#"{"states":[{"round":0,"state":1}],"actions":[{"round":0,"decision":1}]}"#;
        assert!(serde_json::from_str::<HistoryLedger>(unpaired).is_err());

        let mut ledger = HistoryLedger::new(DeviceState::On);
        accept(&mut ledger, Decision::Press, DeviceState::Off);
        let json = serde_json::to_string(&ledger).unwrap();
        let restored: HistoryLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, ledger);
        assert_eq!(restored.current_state(), DeviceState::Off);
    }

    #[test]
    fn test_new_records_initial_state() {
        let ledger = HistoryLedger::new(DeviceState::On);
        assert_eq!(
            ledger.states(),
            &[StateEntry { round: 0, state: DeviceState::On }]
        );
        assert!(ledger.actions().is_empty());
        assert_eq!(ledger.current_round(), 0);
    }

    #[test]
    fn test_length_invariant_across_rounds() {
        let mut ledger = HistoryLedger::new(DeviceState::On);
        accept(&mut ledger, Decision::Press, DeviceState::Off);
        accept(&mut ledger, Decision::Hold, DeviceState::Off);

        assert_eq!(ledger.states().len(), ledger.actions().len() + 1);
        assert_eq!(ledger.current_round(), 2);
    }

    #[test]
    fn test_action_round_must_match_last_state() {
        let mut ledger = HistoryLedger::new(DeviceState::On);
        let err = ledger.record_accepted_action(1, Decision::Press).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LedgerInvariant);
        assert_eq!(err.context_value("expected"), Some("0"));
    }

    #[test]
    fn test_action_cannot_be_recorded_twice() {
        let mut ledger = HistoryLedger::new(DeviceState::Off);
        ledger.record_accepted_action(0, Decision::Hold).unwrap();
        let err = ledger.record_accepted_action(0, Decision::Hold).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LedgerInvariant);
    }

    #[test]
    fn test_next_state_requires_successor_round() {
        let mut ledger = HistoryLedger::new(DeviceState::Off);
        ledger.record_accepted_action(0, Decision::Hold).unwrap();
        let err = ledger.record_next_state(2, DeviceState::On).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LedgerInvariant);
        ledger.record_next_state(1, DeviceState::On).unwrap();
    }

    #[test]
    fn test_next_state_requires_action_first() {
        let mut ledger = HistoryLedger::new(DeviceState::Off);
        let err = ledger.record_next_state(1, DeviceState::On).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LedgerInvariant);
    }

    #[test]
    fn test_rollback_on_origin_underflows() {
        let mut ledger = HistoryLedger::new(DeviceState::On);
        let err = ledger.rollback_last_state().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LedgerUnderflow);
        assert_eq!(ledger.states().len(), 1);
    }

    #[test]
    fn test_rollback_removes_unacted_state() {
        let mut ledger = HistoryLedger::new(DeviceState::On);
        accept(&mut ledger, Decision::Press, DeviceState::Off);

        let removed = ledger.rollback_last_state().unwrap();
        assert_eq!(removed, StateEntry { round: 1, state: DeviceState::Off });
        assert_eq!(ledger.states().len(), 1);
    }

    #[test]
    fn test_rollback_refuses_acted_state() {
        let mut ledger = HistoryLedger::new(DeviceState::On);
        accept(&mut ledger, Decision::Press, DeviceState::Off);
        ledger.record_accepted_action(1, Decision::Hold).unwrap();

        let err = ledger.rollback_last_state().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LedgerInvariant);
    }

    #[test]
    fn test_replace_keeps_round_and_lengths() {
        let mut ledger = HistoryLedger::new(DeviceState::On);
        let previous = ledger.replace_current_state(DeviceState::Off).unwrap();

        assert_eq!(previous.state, DeviceState::On);
        assert_eq!(
            ledger.states(),
            &[StateEntry { round: 0, state: DeviceState::Off }]
        );
        assert!(ledger.actions().is_empty());
    }

    #[test]
    fn test_render_matches_history_format() {
        let mut ledger = HistoryLedger::new(DeviceState::On);
        accept(&mut ledger, Decision::Press, DeviceState::Off);

        let rendered = ledger.render();
        assert!(rendered.contains(r#"[{"0":1},{"1":0}]"#));
        assert!(rendered.contains(r#"Your decision history: `[{"0":1}]`"#));
    }

    #[test]
    fn test_render_reflects_replacement() {
        let mut ledger = HistoryLedger::new(DeviceState::On);
        ledger.replace_current_state(DeviceState::Off).unwrap();
        assert!(ledger.render().contains(r#"[{"0":0}]"#));
    }

    #[test]
    fn test_timeline() {
        let mut ledger = HistoryLedger::new(DeviceState::On);
        accept(&mut ledger, Decision::Press, DeviceState::Off);
        assert_eq!(ledger.timeline(), "0:on > 1:off");
    }

    #[test]
    fn test_from_parts_checks_pairing() {
        let states = vec![
            StateEntry { round: 0, state: DeviceState::On },
            StateEntry { round: 1, state: DeviceState::Off },
        ];
        let actions = vec![ActionEntry { round: 0, decision: Decision::Press }];
        let ledger = HistoryLedger::from_parts(states.clone(), actions).unwrap();
        assert_eq!(ledger.current_state(), DeviceState::Off);

        let err = HistoryLedger::from_parts(states, Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LedgerInvariant);
    }
}
