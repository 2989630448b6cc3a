//! Prompt text shown to the agent each round.

use crate::ledger::HistoryLedger;

/// Experiment briefing, prepended to round 0 only.
pub const INTRODUCTION: &str = r#"You are taking part in an interactive experiment involving a special button.

Rules:
1. You will interact with the button over several rounds.
2. At the end of each round you decide whether to press the button.
3. The button reports its status, e.g. {"status": 0}, where 0 means unlit and 1 means lit.
4. To help you understand how the button works, you are given its state history and your decision history.
5. Your goal: understand how the button works.
"#;

const INSTRUCTIONS: &str = r#"Analyse the button's history and try to understand its mechanism. Your reply must contain:
1. A summary of your current analysis of the mechanism (only this formal reply is kept as your memory for later rounds).
2. At the very end, your action as JSON: `{"action": _}`
    - `{"action": 0}` or `{"action": 1}` is your decision: 0 means do not press, 1 means press
    - `{"action": -1}` means you believe you understand the mechanism and want to end the experiment
"#;

/// Render the user prompt for `round`, showing the ledger's current state.
///
/// Must be called after any rollback, since it reads the ledger as it stands.
pub fn round_prompt(round: u32, ledger: &HistoryLedger) -> String {
    let body = format!(
        "This is round {}.\n- **Current button status**: `{}`\n{}\n\n{}",
        round,
        ledger.current_state().status_json(),
        ledger.render(),
        INSTRUCTIONS
    );

    if round == 0 {
        format!("{}\n\n{}", INTRODUCTION, body)
    } else {
        body
    }
}
