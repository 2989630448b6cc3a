//! # Action Parser
//!
//! Pulls the trailing `{"action": N}` token out of free-form agent text.
//!
//! Agents think aloud and often write tentative values before settling, so
//! only the **last** match counts. A strict pattern is tried first; if it
//! finds nothing, a looser one that tolerates whitespace around the braces
//! is tried. Nothing found means [`Action::Unparseable`], never a default.

use crate::state::Action;
use regex::Regex;
use std::sync::LazyLock;

static STRICT_ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{"action"\s*:\s*(-1|0|1)\}"#).expect("valid strict action regex")
});

static LOOSE_ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[{\s]"action"\s*:\s*(-1|0|1)[\s}]"#).expect("valid loose action regex")
});

/// Which pass produced the match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPass {
    Strict,
    Loose,
}

/// Parse the agent's action from `text`.
pub fn parse_action(text: &str) -> Action {
    parse_action_detailed(text)
        .map(|(action, _)| action)
        .unwrap_or(Action::Unparseable)
}

/// Like [`parse_action`], but also reports which pass matched.
pub fn parse_action_detailed(text: &str) -> Option<(Action, MatchPass)> {
    if let Some(code) = last_code(&STRICT_ACTION_RE, text) {
        return Some((Action::from_code(code), MatchPass::Strict));
    }
    if let Some(code) = last_code(&LOOSE_ACTION_RE, text) {
        tracing::debug!("action recovered by loose pattern");
        return Some((Action::from_code(code), MatchPass::Loose));
    }
    None
}

fn last_code(re: &Regex, text: &str) -> Option<i8> {
    re.captures_iter(text)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i8>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Decision;

    #[test]
    fn test_last_match_wins() {
        let text = "I will analyze... final: {\"action\": 1}\nActually {\"action\": 0}";
        assert_eq!(parse_action(text), Action::Decision(Decision::Hold));
    }

    #[test]
    fn test_press_and_stop() {
        assert_eq!(
            parse_action("so I press.\n{\"action\": 1}"),
            Action::Decision(Decision::Press)
        );
        assert_eq!(
            parse_action("I understand it now. {\"action\": -1}"),
            Action::Stop
        );
    }

    #[test]
    fn test_no_token_is_unparseable() {
        assert_eq!(parse_action("I am not sure what to do."), Action::Unparseable);
        assert_eq!(parse_action(""), Action::Unparseable);
    }

    #[test]
    fn test_out_of_domain_values_are_ignored() {
        assert_eq!(parse_action("{\"action\": 2}"), Action::Unparseable);
        assert_eq!(parse_action("{\"action\": 10}"), Action::Unparseable);
        assert_eq!(parse_action("{\"action\": \"1\"}"), Action::Unparseable);
    }

    #[test]
    fn test_loose_pass_tolerates_brace_padding() {
        let text = "Decision:\n```json\n{ \"action\": 1 }\n```";
        assert_eq!(
            parse_action_detailed(text),
            Some((Action::Decision(Decision::Press), MatchPass::Loose))
        );
    }

    #[test]
    fn test_strict_pass_preferred_over_later_loose_match() {
        let text = "{\"action\": 0} then maybe { \"action\": 1 }";
        assert_eq!(
            parse_action_detailed(text),
            Some((Action::Decision(Decision::Hold), MatchPass::Strict))
        );
    }

    #[test]
    fn test_whitespace_around_colon_is_strict() {
        assert_eq!(
            parse_action_detailed("{\"action\" :0}"),
            Some((Action::Decision(Decision::Hold), MatchPass::Strict))
        );
    }

    #[test]
    fn test_other_keys_are_not_actions() {
        assert_eq!(parse_action("{\"status\": 1}"), Action::Unparseable);
    }
}
