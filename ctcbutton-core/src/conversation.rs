//! Conversation buffer owned by the experiment loop.
//!
//! Every attempt appends a `user` prompt and then the `agent` reply. A
//! rejected attempt removes exactly that pair again, so the buffer only ever
//! holds exchanges that the ledger agrees with.

use crate::error::{self, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Speaker,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::User,
            text: text.into(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::Agent,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::user(text));
    }

    pub fn push_agent(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::agent(text));
    }

    /// Pop the last `(user, agent)` exchange, returning it in that order.
    ///
    /// The buffer is left untouched when its tail has any other shape.
    pub fn rollback_exchange(&mut self) -> Result<(Turn, Turn)> {
        let len = self.turns.len();
        let well_formed = len >= 2
            && self.turns[len - 1].role == Speaker::Agent
            && self.turns[len - 2].role == Speaker::User;
        if !well_formed {
            return Err(error::buffer_shape("(user, agent)", &self.describe_tail(), len));
        }

        let agent = self.turns.pop();
        let user = self.turns.pop();
        match (user, agent) {
            (Some(user), Some(agent)) => Ok((user, agent)),
            _ => Err(error::buffer_shape("(user, agent)", "short buffer", len)),
        }
    }

    fn describe_tail(&self) -> String {
        if self.turns.is_empty() {
            return "empty buffer".to_string();
        }
        let start = self.turns.len().saturating_sub(2);
        let roles: Vec<&str> = self.turns[start..]
            .iter()
            .map(|t| match t.role {
                Speaker::User => "user",
                Speaker::Agent => "agent",
            })
            .collect();
        format!("({})", roles.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_rollback_pops_agent_then_user() {
        let mut conv = Conversation::new();
        conv.push_user("round 0");
        conv.push_agent("{\"action\": 1}");
        conv.push_user("round 1");
        conv.push_agent("{\"action\": 0}");

        let (user, agent) = conv.rollback_exchange().unwrap();
        assert_eq!(user, Turn::user("round 1"));
        assert_eq!(agent, Turn::agent("{\"action\": 0}"));
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.last().map(|t| t.role), Some(Speaker::Agent));
    }

    #[test]
    fn test_rollback_rejects_wrong_tail() {
        let mut conv = Conversation::new();
        conv.push_user("a");
        conv.push_user("b");

        let err = conv.rollback_exchange().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferShapeViolation);
        assert!(err.message().contains("(user, user)"));
        assert_eq!(conv.len(), 2);
    }

    #[test]
    fn test_rollback_rejects_lone_agent_and_empty() {
        let mut conv = Conversation::new();
        assert_eq!(
            conv.rollback_exchange().unwrap_err().kind(),
            ErrorKind::BufferShapeViolation
        );

        conv.push_agent("orphan");
        assert_eq!(
            conv.rollback_exchange().unwrap_err().kind(),
            ErrorKind::BufferShapeViolation
        );
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn test_roles_serialize_lowercase() {
        let json = serde_json::to_value(Turn::agent("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "agent", "text": "hi"}));
    }
}
