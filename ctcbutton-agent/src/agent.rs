//! Agent implementations - who answers the round prompts

use ctcbutton_core::{
    ChatMessage, CompletionRequest, Conversation, FinishReason, LlmProvider, ProviderError,
    Speaker, UsageTracker,
};
use ctcbutton_error::{Error, ErrorKind, Result};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

/// What the agent said for one attempt
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AgentReply {
    /// Formal reply; this is what enters the conversation buffer
    pub content: String,
    /// Hidden chain-of-thought, transcript only
    pub reasoning: Option<String>,
}

impl AgentReply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// Anything that can answer a round prompt given the conversation so far.
///
/// The conversation's last turn is always the `user` prompt for `round`.
#[allow(async_fn_in_trait)]
pub trait Agent {
    async fn invoke(&mut self, round: u32, conversation: &Conversation) -> Result<AgentReply>;
}

// ============================================================================
// Provider-backed agent
// ============================================================================

/// Which model answers which round
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSchedule {
    pub model: String,
    pub late_model: Option<String>,
    pub switch_round: u32,
}

impl ModelSchedule {
    pub fn single(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            late_model: None,
            switch_round: u32::MAX,
        }
    }

    /// `model` for rounds below `switch_round`, `late_model` from then on
    pub fn switching(model: impl Into<String>, late_model: impl Into<String>, switch_round: u32) -> Self {
        Self {
            model: model.into(),
            late_model: Some(late_model.into()),
            switch_round,
        }
    }

    pub fn is_late(&self, round: u32) -> bool {
        self.late_model.is_some() && round >= self.switch_round
    }

    pub fn model_for(&self, round: u32) -> &str {
        match &self.late_model {
            Some(late) if round >= self.switch_round => late,
            _ => &self.model,
        }
    }
}

/// Adapts an [`LlmProvider`] to the [`Agent`] seam
pub struct ProviderAgent<P> {
    provider: P,
    schedule: ModelSchedule,
    temperature: Option<f32>,
    usage: UsageTracker,
    truncated: u32,
}

impl<P: LlmProvider> ProviderAgent<P> {
    pub fn new(provider: P) -> Self {
        let schedule = ModelSchedule::single(provider.default_model());
        Self {
            provider,
            schedule,
            temperature: None,
            usage: UsageTracker::new(),
            truncated: 0,
        }
    }

    pub fn with_schedule(mut self, schedule: ModelSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Sampling temperature for the early model. The late model runs at its
    /// provider default, since reasoning models reject custom temperatures.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn schedule(&self) -> &ModelSchedule {
        &self.schedule
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Replies cut off by the provider's token limit
    pub fn truncated_replies(&self) -> u32 {
        self.truncated
    }

    fn request_for(&self, round: u32, conversation: &Conversation) -> CompletionRequest {
        let messages = conversation
            .turns()
            .iter()
            .map(|turn| match turn.role {
                Speaker::User => ChatMessage::user(turn.text.clone()),
                Speaker::Agent => ChatMessage::assistant(turn.text.clone()),
            })
            .collect();

        let mut request = CompletionRequest::new(messages).with_model(self.schedule.model_for(round));
        if let Some(temperature) = self.temperature {
            if !self.schedule.is_late(round) {
                request = request.with_temperature(temperature);
            }
        }
        request
    }
}

impl<P: LlmProvider> Agent for ProviderAgent<P> {
    async fn invoke(&mut self, round: u32, conversation: &Conversation) -> Result<AgentReply> {
        let request = self.request_for(round, conversation);
        let model = request.model.clone().unwrap_or_default();
        debug!(round, model = %model, messages = request.messages.len(), "calling provider");

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| map_provider_error(e).with_context("round", round.to_string()))?;

        self.usage.track(&model, &response.usage);
        if response.finish_reason == FinishReason::Length {
            // a cut-off reply usually loses its trailing action
            self.truncated += 1;
            warn!(round, model = %model, provider = self.provider.name(), "reply truncated at token limit");
        }

        let content = response.content.ok_or_else(|| {
            Error::agent_invocation_failed("provider returned no content")
                .with_operation("ProviderAgent::invoke")
                .with_context("round", round.to_string())
                .with_context("model", model.clone())
        })?;

        Ok(AgentReply {
            content,
            reasoning: response.reasoning.filter(|r| !r.is_empty()),
        })
    }
}

/// Fold a transport error into the structured error type
pub fn map_provider_error(err: ProviderError) -> Error {
    let message = err.to_string();
    let error = match &err {
        ProviderError::Timeout => Error::new(ErrorKind::AgentTimeout, message),
        ProviderError::Network(_) => Error::new(ErrorKind::NetworkFailed, message),
        ProviderError::RateLimited { retry_after } => {
            let error = Error::new(ErrorKind::RateLimited, message);
            match retry_after {
                Some(secs) => error.with_context("retry_after", secs.to_string()),
                None => error,
            }
        }
        ProviderError::Api { status, .. } if *status >= 500 => {
            Error::new(ErrorKind::ProviderUnavailable, message).with_context("status", status.to_string())
        }
        ProviderError::Api { status, .. } => {
            Error::agent_invocation_failed(message).with_context("status", status.to_string())
        }
        ProviderError::Parse(_) | ProviderError::AuthenticationFailed | ProviderError::Other(_) => {
            Error::agent_invocation_failed(message)
        }
    };

    error.with_operation("ProviderAgent::invoke").set_source(err)
}

// ============================================================================
// Retry
// ============================================================================

/// How often to re-invoke the agent on a temporary failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self { max_attempts, backoff }
    }
}

/// Invoke `agent`, retrying retryable errors up to the policy's budget.
///
/// An error that is still retryable when attempts run out is marked persistent.
pub async fn invoke_with_retry<A: Agent>(
    agent: &mut A,
    policy: &RetryPolicy,
    round: u32,
    conversation: &Conversation,
) -> Result<AgentReply> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match agent.invoke(round, conversation).await {
            Ok(reply) => return Ok(reply),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(round, attempt, error = %err, "agent call failed, retrying");
                if !policy.backoff.is_zero() {
                    tokio::time::sleep(policy.backoff).await;
                }
                attempt += 1;
            }
            Err(err) => return Err(err.persist()),
        }
    }
}

// ============================================================================
// Scripted agent
// ============================================================================

/// Replays canned replies in order; fails once the script runs out.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    replies: VecDeque<AgentReply>,
    calls: Vec<(u32, usize)>,
}

impl ScriptedAgent {
    pub fn new<I, T>(replies: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::from_replies(replies.into_iter().map(AgentReply::new))
    }

    pub fn from_replies(replies: impl IntoIterator<Item = AgentReply>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            calls: Vec::new(),
        }
    }

    /// `(round, conversation length)` for every invocation so far
    pub fn calls(&self) -> &[(u32, usize)] {
        &self.calls
    }

    pub fn remaining(&self) -> usize {
        self.replies.len()
    }
}

impl Agent for ScriptedAgent {
    async fn invoke(&mut self, round: u32, conversation: &Conversation) -> Result<AgentReply> {
        self.calls.push((round, conversation.len()));
        self.replies.pop_front().ok_or_else(|| {
            Error::agent_invocation_failed("script exhausted")
                .with_operation("ScriptedAgent::invoke")
                .with_context("round", round.to_string())
        })
    }
}
