//! # ctcbutton Agent
//!
//! Drives the experiment loop:
//! 1. Show the agent the current button state and both histories
//! 2. Parse the `{"action": n}` it ends its reply with
//! 3. Keep the round if the decision agrees with the state it was shown
//! 4. Otherwise roll the exchange back, flip the state, and ask again
//! 5. Repeat until the agent stops, the round budget runs out, or a fatal error
//!
//! The LLM is the subject, the ledger is the record.

mod agent;
mod experiment;

pub use agent::{
    invoke_with_retry, map_provider_error, Agent, AgentReply, ModelSchedule, ProviderAgent,
    RetryPolicy, ScriptedAgent,
};
pub use experiment::{
    CancelHandle, Experiment, ExperimentConfig, ExperimentEvent, RunOutcome, UnparseablePolicy,
};
