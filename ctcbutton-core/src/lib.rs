//! # ctcbutton core
//!
//! Building blocks for the causal-loop button experiment: a language model
//! is shown a lit or unlit button, decides whether to press it, and the
//! loop only keeps rounds where the button's prior state agrees with the
//! decision that followed.
//!
//! ## Core Concepts
//! - **Ledger**: paired state/action history, with rollback of the newest state
//! - **Checker**: accept or reject a decision against the shown state
//! - **Parser**: extract `{"action": n}` from free-form replies
//! - **Sampler**: source of fresh button states
//! - **Conversation**: the user/agent buffer, kept in lock-step with the ledger
//! - **Snapshot**: side-channel persistence of every transition
//! - **Provider**: OpenAI-compatible chat completion transport

pub mod checker;
pub mod conversation;
pub mod error;
pub mod ledger;
pub mod parser;
pub mod prompt;
pub mod provider;
pub mod sampler;
pub mod snapshot;
pub mod state;

pub use checker::{check, Verdict};
pub use conversation::{Conversation, Speaker, Turn};
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use ledger::{ActionEntry, HistoryLedger, StateEntry};
pub use parser::{parse_action, parse_action_detailed, MatchPass};
pub use prompt::{round_prompt, INTRODUCTION};
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, OpenAIProvider,
    ProviderConfig, ProviderError, Role, Usage, UsageTracker,
};
pub use sampler::{FixedSampler, ScriptedSampler, StateSampler, UniformSampler};
pub use snapshot::{
    AttemptOutcome, FileSink, MemorySink, Snapshot, SnapshotSink, SnapshotTrigger, TranscriptEntry,
};
pub use state::{Action, Decision, DeviceState};
