//! Experiment orchestrator - the round loop with rollback

use crate::agent::{invoke_with_retry, Agent, RetryPolicy};
use ctcbutton_core::{
    check, parse_action, round_prompt, Action, AttemptOutcome, Conversation, Decision, DeviceState,
    HistoryLedger, Snapshot, SnapshotSink, SnapshotTrigger, StateSampler, TranscriptEntry, Verdict,
};
use ctcbutton_error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What to do with a reply that carries no recognisable action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnparseablePolicy {
    /// End the run with `RunOutcome::ParseFailure`
    #[default]
    Stop,
    /// Drop the exchange and ask the same round again
    Retry,
}

/// Configuration for an experiment run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Accepted rounds before the run ends on its own
    pub max_rounds: u32,
    /// State shown at round 0
    pub initial_state: DeviceState,
    /// Attempts (rejections included) allowed for a single round
    pub max_attempts_per_round: u32,
    pub on_unparseable: UnparseablePolicy,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            max_rounds: 16,
            initial_state: DeviceState::On,
            max_attempts_per_round: 8,
            on_unparseable: UnparseablePolicy::Stop,
        }
    }
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts_per_round == 0 {
            return Err(Error::config_invalid("max_attempts_per_round must be at least 1")
                .with_operation("ExperimentConfig::validate"));
        }
        Ok(())
    }
}

/// Why a run ended without a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The agent emitted `{"action": -1}`
    Stopped { round: u32 },
    /// The agent's reply had no action and the policy is `Stop`
    ParseFailure { round: u32 },
    /// `max_rounds` rounds were accepted
    RoundBudgetExhausted { rounds: u32 },
    /// The cancel handle fired; observed between rounds
    Cancelled { round: u32 },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Stopped { round } => write!(f, "agent stopped at round {}", round),
            RunOutcome::ParseFailure { round } => write!(f, "unparseable reply at round {}", round),
            RunOutcome::RoundBudgetExhausted { rounds } => {
                write!(f, "round budget exhausted after {} rounds", rounds)
            }
            RunOutcome::Cancelled { round } => write!(f, "cancelled at round {}", round),
        }
    }
}

/// Progress notifications, delivered to the observer and to `tracing`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExperimentEvent {
    RoundStarted {
        round: u32,
        attempt: u32,
        shown: DeviceState,
    },
    AgentReplied {
        round: u32,
        attempt: u32,
        reply: String,
    },
    Accepted {
        round: u32,
        decision: Decision,
        next_state: DeviceState,
    },
    Violation {
        round: u32,
        shown: DeviceState,
        declared: Decision,
        corrective: DeviceState,
    },
    Unparseable {
        round: u32,
        attempt: u32,
    },
    Stopped {
        round: u32,
    },
    Finished {
        outcome: RunOutcome,
    },
}

/// Cooperative cancellation, honored once the current round resolves
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type Observer = Box<dyn FnMut(&ExperimentEvent) + Send>;

/// The experiment: owns the ledger, the buffer and the round counter.
///
/// Every attempt pushes one `(user, agent)` exchange. A rejected attempt
/// pops it again and flips the current state, so the buffer and the ledger
/// only ever describe consistent rounds.
pub struct Experiment<A, S> {
    config: ExperimentConfig,
    agent: A,
    sampler: S,
    retry: RetryPolicy,
    ledger: HistoryLedger,
    conversation: Conversation,
    round: u32,
    attempts_this_round: u32,
    transcript: Vec<TranscriptEntry>,
    sink: Option<Box<dyn SnapshotSink>>,
    observer: Option<Observer>,
    cancel: CancelHandle,
}

impl<A: Agent, S: StateSampler> Experiment<A, S> {
    pub fn new(config: ExperimentConfig, agent: A, sampler: S) -> Result<Self> {
        config.validate()?;
        let ledger = HistoryLedger::new(config.initial_state);
        Ok(Self {
            config,
            agent,
            sampler,
            retry: RetryPolicy::default(),
            ledger,
            conversation: Conversation::new(),
            round: 0,
            attempts_this_round: 0,
            transcript: Vec::new(),
            sink: None,
            observer: None,
            cancel: CancelHandle::new(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sink(mut self, sink: impl SnapshotSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Set a callback for progress events
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&ExperimentEvent) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    /// Run attempts until the agent stops, the budget runs out, or an error.
    ///
    /// On error the ledger, buffer and transcript are left as they were at
    /// the failure point.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let outcome = loop {
            // A rejected or dropped attempt leaves the round open; finish it first.
            if self.attempts_this_round == 0 && self.cancel.is_cancelled() {
                break RunOutcome::Cancelled { round: self.round };
            }
            if self.round >= self.config.max_rounds {
                break RunOutcome::RoundBudgetExhausted { rounds: self.round };
            }

            match self.run_attempt().await {
                Ok(AttemptOutcome::Stopped) => break RunOutcome::Stopped { round: self.round },
                Ok(AttemptOutcome::Unparseable) if self.config.on_unparseable == UnparseablePolicy::Stop => {
                    break RunOutcome::ParseFailure { round: self.round };
                }
                Ok(_) => {}
                Err(err) => {
                    error!(round = self.round, error = %err, "experiment aborted");
                    self.persist(SnapshotTrigger::Finished);
                    return Err(err);
                }
            }
        };

        self.emit(ExperimentEvent::Finished { outcome });
        self.persist(SnapshotTrigger::Finished);
        Ok(outcome)
    }

    /// One prompt/reply exchange for the current round.
    pub async fn run_attempt(&mut self) -> Result<AttemptOutcome> {
        let round = self.round;
        if self.attempts_this_round >= self.config.max_attempts_per_round {
            return Err(Error::retry_budget_exceeded(round, self.attempts_this_round)
                .with_operation("Experiment::run_attempt"));
        }
        self.attempts_this_round += 1;
        let attempt = self.attempts_this_round;

        let shown = self.ledger.current_state();
        self.emit(ExperimentEvent::RoundStarted { round, attempt, shown });

        let prompt = round_prompt(round, &self.ledger);
        debug!(round, attempt, prompt_len = prompt.len(), buffer_len = self.conversation.len(), "prompting agent");
        self.conversation.push_user(prompt.clone());

        let reply = invoke_with_retry(&mut self.agent, &self.retry, round, &self.conversation).await?;
        self.conversation.push_agent(reply.content.clone());
        self.emit(ExperimentEvent::AgentReplied {
            round,
            attempt,
            reply: reply.content.clone(),
        });

        let action = parse_action(&reply.content);
        let outcome = match action {
            Action::Stop => AttemptOutcome::Stopped,
            Action::Unparseable => AttemptOutcome::Unparseable,
            Action::Decision(declared) => match check(shown, declared) {
                Verdict::Accept => AttemptOutcome::Accepted,
                Verdict::Reject { corrective } => AttemptOutcome::Rejected { corrective },
            },
        };

        self.transcript.push(TranscriptEntry {
            round,
            attempt,
            shown_state: shown,
            prompt,
            reasoning: reply.reasoning,
            reply: reply.content,
            outcome,
        });

        match (action, outcome) {
            (Action::Decision(declared), AttemptOutcome::Accepted) => self.accept(round, declared)?,
            (Action::Decision(declared), AttemptOutcome::Rejected { corrective }) => {
                self.reject(round, shown, declared, corrective)?
            }
            (Action::Stop, _) => self.emit(ExperimentEvent::Stopped { round }),
            _ => {
                self.emit(ExperimentEvent::Unparseable { round, attempt });
                if self.config.on_unparseable == UnparseablePolicy::Retry {
                    self.conversation.rollback_exchange()?;
                    self.persist(SnapshotTrigger::Discarded);
                }
            }
        }

        Ok(outcome)
    }

    fn accept(&mut self, round: u32, decision: Decision) -> Result<()> {
        self.ledger.record_accepted_action(round, decision)?;
        self.round += 1;
        self.attempts_this_round = 0;

        let next_state = self.sampler.sample();
        self.ledger.record_next_state(self.round, next_state)?;

        self.emit(ExperimentEvent::Accepted {
            round,
            decision,
            next_state,
        });
        self.persist(SnapshotTrigger::Accepted);
        Ok(())
    }

    fn reject(&mut self, round: u32, shown: DeviceState, declared: Decision, corrective: DeviceState) -> Result<()> {
        self.emit(ExperimentEvent::Violation {
            round,
            shown,
            declared,
            corrective,
        });
        self.conversation.rollback_exchange()?;
        self.ledger.replace_current_state(corrective)?;
        self.persist(SnapshotTrigger::Rejected);
        Ok(())
    }

    fn emit(&mut self, event: ExperimentEvent) {
        match &event {
            ExperimentEvent::RoundStarted { round, attempt, shown } => {
                info!(round, attempt, shown = %shown, "round started");
            }
            ExperimentEvent::AgentReplied { round, attempt, reply } => {
                debug!(round, attempt, reply_len = reply.len(), "agent replied");
            }
            ExperimentEvent::Accepted {
                round,
                decision,
                next_state,
            } => {
                info!(round, decision = %decision, next_state = %next_state, "round accepted");
            }
            ExperimentEvent::Violation {
                round,
                shown,
                declared,
                corrective,
            } => {
                warn!(round, shown = %shown, declared = %declared, corrective = %corrective, "causal violation, rolling back");
            }
            ExperimentEvent::Unparseable { round, attempt } => {
                warn!(round, attempt, policy = ?self.config.on_unparseable, "reply has no action");
            }
            ExperimentEvent::Stopped { round } => {
                info!(round, "agent ended the experiment");
            }
            ExperimentEvent::Finished { outcome } => {
                info!(outcome = %outcome, timeline = %self.ledger.timeline(), "experiment finished");
            }
        }

        if let Some(observer) = self.observer.as_mut() {
            observer(&event);
        }
    }

    fn persist(&mut self, trigger: SnapshotTrigger) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let snapshot = Snapshot::capture(
            trigger,
            self.round,
            &self.ledger,
            self.conversation.turns(),
            &self.transcript,
        );
        if let Err(err) = sink.record(&snapshot) {
            warn!(round = self.round, error = %err, "snapshot sink failed");
        }
    }
}
