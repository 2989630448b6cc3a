//! # Snapshots
//!
//! Side-channel persistence of the experiment. After every accepted or
//! rejected transition (and when the run ends) the loop captures a
//! [`Snapshot`] and hands it to a [`SnapshotSink`].
//!
//! A snapshot is a pure function of the ledger, conversation buffer and
//! transcript: no timestamps, no map iteration order. Writing the same
//! experiment twice yields byte-identical files, which keeps runs replayable.

use crate::conversation::Turn;
use crate::error::{self, Result};
use crate::ledger::{ActionEntry, HistoryLedger, StateEntry};
use crate::state::DeviceState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How a single attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted,
    Rejected { corrective: DeviceState },
    Stopped,
    Unparseable,
}

/// One agent exchange, kept even when the buffer later drops it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub round: u32,
    /// 1-based attempt number within the round
    pub attempt: u32,
    pub shown_state: DeviceState,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub reply: String,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// What caused a snapshot to be taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotTrigger {
    Accepted,
    Rejected,
    /// An unparseable exchange was dropped and the round will be asked again
    Discarded,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub trigger: SnapshotTrigger,
    pub round: u32,
    pub current_state: DeviceState,
    pub state_history: Vec<StateEntry>,
    pub action_history: Vec<ActionEntry>,
    pub conversation: Vec<Turn>,
    pub transcript: Vec<TranscriptEntry>,
}

impl Snapshot {
    pub fn capture(
        trigger: SnapshotTrigger,
        round: u32,
        ledger: &HistoryLedger,
        conversation: &[Turn],
        transcript: &[TranscriptEntry],
    ) -> Self {
        Self {
            trigger,
            round,
            current_state: ledger.current_state(),
            state_history: ledger.states().to_vec(),
            action_history: ledger.actions().to_vec(),
            conversation: conversation.to_vec(),
            transcript: transcript.to_vec(),
        }
    }

    /// Rebuild the ledger this snapshot was taken from
    pub fn ledger(&self) -> Result<HistoryLedger> {
        HistoryLedger::from_parts(self.state_history.clone(), self.action_history.clone())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| error::serialization_error(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            error::serialization_error(format!("invalid snapshot: {}", e))
                .with_operation("snapshot::from_json")
        })
    }

    /// Load an `experiment.json` written by [`FileSink`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| crate::error::Error::from(e).with_context("path", path.display().to_string()))?;
        Self::from_json(&text)
    }
}

/// Destination for snapshots
pub trait SnapshotSink: Send {
    fn record(&mut self, snapshot: &Snapshot) -> Result<()>;
}

/// Keeps every snapshot in memory (useful for testing)
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    snapshots: Vec<Snapshot>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }
}

impl SnapshotSink for MemorySink {
    fn record(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }
}

/// Overwrites `experiment.json` and `messages.json` in a directory
pub struct FileSink {
    base_path: PathBuf,
}

impl FileSink {
    pub const EXPERIMENT_FILE: &'static str = "experiment.json";
    pub const MESSAGES_FILE: &'static str = "messages.json";

    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)
            .map_err(|e| error::io_error(format!("Failed to create log dir: {}", e)))?;
        Ok(Self { base_path })
    }

    pub fn experiment_path(&self) -> PathBuf {
        self.base_path.join(Self::EXPERIMENT_FILE)
    }

    pub fn messages_path(&self) -> PathBuf {
        self.base_path.join(Self::MESSAGES_FILE)
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        std::fs::write(path, content)
            .map_err(|e| error::io_error(format!("Failed to write {}: {}", path.display(), e)))
    }
}

impl SnapshotSink for FileSink {
    fn record(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.write(&self.experiment_path(), &snapshot.to_json()?)?;

        let messages = serde_json::to_string_pretty(&snapshot.conversation)
            .map_err(|e| error::serialization_error(e.to_string()))?;
        self.write(&self.messages_path(), &messages)
    }
}

impl<S: SnapshotSink + ?Sized> SnapshotSink for Box<S> {
    fn record(&mut self, snapshot: &Snapshot) -> Result<()> {
        (**self).record(snapshot)
    }
}
