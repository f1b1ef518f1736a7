//! Core checkpoint data structures for state persistence and resumption
//!
//! A [`Checkpoint`] is the record committed after every step of a run: the
//! thread it belongs to, the step index, the full state, the frontier of nodes
//! ready to run next, and the run status at that boundary.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Checkpoint                                  │
//! │  • thread_id: "review-42"                    │
//! │  • step: 3                                   │
//! │  • state: { "iteration": 2, "log": [...] }   │
//! │  • frontier: ["decide"]                      │
//! │  • status: running                           │
//! │  • pending_interrupts: []                    │
//! │  • metadata: { source: loop,                 │
//! │                writes: ["analyze"] }         │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Checkpoints are immutable once saved. A thread accumulates a history of
//! checkpoints with strictly increasing step indices; savers expose the latest
//! one and the one at a given step.
//!
//! # Serialization
//!
//! All types implement `Serialize`/`Deserialize`. The persistence record is the
//! JSON form of [`Checkpoint`]:
//!
//! ```rust
//! use stategraph_checkpoint::{Checkpoint, CheckpointStatus};
//! use serde_json::{json, Map};
//!
//! let mut state = Map::new();
//! state.insert("count".to_string(), json!(1));
//!
//! let checkpoint = Checkpoint::new("thread-1", 0, state, vec!["__start__".to_string()]);
//! let encoded = serde_json::to_string(&checkpoint).unwrap();
//! let decoded: Checkpoint = serde_json::from_str(&encoded).unwrap();
//!
//! assert_eq!(decoded.status, CheckpointStatus::Running);
//! assert_eq!(decoded.frontier, vec!["__start__".to_string()]);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier of a single checkpoint record
pub type CheckpointId = String;

/// Field map persisted with each checkpoint
pub type StateValues = serde_json::Map<String, serde_json::Value>;

/// Run status recorded at a step boundary
///
/// Failed and cancelled runs never commit the step that failed, so those
/// statuses are not persisted; the last record of such a run stays `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// More steps remain; resume continues from the frontier
    Running,
    /// Suspended at an interrupt point until the caller supplies a value
    AwaitingInterrupt,
    /// Frontier reached `END`
    Completed,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Running => "running",
            CheckpointStatus::AwaitingInterrupt => "awaiting_interrupt",
            CheckpointStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckpointStatus::Completed)
    }
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckpointStatus {
    type Err = crate::CheckpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(CheckpointStatus::Running),
            "awaiting_interrupt" => Ok(CheckpointStatus::AwaitingInterrupt),
            "completed" => Ok(CheckpointStatus::Completed),
            other => Err(crate::CheckpointError::Invalid(format!(
                "unknown checkpoint status '{}'",
                other
            ))),
        }
    }
}

/// Whether an interrupt fires before a node runs or after it has run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptWhen {
    Before,
    After,
}

/// An interrupt point the run is waiting on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    pub node: String,
    pub when: InterruptWhen,
}

impl PendingInterrupt {
    pub fn before(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            when: InterruptWhen::Before,
        }
    }

    pub fn after(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            when: InterruptWhen::After,
        }
    }
}

/// How a checkpoint came to be written
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Initial state of a run, frontier `{START}`
    Input,
    /// Commit of an executed step
    Loop,
    /// Manual state update applied outside the step loop
    Update,
}

/// Descriptive data attached to a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CheckpointMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// Nodes whose outputs were merged by this commit, in merge order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub writes: Vec<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_writes(mut self, writes: Vec<String>) -> Self {
        self.writes = writes;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Immutable snapshot of a run at a step boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub id: CheckpointId,

    pub thread_id: String,

    /// Monotonic within a thread
    pub step: u64,

    pub state: StateValues,

    /// Nodes ready to run next, in the order they became ready
    pub frontier: Vec<String>,

    pub status: CheckpointStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_interrupts: Vec<PendingInterrupt>,

    #[serde(default)]
    pub metadata: CheckpointMetadata,

    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Create a `Running` checkpoint with empty metadata
    pub fn new(
        thread_id: impl Into<String>,
        step: u64,
        state: StateValues,
        frontier: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            step,
            state,
            frontier,
            status: CheckpointStatus::Running,
            pending_interrupts: Vec::new(),
            metadata: CheckpointMetadata::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: CheckpointStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_pending_interrupts(mut self, pending: Vec<PendingInterrupt>) -> Self {
        self.pending_interrupts = pending;
        self
    }

    pub fn with_metadata(mut self, metadata: CheckpointMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_awaiting_interrupt(&self) -> bool {
        self.status == CheckpointStatus::AwaitingInterrupt
    }

    /// Compare everything except the record identity (`id`, `created_at`)
    ///
    /// Two runs of the same plan over the same input commit checkpoints that
    /// are equal under this comparison.
    pub fn same_content(&self, other: &Checkpoint) -> bool {
        self.thread_id == other.thread_id
            && self.step == other.step
            && self.state == other.state
            && self.frontier == other.frontier
            && self.status == other.status
            && self.pending_interrupts == other.pending_interrupts
            && self.metadata == other.metadata
    }
}
