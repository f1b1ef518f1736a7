//! Types returned and consumed by [`CompiledGraph`](super::CompiledGraph)

use crate::graph::NodeId;
use crate::interrupt::PendingInterrupt;
use crate::state::State;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stategraph_checkpoint::{Checkpoint, CheckpointMetadata, CheckpointStatus};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Per-call settings for a run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Thread whose checkpoints this run reads and appends to
    pub thread_id: String,

    /// Checked before each step and again after its nodes return
    pub cancel: CancellationToken,
}

impl RunConfig {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// How a run that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The frontier emptied or reached only `END`
    Completed,
    /// Suspended at one or more interrupt points
    Interrupted,
}

/// Result of `invoke` or `resume`
///
/// Failures are reported as `Err(GraphError::RunFailed { .. })` instead.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub thread_id: String,
    pub status: RunStatus,
    pub state: State,
    /// Step index of the last committed checkpoint
    pub step: u64,
    /// Interrupts awaiting a resume value; empty when completed
    pub pending_interrupts: Vec<PendingInterrupt>,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn is_interrupted(&self) -> bool {
        self.status == RunStatus::Interrupted
    }

    /// Outcome reported by a committed checkpoint
    pub(crate) fn new(checkpoint: &Checkpoint, status: RunStatus) -> Self {
        Self {
            thread_id: checkpoint.thread_id.clone(),
            status,
            state: checkpoint.state.clone(),
            step: checkpoint.step,
            pending_interrupts: checkpoint.pending_interrupts.clone(),
        }
    }
}

/// Events emitted by [`CompiledGraph::stream`](super::CompiledGraph::stream)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// A node is about to run as part of `step`
    NodeStart { node: NodeId, step: u64 },

    /// A node returned its partial update
    NodeEnd {
        node: NodeId,
        step: u64,
        output: Value,
    },

    /// A checkpoint was persisted
    StepCommitted {
        step: u64,
        frontier: Vec<NodeId>,
        status: CheckpointStatus,
    },

    /// The run suspended at interrupt points
    Interrupted {
        step: u64,
        pending: Vec<PendingInterrupt>,
        state: State,
    },

    /// The run finished
    Complete { final_state: State },

    /// The run failed or was cancelled; always the last event
    Error { error: String },
}

impl ExecutionEvent {
    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionEvent::Interrupted { .. }
                | ExecutionEvent::Complete { .. }
                | ExecutionEvent::Error { .. }
        )
    }
}

/// Async stream of execution events
pub type EventStream = Pin<Box<dyn Stream<Item = ExecutionEvent> + Send>>;

/// Read-only view of one checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub thread_id: String,
    pub step: u64,
    pub values: State,
    /// Nodes that run next; empty or only `END` once the run completed
    pub next: Vec<NodeId>,
    pub status: CheckpointStatus,
    pub pending_interrupts: Vec<PendingInterrupt>,
    pub metadata: CheckpointMetadata,
    pub created_at: DateTime<Utc>,
}

impl From<Checkpoint> for StateSnapshot {
    fn from(checkpoint: Checkpoint) -> Self {
        Self {
            thread_id: checkpoint.thread_id,
            step: checkpoint.step,
            values: checkpoint.state,
            next: checkpoint.frontier,
            status: checkpoint.status,
            pending_interrupts: checkpoint.pending_interrupts,
            metadata: checkpoint.metadata,
            created_at: checkpoint.created_at,
        }
    }
}
