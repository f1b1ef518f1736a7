//! Human-in-the-loop interrupts
//!
//! An interrupt point suspends a run so the caller can decide what happens
//! next, without the engine ever blocking on external I/O.
//!
//! - **Before** `node`: the run stops when `node` becomes ready. The node is
//!   not invoked. On resume, the supplied value stands in for its output: it is
//!   merged through the field reducers and the node's edges are resolved as if
//!   it had run.
//! - **After** `node`: the run stops once the step that executed `node` has
//!   committed. On resume, the supplied value is merged into state before the
//!   next step runs.
//!
//! Either way the suspended checkpoint has status `awaiting_interrupt` and
//! lists its [`PendingInterrupt`]s. Resuming without a value for each of them
//! leaves the run suspended; nothing is retried on its own.
//!
//! ```rust
//! use stategraph_core::{InterruptConfig, ResumeValue};
//! use serde_json::json;
//!
//! let config = InterruptConfig::new()
//!     .with_interrupt_before(vec!["request_approval".to_string()]);
//! assert!(config.should_interrupt_before("request_approval"));
//!
//! let resume = ResumeValue::from(json!({"approved": true}));
//! assert!(resume.value_for("request_approval").is_some());
//! ```

use crate::graph::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub use stategraph_checkpoint::{InterruptWhen, PendingInterrupt};

/// Nodes to suspend before or after
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptConfig {
    #[serde(default)]
    pub interrupt_before: Vec<NodeId>,

    #[serde(default)]
    pub interrupt_after: Vec<NodeId>,
}

impl InterruptConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interrupt_before(mut self, nodes: Vec<NodeId>) -> Self {
        self.interrupt_before = nodes;
        self
    }

    pub fn with_interrupt_after(mut self, nodes: Vec<NodeId>) -> Self {
        self.interrupt_after = nodes;
        self
    }

    pub fn should_interrupt_before(&self, node: &str) -> bool {
        self.interrupt_before.iter().any(|n| n == node)
    }

    pub fn should_interrupt_after(&self, node: &str) -> bool {
        self.interrupt_after.iter().any(|n| n == node)
    }

    pub fn is_empty(&self) -> bool {
        self.interrupt_before.is_empty() && self.interrupt_after.is_empty()
    }

    /// Add the other config's points, skipping ones already present
    pub fn extend(&mut self, other: InterruptConfig) {
        for node in other.interrupt_before {
            if !self.should_interrupt_before(&node) {
                self.interrupt_before.push(node);
            }
        }
        for node in other.interrupt_after {
            if !self.should_interrupt_after(&node) {
                self.interrupt_after.push(node);
            }
        }
    }

    /// Every node named by this config
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.interrupt_before
            .iter()
            .chain(self.interrupt_after.iter())
            .map(String::as_str)
    }

    /// Interrupts raised by committing a step
    ///
    /// `executed` are the nodes whose outputs the step merged; `next` is the
    /// frontier being committed. After-points come first, in execution order,
    /// then before-points in frontier order.
    pub fn pending_for(&self, executed: &[NodeId], next: &[NodeId]) -> Vec<PendingInterrupt> {
        let after = executed
            .iter()
            .filter(|node| self.should_interrupt_after(node))
            .map(PendingInterrupt::after);
        let before = next
            .iter()
            .filter(|node| self.should_interrupt_before(node))
            .map(PendingInterrupt::before);
        after.chain(before).collect()
    }
}

/// Value supplied by the caller to continue a suspended run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeValue {
    /// One value for every pending interrupt
    Single(Value),
    /// Values keyed by interrupted node name
    ByNode(HashMap<NodeId, Value>),
}

impl ResumeValue {
    pub fn value_for(&self, node: &str) -> Option<&Value> {
        match self {
            ResumeValue::Single(value) => Some(value),
            ResumeValue::ByNode(map) => map.get(node),
        }
    }

    /// Pair each pending interrupt with its value, or `None` if any is missing
    pub fn resolve(&self, pending: &[PendingInterrupt]) -> Option<Vec<(PendingInterrupt, Value)>> {
        pending
            .iter()
            .map(|p| self.value_for(&p.node).map(|v| (p.clone(), v.clone())))
            .collect()
    }
}

impl From<Value> for ResumeValue {
    fn from(value: Value) -> Self {
        ResumeValue::Single(value)
    }
}

impl From<HashMap<NodeId, Value>> for ResumeValue {
    fn from(map: HashMap<NodeId, Value>) -> Self {
        ResumeValue::ByNode(map)
    }
}
