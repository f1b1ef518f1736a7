//! Error types for graph construction and execution
//!
//! All fallible operations in this crate return [`Result<T>`], an alias for
//! `Result<T, GraphError>`.
//!
//! # Error Categories
//!
//! - **Compile time**: `GraphDefinition`. The graph is invalid and no plan is produced.
//! - **Run time**: `Routing`, `MergeSchema`, `NodeExecution`, `NodeTimeout`. Fatal to
//!   the run, never to the process. The engine reports them wrapped in `RunFailed`,
//!   which adds the thread id, step index, and failing node.
//! - **Cooperative stop**: `Cancelled`. Not a failure of the graph logic.
//! - **Infrastructure**: `Checkpoint`, `Configuration`, `ThreadNotFound`.
//!
//! # Matching run failures
//!
//! ```rust
//! use stategraph_core::GraphError;
//!
//! fn describe(err: &GraphError) -> String {
//!     match err.kind() {
//!         GraphError::Routing { node, label, .. } => {
//!             format!("router of '{}' returned unmapped label '{}'", node, label)
//!         }
//!         GraphError::NodeExecution { node, .. } => format!("node '{}' failed", node),
//!         other => other.to_string(),
//!     }
//! }
//! ```

use crate::state::StateError;
use stategraph_checkpoint::CheckpointError;
use std::time::Duration;
use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Error returned by a node function
pub type NodeError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while building, compiling, or running a graph
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure is invalid
    ///
    /// Raised by `compile()`. Lists every violation found, separated by `; `.
    #[error("Graph definition invalid: {0}")]
    GraphDefinition(String),

    /// A router returned a label absent from its label map
    #[error("Router of node '{node}' returned unmapped label '{label}' (expected one of: {})", .expected.join(", "))]
    Routing {
        node: String,
        label: String,
        expected: Vec<String>,
    },

    /// A node output referenced a field the state schema does not declare
    #[error("Node '{node}' wrote undeclared state field '{field}'")]
    MergeSchema { node: String, field: String },

    /// A node function returned an error
    #[error("Node '{node}' execution failed: {error}")]
    NodeExecution {
        /// Name of the node that failed
        node: String,
        /// Error message from node execution
        error: String,
    },

    /// A node invocation exceeded the configured timeout
    #[error("Node '{node}' timed out after {timeout:?}")]
    NodeTimeout { node: String, timeout: Duration },

    /// The run was cancelled cooperatively before committing `step`
    #[error("Run '{thread_id}' cancelled before committing step {step}")]
    Cancelled { thread_id: String, step: u64 },

    /// A run-time failure, with the context needed to inspect the last good checkpoint
    #[error("Run '{thread_id}' failed at step {step} (node '{node}'): {source}")]
    RunFailed {
        thread_id: String,
        step: u64,
        node: String,
        #[source]
        source: Box<GraphError>,
    },

    /// No checkpoint exists for the thread
    #[error("No checkpoints found for thread '{0}'")]
    ThreadNotFound(String),

    /// State container error outside of a node merge
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Checkpoint persistence failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Invalid engine or run configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl GraphError {
    pub fn node_execution(node: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.to_string(),
        }
    }

    /// Attach run context to a run-time failure
    pub fn run_failed(
        thread_id: impl Into<String>,
        step: u64,
        node: impl Into<String>,
        source: GraphError,
    ) -> Self {
        Self::RunFailed {
            thread_id: thread_id.into(),
            step,
            node: node.into(),
            source: Box::new(source),
        }
    }

    /// The underlying error, looking through `RunFailed`
    pub fn kind(&self) -> &GraphError {
        match self {
            GraphError::RunFailed { source, .. } => source.kind(),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind(), GraphError::Cancelled { .. })
    }

    /// Thread id and step carried by a run-time error
    pub fn run_context(&self) -> Option<(&str, u64)> {
        match self {
            GraphError::RunFailed {
                thread_id, step, ..
            }
            | GraphError::Cancelled { thread_id, step } => Some((thread_id.as_str(), *step)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_error_message() {
        let err = GraphError::Routing {
            node: "decide".to_string(),
            label: "maybe".to_string(),
            expected: vec!["again".to_string(), "done".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Router of node 'decide' returned unmapped label 'maybe' (expected one of: again, done)"
        );
    }

    #[test]
    fn test_run_failed_kind_and_context() {
        let err = GraphError::run_failed(
            "t1",
            4,
            "analyze",
            GraphError::node_execution("analyze", "boom"),
        );

        assert!(matches!(err.kind(), GraphError::NodeExecution { node, .. } if node == "analyze"));
        assert_eq!(err.run_context(), Some(("t1", 4)));
        assert!(err.to_string().contains("step 4"));
        assert!(err.to_string().contains("boom"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_encoding_failure_surfaces_through_checkpoint() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = GraphError::from(CheckpointError::Serialization(json_err));

        assert!(matches!(err, GraphError::Checkpoint(CheckpointError::Serialization(_))));
        assert!(err.to_string().starts_with("Checkpoint error: Serialization error"));
    }

    #[test]
    fn test_cancelled() {
        let err = GraphError::Cancelled {
            thread_id: "t1".to_string(),
            step: 2,
        };
        assert!(err.is_cancelled());
        assert_eq!(err.run_context(), Some(("t1", 2)));
        assert!(!GraphError::Configuration("x".into()).is_cancelled());
    }
}
