//! # stategraph-core - Stateful graph execution
//!
//! A small workflow runtime that threads a schema-checked state object
//! through named async steps (nodes) connected by static and conditional
//! edges. Graphs may contain cycles, every step boundary is checkpointed, and
//! a run can suspend at designated nodes and be resumed later by the caller,
//! in the same process or another one.
//!
//! ## Core Concepts
//!
//! ### 1. State
//!
//! [`State`] is a JSON object whose fields are declared up front in a
//! [`StateSchema`]. Each field has a [`Reducer`] deciding how a node's partial
//! output combines with the current value: [`OverwriteReducer`] replaces it,
//! [`AppendReducer`] concatenates sequences. Writing an undeclared field fails
//! the run instead of being dropped.
//!
//! ### 2. Graph definition
//!
//! [`StateGraph`] registers nodes and edges. [`StateGraph::compile`] checks the
//! whole definition at once (unknown targets, missing entry edge, dead ends,
//! unreachable nodes) and returns an immutable [`CompiledGraph`].
//!
//! ### 3. Execution
//!
//! Runs proceed in steps. Each step executes the ready nodes (concurrently by
//! default), merges their outputs in a fixed order, follows edges on the
//! merged state, and commits one checkpoint. Routers see the state *after*
//! the step's merge.
//!
//! ### 4. Checkpoints and interrupts
//!
//! Checkpoints go to a [`CheckpointSaver`]: [`InMemoryCheckpointSaver`] by
//! default, or [`SqliteCheckpointSaver`] for runs that must survive the
//! process. [`InterruptConfig`] names nodes to suspend before or after; the
//! caller continues with [`CompiledGraph::resume`] and a [`ResumeValue`].
//!
//! ## Quick Start
//!
//! ```rust
//! use stategraph_core::{AppendReducer, OverwriteReducer, StateGraph, StateSchema, END, START};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> stategraph_core::Result<()> {
//! let schema = StateSchema::new()
//!     .with_field_default("iteration", OverwriteReducer, json!(0))
//!     .with_field("log", AppendReducer);
//!
//! let mut graph = StateGraph::new(schema);
//! graph
//!     .add_node("analyze", |state| async move {
//!         let iteration = state["iteration"].as_i64().unwrap_or(0);
//!         Ok(json!({"iteration": iteration + 1, "log": ["analyze"]}))
//!     })
//!     .add_node("output", |_state| async move { Ok(json!({})) })
//!     .add_edge(START, "analyze")
//!     .add_conditional_edges(
//!         "analyze",
//!         |state| if state["iteration"].as_i64() < Some(2) { "again" } else { "done" },
//!         [("again", "analyze"), ("done", "output")],
//!     )
//!     .add_edge("output", END);
//!
//! let outcome = graph.compile()?.invoke(json!({}), "thread-1").await?;
//! assert!(outcome.is_completed());
//! assert_eq!(outcome.state["iteration"], json!(2));
//! assert_eq!(outcome.state["log"], json!(["analyze", "analyze"]));
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! The crate emits `tracing` events (run start and finish, step commits,
//! interrupts, cancellations, failures) and installs no subscriber.

pub mod builder;
pub mod compiled;
pub mod config;
pub mod error;
pub mod graph;
pub mod interrupt;
mod pregel;
pub mod state;

pub use builder::StateGraph;
pub use compiled::{
    CompiledGraph, EventStream, ExecutionEvent, RunConfig, RunOutcome, RunStatus, StateSnapshot,
};
pub use config::{EngineConfig, DEFAULT_ENV_PREFIX};
pub use error::{GraphError, NodeError, Result};
pub use graph::{node_executor, Edge, NodeId, END, START};
pub use interrupt::{InterruptConfig, InterruptWhen, PendingInterrupt, ResumeValue};
pub use state::{AppendReducer, OverwriteReducer, Reducer, State, StateError, StateSchema};

pub use stategraph_checkpoint::{
    Checkpoint, CheckpointError, CheckpointMetadata, CheckpointSaver, CheckpointSource,
    CheckpointStatus, InMemoryCheckpointSaver,
};
#[cfg(feature = "sqlite")]
pub use stategraph_checkpoint::SqliteCheckpointSaver;
pub use tokio_util::sync::CancellationToken;
