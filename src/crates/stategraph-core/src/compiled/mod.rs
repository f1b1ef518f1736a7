//! CompiledGraph execution engine for running stateful workflows
//!
//! Once a graph is built with [`StateGraph`](crate::StateGraph) and compiled,
//! it becomes a [`CompiledGraph`]: an immutable plan plus the checkpoint saver
//! its runs persist to. One compiled graph can drive any number of runs, each
//! identified by a thread id.
//!
//! # Execution Modes
//!
//! - [`invoke`](CompiledGraph::invoke) starts a run and waits for it to
//!   complete or suspend.
//! - [`resume`](CompiledGraph::resume) continues a thread from its latest
//!   checkpoint, supplying values for pending interrupts.
//! - [`stream`](CompiledGraph::stream) starts a run in the background and
//!   returns its [`ExecutionEvent`]s as they happen.
//!
//! # Inspection
//!
//! [`get_state`](CompiledGraph::get_state),
//! [`get_state_history`](CompiledGraph::get_state_history), and
//! [`update_state`](CompiledGraph::update_state) read and amend a thread's
//! checkpoints; [`to_mermaid`](CompiledGraph::to_mermaid) renders the plan.

mod types;
mod graph;
mod execution;
mod state;
mod streaming;
mod introspection;
#[cfg(test)]
mod tests;

pub use types::{EventStream, ExecutionEvent, RunConfig, RunOutcome, RunStatus, StateSnapshot};
pub use graph::CompiledGraph;
pub(crate) use graph::Plan;
