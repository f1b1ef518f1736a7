//! StateGraph builder API for constructing stateful workflows
//!
//! [`StateGraph`] is the mutable definition of a graph. Nodes, edges, terminal
//! marks, and interrupt points are registered against a [`StateSchema`];
//! [`compile`](StateGraph::compile) consumes the builder, validates everything
//! at once, and returns an immutable [`CompiledGraph`].
//!
//! Registration never fails. Problems such as a duplicate node name are
//! recorded and reported by `compile()` together with the structural checks,
//! so a single compile error lists every problem in the definition.
//!
//! # Example
//!
//! ```rust
//! use stategraph_core::{AppendReducer, OverwriteReducer, StateGraph, StateSchema, END, START};
//! use serde_json::json;
//!
//! let schema = StateSchema::new()
//!     .with_field_default("iteration", OverwriteReducer, json!(0))
//!     .with_field("log", AppendReducer);
//!
//! let mut graph = StateGraph::new(schema);
//! graph
//!     .add_node("analyze", |state| async move {
//!         let n = state["iteration"].as_i64().unwrap_or(0);
//!         Ok(json!({"iteration": n + 1, "log": ["analyze"]}))
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
//! let compiled = graph.compile().unwrap();
//! assert_eq!(compiled.node_names(), vec!["analyze", "output"]);
//! ```

use crate::compiled::CompiledGraph;
use crate::error::{GraphError, NodeError, Result};
use crate::graph::{node_executor, Graph, NodeExecutor, NodeId, NodeSpec, END, START};
use crate::interrupt::InterruptConfig;
use crate::state::{State, StateSchema};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

/// Mutable graph definition over a fixed state schema
pub struct StateGraph {
    graph: Graph,
    schema: StateSchema,
    interrupts: InterruptConfig,
    /// Registration problems reported at compile time
    errors: Vec<String>,
}

impl StateGraph {
    pub fn new(schema: StateSchema) -> Self {
        Self {
            graph: Graph::new(),
            schema,
            interrupts: InterruptConfig::default(),
            errors: Vec::new(),
        }
    }

    /// Register an async node function
    pub fn add_node<F, Fut>(&mut self, id: impl Into<NodeId>, f: F) -> &mut Self
    where
        F: Fn(State) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, NodeError>> + Send + 'static,
    {
        self.add_node_with_executor(id, node_executor(f))
    }

    pub fn add_node_with_executor(&mut self, id: impl Into<NodeId>, executor: NodeExecutor) -> &mut Self {
        let id = id.into();

        if id.is_empty() {
            self.errors.push("node name cannot be empty".to_string());
            return self;
        }
        if id.starts_with("__") {
            self.errors
                .push(format!("node name '{}' is reserved (names starting with '__')", id));
            return self;
        }

        if !self.graph.add_node(NodeSpec {
            name: id.clone(),
            executor,
        }) {
            self.errors.push(format!("node '{}' added twice", id));
        }
        self
    }

    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        self.graph.add_edge(from.into(), to.into());
        self
    }

    /// Route from `from` by label
    ///
    /// The router sees the state after the step's outputs have been merged and
    /// must return one of the labels in `branches`.
    pub fn add_conditional_edges<R, L, B, K, T>(
        &mut self,
        from: impl Into<NodeId>,
        router: R,
        branches: B,
    ) -> &mut Self
    where
        R: Fn(&State) -> L + Send + Sync + 'static,
        L: Into<String>,
        B: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<NodeId>,
    {
        let from = from.into();
        let mut map = BTreeMap::new();
        for (label, target) in branches {
            let label = label.into();
            if map.insert(label.clone(), target.into()).is_some() {
                self.errors
                    .push(format!("label '{}' of '{}' mapped twice", label, from));
            }
        }
        self.graph
            .add_conditional_edge(from, Arc::new(move |state| router(state).into()), map);
        self
    }

    /// Allow `node` to have no outgoing edge; reaching it ends that path
    pub fn mark_terminal(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.graph.mark_terminal(node.into());
        self
    }

    /// Shorthand for `add_edge(node, END)`
    pub fn add_finish(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.graph.add_edge(node.into(), END.to_string());
        self
    }

    /// Shorthand for `add_edge(START, node)`
    pub fn set_entry(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.graph.add_edge(START.to_string(), node.into());
        self
    }

    pub fn interrupt_before(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.interrupts.extend(InterruptConfig::new().with_interrupt_before(vec![node.into()]));
        self
    }

    pub fn interrupt_after(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.interrupts.extend(InterruptConfig::new().with_interrupt_after(vec![node.into()]));
        self
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Validate the definition and produce an immutable plan
    pub fn compile(self) -> Result<CompiledGraph> {
        let StateGraph {
            graph,
            schema,
            interrupts,
            mut errors,
        } = self;

        if let Err(problems) = graph.validate() {
            errors.extend(problems);
        }

        for node in interrupts.nodes() {
            if !graph.contains_node(node) {
                errors.push(format!("interrupt point '{}' is not a registered node", node));
            }
        }

        if !errors.is_empty() {
            tracing::error!(problems = errors.len(), "Graph definition rejected");
            return Err(GraphError::GraphDefinition(errors.join("; ")));
        }

        tracing::debug!(
            nodes = graph.order.len(),
            interrupts = ?interrupts,
            "Compiled graph"
        );
        Ok(CompiledGraph::new(graph, schema, interrupts))
    }

    /// Compile with additional interrupt points
    pub fn compile_with_interrupts(mut self, interrupt_config: InterruptConfig) -> Result<CompiledGraph> {
        self.interrupts.extend(interrupt_config);
        self.compile()
    }
}
