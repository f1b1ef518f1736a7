//! Core graph data structures and types
//!
//! [`Graph`] is the registry behind [`StateGraph`](crate::StateGraph): named
//! nodes, their outgoing edges in registration order, and the set of nodes
//! explicitly marked terminal. It is validated once at compile time and then
//! shared read-only by every step and every concurrent run.
//!
//! ```text
//!   __start__
//!       │
//!       ▼
//!   ┌─────────┐   Direct
//!   │ analyze │──────────────┐
//!   └─────────┘              ▼
//!       ▲              ┌──────────┐
//!       │  "again"     │  decide  │
//!       └──────────────┤ (router) │
//!                      └────┬─────┘
//!                           │ "done"
//!                           ▼
//!                       ┌────────┐
//!                       │ output │──▶ __end__
//!                       └────────┘
//! ```
//!
//! Two names are reserved: [`START`], the unique entry, and [`END`], the
//! terminal marker. Node names may not start with `__`.

use crate::error::NodeError;
use crate::state::State;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Node identifier type
pub type NodeId = String;

/// Entry pseudo-node; exactly one edge must leave it
pub const START: &str = "__start__";

/// Terminal pseudo-node; a frontier of only `END` finishes the run
pub const END: &str = "__end__";

/// Future returned by a node function
pub type NodeFuture = Pin<Box<dyn Future<Output = Result<Value, NodeError>> + Send>>;

/// Node function: receives an owned copy of the state, returns a partial update
pub type NodeExecutor = Arc<dyn Fn(State) -> NodeFuture + Send + Sync>;

/// Router function: picks a label from the post-merge state
pub type RouterFn = Arc<dyn Fn(&State) -> String + Send + Sync>;

/// Box a plain async function into a [`NodeExecutor`]
///
/// ```rust
/// use stategraph_core::graph::node_executor;
/// use serde_json::json;
///
/// let analyze = node_executor(|state| async move {
///     let iteration = state["iteration"].as_i64().unwrap_or(0);
///     Ok(json!({"iteration": iteration + 1}))
/// });
/// ```
pub fn node_executor<F, Fut>(f: F) -> NodeExecutor
where
    F: Fn(State) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, NodeError>> + Send + 'static,
{
    Arc::new(move |state| Box::pin(f(state)) as NodeFuture)
}

/// Outgoing edge of a node
#[derive(Clone)]
pub enum Edge {
    /// Target becomes ready unconditionally
    Direct(NodeId),

    /// Exactly one mapped target becomes ready, chosen by the router
    Conditional {
        router: RouterFn,
        /// Label to target; sorted so routing errors and diagrams are stable
        branches: BTreeMap<String, NodeId>,
    },
}

impl Edge {
    /// Every node this edge can make ready
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Direct(target) => vec![target.as_str()],
            Edge::Conditional { branches, .. } => branches.values().map(String::as_str).collect(),
        }
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct(node_id) => f.debug_tuple("Direct").field(node_id).finish(),
            Edge::Conditional { branches, .. } => f
                .debug_struct("Conditional")
                .field("router", &"<function>")
                .field("branches", branches)
                .finish(),
        }
    }
}

/// A registered node
#[derive(Clone)]
pub struct NodeSpec {
    pub name: NodeId,
    pub executor: NodeExecutor,
}

impl std::fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("executor", &"<function>")
            .finish()
    }
}

/// Nodes, edges, and terminal marks
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub(crate) nodes: HashMap<NodeId, NodeSpec>,
    /// Registration order of `nodes`
    pub(crate) order: Vec<NodeId>,
    pub(crate) edges: HashMap<NodeId, Vec<Edge>>,
    pub(crate) terminal: HashSet<NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node; returns `false` if the name is already taken
    pub fn add_node(&mut self, spec: NodeSpec) -> bool {
        if self.nodes.contains_key(&spec.name) {
            return false;
        }
        self.order.push(spec.name.clone());
        self.nodes.insert(spec.name.clone(), spec);
        true
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.edges.entry(from).or_default().push(Edge::Direct(to));
    }

    pub fn add_conditional_edge(
        &mut self,
        from: NodeId,
        router: RouterFn,
        branches: BTreeMap<String, NodeId>,
    ) {
        self.edges
            .entry(from)
            .or_default()
            .push(Edge::Conditional { router, branches });
    }

    pub fn mark_terminal(&mut self, node: NodeId) {
        self.terminal.insert(node);
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.get(name)
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Node names in registration order
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Outgoing edges of `node` in registration order
    pub fn edges_from(&self, node: &str) -> &[Edge] {
        self.edges.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_terminal(&self, node: &str) -> bool {
        self.terminal.contains(node)
    }

    /// Check structural rules, returning every violation found
    ///
    /// # Errors
    ///
    /// - an edge source is neither a registered node nor `START`, or is `END`
    /// - an edge or branch target is neither a registered node nor `END`
    /// - a conditional edge has an empty label map
    /// - not exactly one edge leaves `START`
    /// - a node has no outgoing edge and is not marked terminal
    /// - a terminal mark names an unregistered node
    /// - a node is unreachable from `START`
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        // Sources in a stable order for readable messages
        let mut sources: Vec<&NodeId> = self.edges.keys().collect();
        sources.sort();

        for from in sources {
            if from == END {
                problems.push(format!("edges cannot leave {}", END));
            } else if from != START && !self.nodes.contains_key(from) {
                problems.push(format!("edge source '{}' is not a registered node", from));
            }

            for edge in &self.edges[from] {
                match edge {
                    Edge::Direct(to) => {
                        if to == START {
                            problems.push(format!("edge '{}' -> '{}' targets {}", from, to, START));
                        } else if to != END && !self.nodes.contains_key(to) {
                            problems.push(format!(
                                "edge '{}' -> '{}' targets an unregistered node",
                                from, to
                            ));
                        }
                    }
                    Edge::Conditional { branches, .. } => {
                        if branches.is_empty() {
                            problems.push(format!(
                                "conditional edge from '{}' has an empty label map",
                                from
                            ));
                        }
                        for (label, to) in branches {
                            if to == START || (to != END && !self.nodes.contains_key(to)) {
                                problems.push(format!(
                                    "label '{}' of '{}' targets unregistered node '{}'",
                                    label, from, to
                                ));
                            }
                        }
                    }
                }
            }
        }

        let start_edges = self.edges_from(START).len();
        if start_edges != 1 {
            problems.push(format!(
                "exactly one edge must leave {} (found {})",
                START, start_edges
            ));
        }

        for name in &self.order {
            if self.edges_from(name).is_empty() && !self.terminal.contains(name) {
                problems.push(format!(
                    "node '{}' has no outgoing edge and is not marked terminal",
                    name
                ));
            }
        }

        let mut terminal: Vec<&NodeId> = self.terminal.iter().collect();
        terminal.sort();
        for name in terminal {
            if !self.nodes.contains_key(name) {
                problems.push(format!("terminal mark names unregistered node '{}'", name));
            }
        }

        let reachable = self.reachable_from_start();
        for name in &self.order {
            if !reachable.contains(name.as_str()) {
                problems.push(format!("node '{}' is unreachable from {}", name, START));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    fn reachable_from_start(&self) -> HashSet<&str> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([START]);
        while let Some(node) = queue.pop_front() {
            if !seen.insert(node) {
                continue;
            }
            for edge in self.edges_from(node) {
                queue.extend(edge.targets());
            }
        }
        seen
    }
}
