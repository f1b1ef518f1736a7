//! Graph introspection methods

use super::CompiledGraph;
use crate::graph::{Edge, END, START};

impl CompiledGraph {
    /// Node names in registration order
    pub fn node_names(&self) -> Vec<&str> {
        self.plan.graph.node_names().collect()
    }

    /// Outgoing edges of `node` (or `START`) in registration order
    pub fn edges_from(&self, node: &str) -> &[Edge] {
        self.plan.graph.edges_from(node)
    }

    /// Render the plan as a Mermaid flowchart
    ///
    /// Output is deterministic: sources in registration order with `START`
    /// first, edges in registration order, conditional branches sorted by
    /// label.
    ///
    /// ```text
    /// graph TD
    ///     __start__([__start__])
    ///     analyze[analyze]
    ///     __end__([__end__])
    ///     __start__ --> analyze
    ///     analyze -.->|again| analyze
    ///     analyze -.->|done| __end__
    /// ```
    pub fn to_mermaid(&self) -> String {
        let graph = &self.plan.graph;
        let mut out = String::from("graph TD\n");

        out.push_str(&format!("    {}([{}])\n", START, START));
        for name in graph.node_names() {
            if graph.is_terminal(name) {
                out.push_str(&format!("    {}[[{}]]\n", name, name));
            } else {
                out.push_str(&format!("    {}[{}]\n", name, name));
            }
        }
        out.push_str(&format!("    {}([{}])\n", END, END));

        let sources = std::iter::once(START).chain(graph.node_names());
        for from in sources {
            for edge in graph.edges_from(from) {
                match edge {
                    Edge::Direct(to) => {
                        out.push_str(&format!("    {} --> {}\n", from, to));
                    }
                    Edge::Conditional { branches, .. } => {
                        for (label, to) in branches {
                            out.push_str(&format!("    {} -.->|{}| {}\n", from, label, to));
                        }
                    }
                }
            }
        }
        out
    }
}
