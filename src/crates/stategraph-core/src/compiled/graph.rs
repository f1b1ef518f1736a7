//! CompiledGraph struct and builder methods

use crate::config::EngineConfig;
use crate::graph::Graph;
use crate::interrupt::InterruptConfig;
use crate::state::StateSchema;
use stategraph_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver};
use std::sync::Arc;

/// Immutable result of compilation, shared by every run
#[derive(Debug)]
pub(crate) struct Plan {
    pub graph: Graph,
    pub schema: StateSchema,
    pub interrupts: InterruptConfig,
}

/// Compiled graph ready for execution
///
/// Cloning is cheap: the plan and the checkpoint saver are shared, so clones
/// can drive independent runs (distinct thread ids) concurrently.
#[derive(Clone)]
pub struct CompiledGraph {
    pub(crate) plan: Arc<Plan>,
    pub(crate) saver: Arc<dyn CheckpointSaver>,
    pub(crate) config: EngineConfig,
}

impl CompiledGraph {
    /// Each compiled graph starts with its own in-memory saver
    pub(crate) fn new(graph: Graph, schema: StateSchema, interrupts: InterruptConfig) -> Self {
        Self {
            plan: Arc::new(Plan {
                graph,
                schema,
                interrupts,
            }),
            saver: Arc::new(InMemoryCheckpointSaver::new()),
            config: EngineConfig::default(),
        }
    }

    /// Set the checkpoint saver
    pub fn with_checkpointer(mut self, saver: Arc<dyn CheckpointSaver>) -> Self {
        self.saver = saver;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn checkpointer(&self) -> Arc<dyn CheckpointSaver> {
        self.saver.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn interrupt_config(&self) -> &InterruptConfig {
        &self.plan.interrupts
    }

    pub fn schema(&self) -> &StateSchema {
        &self.plan.schema
    }

    /// Get a reference to the underlying graph
    pub fn graph(&self) -> &Graph {
        &self.plan.graph
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("plan", &self.plan)
            .field("saver", &"<dyn CheckpointSaver>")
            .field("config", &self.config)
            .finish()
    }
}
