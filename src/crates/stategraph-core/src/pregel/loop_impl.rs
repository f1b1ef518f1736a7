//! The step loop
//!
//! A [`StepLoop`] owns one run's working copy of the state and frontier. Each
//! iteration executes the frontier, merges the outputs in frontier order,
//! resolves edges on the merged state, and commits exactly one checkpoint.
//! Nothing reaches the checkpoint store for a step that fails or is
//! cancelled, so the latest checkpoint is always a consistent resume point.

use super::algo::{self, NodeFailure};
use crate::compiled::{ExecutionEvent, Plan, RunConfig, RunOutcome, RunStatus};
use crate::config::EngineConfig;
use crate::error::{GraphError, Result};
use crate::graph::{NodeId, NodeSpec, END, START};
use crate::interrupt::{InterruptWhen, PendingInterrupt};
use crate::state::State;
use futures::future::join_all;
use serde_json::Value;
use stategraph_checkpoint::{
    Checkpoint, CheckpointMetadata, CheckpointSaver, CheckpointSource, CheckpointStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(crate) struct StepLoop {
    plan: Arc<Plan>,
    saver: Arc<dyn CheckpointSaver>,
    config: EngineConfig,
    thread_id: String,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<ExecutionEvent>>,

    state: State,
    frontier: Vec<NodeId>,
    /// Index the next commit will use
    step: u64,

    /// Resume values standing in for the output of interrupted-before nodes
    injected: HashMap<NodeId, Value>,
    /// Nodes whose resume values were merged but not yet committed
    resumed: Vec<NodeId>,
    /// Commit the starting state before the first step
    input_pending: bool,
}

impl StepLoop {
    pub fn new(
        plan: Arc<Plan>,
        saver: Arc<dyn CheckpointSaver>,
        config: EngineConfig,
        run: &RunConfig,
        state: State,
        frontier: Vec<NodeId>,
        step: u64,
    ) -> Self {
        Self {
            plan,
            saver,
            config,
            thread_id: run.thread_id.clone(),
            cancel: run.cancel.clone(),
            events: None,
            state,
            frontier,
            step,
            injected: HashMap::new(),
            resumed: Vec::new(),
            input_pending: false,
        }
    }

    /// Continue after `checkpoint`, committing from the following step
    pub fn from_checkpoint(
        plan: Arc<Plan>,
        saver: Arc<dyn CheckpointSaver>,
        config: EngineConfig,
        run: &RunConfig,
        checkpoint: Checkpoint,
    ) -> Self {
        Self::new(
            plan,
            saver,
            config,
            run,
            checkpoint.state,
            checkpoint.frontier,
            checkpoint.step + 1,
        )
    }

    pub fn with_events(mut self, events: mpsc::Sender<ExecutionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Apply resume values for a suspended checkpoint
    ///
    /// Before-values are held back and used as the node's output when the
    /// node's step runs. After-values are merged into state immediately.
    pub fn apply_resume(&mut self, resolved: Vec<(PendingInterrupt, Value)>) -> Result<()> {
        for (pending, value) in resolved {
            match pending.when {
                InterruptWhen::Before => {
                    self.injected.insert(pending.node, value);
                }
                InterruptWhen::After => {
                    if !value.is_null() {
                        self.state = self.plan.schema.merge(&self.state, &value).map_err(|e| {
                            let err = algo::merge_error(&pending.node, e);
                            GraphError::run_failed(&self.thread_id, self.step, &pending.node, err)
                        })?;
                    }
                    self.resumed.push(pending.node);
                }
            }
        }
        Ok(())
    }

    /// Commit the starting state as an input checkpoint before the first step
    pub fn starting_fresh(mut self) -> Self {
        self.input_pending = true;
        self
    }

    async fn commit_input(&mut self) -> Result<()> {
        let checkpoint = Checkpoint::new(
            self.thread_id.as_str(),
            self.step,
            self.state.clone(),
            self.frontier.clone(),
        )
        .with_metadata(CheckpointMetadata::new().with_source(CheckpointSource::Input));
        self.commit(checkpoint).await?;
        Ok(())
    }

    /// Run steps until the run completes, suspends, fails, or is cancelled
    pub async fn run(mut self) -> Result<RunOutcome> {
        let result = self.run_steps().await;

        let event = match &result {
            Ok(outcome) if outcome.is_completed() => ExecutionEvent::Complete {
                final_state: outcome.state.clone(),
            },
            Ok(outcome) => ExecutionEvent::Interrupted {
                step: outcome.step,
                pending: outcome.pending_interrupts.clone(),
                state: outcome.state.clone(),
            },
            Err(e) => ExecutionEvent::Error {
                error: e.to_string(),
            },
        };
        self.emit(event).await;

        result
    }

    async fn run_steps(&mut self) -> Result<RunOutcome> {
        if std::mem::take(&mut self.input_pending) {
            self.commit_input().await?;
        }

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled());
            }

            // A resumed after-interrupt can leave nothing to run
            if algo::is_finished(&self.frontier) {
                let writes = std::mem::take(&mut self.resumed);
                let checkpoint = self.step_checkpoint(
                    self.state.clone(),
                    self.frontier.clone(),
                    CheckpointStatus::Completed,
                    Vec::new(),
                    writes,
                );
                let checkpoint = self.commit(checkpoint).await?;
                return Ok(self.finish(&checkpoint));
            }

            // Points not raised by the previous commit, e.g. after the
            // interrupt configuration changed between runs
            let blocked: Vec<PendingInterrupt> = self
                .frontier
                .iter()
                .filter(|node| {
                    self.plan.interrupts.should_interrupt_before(node)
                        && !self.injected.contains_key(node.as_str())
                })
                .map(PendingInterrupt::before)
                .collect();
            if !blocked.is_empty() {
                let writes = std::mem::take(&mut self.resumed);
                let checkpoint = self.step_checkpoint(
                    self.state.clone(),
                    self.frontier.clone(),
                    CheckpointStatus::AwaitingInterrupt,
                    blocked,
                    writes,
                );
                let checkpoint = self.commit(checkpoint).await?;
                return Ok(self.finish(&checkpoint));
            }

            debug!(step = self.step, frontier = ?self.frontier, "Executing step");
            let outputs = self.execute_frontier().await?;

            // In-flight nodes ran to completion; their results are discarded
            if self.cancel.is_cancelled() {
                return Err(self.cancelled());
            }

            let merged = algo::apply_outputs(&self.plan.schema, &self.state, &outputs)
                .map_err(|f| self.fail(f))?;

            let executed: Vec<NodeId> = self
                .frontier
                .iter()
                .filter(|node| node.as_str() != END)
                .cloned()
                .collect();
            let next = algo::next_frontier(&self.plan.graph, &merged, &executed)
                .map_err(|f| self.fail(f))?;

            // Injected values do not re-trigger their node's after-interrupt
            let ran: Vec<NodeId> = outputs
                .iter()
                .map(|(node, _)| node.clone())
                .filter(|node| !self.injected.contains_key(node))
                .collect();
            let (status, pending) = algo::commit_status(&self.plan.interrupts, &ran, &next);

            let mut writes = std::mem::take(&mut self.resumed);
            writes.extend(outputs.into_iter().map(|(node, _)| node));

            let checkpoint = self.step_checkpoint(merged, next, status, pending, writes);
            let checkpoint = self.commit(checkpoint).await?;
            self.injected.clear();

            if status != CheckpointStatus::Running {
                return Ok(self.finish(&checkpoint));
            }
            self.state = checkpoint.state;
            self.frontier = checkpoint.frontier;
        }
    }

    /// Execute every frontier node, returning outputs in frontier order
    ///
    /// `START` runs nothing and `END` is skipped. A node with an injected
    /// resume value is not invoked.
    async fn execute_frontier(&self) -> Result<Vec<(NodeId, Value)>> {
        let mut to_run: Vec<NodeSpec> = Vec::new();
        for node in &self.frontier {
            if node == START || node == END || self.injected.contains_key(node) {
                continue;
            }
            match self.plan.graph.node(node) {
                Some(spec) => to_run.push(spec.clone()),
                None => {
                    // Only reachable when resuming a checkpoint from a different plan
                    let err = GraphError::node_execution(node, "node is not registered in this graph");
                    return Err(GraphError::run_failed(&self.thread_id, self.step, node, err));
                }
            }
        }

        for spec in &to_run {
            self.emit(ExecutionEvent::NodeStart {
                node: spec.name.clone(),
                step: self.step,
            })
            .await;
        }

        let timeout = self.config.node_timeout;
        let results: Vec<std::result::Result<Value, GraphError>> = if self.config.parallel_nodes {
            join_all(
                to_run
                    .iter()
                    .map(|spec| invoke_node(spec, self.state.clone(), timeout)),
            )
            .await
        } else {
            let mut results = Vec::with_capacity(to_run.len());
            for spec in &to_run {
                results.push(invoke_node(spec, self.state.clone(), timeout).await);
            }
            results
        };

        let mut invoked: HashMap<NodeId, Value> = HashMap::with_capacity(to_run.len());
        for (spec, result) in to_run.iter().zip(results) {
            match result {
                Ok(output) => {
                    invoked.insert(spec.name.clone(), output);
                }
                Err(err) => {
                    let failure = NodeFailure::new(spec.name.clone(), err);
                    return Err(self.fail(failure));
                }
            }
        }

        let mut outputs = Vec::new();
        for node in &self.frontier {
            let output = match self.injected.get(node) {
                Some(value) => value.clone(),
                None => match invoked.remove(node) {
                    Some(value) => {
                        self.emit(ExecutionEvent::NodeEnd {
                            node: node.clone(),
                            step: self.step,
                            output: value.clone(),
                        })
                        .await;
                        value
                    }
                    None => continue,
                },
            };
            outputs.push((node.clone(), output));
        }
        Ok(outputs)
    }

    fn step_checkpoint(
        &self,
        state: State,
        frontier: Vec<NodeId>,
        status: CheckpointStatus,
        pending: Vec<PendingInterrupt>,
        writes: Vec<NodeId>,
    ) -> Checkpoint {
        Checkpoint::new(self.thread_id.as_str(), self.step, state, frontier)
            .with_status(status)
            .with_pending_interrupts(pending)
            .with_metadata(
                CheckpointMetadata::new()
                    .with_source(CheckpointSource::Loop)
                    .with_writes(writes),
            )
    }

    async fn commit(&mut self, checkpoint: Checkpoint) -> Result<Checkpoint> {
        self.saver.save(checkpoint.clone()).await?;

        debug!(
            thread_id = %self.thread_id,
            step = checkpoint.step,
            status = %checkpoint.status,
            frontier = ?checkpoint.frontier,
            "Committed checkpoint"
        );
        self.emit(ExecutionEvent::StepCommitted {
            step: checkpoint.step,
            frontier: checkpoint.frontier.clone(),
            status: checkpoint.status,
        })
        .await;

        self.step = checkpoint.step + 1;
        Ok(checkpoint)
    }

    fn finish(&self, checkpoint: &Checkpoint) -> RunOutcome {
        if checkpoint.is_awaiting_interrupt() {
            info!(
                thread_id = %self.thread_id,
                step = checkpoint.step,
                pending = ?checkpoint.pending_interrupts,
                "Run suspended at interrupt"
            );
        } else {
            info!(thread_id = %self.thread_id, step = checkpoint.step, "Run completed");
        }

        let status = if checkpoint.is_awaiting_interrupt() {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };
        RunOutcome::new(checkpoint, status)
    }

    fn fail(&self, failure: NodeFailure) -> GraphError {
        error!(
            thread_id = %self.thread_id,
            step = self.step,
            node = %failure.node,
            error = %failure.error,
            "Step failed"
        );
        GraphError::run_failed(&self.thread_id, self.step, failure.node, failure.error)
    }

    fn cancelled(&self) -> GraphError {
        warn!(thread_id = %self.thread_id, step = self.step, "Run cancelled");
        GraphError::Cancelled {
            thread_id: self.thread_id.clone(),
            step: self.step,
        }
    }

    async fn emit(&self, event: ExecutionEvent) {
        if let Some(events) = &self.events {
            if events.send(event).await.is_err() {
                debug!(thread_id = %self.thread_id, "Event receiver dropped");
            }
        }
    }
}

/// Invoke one node on its own copy of the state
async fn invoke_node(
    spec: &NodeSpec,
    state: State,
    timeout: Option<Duration>,
) -> std::result::Result<Value, GraphError> {
    let future = (spec.executor)(state);
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| GraphError::NodeTimeout {
                node: spec.name.clone(),
                timeout: limit,
            })?,
        None => future.await,
    };
    result.map_err(|e| GraphError::node_execution(&spec.name, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::interrupt::InterruptConfig;
    use crate::state::{AppendReducer, OverwriteReducer, StateSchema};
    use serde_json::json;
    use stategraph_checkpoint::InMemoryCheckpointSaver;

    fn plan(interrupts: InterruptConfig) -> Arc<Plan> {
        let mut graph = Graph::new();
        graph.add_node(NodeSpec {
            name: "count".to_string(),
            executor: crate::graph::node_executor(|state: State| async move {
                let n = state["n"].as_i64().unwrap_or(0);
                Ok(json!({"n": n + 1, "log": ["count"]}))
            }),
        });
        graph.add_edge(START.to_string(), "count".to_string());
        graph.add_edge("count".to_string(), END.to_string());

        let schema = StateSchema::new()
            .with_field_default("n", OverwriteReducer, json!(0))
            .with_field("log", AppendReducer);

        Arc::new(Plan {
            graph,
            schema,
            interrupts,
        })
    }

    fn step_loop(plan: Arc<Plan>, saver: Arc<InMemoryCheckpointSaver>) -> StepLoop {
        let state = plan.schema.initial_state(Value::Null).unwrap();
        StepLoop::new(
            plan,
            saver,
            EngineConfig::default(),
            &RunConfig::new("t1"),
            state,
            vec![START.to_string()],
            0,
        )
    }

    #[tokio::test]
    async fn test_commits_one_checkpoint_per_step() {
        let saver = Arc::new(InMemoryCheckpointSaver::new());
        let run = step_loop(plan(InterruptConfig::default()), saver.clone()).starting_fresh();

        let outcome = run.run().await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(outcome.step, 2);
        assert_eq!(outcome.state["n"], json!(1));

        let history = saver.list_all("t1", None).await.unwrap();
        let steps: Vec<u64> = history.iter().map(|c| c.step).collect();
        assert_eq!(steps, vec![2, 1, 0]);
        assert_eq!(history[1].frontier, vec!["count"]);
        assert_eq!(history[0].metadata.writes, vec!["count"]);
        assert_eq!(history[2].metadata.source, Some(CheckpointSource::Input));
    }

    #[tokio::test]
    async fn test_emits_events_in_order() {
        let saver = Arc::new(InMemoryCheckpointSaver::new());
        let (tx, mut rx) = mpsc::channel(100);
        let run = step_loop(plan(InterruptConfig::default()), saver).with_events(tx);

        run.run().await.unwrap();

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(match event {
                ExecutionEvent::NodeStart { .. } => "start",
                ExecutionEvent::NodeEnd { .. } => "end",
                ExecutionEvent::StepCommitted { .. } => "commit",
                ExecutionEvent::Interrupted { .. } => "interrupted",
                ExecutionEvent::Complete { .. } => "complete",
                ExecutionEvent::Error { .. } => "error",
            });
        }
        assert_eq!(kinds, vec!["commit", "start", "end", "commit", "complete"]);
    }

    #[tokio::test]
    async fn test_before_interrupt_injects_output() {
        let saver = Arc::new(InMemoryCheckpointSaver::new());
        let interrupts = InterruptConfig::new().with_interrupt_before(vec!["count".to_string()]);
        let plan = plan(interrupts);

        let outcome = step_loop(plan.clone(), saver.clone()).run().await.unwrap();
        assert!(outcome.is_interrupted());
        assert_eq!(outcome.pending_interrupts, vec![PendingInterrupt::before("count")]);

        let latest = saver.load_latest("t1").await.unwrap().unwrap();
        let mut resumed = StepLoop::from_checkpoint(
            plan,
            saver.clone(),
            EngineConfig::default(),
            &RunConfig::new("t1"),
            latest,
        );
        resumed
            .apply_resume(vec![(PendingInterrupt::before("count"), json!({"n": 41}))])
            .unwrap();

        let outcome = resumed.run().await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(outcome.state["n"], json!(41));
        assert_eq!(outcome.state["log"], json!([]));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step() {
        let saver = Arc::new(InMemoryCheckpointSaver::new());
        let token = CancellationToken::new();
        token.cancel();

        let plan = plan(InterruptConfig::default());
        let state = plan.schema.initial_state(Value::Null).unwrap();
        let run = StepLoop::new(
            plan,
            saver.clone(),
            EngineConfig::default(),
            &RunConfig::new("t1").with_cancellation(token),
            state,
            vec![START.to_string()],
            0,
        );

        let err = run.run().await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(saver.load_latest("t1").await.unwrap().is_none());
    }
}
