//! Graph execution methods (invoke, resume)

use super::{CompiledGraph, RunConfig, RunOutcome, RunStatus};
use crate::error::{GraphError, Result};
use crate::graph::START;
use crate::interrupt::ResumeValue;
use crate::pregel::StepLoop;
use serde_json::Value;
use stategraph_checkpoint::CheckpointStatus;
use tracing::{info, warn};

impl CompiledGraph {
    /// Start a run on `thread_id` and wait until it completes or suspends
    ///
    /// `initial` seeds the state: every key must be a declared field, and
    /// undeclared fields take their defaults. On a new thread the run commits
    /// its input checkpoint at step 0. On a thread with history the run starts
    /// from `START` again, numbering its checkpoints after the latest one.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stategraph_core::{OverwriteReducer, StateGraph, StateSchema, END, START};
    /// use serde_json::json;
    ///
    /// # async fn example() -> stategraph_core::Result<()> {
    /// let mut graph = StateGraph::new(StateSchema::new().with_field("greeting", OverwriteReducer));
    /// graph
    ///     .add_node("greet", |_state| async move { Ok(json!({"greeting": "hello"})) })
    ///     .add_edge(START, "greet")
    ///     .add_edge("greet", END);
    ///
    /// let outcome = graph.compile()?.invoke(json!({}), "thread-1").await?;
    /// assert!(outcome.is_completed());
    /// assert_eq!(outcome.state["greeting"], json!("hello"));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn invoke(&self, initial: Value, thread_id: &str) -> Result<RunOutcome> {
        self.invoke_with_config(initial, RunConfig::new(thread_id)).await
    }

    #[tracing::instrument(skip(self, initial, run), fields(thread_id = %run.thread_id))]
    pub async fn invoke_with_config(&self, initial: Value, run: RunConfig) -> Result<RunOutcome> {
        let step_loop = self.prepare_fresh_run(initial, &run).await?;
        step_loop.run().await
    }

    /// Continue a thread from its latest checkpoint
    ///
    /// - A completed thread returns its final outcome without running anything.
    /// - A suspended thread needs a value for every pending interrupt. Without
    ///   one, the thread stays suspended and the same outcome is returned.
    /// - A thread whose last commit was an ordinary step (for example after a
    ///   crash or a cancellation) continues from that step's frontier.
    pub async fn resume(&self, thread_id: &str, value: Option<ResumeValue>) -> Result<RunOutcome> {
        self.resume_with_config(RunConfig::new(thread_id), value).await
    }

    #[tracing::instrument(skip(self, run, value), fields(thread_id = %run.thread_id))]
    pub async fn resume_with_config(
        &self,
        run: RunConfig,
        value: Option<ResumeValue>,
    ) -> Result<RunOutcome> {
        let checkpoint = self
            .saver
            .load_latest(&run.thread_id)
            .await?
            .ok_or_else(|| GraphError::ThreadNotFound(run.thread_id.clone()))?;

        if checkpoint.status.is_terminal() {
            info!(step = checkpoint.step, "Thread already completed");
            return Ok(RunOutcome::new(&checkpoint, RunStatus::Completed));
        }

        let resolved = match checkpoint.status {
            CheckpointStatus::AwaitingInterrupt => {
                match value
                    .as_ref()
                    .and_then(|v| v.resolve(&checkpoint.pending_interrupts))
                {
                    Some(resolved) => resolved,
                    None => {
                        warn!(
                            step = checkpoint.step,
                            pending = ?checkpoint.pending_interrupts,
                            "Resume value missing for a pending interrupt"
                        );
                        return Ok(RunOutcome::new(&checkpoint, RunStatus::Interrupted));
                    }
                }
            }
            _ => {
                if value.is_some() {
                    warn!(step = checkpoint.step, "No pending interrupts; resume value ignored");
                }
                Vec::new()
            }
        };

        info!(
            step = checkpoint.step,
            frontier = ?checkpoint.frontier,
            "Resuming run"
        );
        let mut step_loop = StepLoop::from_checkpoint(
            self.plan.clone(),
            self.saver.clone(),
            self.config.clone(),
            &run,
            checkpoint,
        );
        step_loop.apply_resume(resolved)?;
        step_loop.run().await
    }

    /// Validate the input and build a loop that starts at `START`
    pub(crate) async fn prepare_fresh_run(&self, initial: Value, run: &RunConfig) -> Result<StepLoop> {
        if run.thread_id.is_empty() {
            return Err(GraphError::Configuration("thread_id cannot be empty".to_string()));
        }
        self.config.validate()?;

        let state = self.plan.schema.initial_state(initial)?;
        let step = self
            .saver
            .load_latest(&run.thread_id)
            .await?
            .map_or(0, |latest| latest.step + 1);

        info!(thread_id = %run.thread_id, step, "Starting run");
        Ok(StepLoop::new(
            self.plan.clone(),
            self.saver.clone(),
            self.config.clone(),
            run,
            state,
            vec![START.to_string()],
            step,
        )
        .starting_fresh())
    }
}
