//! State management methods (get_state, update_state, etc.)

use super::{CompiledGraph, StateSnapshot};
use crate::error::{GraphError, Result};
use serde_json::Value;
use stategraph_checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSource};

impl CompiledGraph {
    /// Snapshot of the latest checkpoint of `thread_id`, if any
    pub async fn get_state(&self, thread_id: &str) -> Result<Option<StateSnapshot>> {
        let latest = self.saver.load_latest(thread_id).await?;
        Ok(latest.map(StateSnapshot::from))
    }

    /// Snapshot of the checkpoint committed at `step`
    pub async fn get_state_at(&self, thread_id: &str, step: u64) -> Result<Option<StateSnapshot>> {
        let checkpoint = self.saver.load_at(thread_id, step).await?;
        Ok(checkpoint.map(StateSnapshot::from))
    }

    /// Snapshots of `thread_id`, newest first
    pub async fn get_state_history(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<StateSnapshot>> {
        let history = self.saver.list_all(thread_id, limit).await?;
        Ok(history.into_iter().map(StateSnapshot::from).collect())
    }

    /// Merge a manual update into the latest state of `thread_id`
    ///
    /// The update goes through the field reducers like a node output and is
    /// committed as a new checkpoint with source `update`. Frontier, status,
    /// and pending interrupts carry over, so a suspended run stays suspended
    /// and resumes with the amended state.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_state(&self, thread_id: &str, update: Value) -> Result<StateSnapshot> {
        let latest = self
            .saver
            .load_latest(thread_id)
            .await?
            .ok_or_else(|| GraphError::ThreadNotFound(thread_id.to_string()))?;

        let state = self.plan.schema.merge(&latest.state, &update)?;
        let writes = update
            .as_object()
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default();

        let checkpoint = Checkpoint::new(thread_id, latest.step + 1, state, latest.frontier)
            .with_status(latest.status)
            .with_pending_interrupts(latest.pending_interrupts)
            .with_metadata(
                CheckpointMetadata::new()
                    .with_source(CheckpointSource::Update)
                    .with_writes(writes),
            );
        self.saver.save(checkpoint.clone()).await?;

        tracing::info!(step = checkpoint.step, "State updated manually");
        Ok(StateSnapshot::from(checkpoint))
    }
}
