//! Streaming execution methods

use super::{CompiledGraph, EventStream, RunConfig};
use crate::error::Result;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

impl CompiledGraph {
    /// Start a run in the background and stream its events
    ///
    /// The input is validated before anything is spawned, so an invalid
    /// initial state is returned as an error here. Everything after that is
    /// reported through the stream, which ends with exactly one of
    /// `Complete`, `Interrupted`, or `Error`.
    ///
    /// The channel is bounded: a slow consumer slows the run down rather than
    /// buffering without limit. Dropping the stream does not stop the run; use
    /// the cancellation token in `run` for that.
    #[tracing::instrument(skip(self, initial, run), fields(thread_id = %run.thread_id))]
    pub async fn stream(&self, initial: Value, run: RunConfig) -> Result<EventStream> {
        let (tx, rx) = mpsc::channel(100);

        let step_loop = self.prepare_fresh_run(initial, &run).await?.with_events(tx);

        tokio::spawn(async move {
            if let Err(e) = step_loop.run().await {
                tracing::debug!(error = %e, "Streamed run ended with error");
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
