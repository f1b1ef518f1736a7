//! Storage trait for checkpoint backends
//!
//! [`CheckpointSaver`] is the seam between the execution engine and whatever
//! holds checkpoint history. The engine saves one record per committed step and
//! reads back the latest record (or one at a given step) to resume.
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │  Execution engine                │
//! │  • run step                      │
//! │  • commit → saver.save(cp)       │
//! │  • resume ← saver.load_latest()  │
//! └──────────────┬───────────────────┘
//!                │ CheckpointSaver
//!                ↓
//! ┌──────────────────────────────────┐
//! │  InMemoryCheckpointSaver         │
//! │  SqliteCheckpointSaver           │
//! │  your backend                    │
//! └──────────────────────────────────┘
//! ```
//!
//! # Contract
//!
//! - History is append-only. `save` rejects a step index that is not strictly
//!   greater than the latest stored step for that thread with
//!   [`CheckpointError::StepConflict`](crate::CheckpointError::StepConflict).
//! - Loads return owned copies; callers never observe later mutation.
//! - Threads are independent; a saver must not serialize writes of distinct
//!   threads behind each other longer than it takes to append.
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use stategraph_checkpoint::{Checkpoint, CheckpointSaver, CheckpointStream, Result};
//!
//! struct RedisSaver { /* ... */ }
//!
//! #[async_trait]
//! impl CheckpointSaver for RedisSaver {
//!     async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
//!         // ZADD thread:<id> <step> <json> with NX, map collisions to StepConflict
//!         todo!()
//!     }
//!
//!     async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> { todo!() }
//!     async fn load_at(&self, thread_id: &str, step: u64) -> Result<Option<Checkpoint>> { todo!() }
//!     async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream> { todo!() }
//!     async fn delete_thread(&self, thread_id: &str) -> Result<()> { todo!() }
//! }
//! ```

use crate::{checkpoint::Checkpoint, error::Result};
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;

/// Type alias for async stream of checkpoints
pub type CheckpointStream = Pin<Box<dyn Stream<Item = Result<Checkpoint>> + Send + 'static>>;

/// Core trait for checkpoint storage backends
///
/// Implementations must be `Send + Sync`; the engine shares one saver across
/// concurrent runs behind an `Arc`.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Append a checkpoint to its thread's history
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Most recent checkpoint of a thread, `None` for an unknown thread
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Checkpoint committed at `step`, if any
    async fn load_at(&self, thread_id: &str, step: u64) -> Result<Option<Checkpoint>>;

    /// History of a thread, newest first, truncated to `limit` entries
    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream>;

    /// Remove every checkpoint of a thread
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Collect [`list`](Self::list) into a vector
    async fn list_all(&self, thread_id: &str, limit: Option<usize>) -> Result<Vec<Checkpoint>> {
        let mut stream = self.list(thread_id, limit).await?;
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item?);
        }
        Ok(out)
    }
}
