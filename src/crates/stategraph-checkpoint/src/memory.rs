//! In-memory checkpoint storage
//!
//! [`InMemoryCheckpointSaver`] keeps every thread's history in process memory.
//! It is the default saver for tests and single-process runs; history is lost
//! when the process exits.
//!
//! # Locking
//!
//! The thread map sits behind a `tokio::sync::RwLock` that is only held long
//! enough to look up (or insert) a thread's history. Each history has its own
//! mutex, so appends to different threads never wait on each other and appends
//! to one thread are serialized.
//!
//! ```text
//! RwLock<HashMap<thread_id, Arc<Mutex<Vec<Checkpoint>>>>>
//!           │                         │
//!           │ read: lookup            │ lock: append / copy out
//! ```
//!
//! # Example
//!
//! ```rust
//! use stategraph_checkpoint::{Checkpoint, CheckpointSaver, InMemoryCheckpointSaver};
//!
//! # #[tokio::main]
//! # async fn main() -> stategraph_checkpoint::Result<()> {
//! let saver = InMemoryCheckpointSaver::new();
//! saver
//!     .save(Checkpoint::new("t1", 0, Default::default(), vec!["__start__".into()]))
//!     .await?;
//!
//! let latest = saver.load_latest("t1").await?.unwrap();
//! assert_eq!(latest.step, 0);
//! # Ok(())
//! # }
//! ```

use crate::{
    checkpoint::Checkpoint,
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

type ThreadHistory = Arc<Mutex<Vec<Checkpoint>>>;

/// Thread-safe in-memory checkpoint storage
type CheckpointStorage = Arc<RwLock<HashMap<String, ThreadHistory>>>;

/// In-memory checkpoint saver
///
/// Cloning shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of threads being tracked
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Get the total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        let histories: Vec<ThreadHistory> = self.storage.read().await.values().cloned().collect();
        let mut total = 0;
        for history in histories {
            total += history.lock().await.len();
        }
        total
    }

    /// Clear all checkpoints
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }

    async fn history(&self, thread_id: &str) -> Option<ThreadHistory> {
        self.storage.read().await.get(thread_id).cloned()
    }

    async fn history_or_create(&self, thread_id: &str) -> ThreadHistory {
        if let Some(history) = self.history(thread_id).await {
            return history;
        }
        let mut storage = self.storage.write().await;
        storage
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        if checkpoint.thread_id.is_empty() {
            return Err(CheckpointError::Invalid("thread_id is required".to_string()));
        }

        // A concurrent delete_thread may detach the history between lookup and
        // lock; appending to a detached history would drop the write.
        let mut entries = loop {
            let history = self.history_or_create(&checkpoint.thread_id).await;
            let entries = history.clone().lock_owned().await;
            let attached = self
                .storage
                .read()
                .await
                .get(&checkpoint.thread_id)
                .is_some_and(|current| Arc::ptr_eq(current, &history));
            if attached {
                break entries;
            }
        };

        if let Some(latest) = entries.last() {
            if checkpoint.step <= latest.step {
                return Err(CheckpointError::StepConflict {
                    thread_id: checkpoint.thread_id.clone(),
                    step: checkpoint.step,
                    latest: latest.step,
                });
            }
        }

        debug!(
            thread_id = %checkpoint.thread_id,
            step = checkpoint.step,
            status = %checkpoint.status,
            "Saved checkpoint"
        );
        entries.push(checkpoint);
        Ok(())
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        match self.history(thread_id).await {
            Some(history) => Ok(history.lock().await.last().cloned()),
            None => Ok(None),
        }
    }

    async fn load_at(&self, thread_id: &str, step: u64) -> Result<Option<Checkpoint>> {
        let Some(history) = self.history(thread_id).await else {
            return Ok(None);
        };
        let entries = history.lock().await;
        // Steps are strictly increasing, so the history is sorted by step
        Ok(entries
            .binary_search_by_key(&step, |cp| cp.step)
            .ok()
            .map(|idx| entries[idx].clone()))
    }

    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream> {
        let results: Vec<Result<Checkpoint>> = match self.history(thread_id).await {
            Some(history) => {
                let entries = history.lock().await;
                entries
                    .iter()
                    .rev()
                    .take(limit.unwrap_or(usize::MAX))
                    .cloned()
                    .map(Ok)
                    .collect()
            }
            None => Vec::new(),
        };

        Ok(Box::pin(stream::iter(results)))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut storage = self.storage.write().await;
        storage.remove(thread_id);
        Ok(())
    }
}
