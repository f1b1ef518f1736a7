//! # stategraph-checkpoint - Persistence for graph runs
//!
//! Checkpoint records and storage backends for the `stategraph` execution
//! engine. After every step the engine commits a [`Checkpoint`] holding the
//! thread id, the step index, the full state, the frontier of nodes ready to
//! run next, and the run status. A run can resume from the latest checkpoint
//! of its thread, in the same process or a new one.
//!
//! ## Components
//!
//! - [`Checkpoint`] - immutable step-boundary record
//! - [`CheckpointSaver`] - async storage trait (append-only per thread)
//! - [`InMemoryCheckpointSaver`] - process-local storage
//! - [`SqliteCheckpointSaver`] - durable storage (`sqlite` feature, on by default)
//! - [`SerializerProtocol`] / [`JsonSerializer`] - column encoding
//!
//! ## Quick Start
//!
//! ```rust
//! use stategraph_checkpoint::{
//!     Checkpoint, CheckpointMetadata, CheckpointSaver, CheckpointSource,
//!     CheckpointStatus, InMemoryCheckpointSaver,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> stategraph_checkpoint::Result<()> {
//! let saver = InMemoryCheckpointSaver::new();
//!
//! saver
//!     .save(
//!         Checkpoint::new("thread-1", 0, Default::default(), vec!["__start__".into()])
//!             .with_metadata(CheckpointMetadata::new().with_source(CheckpointSource::Input)),
//!     )
//!     .await?;
//!
//! // Steps must strictly increase
//! assert!(saver
//!     .save(Checkpoint::new("thread-1", 0, Default::default(), vec![]))
//!     .await
//!     .is_err());
//!
//! let latest = saver.load_latest("thread-1").await?.unwrap();
//! assert_eq!(latest.status, CheckpointStatus::Running);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod serializer;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

pub use checkpoint::{
    Checkpoint, CheckpointId, CheckpointMetadata, CheckpointSource, CheckpointStatus,
    InterruptWhen, PendingInterrupt, StateValues,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use serializer::{JsonSerializer, SerializerProtocol};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointSaver;
pub use traits::{CheckpointSaver, CheckpointStream};
