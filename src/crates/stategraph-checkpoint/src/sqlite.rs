//! Durable checkpoint storage backed by SQLite
//!
//! [`SqliteCheckpointSaver`] stores one row per checkpoint, keyed by
//! `(thread_id, step)`. The composite primary key makes the append-only
//! contract hold across processes: a second writer trying to commit an
//! existing step fails instead of overwriting it.
//!
//! Structured columns (`state`, `frontier`, `pending_interrupts`, `metadata`)
//! are stored as JSON text through [`JsonSerializer`].
//!
//! `rusqlite` is synchronous, so every call runs on the blocking pool via
//! `tokio::task::spawn_blocking` while the connection sits behind a
//! `std::sync::Mutex`.
//!
//! ```rust,no_run
//! use stategraph_checkpoint::{CheckpointSaver, SqliteCheckpointSaver};
//!
//! # #[tokio::main]
//! # async fn main() -> stategraph_checkpoint::Result<()> {
//! let saver = SqliteCheckpointSaver::open("./checkpoints.db")?;
//! if let Some(latest) = saver.load_latest("review-42").await? {
//!     println!("thread is at step {} ({})", latest.step, latest.status);
//! }
//! # Ok(())
//! # }
//! ```

use crate::{
    checkpoint::{Checkpoint, CheckpointMetadata, CheckpointStatus, PendingInterrupt, StateValues},
    error::{CheckpointError, Result},
    serializer::JsonSerializer,
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const SCHEMA: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;

     CREATE TABLE IF NOT EXISTS checkpoints (
         thread_id TEXT NOT NULL,
         step INTEGER NOT NULL,
         id TEXT NOT NULL,
         state TEXT NOT NULL,
         frontier TEXT NOT NULL,
         status TEXT NOT NULL,
         pending_interrupts TEXT NOT NULL,
         metadata TEXT NOT NULL,
         created_at TEXT NOT NULL,
         PRIMARY KEY (thread_id, step)
     );";

const SELECT_COLUMNS: &str =
    "SELECT id, thread_id, step, state, frontier, status, pending_interrupts, metadata, created_at
     FROM checkpoints";

/// Checkpoint row as stored, before the JSON columns are decoded
struct RawRow {
    id: String,
    thread_id: String,
    step: i64,
    state: String,
    frontier: String,
    status: String,
    pending_interrupts: String,
    metadata: String,
    created_at: String,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            thread_id: row.get(1)?,
            step: row.get(2)?,
            state: row.get(3)?,
            frontier: row.get(4)?,
            status: row.get(5)?,
            pending_interrupts: row.get(6)?,
            metadata: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn decode(self, serializer: &JsonSerializer) -> Result<Checkpoint> {
        let step = u64::try_from(self.step)
            .map_err(|_| CheckpointError::Invalid(format!("negative step {}", self.step)))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CheckpointError::Invalid(format!("bad created_at: {}", e)))?;

        Ok(Checkpoint {
            id: self.id,
            thread_id: self.thread_id,
            step,
            state: serializer.loads_str::<StateValues>(&self.state)?,
            frontier: serializer.loads_str::<Vec<String>>(&self.frontier)?,
            status: self.status.parse::<CheckpointStatus>()?,
            pending_interrupts: serializer
                .loads_str::<Vec<PendingInterrupt>>(&self.pending_interrupts)?,
            metadata: serializer.loads_str::<CheckpointMetadata>(&self.metadata)?,
            created_at,
        })
    }
}

/// SQLite-backed checkpoint saver
///
/// Cloning shares the connection.
#[derive(Clone)]
pub struct SqliteCheckpointSaver {
    conn: Arc<Mutex<Connection>>,
    serializer: JsonSerializer,
}

impl std::fmt::Debug for SqliteCheckpointSaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCheckpointSaver").finish_non_exhaustive()
    }
}

impl SqliteCheckpointSaver {
    /// Open or create the checkpoint database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened SQLite checkpoint store");
        Self::with_connection(conn)
    }

    /// Private in-memory database, gone when the saver is dropped
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            serializer: JsonSerializer::new(),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &JsonSerializer) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let serializer = self.serializer.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| CheckpointError::Storage(format!("connection lock poisoned: {}", e)))?;
            f(&mut guard, &serializer)
        })
        .await
        .map_err(|e| CheckpointError::Storage(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl CheckpointSaver for SqliteCheckpointSaver {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        if checkpoint.thread_id.is_empty() {
            return Err(CheckpointError::Invalid("thread_id is required".to_string()));
        }
        let step = i64::try_from(checkpoint.step)
            .map_err(|_| CheckpointError::Invalid(format!("step {} out of range", checkpoint.step)))?;

        self.with_conn(move |conn, serializer| {
            let state = serializer.dumps_str(&checkpoint.state)?;
            let frontier = serializer.dumps_str(&checkpoint.frontier)?;
            let pending = serializer.dumps_str(&checkpoint.pending_interrupts)?;
            let metadata = serializer.dumps_str(&checkpoint.metadata)?;

            let tx = conn.transaction()?;
            let latest: Option<i64> = tx.query_row(
                "SELECT MAX(step) FROM checkpoints WHERE thread_id = ?1",
                params![checkpoint.thread_id],
                |row| row.get(0),
            )?;

            if let Some(latest) = latest {
                if step <= latest {
                    return Err(CheckpointError::StepConflict {
                        thread_id: checkpoint.thread_id.clone(),
                        step: checkpoint.step,
                        latest: latest.max(0) as u64,
                    });
                }
            }

            tx.execute(
                "INSERT INTO checkpoints
                     (thread_id, step, id, state, frontier, status, pending_interrupts, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    checkpoint.thread_id,
                    step,
                    checkpoint.id,
                    state,
                    frontier,
                    checkpoint.status.as_str(),
                    pending,
                    metadata,
                    checkpoint.created_at.to_rfc3339(),
                ],
            )?;
            tx.commit()?;

            debug!(
                thread_id = %checkpoint.thread_id,
                step = checkpoint.step,
                status = %checkpoint.status,
                "Saved checkpoint"
            );
            Ok(())
        })
        .await
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let thread_id = thread_id.to_string();
        self.with_conn(move |conn, serializer| {
            let sql = format!("{} WHERE thread_id = ?1 ORDER BY step DESC LIMIT 1", SELECT_COLUMNS);
            let raw = conn
                .query_row(&sql, params![thread_id], RawRow::from_row)
                .optional()?;
            raw.map(|raw| raw.decode(serializer)).transpose()
        })
        .await
    }

    async fn load_at(&self, thread_id: &str, step: u64) -> Result<Option<Checkpoint>> {
        let Ok(step) = i64::try_from(step) else {
            return Ok(None);
        };
        let thread_id = thread_id.to_string();
        self.with_conn(move |conn, serializer| {
            let sql = format!("{} WHERE thread_id = ?1 AND step = ?2", SELECT_COLUMNS);
            let raw = conn
                .query_row(&sql, params![thread_id, step], RawRow::from_row)
                .optional()?;
            raw.map(|raw| raw.decode(serializer)).transpose()
        })
        .await
    }

    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream> {
        let thread_id = thread_id.to_string();
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(|l| l.min(i64::MAX as usize) as i64).unwrap_or(-1);

        let rows = self
            .with_conn(move |conn, serializer| {
                let sql = format!(
                    "{} WHERE thread_id = ?1 ORDER BY step DESC LIMIT ?2",
                    SELECT_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let raws = stmt
                    .query_map(params![thread_id, limit], RawRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(raws
                    .into_iter()
                    .map(|raw| raw.decode(serializer))
                    .collect::<Vec<_>>())
            })
            .await?;

        Ok(Box::pin(stream::iter(rows)))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let thread_id = thread_id.to_string();
        self.with_conn(move |conn, _| {
            let deleted = conn.execute(
                "DELETE FROM checkpoints WHERE thread_id = ?1",
                params![thread_id],
            )?;
            debug!(thread_id = %thread_id, deleted, "Deleted thread checkpoints");
            Ok(())
        })
        .await
    }
}
