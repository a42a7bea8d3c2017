//! Storage traits and error types
//!
//! This module defines the trait interface for the run ledger and
//! associated error types.

use crate::state::{JobKind, JobState};
use crate::storage::{CrawlCheckpoint, RunRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Run history and checkpoint ledger
///
/// Implementations are shared between concurrently running jobs, so every
/// method takes `&self` and must be internally synchronized.
pub trait RunStore: Send + Sync {
    // ===== Run History =====

    /// Records an admitted run and returns its id
    fn start_run(&self, kind: JobKind, config_hash: &str) -> StorageResult<i64>;

    /// Records the terminal state of a run
    fn finish_run(
        &self,
        run_id: i64,
        final_state: JobState,
        pages_done: u64,
        items_collected: u64,
        last_error: Option<&str>,
    ) -> StorageResult<()>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Most recent runs first
    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;

    // ===== Checkpoints =====

    /// Replaces the checkpoint for the checkpoint's (kind, category)
    fn save_checkpoint(&self, checkpoint: &CrawlCheckpoint) -> StorageResult<()>;

    fn latest_checkpoint(
        &self,
        kind: JobKind,
        category_id: &str,
    ) -> StorageResult<Option<CrawlCheckpoint>>;
}
