//! Storage module for the run ledger
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Run history (one row per admitted run)
//! - Checkpoint bookkeeping for long walks

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{RunStore, StorageError, StorageResult};

use crate::state::{JobKind, JobState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Opens (or creates) the run ledger at `path`
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// One row of run history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub id: i64,
    pub job_kind: JobKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// `Running` until the run is released
    pub final_state: JobState,
    pub pages_done: u64,
    pub items_collected: u64,
    pub last_error: Option<String>,
    pub config_hash: String,
}

impl RunRecord {
    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }
}

/// Progress snapshot for one (kind, category) pair
///
/// Checkpoints record how far a walk got; they are never used to resume one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlCheckpoint {
    pub job_kind: JobKind,
    pub category_id: String,
    pub category_name: String,
    pub run_id: Option<i64>,
    pub last_completed_page: u32,
    pub accumulated_item_count: u64,
    /// When the run that produced this checkpoint started
    pub started_at: DateTime<Utc>,
}
