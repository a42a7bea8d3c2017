//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the RunStore trait.

use crate::state::{JobKind, JobState};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RunStore, StorageError, StorageResult};
use crate::storage::{CrawlCheckpoint, RunRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

const RUN_COLUMNS: &str = "id, job_kind, started_at, finished_at, state, pages_done, \
                           items_collected, last_error, config_hash";

/// SQLite storage backend
///
/// The connection sits behind a mutex so one ledger can be shared by every
/// job kind.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_time(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("timestamp '{}': {}", raw, e)))
}

/// Raw column values, converted outside the rusqlite row closure
struct RunRow {
    id: i64,
    job_kind: String,
    started_at: String,
    finished_at: Option<String>,
    state: String,
    pages_done: i64,
    items_collected: i64,
    last_error: Option<String>,
    config_hash: String,
}

impl RunRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            job_kind: row.get(1)?,
            started_at: row.get(2)?,
            finished_at: row.get(3)?,
            state: row.get(4)?,
            pages_done: row.get(5)?,
            items_collected: row.get(6)?,
            last_error: row.get(7)?,
            config_hash: row.get(8)?,
        })
    }

    fn into_record(self) -> StorageResult<RunRecord> {
        let job_kind = self
            .job_kind
            .parse::<JobKind>()
            .map_err(|_| StorageError::Corrupt(format!("job kind '{}'", self.job_kind)))?;
        let final_state = JobState::from_db_string(&self.state)
            .ok_or_else(|| StorageError::Corrupt(format!("state '{}'", self.state)))?;
        Ok(RunRecord {
            id: self.id,
            job_kind,
            started_at: parse_time(&self.started_at)?,
            finished_at: self.finished_at.as_deref().map(parse_time).transpose()?,
            final_state,
            pages_done: self.pages_done.max(0) as u64,
            items_collected: self.items_collected.max(0) as u64,
            last_error: self.last_error,
            config_hash: self.config_hash,
        })
    }
}

impl RunStore for SqliteStorage {
    // ===== Run History =====

    fn start_run(&self, kind: JobKind, config_hash: &str) -> StorageResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO runs (job_kind, started_at, state, config_hash) VALUES (?1, ?2, ?3, ?4)",
            params![
                kind.as_str(),
                Utc::now().to_rfc3339(),
                JobState::Running.to_db_string(),
                config_hash
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_run(
        &self,
        run_id: i64,
        final_state: JobState,
        pages_done: u64,
        items_collected: u64,
        last_error: Option<&str>,
    ) -> StorageResult<()> {
        let updated = self.conn().execute(
            "UPDATE runs SET state = ?1, finished_at = ?2, pages_done = ?3,
             items_collected = ?4, last_error = ?5 WHERE id = ?6",
            params![
                final_state.to_db_string(),
                Utc::now().to_rfc3339(),
                pages_done as i64,
                items_collected as i64,
                last_error,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                RunRow::from_row,
            )
            .optional()?;
        row.ok_or(StorageError::RunNotFound(run_id))?.into_record()
    }

    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit as i64], RunRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RunRow::into_record).collect()
    }

    // ===== Checkpoints =====

    fn save_checkpoint(&self, checkpoint: &CrawlCheckpoint) -> StorageResult<()> {
        self.conn().execute(
            "INSERT INTO checkpoints (job_kind, category_id, category_name, run_id,
             last_completed_page, item_count, started_at, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(job_kind, category_id) DO UPDATE SET
               category_name = excluded.category_name,
               run_id = excluded.run_id,
               last_completed_page = excluded.last_completed_page,
               item_count = excluded.item_count,
               started_at = excluded.started_at,
               saved_at = excluded.saved_at",
            params![
                checkpoint.job_kind.as_str(),
                checkpoint.category_id,
                checkpoint.category_name,
                checkpoint.run_id,
                checkpoint.last_completed_page,
                checkpoint.accumulated_item_count as i64,
                checkpoint.started_at.to_rfc3339(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn latest_checkpoint(
        &self,
        kind: JobKind,
        category_id: &str,
    ) -> StorageResult<Option<CrawlCheckpoint>> {
        let row = self
            .conn()
            .query_row(
                "SELECT category_name, run_id, last_completed_page, item_count, started_at
                 FROM checkpoints WHERE job_kind = ?1 AND category_id = ?2",
                params![kind.as_str(), category_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(category_name, run_id, page, count, started_at)| {
            Ok(CrawlCheckpoint {
                job_kind: kind,
                category_id: category_id.to_string(),
                category_name,
                run_id,
                last_completed_page: page,
                accumulated_item_count: count.max(0) as u64,
                started_at: parse_time(&started_at)?,
            })
        })
        .transpose()
    }
}
