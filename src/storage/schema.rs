//! Database schema definitions
//!
//! Two tables: the run history and the checkpoint ledger.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per admitted run
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_kind TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    state TEXT NOT NULL,
    pages_done INTEGER NOT NULL DEFAULT 0,
    items_collected INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    config_hash TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_kind ON runs(job_kind);

-- Latest checkpoint per (job kind, category); later checkpoints overwrite
CREATE TABLE IF NOT EXISTS checkpoints (
    job_kind TEXT NOT NULL,
    category_id TEXT NOT NULL,
    category_name TEXT NOT NULL,
    run_id INTEGER REFERENCES runs(id),
    last_completed_page INTEGER NOT NULL,
    item_count INTEGER NOT NULL,
    started_at TEXT NOT NULL,
    saved_at TEXT NOT NULL,
    PRIMARY KEY (job_kind, category_id)
);
"#;

/// Creates any missing tables
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
