//! Run history report
//!
//! Summarizes the run ledger for the `history` command.

use crate::state::{JobKind, JobState};
use crate::storage::{RunRecord, RunStore, StorageResult};
use std::collections::HashMap;
use std::fmt::Write;

/// Recent runs plus per-outcome counts
#[derive(Debug, Clone)]
pub struct RunHistory {
    /// Newest first
    pub runs: Vec<RunRecord>,
    pub runs_by_state: HashMap<JobState, u64>,
}

impl RunHistory {
    pub fn from_runs(runs: Vec<RunRecord>) -> Self {
        let mut runs_by_state = HashMap::new();
        for run in &runs {
            *runs_by_state.entry(run.final_state).or_insert(0) += 1;
        }
        Self {
            runs,
            runs_by_state,
        }
    }

    /// The newest run of `kind`, if any
    pub fn last_run(&self, kind: JobKind) -> Option<&RunRecord> {
        self.runs.iter().find(|r| r.job_kind == kind)
    }

    /// Share of finished runs that completed
    pub fn success_rate(&self) -> f64 {
        let finished: u64 = self
            .runs_by_state
            .iter()
            .filter(|(state, _)| state.is_terminal())
            .map(|(_, count)| count)
            .sum();
        if finished == 0 {
            return 0.0;
        }
        let completed = self
            .runs_by_state
            .get(&JobState::Completed)
            .copied()
            .unwrap_or(0);
        completed as f64 / finished as f64 * 100.0
    }
}

/// Loads the `limit` most recent runs
pub fn load_history(store: &dyn RunStore, limit: usize) -> StorageResult<RunHistory> {
    Ok(RunHistory::from_runs(store.recent_runs(limit)?))
}

/// Renders the history as a plain-text table
pub fn format_history(history: &RunHistory) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Run History ===\n");

    if history.runs.is_empty() {
        let _ = writeln!(out, "No runs recorded.");
        return out;
    }

    let _ = writeln!(
        out,
        "{:>5}  {:<10} {:<10} {:<25} {:>8} {:>7} {:>7}  {}",
        "ID", "JOB", "STATE", "STARTED", "SECS", "PAGES", "ITEMS", "ERROR"
    );
    for run in &history.runs {
        let duration = run
            .duration_seconds()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:>5}  {:<10} {:<10} {:<25} {:>8} {:>7} {:>7}  {}",
            run.id,
            run.job_kind.as_str(),
            run.final_state.to_db_string(),
            run.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            duration,
            run.pages_done,
            run.items_collected,
            run.last_error.as_deref().unwrap_or("")
        );
    }
    let _ = writeln!(out);

    let mut counts: Vec<_> = history.runs_by_state.iter().collect();
    counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.to_db_string().cmp(b.0.to_db_string())));
    let _ = writeln!(out, "Runs by State:");
    for (state, count) in counts {
        let _ = writeln!(out, "  {}: {}", state, count);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Success Rate: {:.1}%", history.success_rate());
    out
}

pub fn print_history(history: &RunHistory) {
    print!("{}", format_history(history));
}
