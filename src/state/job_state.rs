/// Job lifecycle state definitions
///
/// This module defines every state a job kind can be in, from idle through
/// the cooperative pause/stop states to the terminal outcomes.
use serde::Serialize;
use std::fmt;

/// Represents the current lifecycle state of a job kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Never started in this process
    Idle,

    // ===== Occupying States =====
    /// A crawl is walking pages
    Running,

    /// Pause requested, not yet honored at a page boundary
    Pausing,

    /// Parked at a page boundary until resumed or stopped
    Paused,

    /// Stop requested, not yet honored at a page boundary
    Stopping,

    // ===== Terminal States =====
    /// Stopped by an operator; partial output remains on disk
    Stopped,

    /// Ended on a non-retryable error or exhausted retries
    Failed,

    /// Every category walk ended through its stop policy
    Completed,
}

impl JobState {
    /// Returns true if a run currently holds the slot for this kind
    ///
    /// Only one run per kind may be in an occupying state at a time.
    pub fn is_occupied(&self) -> bool {
        matches!(
            self,
            Self::Running | Self::Pausing | Self::Paused | Self::Stopping
        )
    }

    /// Returns true if this is a terminal outcome of a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed | Self::Completed)
    }

    /// Returns true if a new run may be admitted from this state
    pub fn admits_start(&self) -> bool {
        !self.is_occupied()
    }

    /// Converts the state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    /// Parses a state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "pausing" => Some(Self::Pausing),
            "paused" => Some(Self::Paused),
            "stopping" => Some(Self::Stopping),
            "stopped" => Some(Self::Stopped),
            "failed" => Some(Self::Failed),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Returns all possible job states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Idle,
            Self::Running,
            Self::Pausing,
            Self::Paused,
            Self::Stopping,
            Self::Stopped,
            Self::Failed,
            Self::Completed,
        ]
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
