//! Catalog Harvester: a scheduled, cooperatively controlled catalog crawler
//!
//! This crate walks a paginated retail catalog per category, persists the
//! harvested items as JSON artifacts, and drives those crawls from a
//! forward-only recurring scheduler plus on-demand operator commands.

pub mod categories;
pub mod config;
pub mod crawler;
pub mod jobs;
pub mod notify;
pub mod orchestrator;
pub mod output;
pub mod schedule;
pub mod state;
pub mod storage;
pub mod url;

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure taxonomy surfaced to operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeouts, 5xx, 429 and connection resets; retried with backoff
    TransientNetwork,
    /// A 4xx other than 429; the catalog is refusing us
    ClientRejected,
    /// The page structure no longer matches the parser
    ParseFailure,
    /// A start request conflicted with a run already occupying the slot
    Busy,
    /// Document store or indexing signal failure
    UploadFailure,
}

impl ErrorKind {
    /// Whether the same request may succeed if simply repeated
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientNetwork)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::ClientRejected => "client_rejected",
            ErrorKind::ParseFailure => "parse_failure",
            ErrorKind::Busy => "busy",
            ErrorKind::UploadFailure => "upload_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// The operator-facing classification, when this error has one
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            HarvestError::Fetch(e) => Some(e.kind),
            HarvestError::Job(e) => e.kind(),
            HarvestError::Upload(_) => Some(ErrorKind::UploadFailure),
            _ => None,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),
}

/// A failed page fetch, classified for the retry loop and the job
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::TransientNetwork,
            message: message.into(),
            status: None,
        }
    }

    pub fn client_rejected(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ClientRejected,
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ParseFailure,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Lifecycle control errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("job '{0}' is already running")]
    Busy(state::JobKind),

    #[error("cannot {action} job '{kind}' while it is {from}")]
    InvalidTransition {
        kind: state::JobKind,
        from: state::JobState,
        action: &'static str,
    },
}

impl JobError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            JobError::Busy(_) => Some(ErrorKind::Busy),
            JobError::InvalidTransition { .. } => None,
        }
    }
}

/// Post-crawl upload and indexing signal errors
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to read artifact {path}: {message}")]
    Artifact { path: String, message: String },

    #[error("Document store rejected {artifact}: {message}")]
    Store { artifact: String, message: String },

    #[error("Index signal to {url} failed: {message}")]
    Signal { url: String, message: String },
}

/// Result type alias for harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use jobs::{ControlToken, JobRegistry, JobStatus, RunToken};
pub use orchestrator::Orchestrator;
pub use schedule::{ScheduleSpec, Scheduler, Trigger};
pub use state::{JobKind, JobState};
