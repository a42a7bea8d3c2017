//! Output sink trait and error types
//!
//! This module defines where harvested artifacts go. The job hands the sink
//! complete, ordered item lists; the sink decides how they are made durable.

use crate::categories::Category;
use crate::crawler::ItemRecord;
use crate::state::JobKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// A written artifact, as handed to the upload step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: JobKind,
    pub category: String,
    pub path: PathBuf,
    pub item_count: usize,
}

/// Durable destination for crawl output
///
/// Implementations must replace an artifact atomically: a reader sees either
/// the previous complete file or the new complete file, never a mix.
pub trait OutputSink: Send + Sync {
    /// Writes the full item list for one category, replacing earlier output
    fn write_items(
        &self,
        kind: JobKind,
        category: &Category,
        items: &[ItemRecord],
    ) -> OutputResult<Artifact>;

    /// Stores image bytes for one product
    fn save_image(&self, category: &Category, file_name: &str, bytes: &[u8])
        -> OutputResult<PathBuf>;

    /// Size of a previously saved image, if present
    fn image_size(&self, category: &Category, file_name: &str) -> Option<u64>;
}
