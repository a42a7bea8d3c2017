//! Output module for crawl artifacts and reports
//!
//! This module handles:
//! - Writing per-category JSON artifacts atomically
//! - Storing downloaded product images
//! - Summarizing the run history for operators

pub mod history;
mod json_sink;
mod traits;

pub use history::{format_history, load_history, print_history, RunHistory};
pub use json_sink::{FileSink, IMAGE_DIR};
pub use traits::{Artifact, OutputError, OutputResult, OutputSink};
