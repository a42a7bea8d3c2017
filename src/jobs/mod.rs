//! Job lifecycle
//!
//! # Components
//!
//! - `JobControl` / `ControlToken`: cooperative pause and stop signalling
//! - `JobRegistry`: per-kind state and at-most-one-run admission
//! - `CrawlJob`: one admitted run, from first page to upload hand-off

mod control;
mod job;
mod registry;

pub use control::{ControlToken, JobControl, Signal};
pub use job::{CrawlJob, JobContext, JobOutcome};
pub use registry::{JobRegistry, JobStatus, RunToken};
