//! State module for tracking job lifecycles
//!
//! # Components
//!
//! - `JobKind`: The fixed set of recurring crawls (full, price-only, non-price)
//! - `JobState`: The lifecycle state of a job kind (idle, running, paused, ...)

mod job_kind;
mod job_state;

// Re-export main types
pub use job_kind::JobKind;
pub use job_state::JobState;
