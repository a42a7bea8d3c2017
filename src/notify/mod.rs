//! Post-crawl notification
//!
//! After a run finishes, its artifacts may be pushed to a document store and
//! an indexing service told to pick them up. Both are optional and neither
//! can change the outcome of the run.

mod signal;
mod uploader;

pub use signal::{IndexSignal, SignalMethod, SIGNAL_SOURCE};
pub use uploader::UploadNotifier;

use crate::output::Artifact;
use crate::UploadError;
use async_trait::async_trait;
use serde::Serialize;
use std::ops::AddAssign;

/// What the document store did with the uploaded records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadCounters {
    pub price_updated: u64,
    pub price_skipped: u64,
    pub product_new: u64,
    pub product_updated: u64,
    pub product_skipped: u64,
}

impl AddAssign for UploadCounters {
    fn add_assign(&mut self, other: Self) {
        self.price_updated += other.price_updated;
        self.price_skipped += other.price_skipped;
        self.product_new += other.product_new;
        self.product_updated += other.product_updated;
        self.product_skipped += other.product_skipped;
    }
}

/// Downstream store receiving finished artifacts
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn upload(&self, artifact: &Artifact) -> Result<UploadCounters, UploadError>;
}
