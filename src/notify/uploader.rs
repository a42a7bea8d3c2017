//! Post-crawl upload
//!
//! Pushes a finished run's artifacts to the document store and then sends
//! the indexing signal. The whole sequence runs in a detached task and is
//! retried on its own schedule; its outcome never touches job state.

use crate::config::UploadConfig;
use crate::notify::signal::IndexSignal;
use crate::notify::{DocumentStore, UploadCounters};
use crate::output::Artifact;
use crate::state::JobKind;
use crate::UploadError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Uploads artifacts and signals the indexer, with whole-sequence retries
pub struct UploadNotifier {
    store: Option<Arc<dyn DocumentStore>>,
    signal: Option<IndexSignal>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl fmt::Debug for UploadNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadNotifier")
            .field("store", &self.store.is_some())
            .field("signal", &self.signal.as_ref().map(|s| s.url().as_str()))
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl UploadNotifier {
    pub fn new(
        store: Option<Arc<dyn DocumentStore>>,
        signal: Option<IndexSignal>,
        config: &UploadConfig,
    ) -> Self {
        Self {
            store,
            signal,
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Nothing configured to upload to or signal
    pub fn is_noop(&self) -> bool {
        self.store.is_none() && self.signal.is_none()
    }

    /// One pass: every artifact to the store, then the signal
    pub async fn notify_once(
        &self,
        kind: JobKind,
        artifacts: &[Artifact],
    ) -> Result<UploadCounters, UploadError> {
        let mut counters = UploadCounters::default();
        if let Some(store) = &self.store {
            for artifact in artifacts {
                counters += store.upload(artifact).await?;
            }
        }
        if let Some(signal) = &self.signal {
            signal.send(kind, &counters).await?;
        }
        Ok(counters)
    }

    /// Runs [`notify_once`](Self::notify_once) with retries until it succeeds
    /// or attempts run out
    pub async fn notify(
        &self,
        kind: JobKind,
        artifacts: &[Artifact],
    ) -> Result<UploadCounters, UploadError> {
        let mut attempt = 1;
        loop {
            match self.notify_once(kind, artifacts).await {
                Ok(counters) => {
                    tracing::info!(job = %kind, ?counters, "Upload finished");
                    return Ok(counters);
                }
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(
                        job = %kind,
                        "Upload attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        e,
                        self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Starts the upload in the background; errors are only logged
    pub fn spawn(self: &Arc<Self>, kind: JobKind, artifacts: Vec<Artifact>) -> JoinHandle<()> {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(kind, &artifacts).await {
                tracing::error!(job = %kind, "Upload gave up: {}", e);
            }
        })
    }
}
