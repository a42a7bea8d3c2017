//! One admitted crawl run
//!
//! A [`CrawlJob`] walks every category of its kind in order, persists
//! checkpoints and final artifacts, records the run in the ledger and hands
//! the result to the upload step. The [`RunToken`] it owns is released
//! exactly once with the run's terminal state.

use crate::categories::{Category, CategorySource};
use crate::config::Config;
use crate::crawler::{
    ImageDownloader, ItemRecord, PageSource, PaginationWalker, WalkConfig, WalkEvent,
};
use crate::jobs::{ControlToken, RunToken};
use crate::notify::UploadNotifier;
use crate::output::{Artifact, OutputSink};
use crate::state::{JobKind, JobState};
use crate::storage::{CrawlCheckpoint, RunStore};
use crate::FetchError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Collaborators shared by every run
pub struct JobContext {
    pub config: Arc<Config>,
    pub source: Arc<dyn PageSource>,
    pub categories: Arc<dyn CategorySource>,
    pub sink: Arc<dyn OutputSink>,
    pub store: Option<Arc<dyn RunStore>>,
    pub notifier: Option<Arc<UploadNotifier>>,
    pub images: Option<ImageDownloader>,
    /// Recorded with every run row
    pub config_hash: String,
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("store", &self.store.is_some())
            .field("notifier", &self.notifier)
            .field("images", &self.images.is_some())
            .field("config_hash", &self.config_hash)
            .finish()
    }
}

/// How a run ended
#[derive(Debug)]
pub struct JobOutcome {
    pub kind: JobKind,
    pub state: JobState,
    pub pages_done: u64,
    pub items_collected: u64,
    /// Final artifacts written by this run, in category order
    pub artifacts: Vec<Artifact>,
    pub error: Option<FetchError>,
    /// The detached upload task, when one was started
    pub upload: Option<JoinHandle<()>>,
}

/// Why the category loop ended early
enum Interruption {
    Stopped,
    Fetch(FetchError),
    Output(String),
}

pub struct CrawlJob {
    ctx: Arc<JobContext>,
    token: RunToken,
    control: ControlToken,
    started_at: DateTime<Utc>,
    run_id: Option<i64>,
    pages_done: u64,
    items_done: u64,
}

impl CrawlJob {
    pub fn new(ctx: Arc<JobContext>, token: RunToken) -> Self {
        let control = token.control();
        Self {
            ctx,
            token,
            control,
            started_at: Utc::now(),
            run_id: None,
            pages_done: 0,
            items_done: 0,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.token.kind()
    }

    /// Runs to a terminal state and releases the slot
    pub async fn run(mut self) -> JobOutcome {
        let kind = self.kind();
        self.run_id = self.ctx.store.as_ref().and_then(|store| {
            store
                .start_run(kind, &self.ctx.config_hash)
                .map_err(|e| tracing::warn!(job = %kind, "Could not record run start: {}", e))
                .ok()
        });

        let categories = self.ctx.categories.load();
        tracing::info!(job = %kind, "Starting run over {} categories", categories.len());

        let mut artifacts = Vec::new();
        let mut interruption = None;
        for category in &categories {
            if self.control.is_stopped() {
                interruption = Some(Interruption::Stopped);
                break;
            }
            match self.crawl_category(category).await {
                Ok((artifact, cancelled)) => {
                    artifacts.extend(artifact);
                    if cancelled {
                        interruption = Some(Interruption::Stopped);
                        break;
                    }
                }
                Err(e) => {
                    interruption = Some(e);
                    break;
                }
            }
        }

        let (state, error, message) = match interruption {
            None if self.control.is_stopped() => (JobState::Stopped, None, None),
            None => (JobState::Completed, None, None),
            Some(Interruption::Stopped) => (JobState::Stopped, None, None),
            Some(Interruption::Fetch(e)) => {
                let message = e.to_string();
                (JobState::Failed, Some(e), Some(message))
            }
            Some(Interruption::Output(message)) => (JobState::Failed, None, Some(message)),
        };

        self.finish(state, error, message, artifacts)
    }

    /// Walks one category; returns its artifact and whether a stop cut it short
    async fn crawl_category(
        &mut self,
        category: &Category,
    ) -> Result<(Option<Artifact>, bool), Interruption> {
        let kind = self.kind();
        self.token
            .record_progress(self.pages_done, self.items_done, Some(&category.name));

        let mut walker = PaginationWalker::new(
            Arc::clone(&self.ctx.source),
            category.clone(),
            kind,
            WalkConfig::from(&self.ctx.config.crawler),
            self.control.clone(),
        );

        let mut cancelled = false;
        while let Some(event) = walker.next().await {
            match event {
                WalkEvent::Page { total_items, .. } => {
                    self.pages_done += 1;
                    self.token.record_progress(
                        self.pages_done,
                        self.items_done + total_items as u64,
                        None,
                    );
                }
                WalkEvent::Checkpoint {
                    last_completed_page,
                    items,
                } => self.checkpoint(category, last_completed_page, &items),
                WalkEvent::Finished(reason) => cancelled = reason.is_cancelled(),
                WalkEvent::Failed { page, error } => {
                    tracing::error!(
                        job = %kind,
                        category = %category.name,
                        page,
                        "Run failed: {}",
                        error
                    );
                    return Err(Interruption::Fetch(error));
                }
            }
        }

        let items = walker.into_items();
        // A walk stopped before its first page must not clobber earlier output
        if cancelled && items.is_empty() {
            return Ok((None, true));
        }

        let artifact = self
            .ctx
            .sink
            .write_items(kind, category, &items)
            .map_err(|e| {
                tracing::error!(job = %kind, category = %category.name, "Write failed: {}", e);
                Interruption::Output(format!("failed to write {}: {}", category.name, e))
            })?;
        self.items_done += items.len() as u64;
        self.token.record_progress(self.pages_done, self.items_done, None);

        if !cancelled && self.wants_images() {
            cancelled = self.download_images(category, &items).await;
        }

        Ok((Some(artifact), cancelled))
    }

    fn wants_images(&self) -> bool {
        self.kind().harvests_images()
            && self.ctx.config.crawler.download_images
            && self.ctx.images.is_some()
    }

    async fn download_images(&mut self, category: &Category, items: &[ItemRecord]) -> bool {
        let Some(images) = &self.ctx.images else {
            return false;
        };
        let report = images
            .download_category(self.ctx.sink.as_ref(), category, items, &mut self.control)
            .await;
        report.cancelled
    }

    /// Persists a checkpoint as the category artifact and in the ledger
    fn checkpoint(&self, category: &Category, last_completed_page: u32, items: &[ItemRecord]) {
        let kind = self.kind();
        if let Err(e) = self.ctx.sink.write_items(kind, category, items) {
            tracing::warn!(
                job = %kind,
                category = %category.name,
                "Checkpoint write failed: {}",
                e
            );
        }

        if let Some(store) = &self.ctx.store {
            let checkpoint = CrawlCheckpoint {
                job_kind: kind,
                category_id: category.id.clone(),
                category_name: category.name.clone(),
                run_id: self.run_id,
                last_completed_page,
                accumulated_item_count: items.len() as u64,
                started_at: self.started_at,
            };
            if let Err(e) = store.save_checkpoint(&checkpoint) {
                tracing::warn!(job = %kind, "Checkpoint ledger write failed: {}", e);
            }
        }

        tracing::info!(
            job = %kind,
            category = %category.name,
            page = last_completed_page,
            "Checkpoint: {} items",
            items.len()
        );
    }

    fn finish(
        self,
        state: JobState,
        error: Option<FetchError>,
        message: Option<String>,
        artifacts: Vec<Artifact>,
    ) -> JobOutcome {
        let kind = self.kind();
        let (pages_done, items_collected) = (self.pages_done, self.items_done);

        if let (Some(store), Some(run_id)) = (&self.ctx.store, self.run_id) {
            if let Err(e) =
                store.finish_run(run_id, state, pages_done, items_collected, message.as_deref())
            {
                tracing::warn!(job = %kind, "Could not record run end: {}", e);
            }
        }

        let upload_allowed = match state {
            JobState::Completed => true,
            JobState::Stopped => self.ctx.config.upload.on_partial,
            _ => false,
        };
        let notifier = self.ctx.notifier.clone();

        tracing::info!(
            job = %kind,
            state = %state,
            pages = pages_done,
            items = items_collected,
            "Run finished"
        );
        match (&error, message) {
            (Some(e), _) => self.token.release(state, Some((e.kind, e.message.clone()))),
            (None, Some(message)) => self.token.fail(message),
            (None, None) => self.token.release(state, None),
        }

        let upload = match notifier {
            Some(notifier) if upload_allowed && !notifier.is_noop() => {
                Some(notifier.spawn(kind, artifacts.clone()))
            }
            _ => None,
        };

        JobOutcome {
            kind,
            state,
            pages_done,
            items_collected,
            artifacts,
            error,
            upload,
        }
    }
}
