//! Operator control surface
//!
//! The [`Orchestrator`] owns the job registry, the scheduler and the shared
//! run context. Every start request, whether from an operator or from a
//! trigger, goes through the same registry admission.

use crate::categories::JsonCategoryFile;
use crate::config::Config;
use crate::crawler::{build_http_client, HttpPageFetcher, ImageDownloader};
use crate::jobs::{CrawlJob, JobContext, JobOutcome, JobRegistry, JobStatus};
use crate::notify::{IndexSignal, UploadNotifier};
use crate::output::FileSink;
use crate::schedule::{ScheduleSpec, ScheduleView, Scheduler, TriggerError};
use crate::state::JobKind;
use crate::storage::open_storage;
use crate::{ConfigError, HarvestError, JobError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Single owner of all job and schedule state
#[derive(Debug)]
pub struct Orchestrator {
    ctx: Arc<JobContext>,
    registry: Arc<JobRegistry>,
    scheduler: Arc<Scheduler>,
    runs: Mutex<HashMap<JobKind, JoinHandle<JobOutcome>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl Orchestrator {
    pub fn new(ctx: JobContext, scheduler: Scheduler) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            ctx: Arc::new(ctx),
            registry: JobRegistry::new(),
            scheduler: Arc::new(scheduler),
            runs: Mutex::new(HashMap::new()),
            timer: Mutex::new(None),
            shutdown,
        }
    }

    /// Wires the HTTP fetcher, category file, artifact directory, run ledger
    /// and indexing signal described by `config`
    pub fn from_config(config: Config, config_hash: String) -> Result<Self, HarvestError> {
        let source = HttpPageFetcher::new(&config)?;
        let categories = JsonCategoryFile::new(&config.output.categories_path);
        let sink = FileSink::new(&config.output.directory);
        let store = open_storage(Path::new(&config.output.database_path))?;

        let signal = IndexSignal::from_config(&config.embedding)?;
        if let Some(signal) = &signal {
            tracing::info!("Index signal: {} {}", signal.method(), signal.url());
        }
        let notifier = UploadNotifier::new(None, signal, &config.upload);

        let images = if config.crawler.download_images {
            let client = build_http_client(
                &config.user_agent,
                Duration::from_secs(config.crawler.request_timeout_secs),
            )?;
            Some(ImageDownloader::new(client))
        } else {
            None
        };

        let scheduler = Scheduler::from_config(&config.schedule)
            .map_err(|e| ConfigError::Validation(format!("schedule: {}", e)))?;

        let ctx = JobContext {
            config: Arc::new(config),
            source: Arc::new(source),
            categories: Arc::new(categories),
            sink: Arc::new(sink),
            store: Some(Arc::new(store)),
            notifier: Some(Arc::new(notifier)),
            images,
            config_hash,
        };
        Ok(Self::new(ctx, scheduler))
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<JobKind, JoinHandle<JobOutcome>>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn context(&self) -> &Arc<JobContext> {
        &self.ctx
    }

    /// Admits and spawns a run of `kind`, or fails with Busy
    pub fn start(&self, kind: JobKind) -> Result<JobStatus, JobError> {
        // Held across admission so handles are stored in admission order
        let mut runs = self.runs();
        let token = self.registry.try_acquire(kind)?;
        let job = CrawlJob::new(Arc::clone(&self.ctx), token);
        // The previous handle of this kind belongs to a finished run
        runs.insert(kind, tokio::spawn(job.run()));
        drop(runs);
        tracing::info!(job = %kind, "Run started");
        Ok(self.registry.status(kind))
    }

    /// Starts immediately, bypassing triggers; never queued
    pub fn run_now(&self, kind: JobKind) -> Result<JobStatus, JobError> {
        self.start(kind)
    }

    pub fn stop(&self, kind: JobKind) -> Result<JobStatus, JobError> {
        self.registry.stop(kind)
    }

    pub fn pause(&self, kind: JobKind) -> Result<JobStatus, JobError> {
        self.registry.pause(kind)
    }

    pub fn resume(&self, kind: JobKind) -> Result<JobStatus, JobError> {
        self.registry.resume(kind)
    }

    pub fn status(&self, kind: JobKind) -> JobStatus {
        self.registry.status(kind)
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        self.registry.statuses()
    }

    pub fn schedule(&self) -> ScheduleView {
        self.scheduler.view()
    }

    /// Replaces every trigger; rejected as a whole when one is out of range
    pub fn set_schedule(&self, specs: Vec<ScheduleSpec>) -> Result<(), TriggerError> {
        self.scheduler.set_schedule(specs)
    }

    pub fn enable_scheduler(&self) {
        self.scheduler.enable();
    }

    pub fn disable_scheduler(&self) {
        self.scheduler.disable();
    }

    pub fn scheduler_enabled(&self) -> bool {
        self.scheduler.is_enabled()
    }

    /// Starts the background trigger loop; a no-op when already running
    pub fn spawn_timer(self: &Arc<Self>, tick: Duration) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let orchestrator = Arc::downgrade(self);
        let handle = self
            .scheduler
            .spawn_timer(tick, self.shutdown.subscribe(), move |kind| {
                let Some(orchestrator) = orchestrator.upgrade() else {
                    return;
                };
                match orchestrator.start(kind) {
                    Ok(_) => {}
                    Err(JobError::Busy(_)) => {
                        tracing::info!(job = %kind, "Trigger skipped, run already active");
                    }
                    Err(e) => tracing::warn!(job = %kind, "Trigger could not start run: {}", e),
                }
            });
        *timer = Some(handle);
    }

    /// Waits for the most recent run of `kind` to end
    ///
    /// Returns `None` when no run was started since the last wait or the
    /// run's task panicked.
    pub async fn wait(&self, kind: JobKind) -> Option<JobOutcome> {
        let handle = self.runs().remove(&kind)?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(job = %kind, "Run task ended abnormally: {}", e);
                None
            }
        }
    }

    /// Stops the timer, asks every active run to stop and waits for them
    pub async fn shutdown(&self) -> Vec<JobOutcome> {
        tracing::info!("Shutting down");
        self.shutdown.send_replace(true);

        let timer = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(timer) = timer {
            if let Err(e) = timer.await {
                tracing::warn!("Schedule timer ended abnormally: {}", e);
            }
        }

        for kind in self.registry.active_kinds() {
            if let Err(e) = self.registry.stop(kind) {
                tracing::debug!(job = %kind, "Stop during shutdown: {}", e);
            }
        }

        let mut outcomes = Vec::new();
        for kind in JobKind::ALL {
            if let Some(mut outcome) = self.wait(kind).await {
                if let Some(upload) = outcome.upload.take() {
                    upload.abort();
                }
                outcomes.push(outcome);
            }
        }
        outcomes
    }
}
