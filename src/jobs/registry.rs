//! Job registry: per-kind lifecycle state and run admission
//!
//! The registry is the only structure mutated from several call paths at
//! once (the schedule timer, operator commands and the running jobs
//! themselves), so every operation takes the slot map lock for a short,
//! non-blocking critical section.

use crate::jobs::control::{ControlToken, JobControl};
use crate::state::{JobKind, JobState};
use crate::{ErrorKind, JobError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Point-in-time view of one job kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub kind: JobKind,
    pub state: JobState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Pages fetched successfully across all categories of the run
    pub pages_done: u64,
    pub items_collected: u64,
    pub current_category: Option<String>,
    pub last_error: Option<String>,
    pub last_error_kind: Option<ErrorKind>,
}

#[derive(Debug)]
struct Slot {
    state: JobState,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    pages_done: u64,
    items_collected: u64,
    current_category: Option<String>,
    last_error: Option<String>,
    last_error_kind: Option<ErrorKind>,
    /// Incremented on every admission; stale tokens cannot touch a newer run
    generation: u64,
    control: Option<JobControl>,
}

impl Slot {
    fn idle() -> Self {
        Self {
            state: JobState::Idle,
            started_at: None,
            finished_at: None,
            pages_done: 0,
            items_collected: 0,
            current_category: None,
            last_error: None,
            last_error_kind: None,
            generation: 0,
            control: None,
        }
    }

    fn snapshot(&self, kind: JobKind) -> JobStatus {
        JobStatus {
            kind,
            state: self.state,
            started_at: self.started_at,
            finished_at: self.finished_at,
            pages_done: self.pages_done,
            items_collected: self.items_collected,
            current_category: self.current_category.clone(),
            last_error: self.last_error.clone(),
            last_error_kind: self.last_error_kind,
        }
    }
}

/// Tracks lifecycle state for every job kind and admits at most one run per kind
#[derive(Debug)]
pub struct JobRegistry {
    slots: Mutex<HashMap<JobKind, Slot>>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self {
            slots: Mutex::new(JobKind::ALL.iter().map(|k| (*k, Slot::idle())).collect()),
        }
    }
}

impl JobRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobKind, Slot>> {
        // Slot updates are single assignments; a poisoned map is still consistent
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_slot<T>(&self, kind: JobKind, f: impl FnOnce(&mut Slot) -> T) -> T {
        let mut slots = self.lock();
        let slot = slots.entry(kind).or_insert_with(Slot::idle);
        f(slot)
    }

    /// Admits a run of `kind`, or fails with [`JobError::Busy`]
    ///
    /// Atomic with respect to concurrent callers: of two simultaneous
    /// requests for the same kind exactly one is admitted.
    pub fn try_acquire(self: &Arc<Self>, kind: JobKind) -> Result<RunToken, JobError> {
        let (generation, control) = self.with_slot(kind, |slot| {
            if !slot.state.admits_start() {
                return Err(JobError::Busy(kind));
            }

            let control = JobControl::new();
            slot.generation += 1;
            slot.state = JobState::Running;
            slot.started_at = Some(Utc::now());
            slot.finished_at = None;
            slot.pages_done = 0;
            slot.items_collected = 0;
            slot.current_category = None;
            slot.last_error = None;
            slot.last_error_kind = None;

            let registry = Arc::downgrade(self);
            let generation = slot.generation;
            let token = control.token(Some(Arc::new(move || {
                mark_parked(&registry, kind, generation);
            })));
            slot.control = Some(control);
            Ok((generation, token))
        })?;

        tracing::info!(job = %kind, "Run admitted");
        Ok(RunToken {
            registry: Arc::clone(self),
            kind,
            generation,
            control,
            released: false,
        })
    }

    /// Requests a pause; honored at the job's next page boundary
    pub fn pause(&self, kind: JobKind) -> Result<JobStatus, JobError> {
        self.with_slot(kind, |slot| {
            match slot.state {
                JobState::Running => {
                    slot.state = JobState::Pausing;
                    if let Some(control) = &slot.control {
                        control.pause();
                    }
                }
                JobState::Pausing | JobState::Paused => {}
                from => {
                    return Err(JobError::InvalidTransition {
                        kind,
                        from,
                        action: "pause",
                    })
                }
            }
            Ok(slot.snapshot(kind))
        })
    }

    /// Resumes a paused job, or cancels a pause not yet honored
    pub fn resume(&self, kind: JobKind) -> Result<JobStatus, JobError> {
        self.with_slot(kind, |slot| {
            match slot.state {
                JobState::Pausing | JobState::Paused => {
                    slot.state = JobState::Running;
                    if let Some(control) = &slot.control {
                        control.resume();
                    }
                }
                JobState::Running => {}
                from => {
                    return Err(JobError::InvalidTransition {
                        kind,
                        from,
                        action: "resume",
                    })
                }
            }
            Ok(slot.snapshot(kind))
        })
    }

    /// Requests a stop; honored at the job's next page boundary or retry
    pub fn stop(&self, kind: JobKind) -> Result<JobStatus, JobError> {
        self.with_slot(kind, |slot| {
            match slot.state {
                JobState::Running | JobState::Pausing | JobState::Paused => {
                    slot.state = JobState::Stopping;
                    if let Some(control) = &slot.control {
                        control.stop();
                    }
                }
                JobState::Stopping => {}
                from => {
                    return Err(JobError::InvalidTransition {
                        kind,
                        from,
                        action: "stop",
                    })
                }
            }
            Ok(slot.snapshot(kind))
        })
    }

    /// Current state plus run metadata; never blocks on the job itself
    pub fn status(&self, kind: JobKind) -> JobStatus {
        self.with_slot(kind, |slot| slot.snapshot(kind))
    }

    /// Status of every job kind, in declaration order
    pub fn statuses(&self) -> Vec<JobStatus> {
        let slots = self.lock();
        JobKind::ALL
            .iter()
            .map(|kind| match slots.get(kind) {
                Some(slot) => slot.snapshot(*kind),
                None => Slot::idle().snapshot(*kind),
            })
            .collect()
    }

    /// Kinds whose slot is currently occupied
    pub fn active_kinds(&self) -> Vec<JobKind> {
        let slots = self.lock();
        JobKind::ALL
            .iter()
            .copied()
            .filter(|kind| slots.get(kind).is_some_and(|s| s.state.is_occupied()))
            .collect()
    }

    fn update_current<F: FnOnce(&mut Slot)>(&self, kind: JobKind, generation: u64, f: F) {
        self.with_slot(kind, |slot| {
            if slot.generation == generation {
                f(slot);
            }
        });
    }

    fn release(
        &self,
        kind: JobKind,
        generation: u64,
        final_state: JobState,
        error_kind: Option<ErrorKind>,
        message: Option<String>,
    ) {
        self.update_current(kind, generation, |slot| {
            slot.state = final_state;
            slot.finished_at = Some(Utc::now());
            slot.control = None;
            slot.current_category = None;
            if message.is_some() {
                slot.last_error_kind = error_kind;
                slot.last_error = message;
            }
        });
        tracing::info!(job = %kind, state = %final_state, "Run released");
    }
}

fn mark_parked(registry: &Weak<JobRegistry>, kind: JobKind, generation: u64) {
    if let Some(registry) = registry.upgrade() {
        registry.update_current(kind, generation, |slot| {
            if slot.state == JobState::Pausing {
                slot.state = JobState::Paused;
            }
        });
    }
}

/// Proof of admission for one run
///
/// Dropping a token without [`RunToken::release`] marks the run Failed, so a
/// panicking job cannot leave its kind occupied.
#[derive(Debug)]
pub struct RunToken {
    registry: Arc<JobRegistry>,
    kind: JobKind,
    generation: u64,
    control: ControlToken,
    released: bool,
}

impl RunToken {
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// A control token for the walk and its fetches
    pub fn control(&self) -> ControlToken {
        self.control.clone()
    }

    pub fn record_progress(&self, pages_done: u64, items_collected: u64, category: Option<&str>) {
        self.registry
            .update_current(self.kind, self.generation, |slot| {
                slot.pages_done = pages_done;
                slot.items_collected = items_collected;
                if let Some(name) = category {
                    slot.current_category = Some(name.to_string());
                }
            });
    }

    /// Records the terminal state of the run and frees the slot
    pub fn release(mut self, final_state: JobState, error: Option<(ErrorKind, String)>) {
        self.released = true;
        let (error_kind, message) = match error {
            Some((kind, message)) => (Some(kind), Some(message)),
            None => (None, None),
        };
        self.registry
            .release(self.kind, self.generation, final_state, error_kind, message);
    }

    /// Releases as Failed for a failure outside the fetch taxonomy
    pub fn fail(mut self, message: impl Into<String>) {
        self.released = true;
        self.registry.release(
            self.kind,
            self.generation,
            JobState::Failed,
            None,
            Some(message.into()),
        );
    }
}

impl Drop for RunToken {
    fn drop(&mut self) {
        if !self.released {
            tracing::error!(job = %self.kind, "Run ended without releasing its slot");
            self.registry.release(
                self.kind,
                self.generation,
                JobState::Failed,
                None,
                Some("run aborted".to_string()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_all_kinds_start_idle() {
        let registry = JobRegistry::new();
        let statuses = registry.statuses();
        assert_eq!(statuses.len(), 3);
        assert!(statuses.iter().all(|s| s.state == JobState::Idle));
    }

    #[test]
    fn test_second_acquire_is_busy() {
        let registry = JobRegistry::new();
        let token = registry.try_acquire(JobKind::Price).unwrap();
        assert_eq!(
            registry.try_acquire(JobKind::Price).unwrap_err(),
            JobError::Busy(JobKind::Price)
        );
        // Other kinds are independent
        let other = registry.try_acquire(JobKind::Full).unwrap();

        token.release(JobState::Completed, None);
        other.release(JobState::Completed, None);
        assert!(registry.try_acquire(JobKind::Price).is_ok());
    }

    #[test]
    fn test_concurrent_acquire_admits_exactly_one() {
        for _ in 0..50 {
            let registry = JobRegistry::new();
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let registry = registry.clone();
                    thread::spawn(move || registry.try_acquire(JobKind::Full).map(|t| {
                        std::mem::forget(t);
                    }))
                })
                .collect();

            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert_eq!(
                results.iter().filter(|r| matches!(r, Err(JobError::Busy(_)))).count(),
                1
            );
        }
    }

    #[test]
    fn test_terminal_states_admit_start() {
        for final_state in [JobState::Completed, JobState::Stopped, JobState::Failed] {
            let registry = JobRegistry::new();
            registry
                .try_acquire(JobKind::NonPrice)
                .unwrap()
                .release(final_state, None);
            assert_eq!(registry.status(JobKind::NonPrice).state, final_state);
            assert!(registry.try_acquire(JobKind::NonPrice).is_ok());
        }
    }

    #[test]
    fn test_pause_resume_stop_transitions() {
        let registry = JobRegistry::new();
        let token = registry.try_acquire(JobKind::Full).unwrap();

        assert_eq!(registry.pause(JobKind::Full).unwrap().state, JobState::Pausing);
        assert_eq!(registry.resume(JobKind::Full).unwrap().state, JobState::Running);
        assert_eq!(registry.pause(JobKind::Full).unwrap().state, JobState::Pausing);
        assert_eq!(registry.stop(JobKind::Full).unwrap().state, JobState::Stopping);
        assert!(matches!(
            registry.resume(JobKind::Full),
            Err(JobError::InvalidTransition { action: "resume", .. })
        ));

        token.release(JobState::Stopped, None);
        assert_eq!(registry.status(JobKind::Full).state, JobState::Stopped);
    }

    #[test]
    fn test_control_requests_on_idle_kind_are_rejected() {
        let registry = JobRegistry::new();
        assert!(matches!(
            registry.pause(JobKind::Price),
            Err(JobError::InvalidTransition {
                from: JobState::Idle,
                ..
            })
        ));
        assert!(registry.stop(JobKind::Price).is_err());
    }

    #[tokio::test]
    async fn test_parking_marks_paused() {
        let registry = JobRegistry::new();
        let token = registry.try_acquire(JobKind::Full).unwrap();
        let mut control = token.control();

        registry.pause(JobKind::Full).unwrap();
        let parked = tokio::spawn(async move { control.proceed().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(registry.status(JobKind::Full).state, JobState::Paused);

        registry.resume(JobKind::Full).unwrap();
        assert!(parked.await.unwrap());
        assert_eq!(registry.status(JobKind::Full).state, JobState::Running);
        token.release(JobState::Completed, None);
    }

    #[test]
    fn test_progress_and_error_recorded() {
        let registry = JobRegistry::new();
        let token = registry.try_acquire(JobKind::Price).unwrap();
        token.record_progress(4, 120, Some("Fruits"));

        let status = registry.status(JobKind::Price);
        assert_eq!(status.pages_done, 4);
        assert_eq!(status.items_collected, 120);
        assert_eq!(status.current_category.as_deref(), Some("Fruits"));

        token.release(
            JobState::Failed,
            Some((ErrorKind::ClientRejected, "HTTP 403".to_string())),
        );
        let status = registry.status(JobKind::Price);
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.pages_done, 4);
        assert_eq!(status.last_error_kind, Some(ErrorKind::ClientRejected));
        assert!(status.finished_at.is_some());
    }

    #[test]
    fn test_dropped_token_marks_failed() {
        let registry = JobRegistry::new();
        drop(registry.try_acquire(JobKind::Full).unwrap());
        let status = registry.status(JobKind::Full);
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.last_error.as_deref(), Some("run aborted"));
    }

    #[test]
    fn test_stale_token_cannot_touch_new_run() {
        let registry = JobRegistry::new();
        let first = registry.try_acquire(JobKind::Full).unwrap();
        let stale_generation = first.generation;
        first.release(JobState::Completed, None);

        let second = registry.try_acquire(JobKind::Full).unwrap();
        registry.release(JobKind::Full, stale_generation, JobState::Failed, None, None);
        assert_eq!(registry.status(JobKind::Full).state, JobState::Running);
        second.release(JobState::Completed, None);
    }
}
