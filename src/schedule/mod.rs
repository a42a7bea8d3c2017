//! Recurring scheduler
//!
//! Holds one trigger per job kind and evaluates them against a fixed-offset
//! wall clock. The scheduler only decides *that* a kind is due; admitting the
//! run is the registry's job, so a disabled scheduler never touches a run
//! already in flight.

mod trigger;

pub use trigger::{Trigger, TriggerError};

use crate::config::{ScheduleConfig, TriggerConfig};
use crate::state::JobKind;
use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// The trigger of one job kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleSpec {
    pub kind: JobKind,
    pub trigger: Trigger,
}

impl ScheduleSpec {
    pub fn new(kind: JobKind, trigger: Trigger) -> Self {
        Self { kind, trigger }
    }
}

/// One row of the schedule snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleEntry {
    pub kind: JobKind,
    pub trigger: Trigger,
    pub description: String,
    pub next_fire: Option<DateTime<FixedOffset>>,
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleView {
    pub enabled: bool,
    pub utc_offset_hours: i32,
    pub entries: Vec<ScheduleEntry>,
}

#[derive(Debug)]
struct SchedulerState {
    enabled: bool,
    specs: Vec<ScheduleSpec>,
    /// Minute slot (minutes since epoch) of each kind's last firing
    last_fired: HashMap<JobKind, i64>,
}

/// Time-based trigger evaluation for every job kind
#[derive(Debug)]
pub struct Scheduler {
    offset: FixedOffset,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(offset: FixedOffset, specs: Vec<ScheduleSpec>, enabled: bool) -> Self {
        Self {
            offset,
            state: Mutex::new(SchedulerState {
                enabled,
                specs: dedupe(specs),
                last_fired: HashMap::new(),
            }),
        }
    }

    /// Builds the scheduler from the `[schedule]` config section
    pub fn from_config(config: &ScheduleConfig) -> Result<Self, TriggerError> {
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix());
        Ok(Self::new(offset, specs_from_config(config)?, config.enabled))
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current scheduler wall-clock time
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn enable(&self) {
        self.enable_at(self.now());
    }

    /// Enables firing; a trigger matching the minute of `now` waits for its
    /// next slot
    pub fn enable_at(&self, now: DateTime<FixedOffset>) {
        let mut state = self.lock();
        state.enabled = true;
        self.mark_slot(&mut state, now);
        tracing::info!("Scheduler enabled");
    }

    /// Suppresses firings; runs already admitted are unaffected
    pub fn disable(&self) {
        self.lock().enabled = false;
        tracing::info!("Scheduler disabled");
    }

    /// Replaces the whole trigger set; later entries win for a repeated kind
    pub fn set_schedule(&self, specs: Vec<ScheduleSpec>) -> Result<(), TriggerError> {
        self.set_schedule_at(specs, self.now())
    }

    /// Replaces the trigger set as of `now`
    ///
    /// Nothing is replaced when any trigger is out of range. A new trigger
    /// matching the minute of `now` first fires at its next slot.
    pub fn set_schedule_at(
        &self,
        specs: Vec<ScheduleSpec>,
        now: DateTime<FixedOffset>,
    ) -> Result<(), TriggerError> {
        for spec in &specs {
            spec.trigger.validate()?;
        }
        let specs = dedupe(specs);
        for spec in &specs {
            tracing::info!(job = %spec.kind, "Schedule: {}", spec.trigger);
        }

        let mut state = self.lock();
        state.specs = specs;
        self.mark_slot(&mut state, now);
        Ok(())
    }

    pub fn specs(&self) -> Vec<ScheduleSpec> {
        self.lock().specs.clone()
    }

    pub fn view_at(&self, now: DateTime<FixedOffset>) -> ScheduleView {
        let state = self.lock();
        ScheduleView {
            enabled: state.enabled,
            utc_offset_hours: self.offset.local_minus_utc() / 3600,
            entries: state
                .specs
                .iter()
                .map(|spec| ScheduleEntry {
                    kind: spec.kind,
                    trigger: spec.trigger.clone(),
                    description: spec.trigger.to_string(),
                    next_fire: spec.trigger.next_fire_after(now),
                })
                .collect(),
        }
    }

    pub fn view(&self) -> ScheduleView {
        self.view_at(self.now())
    }

    /// Kinds due in the minute slot containing `now`
    ///
    /// Each kind fires at most once per slot. Slots that passed without a
    /// tick are never fired afterwards.
    pub fn tick_at(&self, now: DateTime<FixedOffset>) -> Vec<JobKind> {
        let mut state = self.lock();
        if !state.enabled {
            // Slots seen while disabled still count as consumed
            self.mark_slot(&mut state, now);
            return Vec::new();
        }

        let slot = now.timestamp().div_euclid(60);
        self.due_at(&state, now)
            .into_iter()
            .filter(|kind| state.last_fired.insert(*kind, slot) != Some(slot))
            .collect()
    }

    fn due_at(&self, state: &SchedulerState, now: DateTime<FixedOffset>) -> Vec<JobKind> {
        let now = now.with_timezone(&self.offset);
        let (hour, minute) = (now.hour(), now.minute());
        state
            .specs
            .iter()
            .filter(|spec| spec.trigger.matches(hour, minute))
            .map(|spec| spec.kind)
            .collect()
    }

    /// Records the slot of `now` as fired for every matching kind
    fn mark_slot(&self, state: &mut SchedulerState, now: DateTime<FixedOffset>) {
        let slot = now.timestamp().div_euclid(60);
        for kind in self.due_at(state, now) {
            state.last_fired.insert(kind, slot);
        }
    }

    /// Evaluates triggers every `tick` until `shutdown` flips to true
    pub fn spawn_timer<F>(
        self: &Arc<Self>,
        tick: Duration,
        mut shutdown: watch::Receiver<bool>,
        on_fire: F,
    ) -> JoinHandle<()>
    where
        F: Fn(JobKind) + Send + 'static,
    {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(tick.max(Duration::from_millis(10)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!("Schedule timer started (every {:?})", tick);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for kind in scheduler.tick_at(scheduler.now()) {
                            tracing::info!(job = %kind, "Trigger fired");
                            on_fire(kind);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("Schedule timer stopped");
        })
    }
}

/// Keeps one spec per kind, the last one given
fn dedupe(specs: Vec<ScheduleSpec>) -> Vec<ScheduleSpec> {
    let mut out: Vec<ScheduleSpec> = Vec::with_capacity(specs.len());
    for spec in specs {
        match out.iter_mut().find(|s| s.kind == spec.kind) {
            Some(existing) => *existing = spec,
            None => out.push(spec),
        }
    }
    out
}

/// Triggers configured in the `[schedule]` section, in kind order
pub fn specs_from_config(config: &ScheduleConfig) -> Result<Vec<ScheduleSpec>, TriggerError> {
    let entries: [(JobKind, &Option<TriggerConfig>); 3] = [
        (JobKind::Full, &config.full),
        (JobKind::Price, &config.price),
        (JobKind::NonPrice, &config.non_price),
    ];
    entries
        .into_iter()
        .filter_map(|(kind, trigger)| trigger.as_ref().map(|t| (kind, t)))
        .map(|(kind, t)| Ok(ScheduleSpec::new(kind, Trigger::from_fields(&t.hour, t.minute)?)))
        .collect()
}
