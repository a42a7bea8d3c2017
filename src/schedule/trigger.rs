//! Recurring trigger definitions
//!
//! A trigger is the cron-style `hour`/`minute` pair of one job kind, parsed
//! into an explicit variant instead of nullable fields.

use chrono::{DateTime, Duration, DurationRound, FixedOffset, Timelike};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error("invalid hour '{0}' (expected 0-23, '*' or a list such as 1-2,5-23)")]
    InvalidHour(String),

    #[error("invalid minute {0} (expected 0-59)")]
    InvalidMinute(u32),
}

/// When a job kind fires, in scheduler wall-clock time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Every hour at the given minute
    EveryHourAt(u32),
    /// Once a day at hour:minute
    DailyAt(u32, u32),
    /// At the given minute of each listed hour (sorted, unique)
    HoursAt(Vec<u32>, u32),
}

impl Trigger {
    /// Parses cron-style fields
    ///
    /// `hour` may be empty or `*` (every hour), a single hour, or a list of
    /// hours and inclusive ranges such as `1-2,5-23`.
    ///
    /// # Examples
    ///
    /// ```
    /// use catalog_harvester::Trigger;
    ///
    /// assert_eq!(Trigger::from_fields("3", 30).unwrap(), Trigger::DailyAt(3, 30));
    /// assert_eq!(Trigger::from_fields("*", 5).unwrap(), Trigger::EveryHourAt(5));
    /// assert_eq!(
    ///     Trigger::from_fields("1-2,5", 30).unwrap(),
    ///     Trigger::HoursAt(vec![1, 2, 5], 30)
    /// );
    /// ```
    pub fn from_fields(hour: &str, minute: u32) -> Result<Self, TriggerError> {
        if minute > 59 {
            return Err(TriggerError::InvalidMinute(minute));
        }

        let hour = hour.trim();
        if hour.is_empty() || hour == "*" {
            return Ok(Trigger::EveryHourAt(minute));
        }

        let invalid = || TriggerError::InvalidHour(hour.to_string());
        let parse_hour = |raw: &str| -> Result<u32, TriggerError> {
            raw.trim()
                .parse::<u32>()
                .ok()
                .filter(|h| *h <= 23)
                .ok_or_else(invalid)
        };

        let mut hours = BTreeSet::new();
        for part in hour.split(',') {
            match part.split_once('-') {
                Some((from, to)) => {
                    let (from, to) = (parse_hour(from)?, parse_hour(to)?);
                    if from > to {
                        return Err(invalid());
                    }
                    hours.extend(from..=to);
                }
                None => {
                    hours.insert(parse_hour(part)?);
                }
            }
        }

        Ok(match hours.len() {
            0 => return Err(invalid()),
            1 => Trigger::DailyAt(*hours.iter().next().ok_or_else(invalid)?, minute),
            24 => Trigger::EveryHourAt(minute),
            _ => Trigger::HoursAt(hours.into_iter().collect(), minute),
        })
    }

    /// Checks that every hour is within 0-23 and the minute within 0-59
    pub fn validate(&self) -> Result<(), TriggerError> {
        let bad_hour = match self {
            Trigger::EveryHourAt(_) => None,
            Trigger::DailyAt(hour, _) => Some(*hour).filter(|h| *h > 23),
            Trigger::HoursAt(hours, _) => hours.iter().copied().find(|h| *h > 23),
        };
        if let Some(hour) = bad_hour {
            return Err(TriggerError::InvalidHour(hour.to_string()));
        }
        if self.minute() > 59 {
            return Err(TriggerError::InvalidMinute(self.minute()));
        }
        Ok(())
    }

    pub fn minute(&self) -> u32 {
        match self {
            Trigger::EveryHourAt(minute)
            | Trigger::DailyAt(_, minute)
            | Trigger::HoursAt(_, minute) => *minute,
        }
    }

    /// Whether the trigger is due in the minute slot `hour:minute`
    pub fn matches(&self, hour: u32, minute: u32) -> bool {
        if minute != self.minute() {
            return false;
        }
        match self {
            Trigger::EveryHourAt(_) => true,
            Trigger::DailyAt(h, _) => *h == hour,
            Trigger::HoursAt(hours, _) => hours.contains(&hour),
        }
    }

    /// First minute slot strictly after `now` in which the trigger fires
    pub fn next_fire_after(&self, now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        let slot = now.duration_trunc(Duration::minutes(1)).ok()?;
        (1..=24 * 60)
            .map(|step| slot + Duration::minutes(step))
            .find(|candidate| self.matches(candidate.hour(), candidate.minute()))
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::EveryHourAt(minute) => write!(f, "every hour at :{:02}", minute),
            Trigger::DailyAt(hour, minute) => write!(f, "daily at {:02}:{:02}", hour, minute),
            Trigger::HoursAt(hours, minute) => {
                write!(f, "hours {} at :{:02}", compress_hours(hours), minute)
            }
        }
    }
}

/// Renders `[1, 2, 5, 6, 7]` as `1-2,5-7`
fn compress_hours(hours: &[u32]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut iter = hours.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        parts.push(if start == end {
            start.to_string()
        } else {
            format!("{}-{}", start, end)
        });
    }
    parts.join(",")
}
