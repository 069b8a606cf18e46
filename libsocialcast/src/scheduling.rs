//! Parsing of human schedule expressions
//!
//! Accepted forms, tried in order:
//! - `random:MIN-MAX`, a random offset in that range ("random:10m-2h")
//! - RFC 3339 timestamps ("2026-03-01T09:00:00Z")
//! - Durations from now ("30m", "2h", "1 day")
//! - Natural language ("tomorrow 3pm", "next friday")
//!
//! Recurring plans ([`RecurringPlan`]) expand a date range into one instant
//! per day, week or month at each of a list of times of day (UTC).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, Duration, Months, NaiveDate, NaiveTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SocialcastError};

const MIN_RANDOM_SECONDS: i64 = 30;
const MAX_RANDOM_SECONDS: i64 = 30 * 24 * 3600;

/// Upper bound on the instants one recurring plan may expand to
pub const MAX_RECURRING_OCCURRENCES: usize = 500;

/// Parse `input` into an instant strictly after now.
///
/// `last_scheduled` anchors `random:` offsets so a batch of posts spreads
/// out instead of clustering around the current time.
pub fn parse_schedule(input: &str, last_scheduled: Option<i64>) -> Result<DateTime<Utc>> {
    parse_schedule_at(input, Utc::now(), last_scheduled)
}

pub fn parse_schedule_at(
    input: &str,
    now: DateTime<Utc>,
    last_scheduled: Option<i64>,
) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(invalid("Schedule cannot be empty".to_string()));
    }

    let at = if let Some(range) = input.strip_prefix("random:") {
        random_in_range(range, now, last_scheduled)?
    } else if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        at.with_timezone(&Utc)
    } else if let Ok(offset) = parse_duration(input) {
        now + offset
    } else {
        chrono_english::parse_date_string(input, now, chrono_english::Dialect::Us)
            .map_err(|e| invalid(format!("Could not parse schedule '{}': {}", input, e)))?
    };

    if at <= now {
        return Err(invalid(format!(
            "Schedule time {} is in the past",
            at.to_rfc3339()
        )));
    }

    Ok(at)
}

fn invalid(message: String) -> SocialcastError {
    SocialcastError::InvalidInput(message)
}

fn parse_duration(input: &str) -> Result<Duration> {
    let std_duration = humantime::parse_duration(input)
        .map_err(|e| invalid(format!("Could not parse duration '{}': {}", input, e)))?;

    i64::try_from(std_duration.as_secs())
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| invalid(format!("Duration '{}' is out of range", input)))
}

fn random_in_range(
    range: &str,
    now: DateTime<Utc>,
    last_scheduled: Option<i64>,
) -> Result<DateTime<Utc>> {
    let (min, max) = range
        .split_once('-')
        .ok_or_else(|| invalid("Random schedule must look like random:MIN-MAX".to_string()))?;

    let min_secs = parse_duration(min.trim())?.num_seconds();
    let max_secs = parse_duration(max.trim())?.num_seconds();

    if min_secs < MIN_RANDOM_SECONDS {
        return Err(invalid(format!(
            "Minimum random interval must be at least {} seconds",
            MIN_RANDOM_SECONDS
        )));
    }
    if max_secs > MAX_RANDOM_SECONDS {
        return Err(invalid(format!(
            "Maximum random interval must be at most {} days",
            MAX_RANDOM_SECONDS / (24 * 3600)
        )));
    }
    if min_secs >= max_secs {
        return Err(invalid("Minimum must be less than maximum".to_string()));
    }

    // An anchor in the past would produce a past instant; fall back to now
    let base = last_scheduled
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .filter(|anchor| *anchor > now)
        .unwrap_or(now);

    let offset = rand::thread_rng().gen_range(min_secs..=max_secs);
    Ok(base + Duration::seconds(offset))
}

/// Step between the dates of a recurring plan
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceInterval {
    Daily,
    Weekly,
    Monthly,
}

impl RecurrenceInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceInterval::Daily => "daily",
            RecurrenceInterval::Weekly => "weekly",
            RecurrenceInterval::Monthly => "monthly",
        }
    }

    /// The `step`-th date after `start`. Months keep the start's day of
    /// month, clamped to the last day of shorter months.
    fn nth_date(&self, start: NaiveDate, step: u32) -> Option<NaiveDate> {
        match self {
            RecurrenceInterval::Daily => start.checked_add_days(Days::new(step.into())),
            RecurrenceInterval::Weekly => {
                start.checked_add_days(Days::new(u64::from(step) * 7))
            }
            RecurrenceInterval::Monthly => start.checked_add_months(Months::new(step)),
        }
    }
}

impl fmt::Display for RecurrenceInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurrenceInterval {
    type Err = SocialcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(RecurrenceInterval::Daily),
            "weekly" => Ok(RecurrenceInterval::Weekly),
            "monthly" => Ok(RecurrenceInterval::Monthly),
            other => Err(invalid(format!(
                "Unknown interval '{}' (expected daily, weekly or monthly)",
                other
            ))),
        }
    }
}

/// The same content repeated between two dates (inclusive)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecurringPlan {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: RecurrenceInterval,
    /// Times of day, UTC
    pub times: Vec<NaiveTime>,
}

impl RecurringPlan {
    /// Every instant of the plan in ascending order, duplicates removed.
    ///
    /// Fails on an empty time list, an end before the start, or a plan
    /// larger than [`MAX_RECURRING_OCCURRENCES`].
    pub fn occurrences(&self) -> Result<Vec<DateTime<Utc>>> {
        if self.times.is_empty() {
            return Err(invalid("A recurring plan needs at least one time".to_string()));
        }
        if self.end < self.start {
            return Err(invalid(format!(
                "End date {} is before start date {}",
                self.end, self.start
            )));
        }

        let mut times = self.times.clone();
        times.sort();
        times.dedup();

        let mut instants = Vec::new();
        let mut step = 0;
        while let Some(date) = self.interval.nth_date(self.start, step) {
            if date > self.end {
                break;
            }
            for time in &times {
                if instants.len() == MAX_RECURRING_OCCURRENCES {
                    return Err(invalid(format!(
                        "Recurring plan expands to more than {} posts",
                        MAX_RECURRING_OCCURRENCES
                    )));
                }
                instants.push(date.and_time(*time).and_utc());
            }
            step += 1;
        }

        Ok(instants)
    }
}

/// Parse a time of day such as "09:00" or "17:30:15"
pub fn parse_time_of_day(input: &str) -> Result<NaiveTime> {
    let input = input.trim();
    NaiveTime::parse_from_str(input, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M:%S"))
        .map_err(|_| invalid(format!("Could not parse time of day '{}'", input)))
}
