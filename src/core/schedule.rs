//! Trigger model and cron scheduling
//!
//! A refresh runs either on a fixed schedule (a five-field cron expression,
//! daily at 00:00 UTC by default) or on explicit request. The trigger is only
//! recorded; it never changes what the pipeline does.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::Serialize;
use thiserror::Error;

/// Cron parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Wrong number of whitespace-separated fields
    #[error("Cron expression '{expr}' must have 5 fields (minute hour day-of-month month day-of-week), found {found}")]
    FieldCount { expr: String, found: usize },

    /// A field could not be parsed or is out of range
    #[error("Invalid {field} field '{value}' in cron expression '{expr}': {reason}")]
    InvalidField {
        expr: String,
        field: &'static str,
        value: String,
        reason: String,
    },

    /// The expression is valid but matches no instant (e.g. February 30th)
    #[error("Cron expression '{expr}' never fires")]
    NeverFires { expr: String },
}

/// What started a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Fired by the cron schedule
    Scheduled,
    /// Requested by a user (`cdu run`)
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Set of allowed values for one cron field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(self, value: u32) -> bool {
        value < 64 && self.0 & (1 << value) != 0
    }

    fn insert(&mut self, value: u32) {
        self.0 |= 1 << value;
    }
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[] };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[] };
const DAY_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[] };
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"],
};
// 7 is accepted as a second spelling of Sunday and folded onto 0.
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &["sun", "mon", "tue", "wed", "thu", "fri", "sat"],
};

/// Parsed five-field cron expression, evaluated in UTC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expr: String,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    /// Parse `minute hour day-of-month month day-of-week`
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::FieldCount {
                expr: expr.to_string(),
                found: fields.len(),
            });
        }

        let mut days_of_week = parse_field(expr, fields[4], &DAY_OF_WEEK)?;
        if days_of_week.contains(7) {
            days_of_week.0 &= !(1 << 7);
            days_of_week.insert(0);
        }

        Ok(Self {
            expr: fields.join(" "),
            minutes: parse_field(expr, fields[0], &MINUTE)?,
            hours: parse_field(expr, fields[1], &HOUR)?,
            days_of_month: parse_field(expr, fields[2], &DAY_OF_MONTH)?,
            months: parse_field(expr, fields[3], &MONTH)?,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    /// The normalized expression
    pub fn expression(&self) -> &str {
        &self.expr
    }

    /// First matching instant strictly after `after`, at minute resolution
    ///
    /// Returns `None` if nothing matches within five years.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.naive_utc();
        let mut t = start.date().and_hms_opt(start.hour(), start.minute(), 0)? + Duration::minutes(1);
        let limit = t + Duration::days(5 * 366);

        while t <= limit {
            if !self.months.contains(t.month()) {
                let (year, month) = if t.month() == 12 {
                    (t.year() + 1, 1)
                } else {
                    (t.year(), t.month() + 1)
                };
                t = midnight(NaiveDate::from_ymd_opt(year, month, 1)?)?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = midnight(t.date() + Duration::days(1))?;
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1);
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(Utc.from_utc_datetime(&t));
        }
        None
    }

    /// The next `count` fire times after `after`
    pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = after;
        while times.len() < count {
            match self.next_after(cursor) {
                Some(next) => {
                    times.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        times
    }

    /// Like [`Self::next_after`], but an expression that never fires is an error
    pub fn require_next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        self.next_after(after).ok_or_else(|| ScheduleError::NeverFires {
            expr: self.expr.clone(),
        })
    }

    // Vixie cron: when both day fields are restricted either one may match.
    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

fn midnight(date: NaiveDate) -> Option<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0)
}

fn parse_field(expr: &str, field: &str, spec: &FieldSpec) -> Result<FieldSet, ScheduleError> {
    let invalid = |reason: String| ScheduleError::InvalidField {
        expr: expr.to_string(),
        field: spec.name,
        value: field.to_string(),
        reason,
    };

    let mut set = FieldSet(0);
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(format!("step '{step}' is not a number")))?;
                if step == 0 {
                    return Err(invalid("step must be at least 1".to_string()));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (low, high) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, spec).map_err(&invalid)?, parse_value(b, spec).map_err(&invalid)?)
        } else {
            let value = parse_value(range, spec).map_err(&invalid)?;
            // `a/n` means every n-th value from a to the end of the range
            if part.contains('/') {
                (value, spec.max)
            } else {
                (value, value)
            }
        };

        if low > high {
            return Err(invalid(format!("range {low}-{high} is reversed")));
        }

        let mut value = low;
        while value <= high {
            set.insert(value);
            match value.checked_add(step) {
                Some(next) => value = next,
                None => break,
            }
        }
    }
    Ok(set)
}

#[allow(clippy::cast_possible_truncation)]
fn parse_value(token: &str, spec: &FieldSpec) -> Result<u32, String> {
    let lowered = token.to_ascii_lowercase();
    if let Some(index) = spec.names.iter().position(|name| *name == lowered) {
        return Ok(spec.min + index as u32);
    }
    let value: u32 = token
        .parse()
        .map_err(|_| format!("'{token}' is not a number"))?;
    if value < spec.min || value > spec.max {
        return Err(format!(
            "{value} is outside {}-{}",
            spec.min, spec.max
        ));
    }
    Ok(value)
}
