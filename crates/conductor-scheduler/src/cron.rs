//! Five-field cron expressions.
//!
//! Fields are `minute hour day-of-month month weekday` with weekday 0-6
//! starting on Sunday. Each field accepts `*`, single values, comma lists,
//! ranges and steps (`*/n`, `a-b/n`, `a/n`).
//!
//! A day matches only when both day-of-month and weekday match; a `*`
//! field matches every day.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::{CronError, SchedulerError, SchedulerResult};

/// Months scanned before giving up on finding a match.
const SEARCH_HORIZON_MONTHS: u32 = 48;

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23 };
const DAY_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31 };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12 };
const WEEKDAY: FieldSpec = FieldSpec { name: "weekday", min: 0, max: 6 };

/// Set of allowed values for one field, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet {
    bits: u64,
}

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.bits & (1u64 << value) != 0
    }

    fn parse(spec: &FieldSpec, text: &str) -> Result<Self, CronError> {
        let mut bits = 0u64;

        for part in text.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(parse_step(spec, step)?)),
                None => (part, None),
            };

            let (start, end) = if range == "*" {
                (spec.min, spec.max)
            } else if let Some((a, b)) = range.split_once('-') {
                let start = parse_value(spec, a)?;
                let end = parse_value(spec, b)?;
                if start > end {
                    return Err(CronError::InvalidRange {
                        field: spec.name,
                        range: range.to_string(),
                    });
                }
                (start, end)
            } else {
                let value = parse_value(spec, range)?;
                match step {
                    Some(_) => (value, spec.max),
                    None => (value, value),
                }
            };

            let step = step.unwrap_or(1) as usize;
            for value in (start..=end).step_by(step) {
                bits |= 1u64 << value;
            }
        }

        Ok(Self { bits })
    }

    fn values(&self) -> impl Iterator<Item = u32> + '_ {
        (0..64).filter(|v| self.contains(*v))
    }
}

fn parse_value(spec: &FieldSpec, token: &str) -> Result<u32, CronError> {
    let value: u32 = token.parse().map_err(|_| CronError::InvalidNumber {
        field: spec.name,
        token: token.to_string(),
    })?;
    if value < spec.min || value > spec.max {
        return Err(CronError::OutOfRange {
            field: spec.name,
            value,
            min: spec.min,
            max: spec.max,
        });
    }
    Ok(value)
}

fn parse_step(spec: &FieldSpec, token: &str) -> Result<u32, CronError> {
    match token.parse::<u32>() {
        Ok(step) if step > 0 => Ok(step),
        _ => Err(CronError::InvalidStep {
            field: spec.name,
            step: token.to_string(),
        }),
    }
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    expression: String,
    minute: FieldSet,
    hour: FieldSet,
    day_of_month: FieldSet,
    month: FieldSet,
    weekday: FieldSet,
}

impl CronExpression {
    /// Parse a five-field expression.
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount {
                found: fields.len(),
            });
        }

        Ok(Self {
            expression: fields.join(" "),
            minute: FieldSet::parse(&MINUTE, fields[0])?,
            hour: FieldSet::parse(&HOUR, fields[1])?,
            day_of_month: FieldSet::parse(&DAY_OF_MONTH, fields[2])?,
            month: FieldSet::parse(&MONTH, fields[3])?,
            weekday: FieldSet::parse(&WEEKDAY, fields[4])?,
        })
    }

    /// The normalized expression text.
    pub fn as_str(&self) -> &str {
        &self.expression
    }

    /// Minutes this expression fires on.
    pub fn minutes(&self) -> Vec<u32> {
        self.minute.values().collect()
    }

    /// Whether the wall-clock minute of `at` matches.
    pub fn matches<T: TimeZone>(&self, at: &DateTime<T>) -> bool {
        if !self.minute.contains(at.minute())
            || !self.hour.contains(at.hour())
            || !self.month.contains(at.month())
        {
            return false;
        }

        self.day_of_month.contains(at.day())
            && self.weekday.contains(at.weekday().num_days_from_sunday())
    }

    /// First matching minute strictly after `from`, evaluated in UTC.
    pub fn next_execution(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_execution_in(from, &Tz::UTC)
    }

    /// First matching minute strictly after `from`, evaluated in `tz`.
    pub fn next_execution_in(&self, from: DateTime<Utc>, tz: &Tz) -> Option<DateTime<Utc>> {
        let start = truncate_to_minute(from)? + TimeDelta::minutes(1);
        let horizon = start.checked_add_months(Months::new(SEARCH_HORIZON_MONTHS))?;

        let mut current = start;
        while current <= horizon {
            if self.matches(&current.with_timezone(tz)) {
                return Some(current);
            }
            current += TimeDelta::minutes(1);
        }
        None
    }

    /// Last matching minute strictly before the minute of `from`, evaluated in UTC.
    pub fn previous_execution(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.previous_execution_in(from, &Tz::UTC)
    }

    pub fn previous_execution_in(&self, from: DateTime<Utc>, tz: &Tz) -> Option<DateTime<Utc>> {
        let start = truncate_to_minute(from)? - TimeDelta::minutes(1);
        let horizon = start.checked_sub_months(Months::new(SEARCH_HORIZON_MONTHS))?;

        let mut current = start;
        while current >= horizon {
            if self.matches(&current.with_timezone(tz)) {
                return Some(current);
            }
            current -= TimeDelta::minutes(1);
        }
        None
    }

    /// The next `count` fire times after `from`.
    pub fn upcoming(&self, from: DateTime<Utc>, tz: &Tz, count: usize) -> Vec<DateTime<Utc>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = from;
        while times.len() < count {
            match self.next_execution_in(cursor, tz) {
                Some(next) => {
                    times.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        times
    }
}

impl FromStr for CronExpression {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn truncate_to_minute(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let secs = at.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(60), 0)
}

/// Resolve an IANA timezone name.
pub fn parse_timezone(name: &str) -> SchedulerResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| SchedulerError::InvalidTimezone(name.to_string()))
}

/// Check that an expression parses.
pub fn validate_cron_expression(expression: &str) -> Result<(), CronError> {
    CronExpression::parse(expression).map(|_| ())
}

/// Next fire time of `expression` after `from` in the named timezone.
pub fn get_next_execution_time(
    expression: &str,
    from: DateTime<Utc>,
    timezone: &str,
) -> SchedulerResult<Option<DateTime<Utc>>> {
    let cron = CronExpression::parse(expression)?;
    let tz = parse_timezone(timezone)?;
    Ok(cron.next_execution_in(from, &tz))
}

/// Previous fire time of `expression` before `from` in the named timezone.
pub fn get_previous_execution_time(
    expression: &str,
    from: DateTime<Utc>,
    timezone: &str,
) -> SchedulerResult<Option<DateTime<Utc>>> {
    let cron = CronExpression::parse(expression)?;
    let tz = parse_timezone(timezone)?;
    Ok(cron.previous_execution_in(from, &tz))
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
