//! Cron expressions.
//!
//! ```text
//! ┌────────────── second (optional, defaults to 0)
//! │ ┌──────────── minute        0-59
//! │ │ ┌────────── hour          0-23
//! │ │ │ ┌──────── day of month  1-31
//! │ │ │ │ ┌────── month         1-12 or JAN-DEC
//! │ │ │ │ │ ┌──── day of week   0-7 or SUN-SAT (0 and 7 are Sunday)
//! * * * * * *
//! ```
//!
//! Each field is a comma list of `*`, `N`, `A-B`, with an optional `/STEP`
//! (`*/15`, `10-40/10`, `5/20`). When both day fields are restricted a day
//! matches if either field does, as in classic cron.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Timelike};

use crate::error::SchedulerError;

const MONTH_NAMES: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAY_NAMES: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Value range and aliases of one field.
struct FieldSpec {
    label: &'static str,
    min: u32,
    max: u32,
    /// Names map to `min + position`.
    names: &'static [&'static str],
}

const SECOND: FieldSpec = FieldSpec { label: "second", min: 0, max: 59, names: &[] };
const MINUTE: FieldSpec = FieldSpec { label: "minute", min: 0, max: 59, names: &[] };
const HOUR: FieldSpec = FieldSpec { label: "hour", min: 0, max: 23, names: &[] };
const DAY_OF_MONTH: FieldSpec = FieldSpec { label: "day-of-month", min: 1, max: 31, names: &[] };
const MONTH: FieldSpec = FieldSpec { label: "month", min: 1, max: 12, names: MONTH_NAMES };
// 7 is accepted and folded onto 0 after parsing.
const DAY_OF_WEEK: FieldSpec = FieldSpec { label: "day-of-week", min: 0, max: 7, names: WEEKDAY_NAMES };

/// Bit `n` set means value `n` matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(self, value: u32) -> bool {
        value < 64 && self.0 & (1u64 << value) != 0
    }
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    seconds: FieldSet,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, SchedulerError> {
        let invalid = |reason: String| SchedulerError::InvalidSchedule {
            expr: expr.to_string(),
            reason,
        };

        let fields: Vec<&str> = expr.split_whitespace().collect();
        let (second, rest) = match fields.len() {
            5 => ("0", &fields[..]),
            6 => (fields[0], &fields[1..]),
            n => return Err(invalid(format!("expected 5 or 6 fields, got {n}"))),
        };

        let seconds = parse_field(second, &SECOND).map_err(&invalid)?;
        let minutes = parse_field(rest[0], &MINUTE).map_err(&invalid)?;
        let hours = parse_field(rest[1], &HOUR).map_err(&invalid)?;
        let days_of_month = parse_field(rest[2], &DAY_OF_MONTH).map_err(&invalid)?;
        let months = parse_field(rest[3], &MONTH).map_err(&invalid)?;
        let mut days_of_week = parse_field(rest[4], &DAY_OF_WEEK).map_err(&invalid)?;
        if days_of_week.contains(7) {
            days_of_week = FieldSet((days_of_week.0 | 1) & !(1u64 << 7));
        }

        Ok(Self {
            source: fields.join(" "),
            seconds,
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: !rest[2].starts_with('*'),
            dow_restricted: !rest[4].starts_with('*'),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Does the given wall-clock second match? Sub-second precision is
    /// ignored.
    pub fn matches<T: Datelike + Timelike>(&self, at: &T) -> bool {
        if !(self.seconds.contains(at.second())
            && self.minutes.contains(at.minute())
            && self.hours.contains(at.hour())
            && self.months.contains(at.month()))
        {
            return false;
        }

        let dom = self.days_of_month.contains(at.day());
        let dow = self
            .days_of_week
            .contains(at.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronExpr {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_field(text: &str, field: &FieldSpec) -> Result<FieldSet, String> {
    let mut bits = 0u64;
    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("bad step '{step}' in {} field", field.label))?;
                if step == 0 {
                    return Err(format!("step of 0 in {} field", field.label));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (lo, hi) = if range == "*" {
            (field.min, field.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, field)?, parse_value(b, field)?)
        } else {
            let v = parse_value(range, field)?;
            // `5/20` means "from 5 to the end, every 20"
            if step.is_some() { (v, field.max) } else { (v, v) }
        };
        if lo > hi {
            return Err(format!("range {lo}-{hi} is reversed in {} field", field.label));
        }

        let step = step.unwrap_or(1) as usize;
        for v in (lo..=hi).step_by(step) {
            bits |= 1u64 << v;
        }
    }
    Ok(FieldSet(bits))
}

fn parse_value(text: &str, field: &FieldSpec) -> Result<u32, String> {
    let value = match text.parse::<u32>() {
        Ok(v) => v,
        Err(_) => field
            .names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(text))
            .map(|pos| field.min + pos as u32)
            .ok_or_else(|| format!("bad value '{text}' in {} field", field.label))?,
    };
    if value < field.min || value > field.max {
        return Err(format!(
            "{value} is outside {}-{} in {} field",
            field.min, field.max, field.label
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use rstest::rstest;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn five_fields_fire_on_second_zero() {
        let expr = CronExpr::parse("30 23 * * *").unwrap();

        assert!(expr.matches(&at(2024, 5, 1, 23, 30, 0)));
        assert!(!expr.matches(&at(2024, 5, 1, 23, 30, 59)));
        assert!(!expr.matches(&at(2024, 5, 1, 23, 31, 0)));
        assert!(!expr.matches(&at(2024, 5, 1, 22, 30, 0)));
    }

    #[test]
    fn six_fields_step_every_minute() {
        let expr = CronExpr::parse("0 */1 * * * *").unwrap();

        assert!(expr.matches(&at(2024, 5, 1, 0, 0, 0)));
        assert!(expr.matches(&at(2024, 5, 1, 13, 47, 0)));
        assert!(!expr.matches(&at(2024, 5, 1, 13, 47, 1)));
    }

    #[rstest]
    #[case::every_15_min("*/15 * * * *", 45, true)]
    #[case::every_15_min_miss("*/15 * * * *", 44, false)]
    #[case::list("5,10,20 * * * *", 10, true)]
    #[case::range_with_step("10-40/10 * * * *", 30, true)]
    #[case::range_with_step_miss("10-40/10 * * * *", 35, false)]
    #[case::start_with_step("5/20 * * * *", 45, true)]
    #[case::start_with_step_miss("5/20 * * * *", 0, false)]
    fn minute_field_forms(#[case] expr: &str, #[case] minute: u32, #[case] expected: bool) {
        let expr = CronExpr::parse(expr).unwrap();
        assert_eq!(expr.matches(&at(2024, 5, 1, 12, minute, 0)), expected);
    }

    #[test]
    fn month_and_weekday_names() {
        // 2024-05-06 is a Monday
        let expr = CronExpr::parse("0 9 * may mon-fri").unwrap();
        assert!(expr.matches(&at(2024, 5, 6, 9, 0, 0)));
        // Sunday
        assert!(!expr.matches(&at(2024, 5, 5, 9, 0, 0)));
        assert!(!expr.matches(&at(2024, 6, 3, 9, 0, 0)));
    }

    #[test]
    fn seven_is_sunday() {
        let expr = CronExpr::parse("0 0 * * 7").unwrap();
        assert!(expr.matches(&at(2024, 5, 5, 0, 0, 0)));
        assert!(!expr.matches(&at(2024, 5, 6, 0, 0, 0)));
    }

    #[test]
    fn both_day_fields_restricted_is_either() {
        // the 1st of the month, or any Monday
        let expr = CronExpr::parse("0 0 1 * 1").unwrap();
        assert!(expr.matches(&at(2024, 5, 1, 0, 0, 0)));
        assert!(expr.matches(&at(2024, 5, 6, 0, 0, 0)));
        assert!(!expr.matches(&at(2024, 5, 7, 0, 0, 0)));
    }

    #[test]
    fn one_day_field_restricted_is_both() {
        let expr = CronExpr::parse("0 0 1 * *").unwrap();
        assert!(expr.matches(&at(2024, 5, 1, 0, 0, 0)));
        assert!(!expr.matches(&at(2024, 5, 6, 0, 0, 0)));
    }

    #[rstest]
    #[case::too_few("* * * *")]
    #[case::too_many("* * * * * * *")]
    #[case::minute_out_of_range("60 * * * *")]
    #[case::hour_out_of_range("0 24 * * *")]
    #[case::zero_day("0 0 0 * *")]
    #[case::zero_step("*/0 * * * *")]
    #[case::bad_step("*/x * * * *")]
    #[case::reversed_range("30-10 * * * *")]
    #[case::unknown_name("0 0 * foo *")]
    #[case::empty("")]
    fn malformed_expressions_are_rejected(#[case] expr: &str) {
        let err = CronExpr::parse(expr).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule { .. }));
    }

    #[test]
    fn display_normalises_whitespace() {
        let expr: CronExpr = "30  23 *\t* *".parse().unwrap();
        assert_eq!(expr.to_string(), "30 23 * * *");
    }
}
