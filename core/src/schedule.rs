//! Cron dialect accepted by the scheduler.
//!
//! Five fields (`min hour dom mon dow`) or six (`sec min hour dom mon dow`).
//! Day-of-week numbers are standard cron (`0` and `7` are Sunday); they are
//! rewritten to the `cron` crate's numbering (`1` is Sunday) before parsing.
//!
//! When both day-of-month and day-of-week are restricted, a day matches if
//! either field does, as in standard cron. The `cron` crate requires both,
//! so such expressions are kept as two schedules and merged.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::{JobError, Result};

/// A parsed cron expression: one schedule, or two whose fires are merged.
#[derive(Clone, Debug)]
pub struct CronSpec(Vec<Schedule>);

impl CronSpec {
    /// First fire strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.0.iter().filter_map(|s| s.after(&after).next()).min()
    }

    /// Next `n` fires from now, in order and without duplicates.
    pub fn upcoming(&self, n: usize) -> Vec<DateTime<Utc>> {
        let mut out: Vec<_> = self.0.iter().flat_map(|s| s.upcoming(Utc).take(n)).collect();
        out.sort();
        out.dedup();
        out.truncate(n);
        out
    }
}

/// Parse `expr` into a [`CronSpec`].
pub fn parse(expr: &str) -> Result<CronSpec> {
    let invalid = |reason: String| JobError::InvalidCronExpression {
        expression: expr.to_string(),
        reason,
    };

    let fields: Vec<&str> = expr.split_whitespace().collect();
    let (sec, rest) = match fields.len() {
        5 => ("0", &fields[..]),
        6 => (fields[0], &fields[1..]),
        0 => return Err(invalid("cron expression is required".into())),
        n => return Err(invalid(format!("expected 5 or 6 fields, got {n}"))),
    };
    let (min, hour, dom, mon) = (rest[0], rest[1], rest[2], rest[3]);
    let dow = translate_dow(rest[4]).map_err(invalid)?;

    let build = |dom: &str, dow: &str| {
        Schedule::from_str(&format!("{sec} {min} {hour} {dom} {mon} {dow}"))
            .map_err(|e| invalid(e.to_string()))
    };
    if is_wild(dom) || is_wild(&dow) {
        return Ok(CronSpec(vec![build(dom, &dow)?]));
    }
    Ok(CronSpec(vec![build(dom, "*")?, build("*", &dow)?]))
}

/// First fire strictly after `after`.
pub fn next_after(spec: &CronSpec, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    spec.next_after(after)
}

/// Next `n` fires from now.
pub fn upcoming(spec: &CronSpec, n: usize) -> Vec<DateTime<Utc>> {
    spec.upcoming(n)
}

fn is_wild(field: &str) -> bool {
    field.starts_with('*') || field == "?"
}

fn translate_dow(field: &str) -> std::result::Result<String, String> {
    let items = field
        .split(',')
        .map(translate_dow_item)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(items.join(","))
}

fn translate_dow_item(item: &str) -> std::result::Result<String, String> {
    let (base, step) = match item.split_once('/') {
        Some((b, s)) => {
            let s: u32 = s.parse().map_err(|_| format!("bad day-of-week step `{item}`"))?;
            if s == 0 {
                return Err(format!("bad day-of-week step `{item}`"));
            }
            (b, Some(s))
        }
        None => (item, None),
    };

    if base == "*" || base == "?" || !base.starts_with(|c: char| c.is_ascii_digit()) {
        // names and wildcards already mean the same thing in both dialects
        return Ok(item.to_string());
    }

    let (lo, hi) = match base.split_once('-') {
        Some((a, b)) => (dow_num(a, item)?, dow_num(b, item)?),
        None if step.is_some() => (dow_num(base, item)?, 7),
        None => {
            let n = dow_num(base, item)?;
            return Ok(shift(n).to_string());
        }
    };
    if lo > hi {
        return Err(format!("bad day-of-week range `{item}`"));
    }

    let step_suffix = step.map(|s| format!("/{s}")).unwrap_or_default();
    if hi < 7 {
        return Ok(format!("{}-{}{step_suffix}", shift(lo), shift(hi)));
    }
    // range reaches 7 (Sunday): keep 0..=6 as a shifted range, add Sunday if hit
    let sunday = match step {
        Some(s) => (7 - lo) % s == 0,
        None => true,
    };
    let mut out = if lo == 7 {
        String::new()
    } else {
        format!("{}-7{step_suffix}", shift(lo))
    };
    if sunday && !(lo == 0 && out.starts_with("1-")) {
        if !out.is_empty() {
            out.push(',');
        }
        out.push('1');
    }
    Ok(out)
}

fn dow_num(s: &str, item: &str) -> std::result::Result<u32, String> {
    match s.parse::<u32>() {
        Ok(n) if n <= 7 => Ok(n),
        _ => Err(format!("bad day-of-week `{item}`")),
    }
}

fn shift(n: u32) -> u32 {
    if n == 7 { 1 } else { n + 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    #[test]
    fn five_fields_fire_on_the_minute() {
        let s = parse("* * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 30).unwrap();
        let next = next_after(&s, from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 10, 1, 0).unwrap());
    }

    #[test]
    fn six_fields_keep_seconds() {
        let s = parse("*/10 * * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 1).unwrap();
        assert_eq!(next_after(&s, from).unwrap().second(), 10);
    }

    #[test]
    fn weekday_range_means_monday_to_friday() {
        let s = parse("0 9 * * 1-5").unwrap();
        // 2024-03-02 is a Saturday
        let from = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let next = next_after(&s, from).unwrap();
        assert_eq!(next.weekday(), Weekday::Mon);
        assert_eq!(next.hour(), 9);
    }

    #[test]
    fn zero_and_seven_are_sunday() {
        for expr in ["0 0 * * 0", "0 0 * * 7"] {
            let s = parse(expr).unwrap();
            let from = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
            assert_eq!(next_after(&s, from).unwrap().weekday(), Weekday::Sun, "{expr}");
        }
    }

    #[test]
    fn range_ending_on_seven_includes_sunday() {
        assert_eq!(translate_dow("5-7").unwrap(), "6-7,1");
        assert_eq!(translate_dow("0-7").unwrap(), "1-7");
        assert_eq!(translate_dow("1-7/2").unwrap(), "2-7/2,1");
        assert_eq!(translate_dow("0,6").unwrap(), "1,7");
        assert_eq!(translate_dow("MON-FRI").unwrap(), "MON-FRI");
        assert_eq!(translate_dow("*/2").unwrap(), "*/2");
    }

    #[test]
    fn rejects_garbage() {
        for expr in ["", "nope", "* * *", "* * * * * * * *", "61 * * * *", "0 0 * * 9"] {
            let err = parse(expr).unwrap_err();
            assert_eq!(err.code(), "INVALID_CRON_EXPRESSION", "{expr}");
        }
    }

    #[test]
    fn day_of_month_or_day_of_week() {
        let s = parse("0 0 1 * 1").unwrap();
        // 2024-03-02 is a Saturday; the next Monday comes before April 1st
        let from = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let next = next_after(&s, from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap());

        // the 1st still fires when it is not a Monday (2024-05-01 is a Wednesday)
        let from = Utc.with_ymd_and_hms(2024, 4, 29, 1, 0, 0).unwrap();
        assert_eq!(
            next_after(&s, from).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn merged_upcoming_is_sorted_and_unique() {
        let s = parse("0 0 1-31 * *").unwrap();
        assert_eq!(s.0.len(), 1);
        let s = parse("0 12 15 * MON").unwrap();
        assert_eq!(s.0.len(), 2);
        let next = upcoming(&s, 6);
        assert_eq!(next.len(), 6);
        assert!(next.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn upcoming_is_in_the_future() {
        let s = parse("* * * * *").unwrap();
        let now = Utc::now();
        let next = upcoming(&s, 3);
        assert_eq!(next.len(), 3);
        assert!(next.iter().all(|t| *t > now));
    }
}
