//! Date and time functions
//!
//! Dates travel as strings. Results for the units day, week, month,
//! quarter and year are `YYYY-MM-DD`; finer units produce a full UTC
//! timestamp (`2025-10-10T08:30:00.000Z`). All arithmetic is in UTC.

use super::{arg, num_arg, unit_arg, Builtin};
use crate::domain::value::Value;
use crate::dsl::error::EvalResult;
use crate::dsl::eval::Env;
use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};

pub(super) static BUILTINS: &[Builtin] = &[
    Builtin::eager("TODAY", 0, Some(0), today),
    Builtin::eager("NOW", 0, Some(0), now),
    Builtin::eager("DATE_DIFF", 3, Some(3), date_diff),
    Builtin::eager("DATEDIFF", 3, Some(3), datediff),
    Builtin::eager("DATE_ADD", 3, Some(3), date_add),
    Builtin::eager("DATE_TRUNC", 2, Some(2), date_trunc),
    Builtin::eager("START_OF", 2, Some(2), date_trunc),
    Builtin::eager("END_OF", 2, Some(2), end_of),
    Builtin::eager("EXTRACT", 2, Some(2), extract),
    Builtin::eager("MAKE_DATE", 3, Some(3), make_date),
];

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Units whose results are rendered as a bare date
fn is_date_only(unit: &str) -> bool {
    matches!(unit, "day" | "week" | "month" | "quarter" | "year")
}

/// Fixed-length units in milliseconds
fn unit_millis(unit: &str) -> Option<i64> {
    Some(match unit {
        "millisecond" => 1,
        "second" => 1_000,
        "minute" => 60_000,
        "hour" => 3_600_000,
        "day" => 86_400_000,
        "week" => 604_800_000,
        _ => return None,
    })
}

/// Interprets a value as an instant.
///
/// Accepts RFC 3339 timestamps, `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM[:SS[.fff]]`
/// (space separator too, read as UTC) and numbers as epoch milliseconds.
pub(crate) fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(ms) if ms.is_finite() => Utc.timestamp_millis_opt(ms.trunc() as i64).single(),
        Value::String(s) => parse_datetime_text(s.trim()),
        _ => None,
    }
}

fn parse_datetime_text(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

pub(crate) fn format_date(dt: &DateTime<Utc>) -> String {
    dt.format(DATE_FORMAT).to_string()
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

fn format_for_unit(dt: &DateTime<Utc>, unit: &str) -> Value {
    if is_date_only(unit) {
        Value::String(format_date(dt))
    } else {
        Value::String(format_datetime(dt))
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(28, |d| d.day())
}

/// Adds calendar months, clamping the day to the target month's length
fn add_months(dt: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let total = i64::from(dt.year()) * 12 + i64::from(dt.month0()) + months;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = total.rem_euclid(12) as u32 + 1;
    let day = dt.day().min(days_in_month(year, month));
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.and_time(dt.time()).and_utc())
}

fn add_unit(dt: DateTime<Utc>, unit: &str, amount: f64) -> Option<DateTime<Utc>> {
    if !amount.is_finite() {
        return None;
    }
    match unit {
        "month" => add_months(dt, amount.trunc() as i64),
        "quarter" => add_months(dt, (amount * 3.0).trunc() as i64),
        "year" => add_months(dt, (amount * 12.0).trunc() as i64),
        _ => {
            let millis = (amount * unit_millis(unit)? as f64).trunc() as i64;
            dt.checked_add_signed(Duration::try_milliseconds(millis)?)
        }
    }
}

fn start_of(dt: DateTime<Utc>, unit: &str) -> Option<DateTime<Utc>> {
    let date = dt.date_naive();
    let midnight = |d: NaiveDate| d.and_time(NaiveTime::MIN).and_utc();
    Some(match unit {
        "second" => dt.with_nanosecond(0)?,
        "minute" => dt.with_nanosecond(0)?.with_second(0)?,
        "hour" => dt.with_nanosecond(0)?.with_second(0)?.with_minute(0)?,
        "day" => midnight(date),
        "week" => {
            let back = i64::from(date.weekday().num_days_from_monday());
            midnight(date.checked_sub_signed(Duration::try_days(back)?)?)
        }
        "month" => midnight(date.with_day(1)?),
        "quarter" => {
            let month = (date.month0() / 3) * 3 + 1;
            midnight(NaiveDate::from_ymd_opt(date.year(), month, 1)?)
        }
        "year" => midnight(NaiveDate::from_ymd_opt(date.year(), 1, 1)?),
        _ => return None,
    })
}

/// Last millisecond of the unit containing `dt`
fn end_of_unit(dt: DateTime<Utc>, unit: &str) -> Option<DateTime<Utc>> {
    if unit == "day" {
        let end = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?;
        return Some(dt.date_naive().and_time(end).and_utc());
    }
    let start = start_of(dt, unit)?;
    let next = add_unit(start, unit, 1.0)?;
    Some(next - Duration::milliseconds(1))
}

/// Whole units from `start` to `end`, truncated toward zero.
///
/// Month, quarter and year count calendar months, backing off one when the
/// day of month has not yet been reached.
fn diff(unit: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<i64> {
    let diff_ms = (end - start).num_milliseconds();

    if matches!(unit, "month" | "quarter" | "year") {
        let mut months = i64::from(end.year() - start.year()) * 12
            + (i64::from(end.month()) - i64::from(start.month()));
        let day_delta = i64::from(end.day()) - i64::from(start.day());
        if diff_ms >= 0 && day_delta < 0 {
            months -= 1;
        } else if diff_ms < 0 && day_delta > 0 {
            months += 1;
        }
        return Some(match unit {
            "month" => months,
            "quarter" => months / 3,
            _ => months / 12,
        });
    }

    Some(diff_ms / unit_millis(unit)?)
}

fn today(_: &[Value], env: &Env) -> EvalResult<Value> {
    Ok(Value::String(format_date(&env.now())))
}

fn now(_: &[Value], env: &Env) -> EvalResult<Value> {
    Ok(Value::String(format_datetime(&env.now())))
}

/// `DATE_DIFF(unit, start, end)`
fn date_diff(args: &[Value], _: &Env) -> EvalResult<Value> {
    let unit = unit_arg(args, 0);
    let result = match (parse_datetime(arg(args, 1)), parse_datetime(arg(args, 2))) {
        (Some(start), Some(end)) => diff(&unit, start, end),
        _ => None,
    };
    Ok(result.map(Value::from).unwrap_or_default())
}

/// `DATEDIFF(end, start, unit)`
fn datediff(args: &[Value], env: &Env) -> EvalResult<Value> {
    let reordered = [arg(args, 2).clone(), arg(args, 1).clone(), arg(args, 0).clone()];
    date_diff(&reordered, env)
}

/// `DATE_ADD(unit, amount, base)`
fn date_add(args: &[Value], _: &Env) -> EvalResult<Value> {
    let unit = unit_arg(args, 0);
    let result = match (num_arg(args, 1), parse_datetime(arg(args, 2))) {
        (Some(amount), Some(base)) => add_unit(base, &unit, amount),
        _ => None,
    };
    Ok(result.map(|dt| format_for_unit(&dt, &unit)).unwrap_or_default())
}

/// `DATE_TRUNC(unit, value)` / `START_OF(unit, value)`
fn date_trunc(args: &[Value], _: &Env) -> EvalResult<Value> {
    let unit = unit_arg(args, 0);
    let result = parse_datetime(arg(args, 1)).and_then(|dt| start_of(dt, &unit));
    Ok(result.map(|dt| format_for_unit(&dt, &unit)).unwrap_or_default())
}

/// `END_OF(unit, value)`
fn end_of(args: &[Value], _: &Env) -> EvalResult<Value> {
    let unit = unit_arg(args, 0);
    let result = parse_datetime(arg(args, 1)).and_then(|dt| end_of_unit(dt, &unit));
    Ok(result.map(|dt| format_for_unit(&dt, &unit)).unwrap_or_default())
}

/// `EXTRACT(part, value)`; week is the ISO week, day_of_week is ISO (Monday = 1)
fn extract(args: &[Value], _: &Env) -> EvalResult<Value> {
    let Some(dt) = parse_datetime(arg(args, 1)) else {
        return Ok(Value::Null);
    };
    let part = match unit_arg(args, 0).as_str() {
        "year" => dt.year() as i64,
        "month" => i64::from(dt.month()),
        "day" | "day_of_month" => i64::from(dt.day()),
        "hour" => i64::from(dt.hour()),
        "minute" => i64::from(dt.minute()),
        "second" => i64::from(dt.second()),
        "quarter" => i64::from(dt.month0() / 3 + 1),
        "week" => i64::from(dt.iso_week().week()),
        "dow" | "day_of_week" => i64::from(dt.weekday().number_from_monday()),
        _ => return Ok(Value::Null),
    };
    Ok(Value::from(part))
}

/// `MAKE_DATE(year, month, day)`; out-of-range months and days roll over
fn make_date(args: &[Value], _: &Env) -> EvalResult<Value> {
    let (Some(y), Some(m), Some(d)) = (num_arg(args, 0), num_arg(args, 1), num_arg(args, 2)) else {
        return Ok(Value::Null);
    };
    let total_months = y.trunc() as i64 * 12 + (m.trunc() as i64 - 1);
    let date = i32::try_from(total_months.div_euclid(12))
        .ok()
        .and_then(|year| NaiveDate::from_ymd_opt(year, total_months.rem_euclid(12) as u32 + 1, 1))
        .and_then(|first| first.checked_add_signed(Duration::try_days(d.trunc() as i64 - 1)?));
    Ok(date
        .map(|date| Value::String(date.format(DATE_FORMAT).to_string()))
        .unwrap_or_default())
}
