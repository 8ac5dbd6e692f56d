//! Datetime, date and time conversions backed by chrono.
//!
//! Supported datetime formats are `iso` (RFC 3339 or naive ISO 8601), `rfc`
//! (RFC 2822), `timestamp` and `timestamp_ms` (POSIX seconds or
//! milliseconds, UTC), plus any strftime pattern. Dates and times accept
//! `iso` or a strftime pattern. When a field has no format of its own, the
//! owning schema's configured format applies, then `iso`.

use std::fmt::Write;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::{Number, Value};

use super::field::Field;
use super::messages::INVALID;
use crate::error_store::ValidationError;

type Converted = Result<Value, ValidationError>;

const ISO: &str = "iso";
const RFC: &str = "rfc";
const TIMESTAMP: &str = "timestamp";
const TIMESTAMP_MS: &str = "timestamp_ms";

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TemporalKind {
    DateTime,
    Date,
    Time,
}

impl TemporalKind {
    fn obj_type(self) -> &'static str {
        match self {
            TemporalKind::DateTime => "datetime",
            TemporalKind::Date => "date",
            TemporalKind::Time => "time",
        }
    }
}

/// A parsed datetime, with or without a UTC offset.
enum Moment {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl Moment {
    fn naive_utc(&self) -> NaiveDateTime {
        match self {
            Moment::Aware(dt) => dt.naive_utc(),
            Moment::Naive(dt) => *dt,
        }
    }

    fn to_iso(&self) -> String {
        match self {
            Moment::Aware(dt) => dt.to_rfc3339(),
            Moment::Naive(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        }
    }

    fn to_rfc(&self) -> String {
        match self {
            Moment::Aware(dt) => dt.to_rfc2822(),
            Moment::Naive(dt) => dt.format("%a, %d %b %Y %H:%M:%S -0000").to_string(),
        }
    }

    fn timestamp(&self) -> f64 {
        let utc = self.naive_utc().and_utc();
        utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_micros()) / 1_000_000.0
    }
}

fn effective_format(field: &Field, kind: TemporalKind, format: Option<&str>) -> String {
    if let Some(format) = format {
        return format.to_string();
    }
    field
        .parent()
        .and_then(|parent| {
            let opts = parent.opts();
            match kind {
                TemporalKind::DateTime => opts.datetime_format.clone(),
                TemporalKind::Date => opts.date_format.clone(),
                TemporalKind::Time => opts.time_format.clone(),
            }
        })
        .unwrap_or_else(|| ISO.to_string())
}

fn invalid(field: &Field, kind: TemporalKind, input: &Value) -> ValidationError {
    field.make_error_with(
        INVALID,
        &[
            ("input", input.to_string()),
            ("obj_type", kind.obj_type().to_string()),
        ],
    )
}

fn cannot_format(field: &Field, kind: TemporalKind, input: &Value) -> ValidationError {
    let input = input.as_str().map_or_else(|| input.to_string(), str::to_string);
    field.make_error_with(
        "format",
        &[("input", input), ("obj_type", kind.obj_type().to_string())],
    )
}

fn from_timestamp(seconds: f64) -> Option<Moment> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let whole = seconds.trunc() as i64;
    let nanos = ((seconds - seconds.trunc()) * 1_000_000.0).round() as u32 * 1_000;
    Utc.timestamp_opt(whole, nanos)
        .single()
        .map(|dt| Moment::Aware(dt.fixed_offset()))
}

fn parse_iso_datetime(text: &str) -> Option<Moment> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(Moment::Aware(dt));
    }
    for pattern in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, pattern) {
            return Some(Moment::Naive(dt));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(Moment::Naive)
}

fn parse_datetime(format: &str, value: &Value) -> Option<Moment> {
    match format {
        TIMESTAMP | TIMESTAMP_MS => {
            let seconds = match value {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => s.trim().parse::<f64>().ok()?,
                _ => return None,
            };
            if format == TIMESTAMP_MS {
                from_timestamp(seconds / 1000.0)
            } else {
                from_timestamp(seconds)
            }
        }
        ISO => parse_iso_datetime(value.as_str()?.trim()),
        RFC => DateTime::parse_from_rfc2822(value.as_str()?.trim())
            .ok()
            .map(Moment::Aware),
        pattern => {
            let text = value.as_str()?;
            if pattern.contains("%z") || pattern.contains("%:z") {
                DateTime::parse_from_str(text, pattern).ok().map(Moment::Aware)
            } else {
                NaiveDateTime::parse_from_str(text, pattern)
                    .ok()
                    .map(Moment::Naive)
            }
        }
    }
}

/// Leniently reads an internal datetime value before formatting it.
fn read_datetime(value: &Value) -> Option<Moment> {
    match value {
        Value::Number(_) => parse_datetime(TIMESTAMP, value),
        Value::String(s) => {
            parse_iso_datetime(s.trim()).or_else(|| parse_datetime(RFC, value))
        }
        _ => None,
    }
}

fn strftime<T>(formatted: T) -> Option<String>
where
    T: std::fmt::Display,
{
    let mut out = String::new();
    write!(out, "{}", formatted).ok()?;
    Some(out)
}

fn format_datetime(format: &str, moment: &Moment) -> Option<Value> {
    match format {
        ISO => Some(Value::String(moment.to_iso())),
        RFC => Some(Value::String(moment.to_rfc())),
        TIMESTAMP => Number::from_f64(moment.timestamp()).map(Value::Number),
        TIMESTAMP_MS => Number::from_f64(moment.timestamp() * 1000.0).map(Value::Number),
        pattern => {
            let formatted = match moment {
                Moment::Aware(dt) => strftime(dt.format(pattern)),
                Moment::Naive(dt) => strftime(dt.format(pattern)),
            };
            formatted.map(Value::String)
        }
    }
}

fn parse_date(format: &str, text: &str) -> Option<NaiveDate> {
    let pattern = if format == ISO { "%Y-%m-%d" } else { format };
    NaiveDate::parse_from_str(text.trim(), pattern).ok()
}

fn parse_time(format: &str, text: &str) -> Option<NaiveTime> {
    if format != ISO {
        return NaiveTime::parse_from_str(text.trim(), format).ok();
    }
    TIME_FORMATS
        .iter()
        .find_map(|pattern| NaiveTime::parse_from_str(text.trim(), pattern).ok())
}

/// Parses input data into the canonical string form for its kind.
pub(crate) fn deserialize(
    field: &Field,
    kind: TemporalKind,
    format: Option<&str>,
    value: &Value,
) -> Converted {
    let format = effective_format(field, kind, format);
    let output = match kind {
        TemporalKind::DateTime => {
            parse_datetime(&format, value).map(|moment| Value::String(moment.to_iso()))
        }
        TemporalKind::Date => value
            .as_str()
            .and_then(|s| parse_date(&format, s))
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        TemporalKind::Time => value
            .as_str()
            .and_then(|s| parse_time(&format, s))
            .map(|t| Value::String(t.format("%H:%M:%S%.f").to_string())),
    };
    output.ok_or_else(|| invalid(field, kind, value))
}

/// Formats an internal temporal value for output.
pub(crate) fn serialize(
    field: &Field,
    kind: TemporalKind,
    format: Option<&str>,
    value: &Value,
) -> Converted {
    let format = effective_format(field, kind, format);
    let output = match kind {
        TemporalKind::DateTime => {
            read_datetime(value).and_then(|moment| format_datetime(&format, &moment))
        }
        TemporalKind::Date => value
            .as_str()
            .and_then(|s| {
                parse_date(ISO, s).or_else(|| parse_iso_datetime(s.trim()).map(|m| m.naive_utc().date()))
            })
            .and_then(|d| {
                let pattern = if format == ISO { "%Y-%m-%d" } else { format.as_str() };
                strftime(d.format(pattern))
            })
            .map(Value::String),
        TemporalKind::Time => value
            .as_str()
            .and_then(|s| parse_time(ISO, s))
            .and_then(|t| {
                let pattern = if format == ISO { "%H:%M:%S%.f" } else { format.as_str() };
                strftime(t.format(pattern))
            })
            .map(Value::String),
    };
    output.ok_or_else(|| cannot_format(field, kind, value))
}
