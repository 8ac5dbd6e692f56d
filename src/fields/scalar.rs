//! Scalar conversions: strings, numbers, booleans and identifiers.

use std::num::IntErrorKind;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Number, Value};
use uuid::Uuid;

use super::field::Field;
use super::messages::INVALID;
use super::types::{BooleanOpts, DecimalOpts, FloatOpts, IntegerOpts, UrlOpts};
use crate::error_store::ValidationError;
use crate::validate::{is_email, is_url, DEFAULT_SCHEMES};

type Converted = Result<Value, ValidationError>;

fn invalid(field: &Field, input: &Value) -> ValidationError {
    field.make_error_with(INVALID, &[("input", input.to_string())])
}

// =============================================================================
// String
// =============================================================================

pub(crate) fn load_string(field: &Field, value: &Value) -> Converted {
    match value {
        Value::String(_) => Ok(value.clone()),
        _ => Err(invalid(field, value)),
    }
}

pub(crate) fn dump_string(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        other => Value::String(other.to_string()),
    }
}

pub(crate) fn check_email(field: &Field, value: &Value) -> Result<(), ValidationError> {
    match value.as_str() {
        Some(s) if is_email(s) => Ok(()),
        _ => Err(invalid(field, value)),
    }
}

pub(crate) fn check_url(field: &Field, opts: &UrlOpts, value: &Value) -> Result<(), ValidationError> {
    let default_schemes: Vec<String>;
    let schemes = if opts.schemes.is_empty() {
        default_schemes = DEFAULT_SCHEMES.iter().map(|s| s.to_string()).collect();
        &default_schemes
    } else {
        &opts.schemes
    };
    match value.as_str() {
        Some(s) if is_url(s, opts.relative, opts.require_tld, schemes) => Ok(()),
        _ => Err(invalid(field, value)),
    }
}

// =============================================================================
// Integer
// =============================================================================

fn to_integer(field: &Field, strict: bool, value: &Value) -> Converted {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        Value::Number(n) if !strict => {
            let f = n.as_f64().ok_or_else(|| invalid(field, value))?;
            if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                Ok(Value::from(f as i64))
            } else {
                Err(invalid(field, value))
            }
        }
        Value::String(s) if !strict => match s.trim().parse::<i64>() {
            Ok(parsed) => Ok(Value::from(parsed)),
            Err(err)
                if matches!(
                    err.kind(),
                    IntErrorKind::PosOverflow | IntErrorKind::NegOverflow
                ) =>
            {
                Err(field.make_error_with("too_large", &[("input", s.clone())]))
            }
            Err(_) => Err(invalid(field, value)),
        },
        _ => Err(invalid(field, value)),
    }
}

pub(crate) fn load_integer(field: &Field, opts: &IntegerOpts, value: &Value) -> Converted {
    to_integer(field, opts.strict, value)
}

pub(crate) fn dump_integer(field: &Field, opts: &IntegerOpts, value: &Value) -> Converted {
    let number = to_integer(field, false, value)?;
    Ok(stringify(number, opts.as_string))
}

fn stringify(number: Value, as_string: bool) -> Value {
    match number {
        Value::Number(n) if as_string => Value::String(n.to_string()),
        other => other,
    }
}

// =============================================================================
// Float
// =============================================================================

fn special_to_value(f: f64) -> Value {
    if f.is_nan() {
        Value::from("NaN")
    } else if f.is_sign_positive() {
        Value::from("Infinity")
    } else {
        Value::from("-Infinity")
    }
}

fn to_float(field: &Field, opts: &FloatOpts, value: &Value) -> Converted {
    let f = match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| invalid(field, value))?,
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| invalid(field, value))?,
        _ => return Err(invalid(field, value)),
    };
    if !f.is_finite() {
        if !opts.allow_nan {
            return Err(field.make_error("special"));
        }
        return Ok(special_to_value(f));
    }
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| invalid(field, value))
}

pub(crate) fn load_float(field: &Field, opts: &FloatOpts, value: &Value) -> Converted {
    to_float(field, opts, value)
}

pub(crate) fn dump_float(field: &Field, opts: &FloatOpts, value: &Value) -> Converted {
    let number = to_float(field, opts, value)?;
    Ok(stringify(number, opts.as_string))
}

// =============================================================================
// Decimal
// =============================================================================

fn is_special(s: &str) -> bool {
    let lowered = s.trim().trim_start_matches(['+', '-']).to_ascii_lowercase();
    matches!(lowered.as_str(), "nan" | "snan" | "inf" | "infinity")
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn to_decimal(field: &Field, opts: &DecimalOpts, value: &Value) -> Converted {
    let parsed = match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) if is_special(s) => return Err(field.make_error("special")),
        Value::String(s) => parse_decimal(s),
        _ => None,
    };
    let mut decimal = parsed.ok_or_else(|| invalid(field, value))?;
    if let Some(places) = opts.places {
        decimal = decimal.round_dp_with_strategy(places, RoundingStrategy::MidpointNearestEven);
    }
    let text = decimal.to_string();
    if opts.as_string {
        return Ok(Value::String(text));
    }
    Number::from_str(&text)
        .map(Value::Number)
        .map_err(|_| invalid(field, value))
}

pub(crate) fn load_decimal(field: &Field, opts: &DecimalOpts, value: &Value) -> Converted {
    to_decimal(field, opts, value)
}

pub(crate) fn dump_decimal(field: &Field, opts: &DecimalOpts, value: &Value) -> Converted {
    to_decimal(field, opts, value)
}

// =============================================================================
// Boolean
// =============================================================================

fn same_token(token: &Value, value: &Value) -> bool {
    match (token, value) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => token == value,
    }
}

fn contains(set: &[Value], value: &Value) -> bool {
    set.iter().any(|token| same_token(token, value))
}

fn truthiness(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

pub(crate) fn load_boolean(field: &Field, opts: &BooleanOpts, value: &Value) -> Converted {
    if opts.truthy.is_empty() {
        return Ok(Value::Bool(truthiness(value)));
    }
    if contains(&opts.truthy, value) {
        Ok(Value::Bool(true))
    } else if contains(&opts.falsy, value) {
        Ok(Value::Bool(false))
    } else {
        Err(invalid(field, value))
    }
}

pub(crate) fn dump_boolean(opts: &BooleanOpts, value: &Value) -> Value {
    if contains(&opts.truthy, value) {
        Value::Bool(true)
    } else if contains(&opts.falsy, value) {
        Value::Bool(false)
    } else {
        Value::Bool(truthiness(value))
    }
}

// =============================================================================
// UUID
// =============================================================================

fn to_uuid(field: &Field, value: &Value) -> Converted {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .map(|uuid| Value::String(uuid.to_string()))
        .ok_or_else(|| field.make_error_with("invalid_uuid", &[("input", value.to_string())]))
}

pub(crate) fn load_uuid(field: &Field, value: &Value) -> Converted {
    to_uuid(field, value)
}

pub(crate) fn dump_uuid(field: &Field, value: &Value) -> Converted {
    to_uuid(field, value)
}
