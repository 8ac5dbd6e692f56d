//! Field type definitions and per-type dispatch.
//!
//! Built-in types:
//! - raw: passes values through untouched
//! - string, integer, float, decimal, boolean, uuid, email, url
//! - datetime, date, time: chrono-backed, configurable format
//! - constant: fixed value in both directions
//! - inferred: picks a type from the dumped value
//! - function: closures over the whole object
//! - nested, pluck: delegate to another schema
//! - list, tuple, mapping: per-element conversion with indexed errors
//! - custom: any [`Conversion`] implementation

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::containers;
use super::field::{Field, LoadContext};
use super::function::FunctionField;
use super::inferred::InferredField;
use super::messages;
use super::nested::{NestedField, PluckField};
use super::scalar;
use super::temporal::{self, TemporalKind};
use crate::error_store::ValidationError;
use crate::schema::Result;

/// Pluggable scalar conversion for types the crate does not ship.
pub trait Conversion: Send + Sync {
    /// Type name used in diagnostics
    fn name(&self) -> &str;

    /// Converts an internal value for output. Never called with `null`.
    fn serialize(&self, field: &Field, value: &Value) -> std::result::Result<Value, ValidationError>;

    /// Converts and checks an input value. Never called with `null`.
    fn deserialize(&self, field: &Field, value: &Value)
        -> std::result::Result<Value, ValidationError>;

    /// Extra message templates layered over the base table.
    fn error_messages(&self) -> &[(&'static str, &'static str)] {
        &[]
    }
}

/// Options for integer fields.
#[derive(Debug, Clone, Default)]
pub struct IntegerOpts {
    /// Reject numeric strings and integral floats
    pub strict: bool,
    /// Dump as a string
    pub as_string: bool,
}

impl IntegerOpts {
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn as_string(mut self, as_string: bool) -> Self {
        self.as_string = as_string;
        self
    }
}

/// Options for float fields.
#[derive(Debug, Clone, Default)]
pub struct FloatOpts {
    /// Accept NaN and infinities
    pub allow_nan: bool,
    pub as_string: bool,
}

impl FloatOpts {
    pub fn allow_nan(mut self, allow_nan: bool) -> Self {
        self.allow_nan = allow_nan;
        self
    }

    pub fn as_string(mut self, as_string: bool) -> Self {
        self.as_string = as_string;
        self
    }
}

/// Options for decimal fields.
#[derive(Debug, Clone, Default)]
pub struct DecimalOpts {
    /// Round to this many decimal places (half-even)
    pub places: Option<u32>,
    pub as_string: bool,
}

impl DecimalOpts {
    pub fn places(mut self, places: u32) -> Self {
        self.places = Some(places);
        self
    }

    pub fn as_string(mut self, as_string: bool) -> Self {
        self.as_string = as_string;
        self
    }
}

/// Token sets for boolean fields. An empty truthy set means plain truthiness.
#[derive(Debug, Clone)]
pub struct BooleanOpts {
    pub truthy: Vec<Value>,
    pub falsy: Vec<Value>,
}

impl Default for BooleanOpts {
    fn default() -> Self {
        let truthy = [
            "t", "T", "true", "True", "TRUE", "on", "On", "ON", "y", "Y", "yes", "Yes", "YES", "1",
        ];
        let falsy = [
            "f", "F", "false", "False", "FALSE", "off", "Off", "OFF", "n", "N", "no", "No", "NO",
            "0",
        ];
        let mut truthy: Vec<Value> = truthy.iter().map(|s| Value::from(*s)).collect();
        truthy.extend([Value::from(1), Value::Bool(true)]);
        let mut falsy: Vec<Value> = falsy.iter().map(|s| Value::from(*s)).collect();
        falsy.extend([Value::from(0), Value::Bool(false)]);
        Self { truthy, falsy }
    }
}

/// Options for URL fields.
#[derive(Debug, Clone)]
pub struct UrlOpts {
    pub relative: bool,
    pub require_tld: bool,
    /// Accepted schemes; empty means http, https, ftp, ftps
    pub schemes: Vec<String>,
}

impl Default for UrlOpts {
    fn default() -> Self {
        Self {
            relative: false,
            require_tld: true,
            schemes: Vec::new(),
        }
    }
}

/// Mapping field: optional key and value fields.
#[derive(Clone, Default)]
pub struct MappingField {
    pub(crate) keys: Option<Box<Field>>,
    pub(crate) values: Option<Box<Field>>,
}

/// The conversion behavior of a field.
#[derive(Clone)]
pub enum FieldType {
    Raw,
    String,
    Integer(IntegerOpts),
    Float(FloatOpts),
    Decimal(DecimalOpts),
    Boolean(BooleanOpts),
    /// Format: `iso`, `rfc`, `timestamp`, `timestamp_ms` or a strftime pattern
    DateTime(Option<String>),
    Date(Option<String>),
    Time(Option<String>),
    Uuid,
    Email,
    Url(UrlOpts),
    Constant(Value),
    Inferred(InferredField),
    Function(FunctionField),
    Nested(NestedField),
    Pluck(PluckField),
    List(Box<Field>),
    Tuple(Vec<Field>),
    Mapping(MappingField),
    Custom(Arc<dyn Conversion>),
}

impl FieldType {
    /// Returns the type name for diagnostics
    pub fn type_name(&self) -> &str {
        match self {
            FieldType::Raw => "raw",
            FieldType::String => "string",
            FieldType::Integer(_) => "integer",
            FieldType::Float(_) => "float",
            FieldType::Decimal(_) => "decimal",
            FieldType::Boolean(_) => "boolean",
            FieldType::DateTime(_) => "datetime",
            FieldType::Date(_) => "date",
            FieldType::Time(_) => "time",
            FieldType::Uuid => "uuid",
            FieldType::Email => "email",
            FieldType::Url(_) => "url",
            FieldType::Constant(_) => "constant",
            FieldType::Inferred(_) => "inferred",
            FieldType::Function(_) => "function",
            FieldType::Nested(_) => "nested",
            FieldType::Pluck(_) => "pluck",
            FieldType::List(_) => "list",
            FieldType::Tuple(_) => "tuple",
            FieldType::Mapping(_) => "mapping",
            FieldType::Custom(conversion) => conversion.name(),
        }
    }

    /// Message table for this type's ancestor chain.
    pub(crate) fn default_messages(&self) -> BTreeMap<String, String> {
        use messages::*;
        match self {
            FieldType::String => merge_tables(&[BASE, STRING]),
            FieldType::Integer(_) => merge_tables(&[BASE, NUMBER, INTEGER]),
            FieldType::Float(_) => merge_tables(&[BASE, NUMBER, SPECIAL_NUMBER]),
            FieldType::Decimal(_) => merge_tables(&[BASE, NUMBER, SPECIAL_NUMBER]),
            FieldType::Boolean(_) => merge_tables(&[BASE, BOOLEAN]),
            FieldType::DateTime(_) | FieldType::Date(_) | FieldType::Time(_) => {
                merge_tables(&[BASE, TEMPORAL])
            }
            FieldType::Uuid => merge_tables(&[BASE, STRING, UUID]),
            FieldType::Email => merge_tables(&[BASE, STRING, EMAIL]),
            FieldType::Url(_) => merge_tables(&[BASE, STRING, URL]),
            FieldType::Nested(_) | FieldType::Pluck(_) => merge_tables(&[BASE, NESTED]),
            FieldType::List(_) => merge_tables(&[BASE, LIST]),
            FieldType::Tuple(_) => merge_tables(&[BASE, TUPLE]),
            FieldType::Mapping(_) => merge_tables(&[BASE, MAPPING]),
            FieldType::Custom(conversion) => merge_tables(&[BASE, conversion.error_messages()]),
            FieldType::Raw
            | FieldType::Constant(_)
            | FieldType::Inferred(_)
            | FieldType::Function(_) => merge_tables(&[BASE]),
        }
    }

    pub(crate) fn is_constant(&self) -> bool {
        matches!(self, FieldType::Constant(_))
    }

    /// False for types that compute their dump output from the whole object.
    pub(crate) fn checks_attribute(&self) -> bool {
        !matches!(self, FieldType::Constant(_) | FieldType::Function(_))
    }

    pub(crate) fn inner_fields(&self) -> Vec<&Field> {
        match self {
            FieldType::List(inner) => vec![inner.as_ref()],
            FieldType::Tuple(items) => items.iter().collect(),
            FieldType::Mapping(mapping) => mapping
                .keys
                .iter()
                .chain(mapping.values.iter())
                .map(|f| f.as_ref())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn inner_fields_mut(&mut self) -> Vec<&mut Field> {
        match self {
            FieldType::List(inner) => vec![inner.as_mut()],
            FieldType::Tuple(items) => items.iter_mut().collect(),
            FieldType::Mapping(mapping) => mapping
                .keys
                .iter_mut()
                .chain(mapping.values.iter_mut())
                .map(|f| f.as_mut())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn nested_targets_mut(&mut self) -> Vec<&mut NestedField> {
        match self {
            FieldType::Nested(nested) => vec![nested],
            FieldType::Pluck(pluck) => vec![pluck.nested_mut()],
            FieldType::List(inner) => inner.nested_targets_mut(),
            FieldType::Mapping(MappingField {
                values: Some(values),
                ..
            }) => values.nested_targets_mut(),
            _ => Vec::new(),
        }
    }

    /// Dump for types that do not read a single attribute.
    pub(crate) fn serialize_whole(&self, field: &Field, obj: &Value) -> Result<Option<Value>> {
        match self {
            FieldType::Constant(value) => Ok(Some(value.clone())),
            FieldType::Function(function) => function.serialize(obj),
            _ => field.serialize_value(obj, obj).map(Some),
        }
    }

    pub(crate) fn serialize_value(&self, field: &Field, value: &Value, obj: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let output = match self {
            FieldType::Raw => value.clone(),
            FieldType::String | FieldType::Email | FieldType::Url(_) => scalar::dump_string(value),
            FieldType::Integer(opts) => scalar::dump_integer(field, opts, value)?,
            FieldType::Float(opts) => scalar::dump_float(field, opts, value)?,
            FieldType::Decimal(opts) => scalar::dump_decimal(field, opts, value)?,
            FieldType::Boolean(opts) => scalar::dump_boolean(opts, value),
            FieldType::Uuid => scalar::dump_uuid(field, value)?,
            FieldType::DateTime(format) => {
                temporal::serialize(field, TemporalKind::DateTime, format.as_deref(), value)?
            }
            FieldType::Date(format) => {
                temporal::serialize(field, TemporalKind::Date, format.as_deref(), value)?
            }
            FieldType::Time(format) => {
                temporal::serialize(field, TemporalKind::Time, format.as_deref(), value)?
            }
            FieldType::Constant(constant) => constant.clone(),
            FieldType::Inferred(inferred) => return inferred.serialize(value, obj),
            FieldType::Function(function) => return Ok(function.serialize(obj)?.unwrap_or(Value::Null)),
            FieldType::Nested(nested) => return nested.serialize(field, value),
            FieldType::Pluck(pluck) => return pluck.serialize(field, value),
            FieldType::List(inner) => return containers::serialize_list(field, inner, value, obj),
            FieldType::Tuple(items) => return containers::serialize_tuple(field, items, value, obj),
            FieldType::Mapping(mapping) => {
                return containers::serialize_mapping(field, mapping, value, obj)
            }
            FieldType::Custom(conversion) => conversion.serialize(field, value)?,
        };
        Ok(output)
    }

    pub(crate) fn deserialize_value(
        &self,
        field: &Field,
        value: &Value,
        ctx: LoadContext<'_>,
    ) -> Result<Value> {
        let output = match self {
            FieldType::Raw | FieldType::Inferred(_) => value.clone(),
            FieldType::String | FieldType::Email | FieldType::Url(_) => {
                scalar::load_string(field, value)?
            }
            FieldType::Integer(opts) => scalar::load_integer(field, opts, value)?,
            FieldType::Float(opts) => scalar::load_float(field, opts, value)?,
            FieldType::Decimal(opts) => scalar::load_decimal(field, opts, value)?,
            FieldType::Boolean(opts) => scalar::load_boolean(field, opts, value)?,
            FieldType::Uuid => scalar::load_uuid(field, value)?,
            FieldType::DateTime(format) => {
                temporal::deserialize(field, TemporalKind::DateTime, format.as_deref(), value)?
            }
            FieldType::Date(format) => {
                temporal::deserialize(field, TemporalKind::Date, format.as_deref(), value)?
            }
            FieldType::Time(format) => {
                temporal::deserialize(field, TemporalKind::Time, format.as_deref(), value)?
            }
            FieldType::Constant(constant) => constant.clone(),
            FieldType::Function(function) => function.deserialize(value)?,
            FieldType::Nested(nested) => return nested.deserialize(field, value, ctx),
            FieldType::Pluck(pluck) => return pluck.deserialize(field, value, ctx),
            FieldType::List(inner) => return containers::deserialize_list(field, inner, value, ctx),
            FieldType::Tuple(items) => {
                return containers::deserialize_tuple(field, items, value, ctx)
            }
            FieldType::Mapping(mapping) => {
                return containers::deserialize_mapping(field, mapping, value, ctx)
            }
            FieldType::Custom(conversion) => conversion.deserialize(field, value)?,
        };
        Ok(output)
    }

    /// Format checks that run ahead of user validators.
    pub(crate) fn builtin_check(&self, field: &Field, value: &Value) -> std::result::Result<(), ValidationError> {
        match self {
            FieldType::Email => scalar::check_email(field, value),
            FieldType::Url(opts) => scalar::check_url(field, opts, value),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldType({})", self.type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    #[test]
    fn test_type_names() {
        assert_eq!(FieldType::String.type_name(), "string");
        assert_eq!(FieldType::Integer(IntegerOpts::default()).type_name(), "integer");
        assert_eq!(fields::list(fields::string()).field_type().type_name(), "list");
        assert_eq!(fields::tuple(vec![fields::string()]).field_type().type_name(), "tuple");
    }

    #[test]
    fn test_message_chains() {
        let table = FieldType::Url(UrlOpts::default()).default_messages();
        assert_eq!(table["invalid"], "Not a valid URL.");
        assert_eq!(table["invalid_utf8"], "Not a valid utf-8 string.");
        assert_eq!(table["null"], "Field may not be null.");

        let table = FieldType::Integer(IntegerOpts::default()).default_messages();
        assert_eq!(table["invalid"], "Not a valid integer.");
        assert_eq!(table["too_large"], "Number too large.");
    }

    #[test]
    fn test_inner_fields() {
        let mapping = fields::mapping(Some(fields::string()), Some(fields::integer()));
        assert_eq!(mapping.field_type().inner_fields().len(), 2);
        assert!(FieldType::Raw.inner_fields().is_empty());
    }

    #[test]
    fn test_boolean_default_tokens() {
        let opts = BooleanOpts::default();
        assert!(opts.truthy.contains(&Value::from("yes")));
        assert!(opts.falsy.contains(&Value::from(0)));
    }
}
