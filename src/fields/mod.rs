//! Field descriptors and their constructors.
//!
//! Constructors return an unbound [`Field`] configured through its
//! consuming setters:
//!
//! ```ignore
//! let age = fields::integer().required().validate(Range::new().min(0.0));
//! let tags = fields::list(fields::string()).load_default_with(|| json!([]));
//! ```

mod containers;
mod field;
mod function;
mod inferred;
mod messages;
mod nested;
mod scalar;
mod temporal;
mod types;

use std::sync::Arc;

use serde_json::Value;

pub(crate) use field::LoadContext;
pub use field::{DefaultValue, Field};
pub use function::{DeserializeFn, FunctionField, SerializeFn};
pub use inferred::InferredField;
pub use messages::{format_message, INVALID, NULL, REQUIRED, VALIDATOR_FAILED};
pub use nested::{NestedField, PluckField, SchemaFactory, SchemaRef};
pub use types::{
    BooleanOpts, Conversion, DecimalOpts, FieldType, FloatOpts, IntegerOpts, MappingField, UrlOpts,
};

use crate::error_store::ValidationError;

/// Passes values through untouched.
pub fn raw() -> Field {
    Field::new(FieldType::Raw)
}

pub fn string() -> Field {
    Field::new(FieldType::String)
}

pub fn integer() -> Field {
    Field::new(FieldType::Integer(IntegerOpts::default()))
}

pub fn integer_with(opts: IntegerOpts) -> Field {
    Field::new(FieldType::Integer(opts))
}

pub fn float() -> Field {
    Field::new(FieldType::Float(FloatOpts::default()))
}

pub fn float_with(opts: FloatOpts) -> Field {
    Field::new(FieldType::Float(opts))
}

pub fn decimal() -> Field {
    Field::new(FieldType::Decimal(DecimalOpts::default()))
}

pub fn decimal_with(opts: DecimalOpts) -> Field {
    Field::new(FieldType::Decimal(opts))
}

pub fn boolean() -> Field {
    Field::new(FieldType::Boolean(BooleanOpts::default()))
}

pub fn boolean_with(opts: BooleanOpts) -> Field {
    Field::new(FieldType::Boolean(opts))
}

pub fn datetime() -> Field {
    Field::new(FieldType::DateTime(None))
}

/// `format` is `iso`, `rfc`, `timestamp`, `timestamp_ms` or a strftime pattern.
pub fn datetime_format(format: impl Into<String>) -> Field {
    Field::new(FieldType::DateTime(Some(format.into())))
}

pub fn date() -> Field {
    Field::new(FieldType::Date(None))
}

pub fn date_format(format: impl Into<String>) -> Field {
    Field::new(FieldType::Date(Some(format.into())))
}

pub fn time() -> Field {
    Field::new(FieldType::Time(None))
}

pub fn time_format(format: impl Into<String>) -> Field {
    Field::new(FieldType::Time(Some(format.into())))
}

pub fn uuid() -> Field {
    Field::new(FieldType::Uuid)
}

pub fn email() -> Field {
    Field::new(FieldType::Email)
}

pub fn url() -> Field {
    Field::new(FieldType::Url(UrlOpts::default()))
}

pub fn url_with(opts: UrlOpts) -> Field {
    Field::new(FieldType::Url(opts))
}

/// Always dumps and loads `value`, whatever the input.
pub fn constant(value: impl Into<Value>) -> Field {
    let value = value.into();
    let mut field = Field::new(FieldType::Constant(value.clone()));
    field.set_load_default(value.clone());
    field.set_dump_default(value);
    field
}

pub fn inferred() -> Field {
    Field::new(FieldType::Inferred(InferredField::new()))
}

/// Computed field. A side without a closure makes the field one-way.
pub fn function(function: FunctionField) -> Field {
    let (dumps, loads) = (function.has_dump(), function.has_load());
    let mut field = Field::new(FieldType::Function(function));
    if !loads {
        field.set_dump_only();
    }
    if !dumps {
        field.set_load_only();
    }
    field
}

/// Dump-only field computed from the whole object.
pub fn method<F>(f: F) -> Field
where
    F: Fn(&Value) -> std::result::Result<Value, ValidationError> + Send + Sync + 'static,
{
    function(FunctionField::new().on_dump(f))
}

pub fn nested(target: impl Into<SchemaRef>) -> Field {
    Field::new(FieldType::Nested(NestedField::new(target)))
}

pub fn nested_with(nested: NestedField) -> Field {
    Field::new(FieldType::Nested(nested))
}

pub fn pluck(target: impl Into<SchemaRef>, field_name: impl Into<String>) -> Field {
    Field::new(FieldType::Pluck(PluckField::new(target, field_name)))
}

pub fn pluck_with(pluck: PluckField) -> Field {
    Field::new(FieldType::Pluck(pluck))
}

pub fn list(inner: Field) -> Field {
    Field::new(FieldType::List(Box::new(inner)))
}

/// Fixed-arity sequence, one field per position.
pub fn tuple(items: Vec<Field>) -> Field {
    Field::new(FieldType::Tuple(items))
}

pub fn mapping(keys: Option<Field>, values: Option<Field>) -> Field {
    Field::new(FieldType::Mapping(MappingField {
        keys: keys.map(Box::new),
        values: values.map(Box::new),
    }))
}

/// Untyped mapping.
pub fn dict() -> Field {
    mapping(None, None)
}

pub fn custom(conversion: impl Conversion + 'static) -> Field {
    Field::new(FieldType::Custom(Arc::new(conversion)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    impl Conversion for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn serialize(&self, _field: &Field, value: &Value) -> Result<Value, ValidationError> {
            Ok(Value::String(value.as_str().unwrap_or_default().to_uppercase()))
        }

        fn deserialize(&self, field: &Field, value: &Value) -> Result<Value, ValidationError> {
            value
                .as_str()
                .map(|s| Value::String(s.to_lowercase()))
                .ok_or_else(|| field.make_error("invalid"))
        }

        fn error_messages(&self) -> &[(&'static str, &'static str)] {
            &[("invalid", "Not shouty text.")]
        }
    }

    #[test]
    fn test_constant_ignores_input() {
        let field = constant("v1");
        let data = json!({});
        assert_eq!(
            field.deserialize(None, LoadContext::detached(&data)).unwrap(),
            Some(json!("v1"))
        );
        assert_eq!(
            field.deserialize(Some(&json!("v2")), LoadContext::detached(&data)).unwrap(),
            Some(json!("v1"))
        );
        assert!(field.clone().required().verify("version").is_ok());
        assert_eq!(
            field.required().deserialize(None, LoadContext::detached(&data)).unwrap(),
            Some(json!("v1"))
        );
    }

    #[test]
    fn test_function_field_direction() {
        let dump_only = method(|obj| Ok(json!(obj["a"].as_i64().unwrap_or(0) * 2)));
        assert!(dump_only.is_dump_only());
        let obj = json!({"a": 21});
        assert_eq!(
            dump_only.serialize("double", &obj, &crate::marshalling::DefaultAccessor).unwrap(),
            Some(json!(42))
        );

        let both = function(
            FunctionField::new()
                .on_dump(|_| Ok(json!("x")))
                .on_load(|v| Ok(json!(v.to_string()))),
        );
        assert!(!both.is_dump_only() && !both.is_load_only());
    }

    #[test]
    fn test_custom_conversion() {
        let field = custom(Upper);
        let data = json!({});
        assert_eq!(
            field.deserialize(Some(&json!("HeLLo")), LoadContext::detached(&data)).unwrap(),
            Some(json!("hello"))
        );
        let err = field
            .deserialize(Some(&json!(3)), LoadContext::detached(&data))
            .unwrap_err()
            .into_validation()
            .unwrap();
        assert_eq!(err.messages().leaf_strings(), vec!["Not shouty text."]);
        assert_eq!(field.field_type().type_name(), "upper");
    }
}
