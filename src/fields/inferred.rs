//! Field whose dump conversion is chosen from the value it receives.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::field::Field;
use super::types::{BooleanOpts, FieldType, FloatOpts, IntegerOpts};
use crate::schema::{Result, SchemaError};

/// Value kinds with a dedicated conversion. Anything else passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Boolean,
    Integer,
    Float,
    String,
    Raw,
}

impl Kind {
    fn of(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Kind::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => Kind::Integer,
            Value::Number(_) => Kind::Float,
            Value::String(_) => Kind::String,
            _ => Kind::Raw,
        }
    }

    fn field(self) -> Field {
        Field::new(match self {
            Kind::Boolean => FieldType::Boolean(BooleanOpts::default()),
            Kind::Integer => FieldType::Integer(IntegerOpts::default()),
            Kind::Float => FieldType::Float(FloatOpts::default()),
            Kind::String => FieldType::String,
            Kind::Raw => FieldType::Raw,
        })
    }
}

/// Synthesized for names listed in `fields`/`additional` without a
/// declared field. Loads pass through unchanged.
#[derive(Default)]
pub struct InferredField {
    cache: Mutex<HashMap<Kind, Arc<Field>>>,
}

impl InferredField {
    pub fn new() -> Self {
        Self::default()
    }

    fn field_for(&self, kind: Kind) -> Result<Arc<Field>> {
        let mut cache = self.cache.lock().map_err(|_| SchemaError::LockPoisoned)?;
        Ok(Arc::clone(
            cache.entry(kind).or_insert_with(|| Arc::new(kind.field())),
        ))
    }

    pub(crate) fn serialize(&self, value: &Value, obj: &Value) -> Result<Value> {
        let field = self.field_for(Kind::of(value))?;
        field.serialize_value(value, obj)
    }
}

/// Copies start with an empty cache.
impl Clone for InferredField {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl fmt::Debug for InferredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InferredField")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infers_by_value_kind() {
        let inferred = InferredField::new();
        let obj = json!({});
        assert_eq!(inferred.serialize(&json!(3), &obj).unwrap(), json!(3));
        assert_eq!(inferred.serialize(&json!(2.5), &obj).unwrap(), json!(2.5));
        assert_eq!(inferred.serialize(&json!("a"), &obj).unwrap(), json!("a"));
        assert_eq!(inferred.serialize(&json!([1, "b"]), &obj).unwrap(), json!([1, "b"]));
    }

    #[test]
    fn test_cache_reused_per_kind() {
        let inferred = InferredField::new();
        let first = inferred.field_for(Kind::Integer).unwrap();
        let second = inferred.field_for(Kind::Integer).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(inferred.clone().cache.lock().unwrap().is_empty());
    }
}
