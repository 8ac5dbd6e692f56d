//! List, tuple and mapping fields.
//!
//! Elements are converted independently. Failures are keyed by element
//! index (or by mapping key) and the collection raises once, carrying the
//! successfully converted elements as `valid_data`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::field::{Field, LoadContext};
use super::messages::INVALID;
use super::types::MappingField;
use crate::error_store::{ErrorKey, ErrorMessages, ValidationError};
use crate::schema::{Error, Result};
use crate::validate::{Length, Validator};

/// Outcome of converting one element.
enum Element {
    Ok(Value),
    Failed(ErrorMessages, Option<Value>),
}

fn split(result: Result<Value>) -> Result<Element> {
    match result {
        Ok(value) => Ok(Element::Ok(value)),
        Err(Error::Validation(mut err)) => {
            let valid = err.take_valid_data();
            Ok(Element::Failed(err.into_messages(), valid))
        }
        Err(other) => Err(other),
    }
}

fn collection_error(errors: BTreeMap<ErrorKey, ErrorMessages>, valid: Value) -> Error {
    ValidationError::with_messages(ErrorMessages::Map(errors))
        .with_valid_data(Some(valid))
        .into()
}

fn not_a(field: &Field) -> Error {
    field.make_error(INVALID).into()
}

fn load_element(inner: &Field, value: &Value, ctx: LoadContext<'_>) -> Result<Value> {
    inner
        .deserialize(Some(value), ctx)
        .map(|loaded| loaded.unwrap_or(Value::Null))
}

fn convert_items<F>(items: &[Value], mut convert: F) -> Result<Value>
where
    F: FnMut(usize, &Value) -> Result<Value>,
{
    let mut output = Vec::with_capacity(items.len());
    let mut errors = BTreeMap::new();
    for (idx, item) in items.iter().enumerate() {
        match split(convert(idx, item))? {
            Element::Ok(value) => output.push(value),
            Element::Failed(messages, valid) => {
                if let Some(valid) = valid {
                    output.push(valid);
                }
                errors.insert(ErrorKey::Index(idx), messages);
            }
        }
    }
    if errors.is_empty() {
        Ok(Value::Array(output))
    } else {
        Err(collection_error(errors, Value::Array(output)))
    }
}

// =============================================================================
// List
// =============================================================================

pub(crate) fn deserialize_list(
    field: &Field,
    inner: &Field,
    value: &Value,
    ctx: LoadContext<'_>,
) -> Result<Value> {
    let Value::Array(items) = value else {
        return Err(not_a(field));
    };
    convert_items(items, |_, item| load_element(inner, item, ctx))
}

pub(crate) fn serialize_list(
    field: &Field,
    inner: &Field,
    value: &Value,
    obj: &Value,
) -> Result<Value> {
    let Value::Array(items) = value else {
        return Err(not_a(field));
    };
    convert_items(items, |_, item| inner.serialize_value(item, obj))
}

// =============================================================================
// Tuple
// =============================================================================

pub(crate) fn deserialize_tuple(
    field: &Field,
    items: &[Field],
    value: &Value,
    ctx: LoadContext<'_>,
) -> Result<Value> {
    let Value::Array(values) = value else {
        return Err(not_a(field));
    };
    Length::new().equal(items.len()).validate(value)?;
    convert_items(values, |idx, item| load_element(&items[idx], item, ctx))
}

pub(crate) fn serialize_tuple(
    field: &Field,
    items: &[Field],
    value: &Value,
    obj: &Value,
) -> Result<Value> {
    let Value::Array(values) = value else {
        return Err(not_a(field));
    };
    let len = values.len().min(items.len());
    convert_items(&values[..len], |idx, item| items[idx].serialize_value(item, obj))
}

// =============================================================================
// Mapping
// =============================================================================

fn key_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn convert_mapping<K, V>(
    field: &Field,
    value: &Value,
    mut convert_key: K,
    mut convert_value: V,
) -> Result<Value>
where
    K: FnMut(&Value) -> Option<Result<Value>>,
    V: FnMut(&Value) -> Option<Result<Value>>,
{
    let Value::Object(entries) = value else {
        return Err(not_a(field));
    };
    let mut output = Map::new();
    let mut errors: BTreeMap<ErrorKey, ErrorMessages> = BTreeMap::new();
    for (key, item) in entries {
        let raw_key = Value::String(key.clone());
        let mut entry_errors = BTreeMap::new();
        let converted_key = match convert_key(&raw_key) {
            None => Some(key.clone()),
            Some(result) => match split(result)? {
                Element::Ok(k) => Some(key_string(k)),
                Element::Failed(messages, _) => {
                    entry_errors.insert(ErrorKey::from("key"), messages);
                    None
                }
            },
        };
        let converted_value = match convert_value(item) {
            None => Some(item.clone()),
            Some(result) => match split(result)? {
                Element::Ok(v) => Some(v),
                Element::Failed(messages, valid) => {
                    entry_errors.insert(ErrorKey::from("value"), messages);
                    valid
                }
            },
        };
        if !entry_errors.is_empty() {
            errors.insert(ErrorKey::from(key.as_str()), ErrorMessages::Map(entry_errors));
        }
        if let (Some(k), Some(v)) = (converted_key, converted_value) {
            output.insert(k, v);
        }
    }
    if errors.is_empty() {
        Ok(Value::Object(output))
    } else {
        Err(collection_error(errors, Value::Object(output)))
    }
}

pub(crate) fn deserialize_mapping(
    field: &Field,
    mapping: &MappingField,
    value: &Value,
    ctx: LoadContext<'_>,
) -> Result<Value> {
    convert_mapping(
        field,
        value,
        |k| mapping.keys.as_ref().map(|f| load_element(f, k, ctx)),
        |v| mapping.values.as_ref().map(|f| load_element(f, v, ctx)),
    )
}

pub(crate) fn serialize_mapping(
    field: &Field,
    mapping: &MappingField,
    value: &Value,
    obj: &Value,
) -> Result<Value> {
    convert_mapping(
        field,
        value,
        |k| mapping.keys.as_ref().map(|f| f.serialize_value(k, obj)),
        |v| mapping.values.as_ref().map(|f| f.serialize_value(v, obj)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use serde_json::json;

    fn load(field: &Field, value: Value) -> Result<Option<Value>> {
        let data = json!({});
        field.deserialize(Some(&value), LoadContext::detached(&data))
    }

    #[test]
    fn test_list_collects_errors_by_index() {
        let field = fields::list(fields::integer());
        let err = load(&field, json!([1, "x", 3, "y"]))
            .unwrap_err()
            .into_validation()
            .unwrap();
        assert_eq!(
            err.messages().to_value(),
            json!({"1": ["Not a valid integer."], "3": ["Not a valid integer."]})
        );
        assert_eq!(err.valid_data(), Some(&json!([1, 3])));
    }

    #[test]
    fn test_list_rejects_non_array() {
        let field = fields::list(fields::string());
        let err = load(&field, json!("abc")).unwrap_err().into_validation().unwrap();
        assert_eq!(err.messages().leaf_strings(), vec!["Not a valid list."]);
    }

    #[test]
    fn test_tuple_enforces_arity_first() {
        let field = fields::tuple(vec![fields::string(), fields::integer()]);
        let err = load(&field, json!(["a"])).unwrap_err().into_validation().unwrap();
        assert_eq!(err.messages().leaf_strings(), vec!["Length must be 2."]);
        assert_eq!(load(&field, json!(["a", "2"])).unwrap(), Some(json!(["a", 2])));
    }

    #[test]
    fn test_mapping_key_and_value_errors() {
        let field = fields::mapping(
            Some(fields::string().validate(crate::validate::Length::new().max(3))),
            Some(fields::integer()),
        );
        let err = load(&field, json!({"abcd": 1, "ok": "x", "ab": 2}))
            .unwrap_err()
            .into_validation()
            .unwrap();
        assert_eq!(
            err.messages().to_value(),
            json!({
                "abcd": {"key": ["Longer than maximum length 3."]},
                "ok": {"value": ["Not a valid integer."]}
            })
        );
    }

    #[test]
    fn test_untyped_mapping_passes_through() {
        let field = fields::dict();
        assert_eq!(
            load(&field, json!({"a": [1, 2]})).unwrap(),
            Some(json!({"a": [1, 2]}))
        );
        assert!(load(&field, json!([1])).is_err());
    }

    #[test]
    fn test_list_serialize() {
        let field = fields::list(fields::integer().error_message("invalid", "bad"));
        let obj = json!({});
        assert_eq!(
            field.serialize_value(&json!(["1", 2]), &obj).unwrap(),
            json!([1, 2])
        );
    }
}
