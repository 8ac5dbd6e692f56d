//! Reading values out of dumped objects and writing loaded values.

use serde_json::{Map, Value};

use crate::schema::{SchemaError, SchemaResult};

/// Pulls a field's source value out of an object being dumped.
///
/// `None` means the value is missing, which is distinct from `null`.
pub trait Accessor: Send + Sync {
    fn get_value(&self, obj: &Value, key: &str) -> Option<Value>;
}

/// Object key lookup, numeric keys index arrays, and dotted keys descend.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAccessor;

fn lookup<'a>(obj: &'a Value, key: &str) -> Option<&'a Value> {
    match obj {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

impl Accessor for DefaultAccessor {
    fn get_value(&self, obj: &Value, key: &str) -> Option<Value> {
        if let Some(value) = lookup(obj, key) {
            return Some(value.clone());
        }
        if !key.contains('.') {
            return None;
        }
        key.split('.')
            .try_fold(obj, |current, part| lookup(current, part))
            .cloned()
    }
}

impl<F> Accessor for F
where
    F: Fn(&Value, &str) -> Option<Value> + Send + Sync,
{
    fn get_value(&self, obj: &Value, key: &str) -> Option<Value> {
        self(obj, key)
    }
}

/// Inserts `value` at `key`, creating intermediate objects for dotted keys.
pub fn set_value(target: &mut Map<String, Value>, key: &str, value: Value) -> SchemaResult<()> {
    let Some((head, rest)) = key.split_once('.') else {
        target.insert(key.to_string(), value);
        return Ok(());
    };
    let slot = target
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    match slot {
        Value::Object(inner) => set_value(inner, rest, value),
        existing => Err(SchemaError::CannotSetValue {
            key: key.to_string(),
            head: head.to_string(),
            existing: existing.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dotted_and_indexed_lookup() {
        let obj = json!({"author": {"name": "Ada", "tags": ["x", "y"]}, "a.b": 1});
        assert_eq!(DefaultAccessor.get_value(&obj, "author.name"), Some(json!("Ada")));
        assert_eq!(DefaultAccessor.get_value(&obj, "author.tags.1"), Some(json!("y")));
        assert_eq!(DefaultAccessor.get_value(&obj, "a.b"), Some(json!(1)));
        assert_eq!(DefaultAccessor.get_value(&obj, "author.age"), None);
    }

    #[test]
    fn test_null_is_not_missing() {
        let obj = json!({"x": null});
        assert_eq!(DefaultAccessor.get_value(&obj, "x"), Some(Value::Null));
        assert_eq!(DefaultAccessor.get_value(&obj, "y"), None);
    }

    #[test]
    fn test_set_value_builds_nested_objects() {
        let mut map = Map::new();
        set_value(&mut map, "a.b.c", json!(1)).unwrap();
        set_value(&mut map, "a.d", json!(2)).unwrap();
        assert_eq!(Value::Object(map), json!({"a": {"b": {"c": 1}, "d": 2}}));
    }

    #[test]
    fn test_set_value_conflict() {
        let mut map = Map::new();
        set_value(&mut map, "a", json!(1)).unwrap();
        let err = set_value(&mut map, "a.b", json!(2)).unwrap_err();
        assert!(matches!(err, SchemaError::CannotSetValue { .. }));
    }
}
