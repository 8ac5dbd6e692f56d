//! Recursive error message structure and its merge rules.
//!
//! A leaf is an ordered list of messages (usually strings, but any JSON value
//! is accepted). A node maps a field name or a collection index to another
//! leaf or node. The `_schema` key holds record-level errors.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// Key under which errors that are not tied to a single field are stored.
pub const SCHEMA: &str = "_schema";

/// Key of an error node: a field name or a position in a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKey {
    /// Position in a list, tuple or many-mode payload
    Index(usize),
    /// Field name, data key or mapping key
    Name(String),
}

impl ErrorKey {
    /// Record-level key (`_schema`)
    pub fn schema() -> Self {
        ErrorKey::Name(SCHEMA.to_string())
    }

    /// Returns true for the `_schema` key
    pub fn is_schema(&self) -> bool {
        matches!(self, ErrorKey::Name(name) if name == SCHEMA)
    }
}

impl fmt::Display for ErrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKey::Index(i) => write!(f, "{}", i),
            ErrorKey::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<usize> for ErrorKey {
    fn from(index: usize) -> Self {
        ErrorKey::Index(index)
    }
}

impl From<&str> for ErrorKey {
    fn from(name: &str) -> Self {
        ErrorKey::Name(name.to_string())
    }
}

impl From<String> for ErrorKey {
    fn from(name: String) -> Self {
        ErrorKey::Name(name)
    }
}

/// Accumulated error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorMessages {
    /// Ordered list of messages
    List(Vec<Value>),
    /// Errors keyed by field name or index
    Map(BTreeMap<ErrorKey, ErrorMessages>),
}

impl Default for ErrorMessages {
    fn default() -> Self {
        ErrorMessages::Map(BTreeMap::new())
    }
}

impl ErrorMessages {
    /// Empty node
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-message leaf
    pub fn message(message: impl Into<String>) -> Self {
        ErrorMessages::List(vec![Value::String(message.into())])
    }

    /// Node with one entry
    pub fn keyed(key: impl Into<ErrorKey>, messages: ErrorMessages) -> Self {
        let mut map = BTreeMap::new();
        map.insert(key.into(), messages);
        ErrorMessages::Map(map)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ErrorMessages::List(items) => items.is_empty(),
            ErrorMessages::Map(map) => map.is_empty(),
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, ErrorMessages::Map(_))
    }

    /// Looks up a direct child by key.
    pub fn get(&self, key: impl Into<ErrorKey>) -> Option<&ErrorMessages> {
        match self {
            ErrorMessages::Map(map) => map.get(&key.into()),
            ErrorMessages::List(_) => None,
        }
    }

    /// Follows a path of keys, e.g. `["inner", "x"]` or `[1, "f"]`.
    pub fn at<K: Into<ErrorKey> + Clone>(&self, path: &[K]) -> Option<&ErrorMessages> {
        let mut node = self;
        for key in path {
            node = node.get(key.clone())?;
        }
        Some(node)
    }

    /// Messages of a leaf as strings; non-string entries are rendered as JSON.
    pub fn leaf_strings(&self) -> Vec<String> {
        match self {
            ErrorMessages::List(items) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            ErrorMessages::Map(_) => Vec::new(),
        }
    }

    /// Number of leaf messages in the whole tree.
    pub fn count(&self) -> usize {
        match self {
            ErrorMessages::List(items) => items.len(),
            ErrorMessages::Map(map) => map.values().map(ErrorMessages::count).sum(),
        }
    }

    /// Converts to a JSON value; index keys become strings.
    pub fn to_value(&self) -> Value {
        match self {
            ErrorMessages::List(items) => Value::Array(items.clone()),
            ErrorMessages::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), v.to_value()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for ErrorMessages {
    fn from(message: &str) -> Self {
        ErrorMessages::message(message)
    }
}

impl From<String> for ErrorMessages {
    fn from(message: String) -> Self {
        ErrorMessages::message(message)
    }
}

impl From<Vec<String>> for ErrorMessages {
    fn from(messages: Vec<String>) -> Self {
        ErrorMessages::List(messages.into_iter().map(Value::String).collect())
    }
}

impl From<Vec<&str>> for ErrorMessages {
    fn from(messages: Vec<&str>) -> Self {
        ErrorMessages::List(
            messages
                .into_iter()
                .map(|m| Value::String(m.to_string()))
                .collect(),
        )
    }
}

impl Serialize for ErrorMessages {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ErrorMessages::List(items) => items.serialize(serializer),
            ErrorMessages::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(&key.to_string(), value)?;
                }
                out.end()
            }
        }
    }
}

impl fmt::Display for ErrorMessages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// Deep-merges two error structures.
///
/// Leaves concatenate (first, then second). A leaf meeting a node is stored
/// under the node's `_schema` key. Nodes merge key by key.
pub fn merge_errors(first: ErrorMessages, second: ErrorMessages) -> ErrorMessages {
    if first.is_empty() {
        return second;
    }
    if second.is_empty() {
        return first;
    }
    match (first, second) {
        (ErrorMessages::List(mut a), ErrorMessages::List(b)) => {
            a.extend(b);
            ErrorMessages::List(a)
        }
        (leaf @ ErrorMessages::List(_), ErrorMessages::Map(mut map)) => {
            let existing = map.remove(&ErrorKey::schema()).unwrap_or_default();
            map.insert(ErrorKey::schema(), merge_errors(leaf, existing));
            ErrorMessages::Map(map)
        }
        (ErrorMessages::Map(mut map), leaf @ ErrorMessages::List(_)) => {
            let existing = map.remove(&ErrorKey::schema()).unwrap_or_default();
            map.insert(ErrorKey::schema(), merge_errors(existing, leaf));
            ErrorMessages::Map(map)
        }
        (ErrorMessages::Map(mut a), ErrorMessages::Map(b)) => {
            for (key, value) in b {
                let merged = match a.remove(&key) {
                    Some(existing) => merge_errors(existing, value),
                    None => value,
                };
                a.insert(key, merged);
            }
            ErrorMessages::Map(a)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(items: &[&str]) -> ErrorMessages {
        ErrorMessages::from(items.to_vec())
    }

    #[test]
    fn test_leaves_concatenate_in_order() {
        let merged = merge_errors(leaf(&["a"]), leaf(&["b", "c"]));
        assert_eq!(merged.to_value(), json!(["a", "b", "c"]));
    }

    #[test]
    fn test_leaf_into_node_goes_under_schema_key() {
        let node = ErrorMessages::keyed("name", leaf(&["bad"]));
        let merged = merge_errors(leaf(&["first"]), node.clone());
        assert_eq!(
            merged.to_value(),
            json!({"_schema": ["first"], "name": ["bad"]})
        );

        let merged = merge_errors(node, leaf(&["last"]));
        assert_eq!(
            merged.to_value(),
            json!({"_schema": ["last"], "name": ["bad"]})
        );
    }

    #[test]
    fn test_nodes_merge_recursively() {
        let a = ErrorMessages::keyed("inner", ErrorMessages::keyed("x", leaf(&["one"])));
        let b = ErrorMessages::keyed("inner", ErrorMessages::keyed("x", leaf(&["two"])));
        let c = ErrorMessages::keyed("other", leaf(&["three"]));
        let merged = merge_errors(merge_errors(a, b), c);
        assert_eq!(
            merged.to_value(),
            json!({"inner": {"x": ["one", "two"]}, "other": ["three"]})
        );
    }

    #[test]
    fn test_merge_is_associative() {
        let samples = vec![
            leaf(&["a"]),
            leaf(&["b", "c"]),
            ErrorMessages::keyed("f", leaf(&["d"])),
            ErrorMessages::keyed(0usize, ErrorMessages::keyed("f", leaf(&["e"]))),
            ErrorMessages::keyed(SCHEMA, leaf(&["g"])),
            ErrorMessages::new(),
        ];
        for e1 in &samples {
            for e2 in &samples {
                for e3 in &samples {
                    let left = merge_errors(merge_errors(e1.clone(), e2.clone()), e3.clone());
                    let right = merge_errors(e1.clone(), merge_errors(e2.clone(), e3.clone()));
                    assert_eq!(left, right, "{} / {} / {}", e1, e2, e3);
                }
            }
        }
    }

    #[test]
    fn test_index_keys_serialize_as_strings() {
        let errors = ErrorMessages::keyed(1usize, ErrorMessages::keyed("f", leaf(&["bad"])));
        let text = serde_json::to_string(&errors).unwrap();
        assert_eq!(text, r#"{"1":{"f":["bad"]}}"#);
        assert_eq!(errors.at(&[ErrorKey::from(1usize), ErrorKey::from("f")]).unwrap().leaf_strings(), vec!["bad"]);
    }

    #[test]
    fn test_count_walks_tree() {
        let errors = merge_errors(
            ErrorMessages::keyed("a", leaf(&["1", "2"])),
            ErrorMessages::keyed("b", ErrorMessages::keyed("c", leaf(&["3"]))),
        );
        assert_eq!(errors.count(), 3);
    }
}
