//! Per-call error accumulator.

use super::messages::{merge_errors, ErrorKey, ErrorMessages, SCHEMA};

/// Collects field and record errors during one dump or load pass.
///
/// A fresh store is created for every call, so a schema instance never
/// carries error state between calls.
#[derive(Debug, Default)]
pub struct ErrorStore {
    errors: ErrorMessages,
}

impl ErrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `messages` under `field_name`, nested under `index` when given.
    ///
    /// A node stored under `_schema` is merged at the top level, which lets
    /// record validators attribute errors to any field.
    pub fn store_error(&mut self, messages: ErrorMessages, field_name: &str, index: Option<usize>) {
        let mut messages = messages;
        if field_name != SCHEMA || !messages.is_map() {
            messages = ErrorMessages::keyed(field_name, messages);
        }
        if let Some(index) = index {
            messages = ErrorMessages::keyed(ErrorKey::Index(index), messages);
        }
        let current = std::mem::take(&mut self.errors);
        self.errors = merge_errors(current, messages);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &ErrorMessages {
        &self.errors
    }

    pub fn into_errors(self) -> ErrorMessages {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_store_keys_by_field_and_index() {
        let mut store = ErrorStore::new();
        store.store_error("Not a valid integer.".into(), "f", Some(1));
        store.store_error("Unknown field.".into(), "extra", Some(1));
        store.store_error("Missing data for required field.".into(), "f", Some(0));
        assert_eq!(
            store.errors().to_value(),
            json!({
                "0": {"f": ["Missing data for required field."]},
                "1": {"f": ["Not a valid integer."], "extra": ["Unknown field."]}
            })
        );
    }

    #[test]
    fn test_schema_level_node_merges_at_top() {
        let mut store = ErrorStore::new();
        store.store_error("bad".into(), "a", None);
        store.store_error(ErrorMessages::keyed("b", "also bad".into()), SCHEMA, None);
        store.store_error("whole record".into(), SCHEMA, None);
        assert_eq!(
            store.into_errors().to_value(),
            json!({"a": ["bad"], "b": ["also bad"], "_schema": ["whole record"]})
        );
    }

    #[test]
    fn test_new_store_is_empty() {
        assert!(ErrorStore::new().is_empty());
    }
}
