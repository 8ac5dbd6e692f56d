//! The failure object raised by conversions, validators and hooks.

use std::fmt;

use serde_json::Value;

use super::messages::{ErrorMessages, SCHEMA};

/// Raised when data fails conversion or validation.
///
/// Carries the whole accumulated message structure, the offending input and
/// whatever part of the result was produced before the failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    messages: ErrorMessages,
    field_name: String,
    data: Option<Value>,
    valid_data: Option<Value>,
}

impl ValidationError {
    /// Single-message error at record level
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_messages(ErrorMessages::message(message))
    }

    /// Error carrying an existing message structure
    pub fn with_messages(messages: ErrorMessages) -> Self {
        Self {
            messages,
            field_name: SCHEMA.to_string(),
            data: None,
            valid_data: None,
        }
    }

    /// Attributes the error to a field (or a synthesized top-level key).
    pub fn for_field(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = field_name.into();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_valid_data(mut self, valid_data: Option<Value>) -> Self {
        self.valid_data = valid_data;
        self
    }

    pub fn messages(&self) -> &ErrorMessages {
        &self.messages
    }

    pub fn into_messages(self) -> ErrorMessages {
        self.messages
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn valid_data(&self) -> Option<&Value> {
        self.valid_data.as_ref()
    }

    pub(crate) fn take_valid_data(&mut self) -> Option<Value> {
        self.valid_data.take()
    }

    /// Messages keyed by field name unless already a record-level node.
    pub fn normalized_messages(&self) -> ErrorMessages {
        if self.field_name == SCHEMA && self.messages.is_map() {
            self.messages.clone()
        } else {
            ErrorMessages::keyed(self.field_name.as_str(), self.messages.clone())
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed: {}", self.normalized_messages())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalized_messages_keys_by_field() {
        let err = ValidationError::new("Too young.").for_field("age");
        assert_eq!(err.normalized_messages().to_value(), json!({"age": ["Too young."]}));
    }

    #[test]
    fn test_schema_level_list_is_wrapped() {
        let err = ValidationError::new("Passwords differ.");
        assert_eq!(
            err.normalized_messages().to_value(),
            json!({"_schema": ["Passwords differ."]})
        );
    }

    #[test]
    fn test_schema_level_map_is_kept() {
        let err = ValidationError::with_messages(ErrorMessages::keyed("a", "bad".into()));
        assert_eq!(err.normalized_messages().to_value(), json!({"a": ["bad"]}));
    }

    #[test]
    fn test_display_includes_messages() {
        let err = ValidationError::new("nope").for_field("x");
        let display = format!("{}", err);
        assert!(display.contains("\"x\""));
        assert!(display.contains("nope"));
    }
}
