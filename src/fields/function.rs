//! Fields computed by closures.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error_store::ValidationError;
use crate::schema::Result;

/// Dump closure: receives the whole object being dumped.
pub type SerializeFn =
    Arc<dyn Fn(&Value) -> std::result::Result<Value, ValidationError> + Send + Sync>;

/// Load closure: receives the raw input value.
pub type DeserializeFn =
    Arc<dyn Fn(&Value) -> std::result::Result<Value, ValidationError> + Send + Sync>;

/// A field whose dump value is computed from the whole object and whose
/// load value comes from a closure. Without a load closure, input passes
/// through unchanged.
#[derive(Clone, Default)]
pub struct FunctionField {
    serialize: Option<SerializeFn>,
    deserialize: Option<DeserializeFn>,
}

impl FunctionField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_dump<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<Value, ValidationError> + Send + Sync + 'static,
    {
        self.serialize = Some(Arc::new(f));
        self
    }

    pub fn on_load<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<Value, ValidationError> + Send + Sync + 'static,
    {
        self.deserialize = Some(Arc::new(f));
        self
    }

    pub(crate) fn has_dump(&self) -> bool {
        self.serialize.is_some()
    }

    pub(crate) fn has_load(&self) -> bool {
        self.deserialize.is_some()
    }

    /// `None` without a dump closure, which omits the key.
    pub(crate) fn serialize(&self, obj: &Value) -> Result<Option<Value>> {
        match &self.serialize {
            Some(f) => Ok(Some(f(obj)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn deserialize(&self, value: &Value) -> std::result::Result<Value, ValidationError> {
        match &self.deserialize {
            Some(f) => f(value),
            None => Ok(value.clone()),
        }
    }
}

impl fmt::Debug for FunctionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionField")
            .field("dump", &self.serialize.is_some())
            .field("load", &self.deserialize.is_some())
            .finish()
    }
}
