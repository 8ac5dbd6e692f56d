//! The dump engine.

use serde_json::{Map, Value};

use crate::error_store::{ErrorStore, ValidationError, SCHEMA};
use crate::hooks::{run_processors, Phase};
use crate::schema::{Error, Result, Schema};

/// Drives one dump call. Created fresh per call.
pub(crate) struct Marshaller<'a> {
    schema: &'a Schema,
    many: bool,
    store: ErrorStore,
}

impl<'a> Marshaller<'a> {
    pub(crate) fn new(schema: &'a Schema, many: bool) -> Self {
        Self {
            schema,
            many,
            store: ErrorStore::new(),
        }
    }

    /// pre_dump, per-record serialization, then post_dump if nothing failed.
    pub(crate) fn run(mut self, obj: &Value) -> Result<Value> {
        let schema = self.schema;
        let hooks = schema.definition().hooks();
        let processed = if hooks.has(Phase::PreDump) {
            self.process(Phase::PreDump, obj.clone(), obj)?
        } else {
            obj.clone()
        };

        let result = self.serialize(&processed)?;

        if !self.store.is_empty() {
            let errors = self.store.into_errors();
            tracing::debug!(
                schema = schema.definition().name(),
                errors = errors.count(),
                "dump failed"
            );
            return Err(ValidationError::with_messages(errors)
                .with_data(obj.clone())
                .with_valid_data(Some(result))
                .into());
        }

        if hooks.has(Phase::PostDump) {
            return self.process(Phase::PostDump, result, obj);
        }
        Ok(result)
    }

    /// Per-item processors first, then whole-collection ones.
    fn process(&self, phase: Phase, data: Value, original: &Value) -> Result<Value> {
        let data = run_processors(self.schema, phase, false, data, self.many, original, None)
            .map_err(normalize)?;
        run_processors(self.schema, phase, true, data, self.many, original, None)
            .map_err(normalize)
    }

    fn serialize(&mut self, obj: &Value) -> Result<Value> {
        if !self.many {
            return self.serialize_item(obj, None).map(Value::Object);
        }
        let Value::Array(items) = obj else {
            let message = self.schema.definition().error_message("type");
            self.store.store_error(message.into(), SCHEMA, None);
            return Ok(Value::Array(Vec::new()));
        };
        let index_errors = self.schema.definition().opts().index_errors;
        let mut output = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let index = index_errors.then_some(idx);
            output.push(Value::Object(self.serialize_item(item, index)?));
        }
        Ok(Value::Array(output))
    }

    fn serialize_item(&mut self, obj: &Value, index: Option<usize>) -> Result<Map<String, Value>> {
        let schema = self.schema;
        let accessor = schema.definition().accessor();
        let mut output = Map::new();
        for (name, field) in schema.dump_fields() {
            let key = field.get_data_key().unwrap_or(name);
            match field.serialize(name, obj, accessor) {
                Ok(Some(value)) => {
                    output.insert(key.to_string(), value);
                }
                Ok(None) => {}
                Err(Error::Validation(err)) => {
                    self.store.store_error(err.into_messages(), key, index);
                }
                Err(other) => return Err(other),
            }
        }
        if !schema.is_ordered() {
            output = sorted(output);
        }
        Ok(output)
    }
}

/// Rebuilds a map in ascending key order.
pub(crate) fn sorted(map: Map<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<(String, Value)> = map.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().collect()
}

/// Hook failures surface as record-level errors.
pub(crate) fn normalize(err: ValidationError) -> Error {
    let data = err.data().cloned();
    let mut normalized = ValidationError::with_messages(err.normalized_messages());
    if let Some(data) = data {
        normalized = normalized.with_data(data);
    }
    normalized.into()
}
