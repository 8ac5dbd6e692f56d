//! The load engine.
//!
//! Pipeline for one call:
//! 1. pre_load hooks (whole-collection, then per-item)
//! 2. per-record field deserialization, unknown-key policy
//! 3. `validates` hooks on loaded field values
//! 4. `validates_schema` hooks (whole-collection, then per-item)
//! 5. post_load hooks (per-item, then whole-collection) if nothing failed
//!
//! Field and element failures never stop the pass. Hook failures end the
//! phase they occur in.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use super::accessor::set_value;
use super::marshaller::sorted;
use crate::error_store::{ErrorMessages, ErrorStore, ValidationError, SCHEMA};
use crate::fields::LoadContext;
use crate::hooks::{run_field_validators, run_processors, run_schema_validators, Phase};
use crate::schema::{Error, Partial, Result, Schema, Unknown};

/// Drives one load call. Created fresh per call.
pub(crate) struct Unmarshaller<'a> {
    schema: &'a Schema,
    many: bool,
    partial: Option<&'a Partial>,
    /// `unknown` given explicitly to this call; handed down to nested loads
    explicit_unknown: Option<Unknown>,
    unknown: Unknown,
    postprocess: bool,
    store: ErrorStore,
}

impl<'a> Unmarshaller<'a> {
    pub(crate) fn new(
        schema: &'a Schema,
        many: bool,
        partial: Option<&'a Partial>,
        explicit_unknown: Option<Unknown>,
    ) -> Self {
        let unknown = explicit_unknown.unwrap_or_else(|| schema.unknown());
        Self {
            schema,
            many,
            partial,
            explicit_unknown,
            unknown,
            postprocess: true,
            store: ErrorStore::new(),
        }
    }

    /// Stops after validation; post_load hooks are not run.
    pub(crate) fn without_postprocess(mut self) -> Self {
        self.postprocess = false;
        self
    }

    pub(crate) fn run(mut self, data: &Value) -> Result<Value> {
        let schema = self.schema;
        let hooks = schema.definition().hooks();

        let (result, errors) = match self.pre_load(data) {
            Err(err) => (None, err.normalized_messages()),
            Ok(processed) => {
                let mut result = self.deserialize(&processed)?;
                run_field_validators(schema, &mut self.store, &mut result, self.many, self.partial);
                if hooks.has(Phase::ValidatesSchema) {
                    let field_errors = !self.store.is_empty();
                    for pass_many in [true, false] {
                        run_schema_validators(
                            schema,
                            &mut self.store,
                            pass_many,
                            &result,
                            data,
                            self.many,
                            self.partial,
                            field_errors,
                        );
                    }
                }
                let mut errors = std::mem::take(&mut self.store).into_errors();
                if errors.is_empty() && self.postprocess && hooks.has(Phase::PostLoad) {
                    match self.post_load(result.clone(), data) {
                        Ok(processed) => result = processed,
                        Err(err) => errors = err.normalized_messages(),
                    }
                }
                (Some(result), errors)
            }
        };

        if errors.is_empty() {
            return Ok(result.unwrap_or(Value::Null));
        }
        tracing::debug!(
            schema = schema.definition().name(),
            errors = errors.count(),
            "load failed"
        );
        Err(ValidationError::with_messages(errors)
            .with_data(data.clone())
            .with_valid_data(result)
            .into())
    }

    fn pre_load(&self, data: &Value) -> std::result::Result<Value, ValidationError> {
        if !self.schema.definition().hooks().has(Phase::PreLoad) {
            return Ok(data.clone());
        }
        let processed = self.processors(Phase::PreLoad, true, data.clone(), data)?;
        self.processors(Phase::PreLoad, false, processed, data)
    }

    fn post_load(&self, result: Value, original: &Value) -> std::result::Result<Value, ValidationError> {
        let processed = self.processors(Phase::PostLoad, false, result, original)?;
        self.processors(Phase::PostLoad, true, processed, original)
    }

    fn processors(
        &self,
        phase: Phase,
        pass_many: bool,
        data: Value,
        original: &Value,
    ) -> std::result::Result<Value, ValidationError> {
        run_processors(
            self.schema,
            phase,
            pass_many,
            data,
            self.many,
            original,
            self.partial,
        )
    }

    fn type_error(&mut self, index: Option<usize>) {
        let message = self.schema.definition().error_message("type");
        self.store.store_error(message.into(), SCHEMA, index);
    }

    fn deserialize(&mut self, data: &Value) -> Result<Value> {
        if !self.many {
            return self.deserialize_item(data, None).map(Value::Object);
        }
        let Value::Array(items) = data else {
            self.type_error(None);
            return Ok(Value::Array(Vec::new()));
        };
        let index_errors = self.schema.definition().opts().index_errors;
        let mut output = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let index = index_errors.then_some(idx);
            output.push(Value::Object(self.deserialize_item(item, index)?));
        }
        Ok(Value::Array(output))
    }

    fn deserialize_item(&mut self, data: &Value, index: Option<usize>) -> Result<Map<String, Value>> {
        let schema = self.schema;
        let mut output = Map::new();
        let Value::Object(input) = data else {
            self.type_error(index);
            return Ok(output);
        };

        for (name, field) in schema.load_fields() {
            let data_key = field.get_data_key().unwrap_or(name);
            let raw = input.get(data_key);
            if raw.is_none()
                && !field.is_constant()
                && self.partial.map_or(false, |p| p.includes(name))
            {
                tracing::trace!(field = name, "missing under partial load, skipped");
                continue;
            }
            let sub_partial = self.partial.map(|p| p.strip_prefix(name));
            let ctx = LoadContext {
                partial: sub_partial.as_ref(),
                unknown: self.explicit_unknown,
                data,
            };
            let target = field.get_attribute().unwrap_or(name);
            match field.deserialize(raw, ctx) {
                Ok(Some(value)) => set_value(&mut output, target, value)?,
                Ok(None) => {}
                Err(Error::Validation(mut err)) => {
                    let valid = err.take_valid_data();
                    self.store.store_error(err.into_messages(), data_key, index);
                    if let Some(valid) = valid.filter(has_content) {
                        set_value(&mut output, target, valid)?;
                    }
                }
                Err(other) => return Err(other),
            }
        }

        if self.unknown != Unknown::Exclude {
            let known: BTreeSet<&str> = schema
                .load_fields()
                .map(|(name, field)| field.get_data_key().unwrap_or(name))
                .collect();
            for (key, value) in input {
                if known.contains(key.as_str()) {
                    continue;
                }
                match self.unknown {
                    Unknown::Include => {
                        output.insert(key.clone(), value.clone());
                    }
                    Unknown::Raise => {
                        let message = schema.definition().error_message("unknown");
                        self.store.store_error(message.into(), key, index);
                    }
                    Unknown::Exclude => {}
                }
            }
        }

        if !schema.is_ordered() {
            output = sorted(output);
        }
        Ok(output)
    }
}

/// Empty partial results are not kept.
fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

/// Error structure of a load, without raising.
pub(crate) fn collect_errors(result: Result<Value>) -> crate::schema::SchemaResult<ErrorMessages> {
    match result {
        Ok(_) => Ok(ErrorMessages::new()),
        Err(Error::Validation(err)) => Ok(err.into_messages()),
        Err(Error::Schema(err)) => Err(err),
        Err(Error::Json(err)) => Ok(ErrorMessages::keyed(
            SCHEMA,
            ErrorMessages::message(err.to_string()),
        )),
    }
}
