//! The field descriptor: options shared by every field type, plus the
//! missing/null policy and validator plumbing around a type's conversion.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::messages::{format_message, NULL, REQUIRED, VALIDATOR_FAILED};
use super::nested::NestedField;
use super::types::FieldType;
use crate::error_store::{ErrorMessages, ValidationError};
use crate::marshalling::Accessor;
use crate::schema::{Error, Partial, Result, SchemaDef, SchemaError, SchemaResult, Unknown};
use crate::validate::{collect_messages, Validator};

static CREATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A dump or load default: a fixed value or a producer called each time.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Value(value) => value.clone(),
            DefaultValue::Factory(factory) => factory(),
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, DefaultValue::Value(Value::Null))
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(value) => write!(f, "Value({})", value),
            DefaultValue::Factory(_) => write!(f, "Factory(..)"),
        }
    }
}

#[derive(Clone)]
enum FieldValidator {
    Validator(Arc<dyn Validator>),
    Predicate(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
}

/// Per-call state handed to a field while loading.
#[derive(Clone, Copy)]
pub(crate) struct LoadContext<'a> {
    /// Partial policy for this field's value, already stripped of the field prefix
    pub partial: Option<&'a Partial>,
    /// `unknown` passed explicitly to the outermost load call
    pub unknown: Option<Unknown>,
    /// The whole record being loaded
    pub data: &'a Value,
}

impl<'a> LoadContext<'a> {
    pub(crate) fn detached(data: &'a Value) -> Self {
        Self {
            partial: None,
            unknown: None,
            data,
        }
    }
}

/// One named value's conversion and validation rules.
///
/// Fields are built unbound with the constructors in [`crate::fields`],
/// configured with the consuming setters below, and bound to a schema
/// instance (receiving their `name` and `parent`) when that instance is
/// created.
#[derive(Clone)]
pub struct Field {
    pub(crate) kind: FieldType,
    attribute: Option<String>,
    data_key: Option<String>,
    required: bool,
    allow_none: Option<bool>,
    load_only: bool,
    dump_only: bool,
    dump_default: Option<DefaultValue>,
    load_default: Option<DefaultValue>,
    validators: Vec<FieldValidator>,
    error_messages: BTreeMap<String, String>,
    metadata: Map<String, Value>,
    name: Option<String>,
    parent: Option<Arc<SchemaDef>>,
    creation_index: u64,
}

impl Field {
    pub fn new(kind: FieldType) -> Self {
        Self {
            kind,
            attribute: None,
            data_key: None,
            required: false,
            allow_none: None,
            load_only: false,
            dump_only: false,
            dump_default: None,
            load_default: None,
            validators: Vec::new(),
            error_messages: BTreeMap::new(),
            metadata: Map::new(),
            name: None,
            parent: None,
            creation_index: CREATION_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// Source key on the dumped object and output key of a load.
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// External key in plain data.
    pub fn data_key(mut self, data_key: impl Into<String>) -> Self {
        self.data_key = Some(data_key.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn allow_none(mut self, allow_none: bool) -> Self {
        self.allow_none = Some(allow_none);
        self
    }

    pub fn load_only(mut self) -> Self {
        self.load_only = true;
        self
    }

    pub fn dump_only(mut self) -> Self {
        self.dump_only = true;
        self
    }

    pub fn dump_default(mut self, value: impl Into<Value>) -> Self {
        self.dump_default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn dump_default_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.dump_default = Some(DefaultValue::Factory(Arc::new(factory)));
        self
    }

    pub fn load_default(mut self, value: impl Into<Value>) -> Self {
        self.load_default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn load_default_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.load_default = Some(DefaultValue::Factory(Arc::new(factory)));
        self
    }

    /// Attaches a validator; failures of all validators are collected.
    pub fn validate(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(FieldValidator::Validator(Arc::new(validator)));
        self
    }

    /// Attaches a predicate; `false` fails with the `validator_failed` message.
    pub fn check<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validators.push(FieldValidator::Predicate(Arc::new(predicate)));
        self
    }

    /// Overrides the message template for a failure kind.
    pub fn error_message(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_messages.insert(key.into(), message.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn field_type(&self) -> &FieldType {
        &self.kind
    }

    /// Field name; set when bound to a schema.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Owning schema definition; set when bound.
    pub fn parent(&self) -> Option<&Arc<SchemaDef>> {
        self.parent.as_ref()
    }

    pub fn get_attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    pub fn get_data_key(&self) -> Option<&str> {
        self.data_key.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether this field emits a fixed value whatever the input holds.
    pub fn is_constant(&self) -> bool {
        self.kind.is_constant()
    }

    /// Explicit setting, else true only when the load default is `null`.
    pub fn allows_none(&self) -> bool {
        self.allow_none
            .unwrap_or_else(|| self.load_default.as_ref().map_or(false, DefaultValue::is_null))
    }

    pub fn is_load_only(&self) -> bool {
        self.load_only
    }

    pub fn is_dump_only(&self) -> bool {
        self.dump_only
    }

    pub fn get_metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn get_load_default(&self) -> Option<&DefaultValue> {
        self.load_default.as_ref()
    }

    pub fn get_dump_default(&self) -> Option<&DefaultValue> {
        self.dump_default.as_ref()
    }

    pub(crate) fn creation_index(&self) -> u64 {
        self.creation_index
    }

    /// Effective message table: type chain, then overrides.
    pub fn error_messages(&self) -> BTreeMap<String, String> {
        let mut table = self.kind.default_messages();
        for (key, message) in &self.error_messages {
            table.insert(key.clone(), message.clone());
        }
        table
    }

    /// Builds the error for a failure kind.
    pub fn make_error(&self, key: &str) -> ValidationError {
        self.make_error_with(key, &[])
    }

    /// Builds the error for a failure kind, filling `{name}` placeholders.
    pub fn make_error_with(&self, key: &str, args: &[(&str, String)]) -> ValidationError {
        let template = self
            .error_messages
            .get(key)
            .cloned()
            .or_else(|| self.kind.default_messages().remove(key));
        match template {
            Some(template) => ValidationError::new(format_message(&template, args)),
            None => {
                tracing::warn!(key, field = ?self.name, "no error message template for key");
                ValidationError::new("Invalid value.")
            }
        }
    }

    pub(crate) fn set_load_only(&mut self) {
        self.load_only = true;
    }

    pub(crate) fn set_dump_only(&mut self) {
        self.dump_only = true;
    }

    pub(crate) fn set_load_default(&mut self, value: Value) {
        self.load_default = Some(DefaultValue::Value(value));
    }

    pub(crate) fn set_dump_default(&mut self, value: Value) {
        self.dump_default = Some(DefaultValue::Value(value));
    }

    // -------------------------------------------------------------------------
    // Definition checks and binding
    // -------------------------------------------------------------------------

    /// Rejects contradictory options, recursing into container fields.
    pub(crate) fn verify(&self, name: &str) -> SchemaResult<()> {
        if self.required && self.load_default.is_some() && !self.kind.is_constant() {
            return Err(SchemaError::RequiredWithDefault {
                field: name.to_string(),
            });
        }
        for inner in self.kind.inner_fields() {
            inner.verify(name)?;
        }
        Ok(())
    }

    /// Sets `name` and `parent` unless already set, recursing into inner fields.
    pub(crate) fn bind(&mut self, name: &str, parent: &Arc<SchemaDef>) {
        if self.name.is_none() {
            self.name = Some(name.to_string());
        }
        if self.parent.is_none() {
            self.parent = Some(Arc::clone(parent));
        }
        for inner in self.kind.inner_fields_mut() {
            inner.bind(name, parent);
        }
    }

    /// Nested targets reachable through this field (itself, list items, mapping values).
    pub(crate) fn nested_targets_mut(&mut self) -> Vec<&mut NestedField> {
        self.kind.nested_targets_mut()
    }

    // -------------------------------------------------------------------------
    // Dump
    // -------------------------------------------------------------------------

    /// Pulls this field's value out of `obj` and converts it for output.
    ///
    /// Returns `Ok(None)` when the value is missing and no dump default is
    /// configured, meaning the key is omitted from the output.
    pub(crate) fn serialize(
        &self,
        attr: &str,
        obj: &Value,
        accessor: &dyn Accessor,
    ) -> Result<Option<Value>> {
        if !self.kind.checks_attribute() {
            return self.kind.serialize_whole(self, obj);
        }
        let key = self.attribute.as_deref().unwrap_or(attr);
        let value = accessor
            .get_value(obj, key)
            .or_else(|| self.dump_default.as_ref().map(DefaultValue::resolve));
        match value {
            Some(value) => self.serialize_value(&value, obj).map(Some),
            None => {
                tracing::trace!(field = attr, "missing on dump, omitted");
                Ok(None)
            }
        }
    }

    /// Converts an already-extracted value.
    pub(crate) fn serialize_value(&self, value: &Value, obj: &Value) -> Result<Value> {
        self.kind.serialize_value(self, value, obj)
    }

    // -------------------------------------------------------------------------
    // Load
    // -------------------------------------------------------------------------

    /// Applies missing/null policy, converts, then runs every validator.
    ///
    /// Returns `Ok(None)` when the input is missing and there is no load
    /// default, meaning the key is omitted from the result.
    pub(crate) fn deserialize(
        &self,
        raw: Option<&Value>,
        ctx: LoadContext<'_>,
    ) -> Result<Option<Value>> {
        if let FieldType::Constant(constant) = &self.kind {
            return Ok(Some(constant.clone()));
        }
        let Some(raw) = raw else {
            if self.required {
                return Err(self.make_error(REQUIRED).into());
            }
            return Ok(self.load_default.as_ref().map(DefaultValue::resolve));
        };
        if raw.is_null() {
            if self.allows_none() {
                return Ok(Some(Value::Null));
            }
            return Err(self.make_error(NULL).into());
        }
        let output = self.kind.deserialize_value(self, raw, ctx)?;
        self.run_validators(&output)?;
        Ok(Some(output))
    }

    fn run_validators(&self, value: &Value) -> Result<()> {
        let mut collected: Vec<Value> = Vec::new();
        if let Err(err) = self.kind.builtin_check(self, value) {
            collect_messages(&mut collected, err.into_messages());
        }
        for validator in &self.validators {
            let outcome = match validator {
                FieldValidator::Validator(v) => v.validate(value),
                FieldValidator::Predicate(p) => {
                    if p(value) {
                        Ok(())
                    } else {
                        Err(self.make_error(VALIDATOR_FAILED))
                    }
                }
            };
            if let Err(err) = outcome {
                collect_messages(&mut collected, err.into_messages());
            }
        }
        if collected.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(ValidationError::with_messages(
                ErrorMessages::List(collected),
            )))
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("type", &self.kind.type_name())
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name().to_string()))
            .field("attribute", &self.attribute)
            .field("data_key", &self.data_key)
            .field("required", &self.required)
            .field("allow_none", &self.allows_none())
            .field("load_only", &self.load_only)
            .field("dump_only", &self.dump_only)
            .field("load_default", &self.load_default)
            .field("dump_default", &self.dump_default)
            .finish()
    }
}
