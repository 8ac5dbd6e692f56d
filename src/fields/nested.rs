//! Nested schema fields.
//!
//! The target schema is named lazily and resolved on first use, then
//! memoized on this field copy. Every bound schema instance owns its own
//! copy (cloning resets the cache), so two instances never share a resolved
//! nested schema.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::{Map, Value};

use super::field::{Field, LoadContext};
use crate::schema::{
    registry, Error, LoadOptions, Result, Schema, SchemaDef, SchemaError, SchemaOptions,
    SchemaResult, Unknown,
};

/// Producer of a nested schema instance.
pub type SchemaFactory = Arc<dyn Fn() -> SchemaResult<Schema> + Send + Sync>;

/// How a nested field names its target schema.
#[derive(Clone)]
pub enum SchemaRef {
    /// A schema definition, instantiated on first use
    Def(Arc<SchemaDef>),
    /// A configured instance, copied and restricted on first use
    Instance(Box<Schema>),
    /// Called once on first use
    Factory(SchemaFactory),
    /// The definition that owns the field
    SelfRef,
    /// A registry name, bare or fully qualified
    Name(String),
}

impl SchemaRef {
    pub fn name(name: impl Into<String>) -> Self {
        SchemaRef::Name(name.into())
    }

    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn() -> SchemaResult<Schema> + Send + Sync + 'static,
    {
        SchemaRef::Factory(Arc::new(factory))
    }
}

impl From<Arc<SchemaDef>> for SchemaRef {
    fn from(def: Arc<SchemaDef>) -> Self {
        SchemaRef::Def(def)
    }
}

impl From<&Arc<SchemaDef>> for SchemaRef {
    fn from(def: &Arc<SchemaDef>) -> Self {
        SchemaRef::Def(Arc::clone(def))
    }
}

impl From<Schema> for SchemaRef {
    fn from(schema: Schema) -> Self {
        SchemaRef::Instance(Box::new(schema))
    }
}

/// `"self"` is the self-reference sentinel; anything else is a registry name.
impl From<&str> for SchemaRef {
    fn from(name: &str) -> Self {
        if name == "self" {
            SchemaRef::SelfRef
        } else {
            SchemaRef::Name(name.to_string())
        }
    }
}

impl fmt::Debug for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaRef::Def(def) => write!(f, "Def({})", def.name()),
            SchemaRef::Instance(schema) => write!(f, "Instance({})", schema.definition().name()),
            SchemaRef::Factory(_) => write!(f, "Factory(..)"),
            SchemaRef::SelfRef => write!(f, "SelfRef"),
            SchemaRef::Name(name) => write!(f, "Name({})", name),
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Delegates a value to another schema.
pub struct NestedField {
    target: SchemaRef,
    many: bool,
    only: Option<BTreeSet<String>>,
    exclude: BTreeSet<String>,
    load_only: BTreeSet<String>,
    dump_only: BTreeSet<String>,
    unknown: Option<Unknown>,
    resolved: OnceCell<Box<Schema>>,
}

impl NestedField {
    pub fn new(target: impl Into<SchemaRef>) -> Self {
        Self {
            target: target.into(),
            many: false,
            only: None,
            exclude: BTreeSet::new(),
            load_only: BTreeSet::new(),
            dump_only: BTreeSet::new(),
            unknown: None,
            resolved: OnceCell::new(),
        }
    }

    /// Treat the value as a collection of records.
    pub fn many(mut self, many: bool) -> Self {
        self.many = many;
        self
    }

    pub fn only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply_only(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply_exclude(names.into_iter().map(Into::into).collect());
        self
    }

    /// Overrides the unknown-field policy for loads through this field.
    pub fn unknown(mut self, unknown: Unknown) -> Self {
        self.unknown = Some(unknown);
        self
    }

    pub fn target(&self) -> &SchemaRef {
        &self.target
    }

    pub fn is_many(&self) -> bool {
        self.many
    }

    /// Intersects with any existing `only` restriction.
    pub(crate) fn apply_only(&mut self, names: BTreeSet<String>) {
        self.only = Some(match self.only.take() {
            Some(existing) => existing.intersection(&names).cloned().collect(),
            None => names,
        });
    }

    pub(crate) fn apply_exclude(&mut self, names: BTreeSet<String>) {
        self.exclude.extend(names);
    }

    pub(crate) fn apply_load_only(&mut self, names: BTreeSet<String>) {
        self.load_only.extend(names);
    }

    pub(crate) fn apply_dump_only(&mut self, names: BTreeSet<String>) {
        self.dump_only.extend(names);
    }

    /// The resolved target schema, built on first call.
    pub fn schema(&self, field: &Field) -> Result<&Schema> {
        let schema = self
            .resolved
            .get_or_try_init(|| self.resolve(field).map(Box::new))?;
        Ok(schema.as_ref())
    }

    fn resolve(&self, field: &Field) -> SchemaResult<Schema> {
        let options = SchemaOptions {
            only: self.only.clone(),
            exclude: self.exclude.clone(),
            many: self.many,
            load_only: self.load_only.clone(),
            dump_only: self.dump_only.clone(),
            ..SchemaOptions::default()
        };
        let schema = match &self.target {
            SchemaRef::Def(def) => Schema::with_options(def, options)?,
            SchemaRef::Name(name) => Schema::with_options(&registry::get_class(name)?, options)?,
            SchemaRef::SelfRef => {
                let parent = field.parent().ok_or_else(|| {
                    SchemaError::InvalidNested(format!(
                        "'self' reference on unbound field {:?}",
                        field.name()
                    ))
                })?;
                Schema::with_options(parent, options)?
            }
            SchemaRef::Instance(schema) => schema.restricted(&options)?,
            SchemaRef::Factory(factory) => factory()?.restricted(&options)?,
        };
        tracing::debug!(
            field = ?field.name(),
            target = schema.definition().name(),
            "resolved nested schema"
        );
        Ok(schema)
    }

    pub(crate) fn serialize(&self, field: &Field, value: &Value) -> Result<Value> {
        let schema = self.schema(field)?;
        schema.dump_with(value, Some(schema.is_many() || self.many))
    }

    pub(crate) fn deserialize(
        &self,
        field: &Field,
        value: &Value,
        ctx: LoadContext<'_>,
    ) -> Result<Value> {
        self.check_collection(field, value)?;
        self.load(field, value, ctx)
    }

    fn check_collection(&self, field: &Field, value: &Value) -> Result<()> {
        let schema = self.schema(field)?;
        if (schema.is_many() || self.many) && !value.is_array() {
            return Err(field
                .make_error_with(
                    "type",
                    &[
                        ("input", value.to_string()),
                        ("type", json_type_name(value).to_string()),
                    ],
                )
                .into());
        }
        Ok(())
    }

    fn load(&self, field: &Field, value: &Value, ctx: LoadContext<'_>) -> Result<Value> {
        let schema = self.schema(field)?;
        let options = LoadOptions {
            many: Some(schema.is_many() || self.many),
            partial: ctx.partial.cloned(),
            unknown: self.unknown.or(ctx.unknown),
        };
        match schema.load_with(value, &options) {
            Ok(loaded) => Ok(loaded),
            Err(Error::Validation(mut err)) => {
                let valid_data = err.take_valid_data();
                Err(Error::Validation(
                    crate::error_store::ValidationError::with_messages(err.into_messages())
                        .with_valid_data(valid_data),
                ))
            }
            Err(other) => Err(other),
        }
    }
}

impl Clone for NestedField {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            many: self.many,
            only: self.only.clone(),
            exclude: self.exclude.clone(),
            load_only: self.load_only.clone(),
            dump_only: self.dump_only.clone(),
            unknown: self.unknown,
            resolved: OnceCell::new(),
        }
    }
}

impl fmt::Debug for NestedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedField")
            .field("target", &self.target)
            .field("many", &self.many)
            .field("only", &self.only)
            .field("exclude", &self.exclude)
            .field("unknown", &self.unknown)
            .finish()
    }
}

/// Dumps and loads a single field of the nested schema in place of the
/// whole record.
#[derive(Clone, Debug)]
pub struct PluckField {
    nested: NestedField,
    field_name: String,
}

impl PluckField {
    pub fn new(target: impl Into<SchemaRef>, field_name: impl Into<String>) -> Self {
        let field_name = field_name.into();
        Self {
            nested: NestedField::new(target).only([field_name.clone()]),
            field_name,
        }
    }

    pub fn many(mut self, many: bool) -> Self {
        self.nested = self.nested.many(many);
        self
    }

    pub(crate) fn nested_mut(&mut self) -> &mut NestedField {
        &mut self.nested
    }

    fn plucked_key(&self, schema: &Schema) -> String {
        schema
            .field(&self.field_name)
            .and_then(Field::get_data_key)
            .unwrap_or(self.field_name.as_str())
            .to_string()
    }

    fn is_many(&self, schema: &Schema) -> bool {
        schema.is_many() || self.nested.many
    }

    pub(crate) fn serialize(&self, field: &Field, value: &Value) -> Result<Value> {
        let dumped = self.nested.serialize(field, value)?;
        let schema = self.nested.schema(field)?;
        let key = self.plucked_key(schema);
        let pluck = |record: &Value| record.get(&key).cloned().unwrap_or(Value::Null);
        if self.is_many(schema) {
            let items = dumped.as_array().map(|items| items.iter().map(pluck).collect());
            Ok(Value::Array(items.unwrap_or_default()))
        } else {
            Ok(pluck(&dumped))
        }
    }

    pub(crate) fn deserialize(
        &self,
        field: &Field,
        value: &Value,
        ctx: LoadContext<'_>,
    ) -> Result<Value> {
        self.nested.check_collection(field, value)?;
        let schema = self.nested.schema(field)?;
        let key = self.plucked_key(schema);
        let wrap = |item: &Value| {
            let mut record = Map::new();
            record.insert(key.clone(), item.clone());
            Value::Object(record)
        };
        let wrapped = match value {
            Value::Array(items) if self.is_many(schema) => {
                Value::Array(items.iter().map(wrap).collect())
            }
            other => wrap(other),
        };
        self.nested.load(field, &wrapped, ctx)
    }
}
