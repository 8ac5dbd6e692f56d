//! Schema instances: a definition bound with per-instance options.
//!
//! Binding copies every selected field, so fields (and the nested schemas
//! they cache) are never shared between instances. An instance holds no
//! per-call state and may be used from several threads at once.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::definition::SchemaDef;
use super::errors::{Result, SchemaError, SchemaResult};
use super::options::{LoadOptions, Partial, SchemaOptions, Unknown};
use crate::error_store::ErrorMessages;
use crate::fields::{self, Field};
use crate::marshalling::{collect_errors, Marshaller, Unmarshaller};

/// A bound schema.
#[derive(Clone, Debug)]
pub struct Schema {
    def: Arc<SchemaDef>,
    options: SchemaOptions,
    fields: Vec<(String, Field)>,
}

/// Top-level names plus dotted names grouped under their first segment.
struct SplitNames {
    top: BTreeSet<String>,
    nested: BTreeMap<String, BTreeSet<String>>,
}

fn split_names<'a>(names: impl IntoIterator<Item = &'a String>) -> SplitNames {
    let mut split = SplitNames {
        top: BTreeSet::new(),
        nested: BTreeMap::new(),
    };
    for name in names {
        match name.split_once('.') {
            Some((head, rest)) => {
                split
                    .nested
                    .entry(head.to_string())
                    .or_default()
                    .insert(rest.to_string());
            }
            None => {
                split.top.insert(name.clone());
            }
        }
    }
    split
}

/// Sorted names that appear more than once.
fn duplicates<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut repeated = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            repeated.insert(name.to_string());
        }
    }
    repeated.into_iter().collect()
}

impl Schema {
    /// Binds `def` with default instance options.
    pub fn new(def: &Arc<SchemaDef>) -> SchemaResult<Self> {
        Self::with_options(def, SchemaOptions::default())
    }

    /// Binds `def`, selecting and configuring fields per `options`.
    pub fn with_options(def: &Arc<SchemaDef>, options: SchemaOptions) -> SchemaResult<Self> {
        let available = def.available_names();
        let opts = def.opts();

        let only = options.only.as_ref().map(|only| split_names(only.iter()));
        let exclude = split_names(options.exclude.iter().chain(opts.exclude.iter()));

        let mut invalid: BTreeSet<String> = BTreeSet::new();
        let mut referenced: Vec<&String> = exclude.top.iter().chain(exclude.nested.keys()).collect();
        if let Some(only) = &only {
            referenced.extend(only.top.iter().chain(only.nested.keys()));
        }
        for name in referenced {
            if !available.contains(name) {
                invalid.insert(name.clone());
            }
        }
        if !invalid.is_empty() {
            return Err(SchemaError::InvalidFields {
                schema: def.name().to_string(),
                fields: invalid.into_iter().collect(),
            });
        }

        let mut selected: Vec<String> = available
            .into_iter()
            .filter(|name| {
                only.as_ref().map_or(true, |only| {
                    only.top.contains(name) || only.nested.contains_key(name)
                })
            })
            .filter(|name| !exclude.top.contains(name))
            .collect();
        if !opts.ordered {
            selected.sort();
        }

        let load_only = split_names(options.load_only.iter().chain(opts.load_only.iter()));
        let dump_only = split_names(options.dump_only.iter().chain(opts.dump_only.iter()));

        let mut bound = Vec::with_capacity(selected.len());
        for name in selected {
            let mut field = def.declared_field(&name).cloned().unwrap_or_else(fields::inferred);
            if load_only.top.contains(&name) {
                field.set_load_only();
            }
            if dump_only.top.contains(&name) {
                field.set_dump_only();
            }
            for nested in field.nested_targets_mut() {
                if let Some(names) = only.as_ref().and_then(|o| o.nested.get(&name)) {
                    nested.apply_only(names.clone());
                }
                if let Some(names) = exclude.nested.get(&name) {
                    nested.apply_exclude(names.clone());
                }
                if let Some(names) = load_only.nested.get(&name) {
                    nested.apply_load_only(names.clone());
                }
                if let Some(names) = dump_only.nested.get(&name) {
                    nested.apply_dump_only(names.clone());
                }
            }
            field.bind(&name, def);
            if let Some(on_bind) = def.on_bind_field() {
                on_bind(&name, &mut field);
            }
            tracing::trace!(schema = def.name(), field = name.as_str(), "bound field");
            bound.push((name, field));
        }

        let keys = duplicates(
            bound
                .iter()
                .filter(|(_, f)| !f.is_load_only())
                .map(|(n, f)| f.get_data_key().unwrap_or(n.as_str())),
        );
        if !keys.is_empty() {
            return Err(SchemaError::DataKeyCollision { keys });
        }
        let attributes = duplicates(
            bound
                .iter()
                .filter(|(_, f)| !f.is_dump_only())
                .map(|(n, f)| f.get_attribute().unwrap_or(n.as_str())),
        );
        if !attributes.is_empty() {
            return Err(SchemaError::AttributeCollision { attributes });
        }

        Ok(Self {
            def: Arc::clone(def),
            options,
            fields: bound,
        })
    }

    /// A copy of this instance further restricted by `options`: `only`
    /// sets intersect, the other name sets are unioned.
    pub fn restricted(&self, options: &SchemaOptions) -> SchemaResult<Self> {
        let mut merged = self.options.clone();
        merged.only = match (&self.options.only, &options.only) {
            (Some(current), Some(extra)) => Some(current.intersection(extra).cloned().collect()),
            (current, extra) => current.clone().or_else(|| extra.clone()),
        };
        merged.exclude.extend(options.exclude.iter().cloned());
        merged.load_only.extend(options.load_only.iter().cloned());
        merged.dump_only.extend(options.dump_only.iter().cloned());
        merged.many = self.options.many || options.many;
        if options.partial.is_some() {
            merged.partial = options.partial.clone();
        }
        if options.unknown.is_some() {
            merged.unknown = options.unknown;
        }
        Self::with_options(&self.def, merged)
    }

    pub fn definition(&self) -> &Arc<SchemaDef> {
        &self.def
    }

    pub fn options(&self) -> &SchemaOptions {
        &self.options
    }

    pub fn is_many(&self) -> bool {
        self.options.many
    }

    pub fn is_ordered(&self) -> bool {
        self.def.opts().ordered
    }

    /// Instance policy, else the definition's.
    pub fn unknown(&self) -> Unknown {
        self.options.unknown.unwrap_or(self.def.opts().unknown)
    }

    /// A bound field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// All bound fields, in output order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> + '_ {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// Fields written by a dump.
    pub fn dump_fields(&self) -> impl Iterator<Item = (&str, &Field)> + '_ {
        self.fields().filter(|(_, f)| !f.is_load_only())
    }

    /// Fields read by a load.
    pub fn load_fields(&self) -> impl Iterator<Item = (&str, &Field)> + '_ {
        self.fields().filter(|(_, f)| !f.is_dump_only())
    }

    // =========================================================================
    // Dump
    // =========================================================================

    /// Serializes `obj` (a record, or a list of records in many mode).
    pub fn dump(&self, obj: &Value) -> Result<Value> {
        self.dump_with(obj, None)
    }

    /// Like [`dump`](Self::dump) with the instance's `many` overridden.
    pub fn dump_with(&self, obj: &Value, many: Option<bool>) -> Result<Value> {
        let many = many.unwrap_or(self.options.many);
        Marshaller::new(self, many).run(obj)
    }

    /// Dumps to JSON text.
    pub fn dumps(&self, obj: &Value) -> Result<String> {
        let dumped = self.dump(obj)?;
        Ok(serde_json::to_string(&dumped)?)
    }

    /// Dumps any serde-serializable value by way of its JSON form.
    pub fn dump_serializable<T: Serialize>(&self, obj: &T) -> Result<Value> {
        let value = serde_json::to_value(obj)?;
        self.dump(&value)
    }

    // =========================================================================
    // Load
    // =========================================================================

    pub fn load(&self, data: &Value) -> Result<Value> {
        self.load_with(data, &LoadOptions::default())
    }

    /// Deserializes and validates `data`. Unset call options fall back to
    /// the instance options.
    pub fn load_with(&self, data: &Value, options: &LoadOptions) -> Result<Value> {
        self.unmarshaller(options).run(data)
    }

    /// Parses JSON text, then loads it.
    pub fn loads(&self, text: &str) -> Result<Value> {
        let data: Value = serde_json::from_str(text)?;
        self.load(&data)
    }

    /// Loads `data`, then deserializes the result into `T`.
    pub fn load_as<T: DeserializeOwned>(&self, data: &Value) -> Result<T> {
        let loaded = self.load(data)?;
        Ok(serde_json::from_value(loaded)?)
    }

    // =========================================================================
    // Validate
    // =========================================================================

    /// Error structure a load would produce; empty when valid. post_load
    /// hooks do not run.
    pub fn validate(&self, data: &Value) -> SchemaResult<ErrorMessages> {
        self.validate_with(data, &LoadOptions::default())
    }

    pub fn validate_with(&self, data: &Value, options: &LoadOptions) -> SchemaResult<ErrorMessages> {
        collect_errors(self.unmarshaller(options).without_postprocess().run(data))
    }

    fn unmarshaller<'a>(&'a self, options: &'a LoadOptions) -> Unmarshaller<'a> {
        let many = options.many.unwrap_or(self.options.many);
        let partial: Option<&Partial> = options.partial.as_ref().or(self.options.partial.as_ref());
        Unmarshaller::new(self, many, partial, options.unknown)
    }
}
