//! Schema definitions: the class-level side of a schema.
//!
//! A definition is built once by [`SchemaBuilder`] and shared behind an
//! `Arc`. Building:
//! 1. linearizes the bases (C3)
//! 2. collects declared fields, ancestors first, with overrides kept at the
//!    ancestor's position
//! 3. resolves hooks by name along the linearization
//! 4. checks the options and fields for contradictions
//! 5. registers the definition unless `register` is off

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::errors::{SchemaError, SchemaResult};
use super::options::SchemaOpts;
use super::registry;
use crate::fields::Field;
use crate::hooks::{Hook, HookTable};
use crate::marshalling::{Accessor, DefaultAccessor};

static DEFINITION_IDS: AtomicU64 = AtomicU64::new(0);

/// Record-level message keys and their defaults.
const SCHEMA_MESSAGES: &[(&str, &str)] = &[
    ("type", "Invalid input type."),
    ("unknown", "Unknown field."),
];

/// Called for every field when a schema instance binds it.
pub type BindFieldFn = Arc<dyn Fn(&str, &mut Field) + Send + Sync>;

/// A schema class: declared fields, resolved hooks and options.
pub struct SchemaDef {
    id: u64,
    name: String,
    module: String,
    bases: Vec<Arc<SchemaDef>>,
    /// Linearized ancestors, nearest first, excluding this definition
    ancestors: Vec<Arc<SchemaDef>>,
    own_fields: Vec<(String, Field)>,
    own_hooks: BTreeMap<String, Option<Hook>>,
    declared_fields: Vec<(String, Field)>,
    hooks: HookTable,
    opts: SchemaOpts,
    own_accessor: Option<Arc<dyn Accessor>>,
    accessor: Arc<dyn Accessor>,
    own_on_bind_field: Option<BindFieldFn>,
    on_bind_field: Option<BindFieldFn>,
}

impl SchemaDef {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Definition context used to tell same-named definitions apart.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// `module.Name`, or the bare name without a module.
    pub fn full_name(&self) -> String {
        if self.module.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.module, self.name)
        }
    }

    pub fn bases(&self) -> &[Arc<SchemaDef>] {
        &self.bases
    }

    /// Method resolution order: this definition, then its ancestors.
    pub fn mro(&self) -> Vec<&str> {
        std::iter::once(self.name())
            .chain(self.ancestors.iter().map(|a| a.name()))
            .collect()
    }

    pub fn is_subclass_of(&self, other: &SchemaDef) -> bool {
        self.id == other.id || self.ancestors.iter().any(|a| a.id == other.id)
    }

    /// All declared fields including inherited ones, in declaration order.
    pub fn declared_fields(&self) -> &[(String, Field)] {
        &self.declared_fields
    }

    pub fn declared_field(&self, name: &str) -> Option<&Field> {
        self.declared_fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
    }

    /// Fields declared on this definition itself.
    pub fn own_fields(&self) -> &[(String, Field)] {
        &self.own_fields
    }

    pub fn hooks(&self) -> &HookTable {
        &self.hooks
    }

    pub fn opts(&self) -> &SchemaOpts {
        &self.opts
    }

    pub fn accessor(&self) -> &dyn Accessor {
        self.accessor.as_ref()
    }

    pub(crate) fn on_bind_field(&self) -> Option<&BindFieldFn> {
        self.on_bind_field.as_ref()
    }

    /// Record-level message for `key`, with definition overrides applied.
    pub fn error_message(&self, key: &str) -> String {
        if let Some(message) = self.opts.error_messages.get(key) {
            return message.clone();
        }
        SCHEMA_MESSAGES
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, m)| (*m).to_string())
            .unwrap_or_else(|| {
                tracing::warn!(key, schema = self.name(), "no schema message for key");
                "Invalid value.".to_string()
            })
    }

    /// Names a load or dump may select: the `fields` option, else declared
    /// fields plus `additional`.
    pub(crate) fn available_names(&self) -> Vec<String> {
        if let Some(fields) = &self.opts.fields {
            return fields.clone();
        }
        let mut names: Vec<String> = self.declared_fields.iter().map(|(n, _)| n.clone()).collect();
        for extra in &self.opts.additional {
            if !names.contains(extra) {
                names.push(extra.clone());
            }
        }
        names
    }
}

impl fmt::Debug for SchemaDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaDef")
            .field("name", &self.full_name())
            .field("mro", &self.mro())
            .field(
                "fields",
                &self.declared_fields.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            )
            .field("opts", &self.opts)
            .finish()
    }
}

/// C3 linearization of `bases`, excluding the definition being built.
fn linearize(name: &str, bases: &[Arc<SchemaDef>]) -> SchemaResult<Vec<Arc<SchemaDef>>> {
    let mut sequences: Vec<Vec<Arc<SchemaDef>>> = bases
        .iter()
        .map(|base| {
            std::iter::once(Arc::clone(base))
                .chain(base.ancestors.iter().cloned())
                .collect()
        })
        .collect();
    sequences.push(bases.to_vec());

    let mut result: Vec<Arc<SchemaDef>> = Vec::new();
    loop {
        sequences.retain(|s| !s.is_empty());
        if sequences.is_empty() {
            return Ok(result);
        }
        let candidate = sequences
            .iter()
            .map(|s| &s[0])
            .find(|head| {
                !sequences
                    .iter()
                    .any(|s| s[1..].iter().any(|d| d.id == head.id))
            })
            .cloned()
            .ok_or_else(|| SchemaError::InconsistentHierarchy {
                schema: name.to_string(),
            })?;
        for sequence in sequences.iter_mut() {
            if sequence[0].id == candidate.id {
                sequence.remove(0);
            }
        }
        result.push(candidate);
    }
}

/// Inserts or replaces in place, keeping the first position of a name.
fn upsert(fields: &mut Vec<(String, Field)>, name: &str, field: &Field) {
    match fields.iter_mut().find(|(n, _)| n == name) {
        Some(slot) => slot.1 = field.clone(),
        None => fields.push((name.to_string(), field.clone())),
    }
}

/// Builds a [`SchemaDef`].
pub struct SchemaBuilder {
    name: String,
    module: String,
    bases: Vec<Arc<SchemaDef>>,
    fields: Vec<(String, Field)>,
    hooks: BTreeMap<String, Option<Hook>>,
    opts: Option<SchemaOpts>,
    accessor: Option<Arc<dyn Accessor>>,
    on_bind_field: Option<BindFieldFn>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: String::new(),
            bases: Vec::new(),
            fields: Vec::new(),
            hooks: BTreeMap::new(),
            opts: None,
            accessor: None,
            on_bind_field: None,
        }
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    /// Adds a base; order matters for linearization.
    pub fn base(mut self, base: &Arc<SchemaDef>) -> Self {
        self.bases.push(Arc::clone(base));
        self
    }

    /// Declares a field. Declaring a name twice keeps the later field.
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        let name = name.into();
        self.fields.retain(|(n, _)| *n != name);
        self.fields.push((name, field));
        self
    }

    /// Registers a hook under a method name, shadowing inherited ones.
    pub fn hook(mut self, name: impl Into<String>, hook: Hook) -> Self {
        self.hooks.insert(name.into(), Some(hook));
        self
    }

    /// Removes an inherited hook.
    pub fn remove_hook(mut self, name: impl Into<String>) -> Self {
        self.hooks.insert(name.into(), None);
        self
    }

    /// Without explicit options, the first base's options are inherited.
    pub fn opts(mut self, opts: SchemaOpts) -> Self {
        self.opts = Some(opts);
        self
    }

    /// Overrides attribute lookup for dumps.
    pub fn accessor(mut self, accessor: impl Accessor + 'static) -> Self {
        self.accessor = Some(Arc::new(accessor));
        self
    }

    pub fn on_bind_field<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &mut Field) + Send + Sync + 'static,
    {
        self.on_bind_field = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> SchemaResult<Arc<SchemaDef>> {
        let ancestors = linearize(&self.name, &self.bases)?;

        let opts = self
            .opts
            .or_else(|| self.bases.first().map(|b| b.opts.clone()))
            .unwrap_or_default();
        if opts.fields.is_some() && !opts.additional.is_empty() {
            return Err(SchemaError::ConflictingOptions { schema: self.name });
        }

        let mut own_fields = self.fields;
        own_fields.sort_by_key(|(_, f)| f.creation_index());
        for (name, field) in &own_fields {
            field.verify(name)?;
        }

        let mut declared_fields: Vec<(String, Field)> = Vec::new();
        for ancestor in ancestors.iter().rev() {
            for (name, field) in &ancestor.declared_fields {
                upsert(&mut declared_fields, name, field);
            }
        }
        for (name, field) in &own_fields {
            upsert(&mut declared_fields, name, field);
        }

        let mut resolved = self.hooks.clone();
        for ancestor in &ancestors {
            for (name, hook) in &ancestor.own_hooks {
                resolved.entry(name.clone()).or_insert_with(|| hook.clone());
            }
        }
        let hooks = HookTable::build(&resolved);

        for target in hooks.validated_fields() {
            let declared = declared_fields.iter().any(|(n, _)| n == target);
            let listed = opts.fields.iter().flatten().any(|n| n == target)
                || opts.additional.iter().any(|n| n == target);
            if !declared && !listed {
                return Err(SchemaError::UnknownValidatedField {
                    schema: self.name,
                    field: target.to_string(),
                });
            }
        }

        let accessor = self
            .accessor
            .clone()
            .or_else(|| ancestors.iter().find_map(|a| a.own_accessor.clone()))
            .unwrap_or_else(|| Arc::new(DefaultAccessor));
        let on_bind_field = self
            .on_bind_field
            .clone()
            .or_else(|| ancestors.iter().find_map(|a| a.own_on_bind_field.clone()));

        let def = Arc::new(SchemaDef {
            id: DEFINITION_IDS.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            module: self.module,
            bases: self.bases,
            ancestors,
            own_fields,
            own_hooks: self.hooks,
            declared_fields,
            hooks,
            opts,
            own_accessor: self.accessor,
            accessor,
            own_on_bind_field: self.on_bind_field,
            on_bind_field,
        });
        tracing::debug!(
            schema = def.name(),
            fields = def.declared_fields.len(),
            mro = ?def.mro(),
            "built schema definition"
        );

        if def.opts.register {
            registry::register(&def)?;
        }
        Ok(def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::hooks::Phase;

    fn quiet() -> SchemaOpts {
        SchemaOpts::new().register(false).ordered(true)
    }

    fn names(def: &SchemaDef) -> Vec<&str> {
        def.declared_fields().iter().map(|(n, _)| n.as_str()).collect()
    }

    #[test]
    fn test_inherited_fields_come_first() {
        let a = SchemaDef::builder("A").field("x", fields::integer()).opts(quiet()).build().unwrap();
        let b = SchemaDef::builder("B").base(&a).field("y", fields::string()).build().unwrap();
        assert_eq!(names(&b), vec!["x", "y"]);
        assert!(b.opts().ordered);
    }

    #[test]
    fn test_override_keeps_position() {
        let a = SchemaDef::builder("A")
            .field("x", fields::integer())
            .field("z", fields::integer())
            .opts(quiet())
            .build()
            .unwrap();
        let b = SchemaDef::builder("B")
            .base(&a)
            .field("y", fields::string())
            .field("x", fields::string())
            .build()
            .unwrap();
        assert_eq!(names(&b), vec!["x", "z", "y"]);
        assert_eq!(b.declared_field("x").unwrap().field_type().type_name(), "string");
        assert_eq!(b.own_fields().len(), 2);
    }

    #[test]
    fn test_diamond_linearization() {
        let base = SchemaDef::builder("Base").opts(quiet()).build().unwrap();
        let left = SchemaDef::builder("Left").base(&base).build().unwrap();
        let right = SchemaDef::builder("Right").base(&base).build().unwrap();
        let child = SchemaDef::builder("Child").base(&left).base(&right).build().unwrap();
        assert_eq!(child.mro(), vec!["Child", "Left", "Right", "Base"]);
        assert!(child.is_subclass_of(&base));
        assert!(!base.is_subclass_of(&child));
    }

    #[test]
    fn test_inconsistent_hierarchy() {
        let x = SchemaDef::builder("X").opts(quiet()).build().unwrap();
        let y = SchemaDef::builder("Y").base(&x).build().unwrap();
        let err = SchemaDef::builder("Z").base(&x).base(&y).build().unwrap_err();
        assert_eq!(err, SchemaError::InconsistentHierarchy { schema: "Z".into() });
    }

    #[test]
    fn test_conflicting_options() {
        let err = SchemaDef::builder("Bad")
            .opts(quiet().fields(["a"]).additional(["b"]))
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::ConflictingOptions { schema: "Bad".into() });
    }

    #[test]
    fn test_hooks_most_derived_wins_and_removal() {
        let a = SchemaDef::builder("A")
            .hook("wrap", Hook::post_dump(|_, data, _| Ok(data)))
            .hook("strip", Hook::pre_load(|_, data, _| Ok(data)))
            .opts(quiet())
            .build()
            .unwrap();
        let b = SchemaDef::builder("B")
            .base(&a)
            .hook("wrap", Hook::post_dump(|_, data, _| Ok(data)).pass_many(true))
            .remove_hook("strip")
            .build()
            .unwrap();
        assert!(b.hooks().names(Phase::PostDump, false).is_empty());
        assert_eq!(b.hooks().names(Phase::PostDump, true), vec!["wrap"]);
        assert!(!b.hooks().has(Phase::PreLoad));
        assert!(a.hooks().has(Phase::PreLoad));
    }

    #[test]
    fn test_validates_unknown_field() {
        let err = SchemaDef::builder("V")
            .field("age", fields::integer())
            .hook("check_name", Hook::validates("name", |_, _, _| Ok(())))
            .opts(quiet())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownValidatedField { .. }));
    }

    #[test]
    fn test_schema_messages() {
        let def = SchemaDef::builder("M")
            .opts(quiet().error_message("unknown", "Not allowed."))
            .build()
            .unwrap();
        assert_eq!(def.error_message("unknown"), "Not allowed.");
        assert_eq!(def.error_message("type"), "Invalid input type.");
    }
}
