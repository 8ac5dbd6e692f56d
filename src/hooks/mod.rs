//! Processing hooks attached to schema definitions.
//!
//! A hook is registered under a method name. Definitions resolve names
//! along their inheritance order (the most-derived registration wins, and
//! registering `None` under a name removes the inherited hook), then group
//! the surviving hooks into slots by `(phase, pass_many)`. Within a slot,
//! hooks run in ascending name order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error_store::{ErrorStore, ValidationError};
use crate::schema::{Partial, Schema};

/// Pipeline position of a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    PreDump,
    PostDump,
    PreLoad,
    PostLoad,
    /// Validator for one field's loaded value
    Validates,
    /// Validator for the whole loaded record
    ValidatesSchema,
}

/// What a hook receives besides the schema and the data.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    /// Whether the call processes a collection
    pub many: bool,
    /// Partial policy of a load call
    pub partial: Option<&'a Partial>,
    /// Data before any transformation; only set for `pass_original` hooks
    pub original: Option<&'a Value>,
}

/// Transforms the data passing through a pre/post phase.
pub type ProcessorFn =
    Arc<dyn Fn(&Schema, Value, &HookContext<'_>) -> Result<Value, ValidationError> + Send + Sync>;

/// Checks a field value or a whole record.
pub type CheckFn =
    Arc<dyn Fn(&Schema, &Value, &HookContext<'_>) -> Result<(), ValidationError> + Send + Sync>;

#[derive(Clone)]
enum Action {
    Process(ProcessorFn),
    Check(CheckFn),
}

/// A hook and its invocation flags.
#[derive(Clone)]
pub struct Hook {
    phase: Phase,
    pass_many: bool,
    pass_original: bool,
    skip_on_field_errors: bool,
    field_name: Option<String>,
    action: Action,
}

impl Hook {
    fn processor<F>(phase: Phase, f: F) -> Self
    where
        F: Fn(&Schema, Value, &HookContext<'_>) -> Result<Value, ValidationError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            phase,
            pass_many: false,
            pass_original: false,
            skip_on_field_errors: true,
            field_name: None,
            action: Action::Process(Arc::new(f)),
        }
    }

    pub fn pre_dump<F>(f: F) -> Self
    where
        F: Fn(&Schema, Value, &HookContext<'_>) -> Result<Value, ValidationError>
            + Send
            + Sync
            + 'static,
    {
        Self::processor(Phase::PreDump, f)
    }

    /// Runs only when the dump produced no errors.
    pub fn post_dump<F>(f: F) -> Self
    where
        F: Fn(&Schema, Value, &HookContext<'_>) -> Result<Value, ValidationError>
            + Send
            + Sync
            + 'static,
    {
        Self::processor(Phase::PostDump, f)
    }

    pub fn pre_load<F>(f: F) -> Self
    where
        F: Fn(&Schema, Value, &HookContext<'_>) -> Result<Value, ValidationError>
            + Send
            + Sync
            + 'static,
    {
        Self::processor(Phase::PreLoad, f)
    }

    /// Runs only when the load produced no errors. Builds the final output.
    pub fn post_load<F>(f: F) -> Self
    where
        F: Fn(&Schema, Value, &HookContext<'_>) -> Result<Value, ValidationError>
            + Send
            + Sync
            + 'static,
    {
        Self::processor(Phase::PostLoad, f)
    }

    /// Validates the loaded value of `field_name`. On failure the value is
    /// dropped from the result and the error is keyed by the field's data key.
    pub fn validates<F>(field_name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Schema, &Value, &HookContext<'_>) -> Result<(), ValidationError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            phase: Phase::Validates,
            pass_many: false,
            pass_original: false,
            skip_on_field_errors: true,
            field_name: Some(field_name.into()),
            action: Action::Check(Arc::new(f)),
        }
    }

    /// Validates the whole loaded record. Errors are attributed through the
    /// raised error's `field_name`.
    pub fn validates_schema<F>(f: F) -> Self
    where
        F: Fn(&Schema, &Value, &HookContext<'_>) -> Result<(), ValidationError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            phase: Phase::ValidatesSchema,
            pass_many: false,
            pass_original: false,
            skip_on_field_errors: true,
            field_name: None,
            action: Action::Check(Arc::new(f)),
        }
    }

    /// Receive the whole collection once instead of each item. Field
    /// validators always run per item, so this has no effect on them.
    pub fn pass_many(mut self, pass_many: bool) -> Self {
        self.pass_many = pass_many && self.phase != Phase::Validates;
        self
    }

    pub fn pass_original(mut self, pass_original: bool) -> Self {
        self.pass_original = pass_original;
        self
    }

    /// Schema validators only. Defaults to true.
    pub fn skip_on_field_errors(mut self, skip: bool) -> Self {
        self.skip_on_field_errors = skip;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }

    fn context<'a>(
        &self,
        many: bool,
        partial: Option<&'a Partial>,
        original: &'a Value,
    ) -> HookContext<'a> {
        HookContext {
            many,
            partial,
            original: self.pass_original.then_some(original),
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("phase", &self.phase)
            .field("pass_many", &self.pass_many)
            .field("pass_original", &self.pass_original)
            .field("field_name", &self.field_name)
            .finish()
    }
}

/// Resolved hooks of one definition, grouped by slot.
#[derive(Debug, Clone, Default)]
pub struct HookTable {
    slots: BTreeMap<(Phase, bool), Vec<(String, Hook)>>,
}

impl HookTable {
    /// Builds slots from resolved registrations; `None` entries are skipped.
    pub(crate) fn build(resolved: &BTreeMap<String, Option<Hook>>) -> Self {
        let mut slots: BTreeMap<(Phase, bool), Vec<(String, Hook)>> = BTreeMap::new();
        for (name, hook) in resolved {
            if let Some(hook) = hook {
                slots
                    .entry((hook.phase, hook.pass_many))
                    .or_default()
                    .push((name.clone(), hook.clone()));
            }
        }
        Self { slots }
    }

    pub fn slot(&self, phase: Phase, pass_many: bool) -> &[(String, Hook)] {
        self.slots
            .get(&(phase, pass_many))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has(&self, phase: Phase) -> bool {
        !self.slot(phase, false).is_empty() || !self.slot(phase, true).is_empty()
    }

    /// Hook method names in a slot, in invocation order.
    pub fn names(&self, phase: Phase, pass_many: bool) -> Vec<&str> {
        self.slot(phase, pass_many)
            .iter()
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Field names targeted by `validates` hooks.
    pub(crate) fn validated_fields(&self) -> impl Iterator<Item = &str> {
        self.slot(Phase::Validates, false)
            .iter()
            .chain(self.slot(Phase::Validates, true))
            .filter_map(|(_, hook)| hook.field_name())
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Runs the processors of one slot over `data`.
///
/// In many mode, per-item processors are mapped over the collection, each
/// item paired with its original counterpart.
pub(crate) fn run_processors(
    schema: &Schema,
    phase: Phase,
    pass_many: bool,
    mut data: Value,
    many: bool,
    original: &Value,
    partial: Option<&Partial>,
) -> Result<Value, ValidationError> {
    for (name, hook) in schema.definition().hooks().slot(phase, pass_many) {
        let Action::Process(processor) = &hook.action else {
            continue;
        };
        tracing::trace!(hook = name.as_str(), ?phase, pass_many, "invoking processor");
        data = match data {
            Value::Array(items) if many && !pass_many => {
                let mut processed = Vec::with_capacity(items.len());
                for (idx, item) in items.into_iter().enumerate() {
                    let item_original = original.get(idx).unwrap_or(&Value::Null);
                    let ctx = hook.context(many, partial, item_original);
                    processed.push(processor(schema, item, &ctx)?);
                }
                Value::Array(processed)
            }
            whole => {
                let ctx = hook.context(many, partial, original);
                processor(schema, whole, &ctx)?
            }
        };
    }
    Ok(data)
}

/// Runs `validates` hooks against the loaded values of their fields. A
/// value that fails is removed from the result.
pub(crate) fn run_field_validators(
    schema: &Schema,
    store: &mut ErrorStore,
    data: &mut Value,
    many: bool,
    partial: Option<&Partial>,
) {
    let index_errors = schema.definition().opts().index_errors;
    for (name, hook) in schema.definition().hooks().slot(Phase::Validates, false) {
        let (Action::Check(check), Some(field_name)) = (&hook.action, hook.field_name()) else {
            continue;
        };
        let Some(field) = schema.field(field_name) else {
            tracing::trace!(hook = name.as_str(), field = field_name, "validated field not active");
            continue;
        };
        let data_key = field.get_data_key().unwrap_or(field_name);
        let attribute = field.get_attribute().unwrap_or(field_name);
        let ctx = HookContext {
            many,
            partial,
            original: None,
        };
        let mut validate_item = |item: &mut Value, index: Option<usize>| {
            let Some(record) = item.as_object_mut() else {
                return;
            };
            let Some(value) = record.get(attribute) else {
                return;
            };
            if let Err(err) = check(schema, value, &ctx) {
                store.store_error(err.into_messages(), data_key, index);
                record.remove(attribute);
            }
        };
        match &mut *data {
            Value::Array(items) if many => {
                for (idx, item) in items.iter_mut().enumerate() {
                    validate_item(item, index_errors.then_some(idx));
                }
            }
            item => validate_item(item, None),
        }
    }
}

/// Runs `validates_schema` hooks of one slot.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_schema_validators(
    schema: &Schema,
    store: &mut ErrorStore,
    pass_many: bool,
    data: &Value,
    original: &Value,
    many: bool,
    partial: Option<&Partial>,
    field_errors: bool,
) {
    let index_errors = schema.definition().opts().index_errors;
    for (name, hook) in schema
        .definition()
        .hooks()
        .slot(Phase::ValidatesSchema, pass_many)
    {
        let Action::Check(check) = &hook.action else {
            continue;
        };
        if field_errors && hook.skip_on_field_errors {
            tracing::trace!(hook = name.as_str(), "skipped after field errors");
            continue;
        }
        let mut run = |item: &Value, item_original: &Value, index: Option<usize>| {
            let ctx = hook.context(many, partial, item_original);
            if let Err(err) = check(schema, item, &ctx) {
                let field_name = err.field_name().to_string();
                store.store_error(err.into_messages(), &field_name, index);
            }
        };
        match data {
            Value::Array(items) if many && !pass_many => {
                for (idx, item) in items.iter().enumerate() {
                    let item_original = original.get(idx).unwrap_or(&Value::Null);
                    run(item, item_original, index_errors.then_some(idx));
                }
            }
            whole => run(whole, original, None),
        }
    }
}
