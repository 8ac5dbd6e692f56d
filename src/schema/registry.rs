//! Class registry for name-based nested references.
//!
//! Definitions register under their bare name and their qualified
//! `module.Name` path. Several definitions may share a bare name (from
//! different modules); looking that name up is then ambiguous and callers
//! must use the qualified path. Entries live for the whole process.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use super::definition::SchemaDef;
use super::errors::{SchemaError, SchemaResult};

static REGISTRY: Lazy<ClassRegistry> = Lazy::new(ClassRegistry::new);

/// Name -> definitions map guarded by a lock.
#[derive(Default)]
pub struct ClassRegistry {
    classes: RwLock<HashMap<String, Vec<Arc<SchemaDef>>>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `def` under its bare name and its qualified path.
    ///
    /// Registering again from the same module replaces the earlier entry.
    pub fn register(&self, def: &Arc<SchemaDef>) -> SchemaResult<()> {
        let mut classes = self
            .classes
            .write()
            .map_err(|_| SchemaError::LockPoisoned)?;

        let bare = classes.entry(def.name().to_string()).or_default();
        match bare.iter_mut().find(|each| each.module() == def.module()) {
            Some(existing) => *existing = Arc::clone(def),
            None => bare.push(Arc::clone(def)),
        }

        let full_name = def.full_name();
        if full_name != def.name() {
            classes.insert(full_name, vec![Arc::clone(def)]);
        }

        tracing::debug!(
            schema = def.name(),
            full_name = %def.full_name(),
            "registered schema"
        );
        Ok(())
    }

    /// Returns the single definition registered under `name`.
    pub fn get_class(&self, name: &str) -> SchemaResult<Arc<SchemaDef>> {
        let mut candidates = self.get_all(name)?;
        if candidates.len() > 1 {
            return Err(SchemaError::AmbiguousClass(name.to_string()));
        }
        candidates
            .pop()
            .ok_or_else(|| SchemaError::ClassNotFound(name.to_string()))
    }

    /// Returns every definition registered under `name`.
    pub fn get_all(&self, name: &str) -> SchemaResult<Vec<Arc<SchemaDef>>> {
        let classes = self
            .classes
            .read()
            .map_err(|_| SchemaError::LockPoisoned)?;
        match classes.get(name) {
            Some(found) if !found.is_empty() => Ok(found.clone()),
            _ => Err(SchemaError::ClassNotFound(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes
            .read()
            .map(|classes| classes.contains_key(name))
            .unwrap_or(false)
    }

    /// Number of registered names (bare and qualified).
    pub fn len(&self) -> usize {
        self.classes.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The process-wide registry.
pub fn global() -> &'static ClassRegistry {
    &REGISTRY
}

pub fn register(def: &Arc<SchemaDef>) -> SchemaResult<()> {
    REGISTRY.register(def)
}

pub fn get_class(name: &str) -> SchemaResult<Arc<SchemaDef>> {
    REGISTRY.get_class(name)
}

pub fn get_all(name: &str) -> SchemaResult<Vec<Arc<SchemaDef>>> {
    REGISTRY.get_all(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::schema::SchemaOpts;

    fn unregistered(name: &str, module: &str) -> Arc<SchemaDef> {
        SchemaDef::builder(name)
            .module(module)
            .field("id", fields::integer())
            .opts(SchemaOpts::new().register(false))
            .build()
            .unwrap()
    }

    #[test]
    fn test_bare_and_qualified_lookup() {
        let registry = ClassRegistry::new();
        let def = unregistered("Account", "billing");
        registry.register(&def).unwrap();
        assert!(Arc::ptr_eq(&registry.get_class("Account").unwrap(), &def));
        assert!(Arc::ptr_eq(&registry.get_class("billing.Account").unwrap(), &def));
    }

    #[test]
    fn test_same_bare_name_is_ambiguous() {
        let registry = ClassRegistry::new();
        registry.register(&unregistered("Item", "shop")).unwrap();
        registry.register(&unregistered("Item", "store")).unwrap();

        assert_eq!(
            registry.get_class("Item").unwrap_err(),
            SchemaError::AmbiguousClass("Item".into())
        );
        assert_eq!(registry.get_all("Item").unwrap().len(), 2);
        assert!(registry.get_class("shop.Item").is_ok());
    }

    #[test]
    fn test_reregistration_from_same_module_replaces() {
        let registry = ClassRegistry::new();
        let first = unregistered("Widget", "ui");
        let second = unregistered("Widget", "ui");
        registry.register(&first).unwrap();
        registry.register(&second).unwrap();
        assert!(Arc::ptr_eq(&registry.get_class("Widget").unwrap(), &second));
        assert!(Arc::ptr_eq(&registry.get_class("ui.Widget").unwrap(), &second));
    }

    #[test]
    fn test_not_found() {
        let registry = ClassRegistry::new();
        assert_eq!(
            registry.get_class("Nope").unwrap_err(),
            SchemaError::ClassNotFound("Nope".into())
        );
        assert!(!registry.contains("Nope"));
    }
}
