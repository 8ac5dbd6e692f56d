//! Nested Resolution Tests
//!
//! Nested schemas and the class registry:
//! - Targets given by definition, instance, factory, name or "self"
//! - Partial and unknown policies reach nested loads
//! - Nested errors and valid data keep their shape
//! - Dotted only/exclude restrict nested schemas
//! - Each instance and copy resolves nested schemas on its own
//! - Registry lookups by bare and qualified name

use std::sync::Arc;

use schemabind::fields::{self, NestedField, SchemaRef};
use schemabind::{
    registry, LoadOptions, Partial, Schema, SchemaDef, SchemaError, SchemaOptions, SchemaOpts,
    Unknown,
};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

fn opts() -> SchemaOpts {
    SchemaOpts::new().register(false).ordered(true)
}

fn inner_def() -> Arc<SchemaDef> {
    SchemaDef::builder("Inner")
        .field("x", fields::integer().required())
        .field("y", fields::integer())
        .opts(opts())
        .build()
        .unwrap()
}

fn outer_schema() -> Schema {
    let def = SchemaDef::builder("Outer")
        .field("inner", fields::nested(&inner_def()))
        .field("label", fields::string())
        .opts(opts())
        .build()
        .unwrap();
    Schema::new(&def).unwrap()
}

// =============================================================================
// Partial Propagation Tests
// =============================================================================

/// partial=true reaches the nested schema.
#[test]
fn test_nested_partial_all() {
    let loaded = outer_schema()
        .load_with(&json!({"inner": {"y": 1}}), &LoadOptions::new().partial(true))
        .unwrap();
    assert_eq!(loaded, json!({"inner": {"y": 1}}));
}

/// Dotted partial names reach only the named nested field.
#[test]
fn test_nested_partial_dotted() {
    let schema = outer_schema();
    let loaded = schema
        .load_with(
            &json!({"inner": {"y": 1}}),
            &LoadOptions::new().partial(Partial::fields(["inner.x"])),
        )
        .unwrap();
    assert_eq!(loaded, json!({"inner": {"y": 1}}));

    let errors = schema
        .validate_with(
            &json!({"inner": {"y": 1}}),
            &LoadOptions::new().partial(Partial::fields(["label"])),
        )
        .unwrap();
    assert_eq!(
        errors.to_value(),
        json!({"inner": {"x": ["Missing data for required field."]}})
    );
}

/// Without partial the nested failure is attributed under the outer key.
#[test]
fn test_nested_error_attribution() {
    let err = outer_schema()
        .load(&json!({"inner": {"y": 1}, "label": "ok"}))
        .unwrap_err()
        .into_validation()
        .unwrap();
    assert_eq!(
        err.messages().to_value(),
        json!({"inner": {"x": ["Missing data for required field."]}})
    );
    assert_eq!(err.valid_data(), Some(&json!({"inner": {"y": 1}, "label": "ok"})));
}

/// A non-object nested value is a type error of the nested record.
#[test]
fn test_nested_type_error() {
    let errors = outer_schema().validate(&json!({"inner": 5})).unwrap();
    assert_eq!(
        errors.to_value(),
        json!({"inner": {"_schema": ["Invalid input type."]}})
    );
}

// =============================================================================
// Unknown Propagation Tests
// =============================================================================

/// An explicit call-level policy reaches nested loads.
#[test]
fn test_call_level_unknown_reaches_nested() {
    let schema = outer_schema();
    let data = json!({"inner": {"x": 1, "zzz": 2}});

    let errors = schema.validate(&data).unwrap();
    assert_eq!(errors.to_value(), json!({"inner": {"zzz": ["Unknown field."]}}));

    let loaded = schema
        .load_with(&data, &LoadOptions::new().unknown(Unknown::Exclude))
        .unwrap();
    assert_eq!(loaded, json!({"inner": {"x": 1}}));
}

/// A nested field's own policy wins over the call's.
#[test]
fn test_nested_field_unknown_wins() {
    let def = SchemaDef::builder("OuterInclude")
        .field(
            "inner",
            fields::nested_with(NestedField::new(&inner_def()).unknown(Unknown::Include)),
        )
        .opts(opts())
        .build()
        .unwrap();
    let loaded = Schema::new(&def)
        .unwrap()
        .load_with(
            &json!({"inner": {"x": 1, "zzz": 2}}),
            &LoadOptions::new().unknown(Unknown::Exclude),
        )
        .unwrap();
    assert_eq!(loaded, json!({"inner": {"x": 1, "zzz": 2}}));
}

// =============================================================================
// Collection Tests
// =============================================================================

/// Many-nested errors are keyed by item index inside the field.
#[test]
fn test_nested_many() {
    let def = SchemaDef::builder("OuterMany")
        .field("items", fields::nested_with(NestedField::new(&inner_def()).many(true)))
        .opts(opts())
        .build()
        .unwrap();
    let schema = Schema::new(&def).unwrap();

    let dumped = schema.dump(&json!({"items": [{"x": 1}, {"x": 2, "y": 3}]})).unwrap();
    assert_eq!(dumped, json!({"items": [{"x": 1}, {"x": 2, "y": 3}]}));

    let err = schema
        .load(&json!({"items": [{"x": 1}, {"y": 3}]}))
        .unwrap_err()
        .into_validation()
        .unwrap();
    assert_eq!(
        err.messages().to_value(),
        json!({"items": {"1": {"x": ["Missing data for required field."]}}})
    );
    assert_eq!(err.valid_data(), Some(&json!({"items": [{"x": 1}, {"y": 3}]})));

    let errors = schema.validate(&json!({"items": {"x": 1}})).unwrap();
    assert_eq!(errors.to_value(), json!({"items": ["Invalid type."]}));
}

/// A list of nested records reports failures per element.
#[test]
fn test_list_of_nested() {
    let def = SchemaDef::builder("OuterList")
        .field("items", fields::list(fields::nested(&inner_def())))
        .opts(opts())
        .build()
        .unwrap();
    let errors = Schema::new(&def)
        .unwrap()
        .validate(&json!({"items": [{"x": 1}, {"x": "bad"}]}))
        .unwrap();
    assert_eq!(
        errors.to_value(),
        json!({"items": {"1": {"x": ["Not a valid integer."]}}})
    );
}

// =============================================================================
// Restriction Tests
// =============================================================================

/// Dotted only and exclude reach into nested schemas.
#[test]
fn test_dotted_only_and_exclude() {
    let def = SchemaDef::builder("OuterDotted")
        .field("inner", fields::nested(&inner_def()))
        .field("label", fields::string())
        .opts(opts())
        .build()
        .unwrap();
    let obj = json!({"inner": {"x": 1, "y": 2}, "label": "l"});

    let only = Schema::with_options(&def, SchemaOptions::new().only(["inner.y"])).unwrap();
    assert_eq!(only.dump(&obj).unwrap(), json!({"inner": {"y": 2}}));

    let exclude = Schema::with_options(&def, SchemaOptions::new().exclude(["inner.y"])).unwrap();
    assert_eq!(exclude.dump(&obj).unwrap(), json!({"inner": {"x": 1}, "label": "l"}));
}

/// Nested only must name fields of the nested schema.
#[test]
fn test_nested_invalid_only() {
    let def = SchemaDef::builder("OuterBadOnly")
        .field("inner", fields::nested_with(NestedField::new(&inner_def()).only(["nope"])))
        .opts(opts())
        .build()
        .unwrap();
    let err = Schema::new(&def).unwrap().dump(&json!({"inner": {}})).unwrap_err();
    assert!(matches!(
        err,
        schemabind::Error::Schema(SchemaError::InvalidFields { .. })
    ));
}

/// Instance targets are copied and restricted, never shared.
#[test]
fn test_instance_target_restricted() {
    let configured = Schema::with_options(&inner_def(), SchemaOptions::new().only(["x", "y"])).unwrap();
    let def = SchemaDef::builder("OuterInstance")
        .field(
            "inner",
            fields::nested_with(NestedField::new(configured.clone()).only(["x"])),
        )
        .opts(opts())
        .build()
        .unwrap();
    let dumped = Schema::new(&def)
        .unwrap()
        .dump(&json!({"inner": {"x": 1, "y": 2}}))
        .unwrap();
    assert_eq!(dumped, json!({"inner": {"x": 1}}));
    assert_eq!(configured.fields().count(), 2);
}

/// Factories are called on first use.
#[test]
fn test_factory_target() {
    let def = SchemaDef::builder("OuterFactory")
        .field(
            "inner",
            fields::nested(SchemaRef::factory(|| Schema::new(&inner_def()))),
        )
        .opts(opts())
        .build()
        .unwrap();
    let loaded = Schema::new(&def)
        .unwrap()
        .load(&json!({"inner": {"x": "4"}}))
        .unwrap();
    assert_eq!(loaded, json!({"inner": {"x": 4}}));
}

// =============================================================================
// Instance Isolation Tests
// =============================================================================

/// Copies of a resolved instance keep working on their own.
#[test]
fn test_cloned_instance_after_resolution() {
    let schema = outer_schema();
    let obj = json!({"inner": {"x": 1, "y": 2}, "label": "l"});
    assert_eq!(schema.dump(&obj).unwrap(), obj);

    let copy = schema.clone();
    drop(schema);
    assert_eq!(copy.load(&obj).unwrap(), obj);
    assert_eq!(
        copy.validate(&json!({"inner": {"y": 1}})).unwrap().to_value(),
        json!({"inner": {"x": ["Missing data for required field."]}})
    );
}

/// Instances of one definition resolve their nested schemas separately.
#[test]
fn test_nested_cache_per_instance() {
    let def = SchemaDef::builder("OuterIsolated")
        .field("inner", fields::nested(&inner_def()))
        .opts(opts())
        .build()
        .unwrap();
    let obj = json!({"inner": {"x": 1, "y": 2}});

    let full = Schema::new(&def).unwrap();
    assert_eq!(full.dump(&obj).unwrap(), obj);
    let narrowed = Schema::with_options(&def, SchemaOptions::new().only(["inner.x"])).unwrap();
    assert_eq!(narrowed.dump(&obj).unwrap(), json!({"inner": {"x": 1}}));

    let narrowed_copy = narrowed.clone();
    assert_eq!(full.dump(&obj).unwrap(), obj);
    assert_eq!(narrowed_copy.dump(&obj).unwrap(), json!({"inner": {"x": 1}}));
}

// =============================================================================
// Self Reference Tests
// =============================================================================

/// "self" targets the definition that owns the field, to any depth.
#[test]
fn test_self_reference() {
    let def = SchemaDef::builder("TreeNode")
        .field("name", fields::string())
        .field("children", fields::list(fields::nested("self")))
        .opts(opts())
        .build()
        .unwrap();
    let tree = json!({
        "name": "root",
        "children": [
            {"name": "a", "children": [{"name": "a1", "children": []}]},
            {"name": "b", "children": []}
        ]
    });
    let schema = Schema::new(&def).unwrap();
    assert_eq!(schema.dump(&tree).unwrap(), tree);
    assert_eq!(schema.load(&tree).unwrap(), tree);

    let errors = schema
        .validate(&json!({"name": "root", "children": [{"name": 7}]}))
        .unwrap();
    assert_eq!(
        errors.to_value(),
        json!({"children": {"0": {"name": ["Not a valid string."]}}})
    );
}

// =============================================================================
// Registry Tests
// =============================================================================

/// Nested targets may name a registered definition.
#[test]
fn test_nested_by_registered_name() {
    SchemaDef::builder("NestedRegAuthor")
        .module("tests.nested")
        .field("name", fields::string())
        .opts(SchemaOpts::new().ordered(true))
        .build()
        .unwrap();
    let def = SchemaDef::builder("NestedRegBook")
        .field("title", fields::string())
        .field("author", fields::nested("NestedRegAuthor"))
        .opts(opts())
        .build()
        .unwrap();

    let obj = json!({"title": "T", "author": {"name": "N", "age": 9}});
    let dumped = Schema::new(&def).unwrap().dump(&obj).unwrap();
    assert_eq!(dumped, json!({"title": "T", "author": {"name": "N"}}));
    assert!(registry::get_class("tests.nested.NestedRegAuthor").is_ok());
}

/// Same bare name from two modules needs the qualified name.
#[test]
fn test_ambiguous_registered_name() {
    for module in ["tests.alpha", "tests.beta"] {
        SchemaDef::builder("NestedRegDuplicate")
            .module(module)
            .field("id", fields::integer())
            .build()
            .unwrap();
    }
    assert_eq!(
        registry::get_class("NestedRegDuplicate").unwrap_err(),
        SchemaError::AmbiguousClass("NestedRegDuplicate".into())
    );
    assert_eq!(registry::get_all("NestedRegDuplicate").unwrap().len(), 2);

    let ambiguous = SchemaDef::builder("NestedRegAmbiguousUser")
        .field("ref", fields::nested("NestedRegDuplicate"))
        .opts(opts())
        .build()
        .unwrap();
    let err = Schema::new(&ambiguous)
        .unwrap()
        .dump(&json!({"ref": {"id": 1}}))
        .unwrap_err();
    assert!(matches!(
        err,
        schemabind::Error::Schema(SchemaError::AmbiguousClass(_))
    ));

    let qualified = SchemaDef::builder("NestedRegQualifiedUser")
        .field("ref", fields::nested("tests.beta.NestedRegDuplicate"))
        .opts(opts())
        .build()
        .unwrap();
    let dumped = Schema::new(&qualified).unwrap().dump(&json!({"ref": {"id": 1}})).unwrap();
    assert_eq!(dumped, json!({"ref": {"id": 1}}));
}

/// Unregistered definitions cannot be found by name.
#[test]
fn test_unregistered_not_found() {
    SchemaDef::builder("NestedRegHidden")
        .opts(SchemaOpts::new().register(false))
        .build()
        .unwrap();
    assert_eq!(
        registry::get_class("NestedRegHidden").unwrap_err(),
        SchemaError::ClassNotFound("NestedRegHidden".into())
    );
}

// =============================================================================
// Pluck Tests
// =============================================================================

/// Pluck dumps one nested field and wraps it back on load.
#[test]
fn test_pluck() {
    let def = SchemaDef::builder("PluckOwner")
        .field(
            "friends",
            fields::pluck_with(fields::PluckField::new(&inner_def(), "x").many(true)),
        )
        .opts(opts())
        .build()
        .unwrap();
    let schema = Schema::new(&def).unwrap();
    let dumped = schema
        .dump(&json!({"friends": [{"x": 1, "y": 5}, {"x": 2}]}))
        .unwrap();
    assert_eq!(dumped, json!({"friends": [1, 2]}));
    assert_eq!(schema.load(&dumped).unwrap(), json!({"friends": [{"x": 1}, {"x": 2}]}));
}
