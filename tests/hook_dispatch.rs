//! Hook Dispatch Tests
//!
//! Ordering and failure behavior of processing hooks:
//! - Envelope hooks are symmetric between dump and load
//! - Per-item and whole-collection hooks run in a fixed order
//! - Field and schema validators report under the right keys
//! - Hook failures end the phase and surface as record-level errors
//! - Subclasses can override or remove inherited hooks

use std::sync::{Arc, Mutex};

use schemabind::{
    fields, Hook, LoadOptions, Schema, SchemaDef, SchemaOptions, SchemaOpts, ValidationError,
};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn opts() -> SchemaOpts {
    SchemaOpts::new().register(false).ordered(true)
}

type Log = Arc<Mutex<Vec<String>>>;

fn logger(log: &Log, entry: &'static str) -> Hook {
    let log = Arc::clone(log);
    Hook::post_load(move |_, data, _| {
        log.lock().unwrap().push(entry.to_string());
        Ok(data)
    })
}

// =============================================================================
// Envelope Tests
// =============================================================================

/// A collection hook wraps the dump and unwraps the load.
#[test]
fn test_envelope_hooks_round_trip() {
    let def = SchemaDef::builder("Enveloped")
        .field("n", fields::integer())
        .hook(
            "wrap",
            Hook::post_dump(|_, data, _| Ok(json!({ "items": data }))).pass_many(true),
        )
        .hook(
            "unwrap",
            Hook::pre_load(|_, data, _| Ok(data.get("items").cloned().unwrap_or(Value::Null)))
                .pass_many(true),
        )
        .opts(opts())
        .build()
        .unwrap();
    let schema = Schema::with_options(&def, SchemaOptions::new().many(true)).unwrap();

    let dumped = schema.dump(&json!([{"n": 1}, {"n": 2}])).unwrap();
    assert_eq!(dumped, json!({"items": [{"n": 1}, {"n": 2}]}));
    assert_eq!(schema.load(&dumped).unwrap(), json!([{"n": 1}, {"n": 2}]));
}

/// post_load runs per-item hooks before collection hooks, in name order.
#[test]
fn test_post_load_order() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let def = SchemaDef::builder("PostLoadOrder")
        .field("n", fields::integer())
        .hook("b_item", logger(&log, "b_item"))
        .hook("a_item", logger(&log, "a_item"))
        .hook("collection", logger(&log, "collection").pass_many(true))
        .opts(opts())
        .build()
        .unwrap();
    let schema = Schema::new(&def).unwrap();

    schema
        .load_with(&json!([{"n": 1}, {"n": 2}]), &LoadOptions::new().many(true))
        .unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["a_item", "a_item", "b_item", "b_item", "collection"]
    );
}

/// post_load builds the final object; it does not run when validating.
#[test]
fn test_post_load_skipped_by_validate() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let def = SchemaDef::builder("ValidateNoPostLoad")
        .field("n", fields::integer())
        .hook("make", logger(&log, "make"))
        .opts(opts())
        .build()
        .unwrap();
    let schema = Schema::new(&def).unwrap();

    assert!(schema.validate(&json!({"n": 1})).unwrap().is_empty());
    assert!(log.lock().unwrap().is_empty());
    schema.load(&json!({"n": 1})).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["make"]);
}

/// post_load does not run when fields failed.
#[test]
fn test_post_load_skipped_on_errors() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let def = SchemaDef::builder("NoPostLoadOnError")
        .field("n", fields::integer())
        .hook("make", logger(&log, "make"))
        .opts(opts())
        .build()
        .unwrap();
    assert!(Schema::new(&def).unwrap().load(&json!({"n": "x"})).is_err());
    assert!(log.lock().unwrap().is_empty());
}

/// pass_original hooks see the input as given.
#[test]
fn test_pass_original() {
    let def = SchemaDef::builder("Original")
        .field("n", fields::integer())
        .hook(
            "keep_extra",
            Hook::post_load(|_, mut data, ctx| {
                if let (Some(record), Some(original)) = (data.as_object_mut(), ctx.original) {
                    record.insert("raw_keys".into(), json!(original.as_object().map_or(0, |o| o.len())));
                }
                Ok(data)
            })
            .pass_original(true),
        )
        .opts(opts().unknown(schemabind::Unknown::Exclude))
        .build()
        .unwrap();
    let loaded = Schema::new(&def)
        .unwrap()
        .load(&json!({"n": 1, "extra": true}))
        .unwrap();
    assert_eq!(loaded, json!({"n": 1, "raw_keys": 2}));
}

// =============================================================================
// Validator Tests
// =============================================================================

fn signup_def(name: &str) -> Arc<SchemaDef> {
    SchemaDef::builder(name)
        .field("age", fields::integer())
        .field("password", fields::string())
        .field("confirm", fields::string())
        .hook(
            "age_positive",
            Hook::validates("age", |_, value, _| {
                if value.as_i64().map_or(false, |n| n < 0) {
                    return Err(ValidationError::new("Must be positive."));
                }
                Ok(())
            }),
        )
        .hook(
            "passwords_match",
            Hook::validates_schema(|_, data, _| {
                if data.get("password") != data.get("confirm") {
                    return Err(ValidationError::new("Passwords differ.").for_field("confirm"));
                }
                Ok(())
            }),
        )
        .opts(opts())
        .build()
        .unwrap()
}

/// A failed field validator reports under the field and drops its value.
#[test]
fn test_field_validator_drops_value() {
    let schema = Schema::new(&signup_def("SignupField")).unwrap();
    let err = schema
        .load(&json!({"age": -3, "password": "a", "confirm": "a"}))
        .unwrap_err()
        .into_validation()
        .unwrap();
    assert_eq!(err.messages().to_value(), json!({"age": ["Must be positive."]}));
    assert_eq!(err.valid_data(), Some(&json!({"password": "a", "confirm": "a"})));
}

/// A schema validator can attribute its error to any key.
#[test]
fn test_schema_validator_field_attribution() {
    let schema = Schema::new(&signup_def("SignupSchema")).unwrap();
    let errors = schema
        .validate(&json!({"age": 3, "password": "a", "confirm": "b"}))
        .unwrap();
    assert_eq!(errors.to_value(), json!({"confirm": ["Passwords differ."]}));
}

/// Schema validators are skipped once a field failed, unless told otherwise.
#[test]
fn test_skip_on_field_errors() {
    let schema = Schema::new(&signup_def("SignupSkip")).unwrap();
    let errors = schema
        .validate(&json!({"age": "x", "password": "a", "confirm": "b"}))
        .unwrap();
    assert_eq!(errors.to_value(), json!({"age": ["Not a valid integer."]}));

    let strict = SchemaDef::builder("SignupNoSkip")
        .base(&signup_def("SignupNoSkipBase"))
        .hook(
            "passwords_match",
            Hook::validates_schema(|_, data, _| {
                if data.get("password") != data.get("confirm") {
                    return Err(ValidationError::new("Passwords differ.").for_field("confirm"));
                }
                Ok(())
            })
            .skip_on_field_errors(false),
        )
        .build()
        .unwrap();
    let errors = Schema::new(&strict)
        .unwrap()
        .validate(&json!({"age": "x", "password": "a", "confirm": "b"}))
        .unwrap();
    assert_eq!(
        errors.to_value(),
        json!({"age": ["Not a valid integer."], "confirm": ["Passwords differ."]})
    );
}

/// Schema validators on many loads run per item and report at the index.
#[test]
fn test_schema_validator_many_indexing() {
    let schema = Schema::with_options(&signup_def("SignupMany"), SchemaOptions::new().many(true))
        .unwrap();
    let errors = schema
        .validate(&json!([
            {"password": "a", "confirm": "a"},
            {"password": "a", "confirm": "z"}
        ]))
        .unwrap();
    assert_eq!(errors.to_value(), json!({"1": {"confirm": ["Passwords differ."]}}));
}

/// Field validators run per item even when asked for the whole collection.
#[test]
fn test_field_validator_ignores_pass_many() {
    let def = SchemaDef::builder("PerItemValidates")
        .field("n", fields::integer())
        .hook(
            "small",
            Hook::validates("n", |_, value, _| {
                if value.as_i64().map_or(false, |n| n > 9) {
                    return Err(ValidationError::new("Too big."));
                }
                Ok(())
            })
            .pass_many(true),
        )
        .opts(opts())
        .build()
        .unwrap();
    let errors = Schema::new(&def)
        .unwrap()
        .validate_with(&json!([{"n": 1}, {"n": 10}]), &LoadOptions::new().many(true))
        .unwrap();
    assert_eq!(errors.to_value(), json!({"1": {"n": ["Too big."]}}));
}

// =============================================================================
// Failure Tests
// =============================================================================

/// A failing pre_load hook ends the load with a record-level error.
#[test]
fn test_pre_load_failure_is_schema_level() {
    let def = SchemaDef::builder("RejectAll")
        .field("n", fields::integer())
        .hook(
            "reject",
            Hook::pre_load(|_, _, _| Err(ValidationError::new("Closed for maintenance."))),
        )
        .opts(opts())
        .build()
        .unwrap();
    let err = Schema::new(&def)
        .unwrap()
        .load(&json!({"n": "not even checked"}))
        .unwrap_err()
        .into_validation()
        .unwrap();
    assert_eq!(
        err.messages().to_value(),
        json!({"_schema": ["Closed for maintenance."]})
    );
}

/// post_dump does not run when serialization failed.
#[test]
fn test_post_dump_needs_clean_dump() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&log);
    let def = SchemaDef::builder("DumpFailure")
        .field("when", fields::datetime())
        .hook(
            "note",
            Hook::post_dump(move |_, data, _| {
                seen.lock().unwrap().push("post_dump".into());
                Ok(data)
            }),
        )
        .opts(opts())
        .build()
        .unwrap();
    let schema = Schema::new(&def).unwrap();

    assert!(schema.dump(&json!({"when": "not a date"})).is_err());
    assert!(log.lock().unwrap().is_empty());
    schema.dump(&json!({"when": "2024-01-02T03:04:05"})).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["post_dump"]);
}

// =============================================================================
// Inheritance Tests
// =============================================================================

/// A subclass hook replaces the inherited one of the same name; None removes it.
#[test]
fn test_override_and_remove_inherited_hooks() {
    let base = SchemaDef::builder("HookBase")
        .field("n", fields::integer())
        .hook("tag", Hook::post_dump(|_, mut data, _| {
            data["source"] = json!("base");
            Ok(data)
        }))
        .opts(opts())
        .build()
        .unwrap();
    let overriding = SchemaDef::builder("HookOverride")
        .base(&base)
        .hook("tag", Hook::post_dump(|_, mut data, _| {
            data["source"] = json!("child");
            Ok(data)
        }))
        .build()
        .unwrap();
    let removing = SchemaDef::builder("HookRemove")
        .base(&base)
        .remove_hook("tag")
        .build()
        .unwrap();

    let obj = json!({"n": 1});
    assert_eq!(Schema::new(&base).unwrap().dump(&obj).unwrap()["source"], json!("base"));
    assert_eq!(Schema::new(&overriding).unwrap().dump(&obj).unwrap()["source"], json!("child"));
    assert_eq!(Schema::new(&removing).unwrap().dump(&obj).unwrap(), json!({"n": 1}));
}
