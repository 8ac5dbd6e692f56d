//! schemabind - declarative schemas for plain data
//!
//! A schema declares named fields. Dumping turns an object into plain data
//! (`serde_json::Value`), loading validates and converts plain data back.
//! Load errors are collected across the whole input and reported once as a
//! nested error structure.
//!
//! ```ignore
//! use schemabind::{fields, Schema, SchemaDef, validate::Range};
//!
//! let user = SchemaDef::builder("User")
//!     .field("name", fields::string().required())
//!     .field("age", fields::integer().validate(Range::new().min(0.0)))
//!     .build()?;
//! let loaded = Schema::new(&user)?.load(&json!({"name": "Ann", "age": 31}))?;
//! ```

pub mod error_store;
pub mod fields;
pub mod hooks;
pub mod marshalling;
pub mod schema;
pub mod validate;

pub use error_store::{merge_errors, ErrorKey, ErrorMessages, ErrorStore, ValidationError};
pub use fields::{Field, FieldType};
pub use hooks::{Hook, HookContext, Phase};
pub use marshalling::{Accessor, DefaultAccessor};
pub use schema::{
    registry, Error, LoadOptions, Partial, Result, Schema, SchemaBuilder, SchemaDef, SchemaError,
    SchemaLoader, SchemaOptions, SchemaOpts, SchemaResult, Unknown,
};
