//! Schemas: definitions, bound instances, options and the class registry.
//!
//! - [`SchemaDef`] is the class: declared fields, hooks and options, built
//!   once with [`SchemaBuilder`] and shared behind an `Arc`
//! - [`Schema`] is an instance bound with [`SchemaOptions`], exposing
//!   `dump`, `load` and `validate`
//! - [`registry`] resolves nested targets given by name
//! - [`SchemaLoader`] builds definitions from JSON files

mod definition;
mod errors;
mod instance;
mod loader;
mod options;
pub mod registry;

pub use definition::{BindFieldFn, SchemaBuilder, SchemaDef};
pub use errors::{Error, Result, SchemaError, SchemaErrorCode, SchemaResult};
pub use instance::Schema;
pub use loader::{
    FieldKind, FieldSpec, MetaSpec, NameList, SchemaDefinition, SchemaLoader, ValidatorSpec,
};
pub use options::{LoadOptions, Partial, SchemaOpts, SchemaOptions, Unknown};
pub use registry::ClassRegistry;
