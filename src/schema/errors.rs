//! Construction, lookup and top-level error types.
//!
//! Error codes:
//! - SCHEMA_CONFIGURATION (programmer error in a schema or field definition)
//! - SCHEMA_CLASS_NOT_FOUND (registry lookup found nothing)
//! - SCHEMA_CLASS_AMBIGUOUS (registry lookup found several classes)
//! - SCHEMA_DEFINITION (declarative definition could not be read or parsed)

use thiserror::Error;

use crate::error_store::ValidationError;

/// Stable category of a [`SchemaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    Configuration,
    ClassNotFound,
    ClassAmbiguous,
    Definition,
}

impl SchemaErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::Configuration => "SCHEMA_CONFIGURATION",
            SchemaErrorCode::ClassNotFound => "SCHEMA_CLASS_NOT_FOUND",
            SchemaErrorCode::ClassAmbiguous => "SCHEMA_CLASS_AMBIGUOUS",
            SchemaErrorCode::Definition => "SCHEMA_DEFINITION",
        }
    }
}

/// Misconfiguration and lookup failures. Never caused by bad input data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("Cannot set both `fields` and `additional` options for {schema}")]
    ConflictingOptions { schema: String },

    #[error("'load_default' must not be set for required field '{field}'")]
    RequiredWithDefault { field: String },

    #[error("Invalid fields for {schema}: {}", .fields.join(", "))]
    InvalidFields { schema: String, fields: Vec<String> },

    #[error("'{option}' must be a collection of field names, not a string")]
    StringNotCollection { option: String },

    #[error("The data_key argument for one or more fields collides with another field's name or data_key argument: {}", .keys.join(", "))]
    DataKeyCollision { keys: Vec<String> },

    #[error("The attribute argument for one or more fields collides with another field's name or attribute argument: {}", .attributes.join(", "))]
    AttributeCollision { attributes: Vec<String> },

    #[error("\"{field}\" field does not exist on {schema}")]
    UnknownValidatedField { schema: String, field: String },

    #[error("Cannot create a consistent method resolution order for {schema}")]
    InconsistentHierarchy { schema: String },

    #[error("Class with name '{0}' was not found. It may not be registered yet")]
    ClassNotFound(String),

    #[error("Several classes registered with name '{0}'. Use the fully qualified name")]
    AmbiguousClass(String),

    #[error("Invalid nested schema target: {0}")]
    InvalidNested(String),

    #[error("Invalid regular expression '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Cannot set {key} in {head} due to existing value: {existing}")]
    CannotSetValue {
        key: String,
        head: String,
        existing: String,
    },

    #[error("Failed to read schema definitions at '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("Malformed schema definition '{path}': {reason}")]
    MalformedDefinition { path: String, reason: String },

    #[error("Registry lock poisoned")]
    LockPoisoned,
}

impl SchemaError {
    /// Returns the error category
    pub fn code(&self) -> SchemaErrorCode {
        match self {
            SchemaError::ClassNotFound(_) => SchemaErrorCode::ClassNotFound,
            SchemaError::AmbiguousClass(_) => SchemaErrorCode::ClassAmbiguous,
            SchemaError::Io { .. } | SchemaError::MalformedDefinition { .. } => {
                SchemaErrorCode::Definition
            }
            _ => SchemaErrorCode::Configuration,
        }
    }
}

/// Result type for schema construction and lookup
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

/// Error returned by the dump/load surface.
#[derive(Debug, Error)]
pub enum Error {
    /// Input data failed conversion or validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A schema or field is misconfigured, or a nested target cannot be resolved
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// JSON text could not be parsed or produced
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the validation error, if that is what this is.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(err) => Some(err),
            _ => None,
        }
    }

    pub fn into_validation(self) -> Option<ValidationError> {
        match self {
            Error::Validation(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type for dump and load operations
pub type Result<T> = std::result::Result<T, Error>;
