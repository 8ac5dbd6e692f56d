//! Declarative schema definitions read from JSON files.
//!
//! One definition per `*.json` file in a directory:
//!
//! ```json
//! {
//!   "name": "Article",
//!   "module": "blog",
//!   "bases": ["Entity"],
//!   "fields": {
//!     "title": {"type": "string", "required": true,
//!               "validate": [{"type": "length", "min": 1, "max": 80}]},
//!     "author": {"type": "nested", "schema": "Author", "only": ["name"]}
//!   },
//!   "meta": {"ordered": true, "unknown": "exclude"}
//! }
//! ```
//!
//! Bases may be defined by another file in the same directory (in any
//! order) or already registered in the class registry.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::definition::SchemaDef;
use super::errors::{SchemaError, SchemaResult};
use super::options::{SchemaOpts, Unknown};
use super::registry;
use crate::fields::{
    self, BooleanOpts, DecimalOpts, Field, FloatOpts, IntegerOpts, NestedField, PluckField,
    SchemaRef, UrlOpts,
};
use crate::validate::{
    ContainsNoneOf, ContainsOnly, Email, Equal, Length, NoneOf, OneOf, Range, Regexp, Url,
};

// =============================================================================
// Definition format
// =============================================================================

/// A list of field names. A bare string is accepted by the parser only so
/// it can be rejected with a clear error.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NameList {
    Names(Vec<String>),
    Text(String),
}

impl NameList {
    fn into_names(self, option: &str) -> SchemaResult<Vec<String>> {
        match self {
            NameList::Names(names) => Ok(names),
            NameList::Text(_) => Err(SchemaError::StringNotCollection {
                option: option.to_string(),
            }),
        }
    }
}

fn names(list: Option<NameList>, option: &str) -> SchemaResult<Option<Vec<String>>> {
    list.map(|l| l.into_names(option)).transpose()
}

/// One schema definition file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDefinition {
    pub name: String,
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub bases: Vec<String>,
    #[serde(default, deserialize_with = "ordered_fields")]
    pub fields: Vec<(String, FieldSpec)>,
    /// Absent means the first base's options are inherited
    #[serde(default)]
    pub meta: Option<MetaSpec>,
}

/// Keeps fields in file order.
fn ordered_fields<'de, D>(deserializer: D) -> Result<Vec<(String, FieldSpec)>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Map::<String, Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(name, spec)| {
            serde_json::from_value(spec)
                .map(|spec| (name.clone(), spec))
                .map_err(|e| serde::de::Error::custom(format!("field '{}': {}", name, e)))
        })
        .collect()
}

/// A field declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub allow_none: Option<bool>,
    #[serde(default)]
    pub load_only: bool,
    #[serde(default)]
    pub dump_only: bool,
    #[serde(default)]
    pub data_key: Option<String>,
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub load_default: Option<Value>,
    #[serde(default)]
    pub dump_default: Option<Value>,
    #[serde(default)]
    pub validate: Vec<ValidatorSpec>,
    #[serde(default)]
    pub error_messages: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Field type with its type-specific options, tagged by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Raw,
    String,
    Integer {
        #[serde(default)]
        strict: bool,
        #[serde(default)]
        as_string: bool,
    },
    Float {
        #[serde(default)]
        allow_nan: bool,
        #[serde(default)]
        as_string: bool,
    },
    Decimal {
        #[serde(default)]
        places: Option<u32>,
        #[serde(default)]
        as_string: bool,
    },
    Boolean {
        #[serde(default)]
        truthy: Option<Vec<Value>>,
        #[serde(default)]
        falsy: Option<Vec<Value>>,
    },
    #[serde(rename = "datetime")]
    DateTime {
        #[serde(default)]
        format: Option<String>,
    },
    Date {
        #[serde(default)]
        format: Option<String>,
    },
    Time {
        #[serde(default)]
        format: Option<String>,
    },
    Uuid,
    Email,
    Url {
        #[serde(default)]
        relative: bool,
        #[serde(default)]
        require_tld: Option<bool>,
        #[serde(default)]
        schemes: Vec<String>,
    },
    Constant {
        value: Value,
    },
    Inferred,
    Nested {
        /// Registry name, or `self`
        schema: String,
        #[serde(default)]
        many: bool,
        #[serde(default)]
        only: Option<NameList>,
        #[serde(default)]
        exclude: Option<NameList>,
        #[serde(default)]
        unknown: Option<Unknown>,
    },
    Pluck {
        schema: String,
        field: String,
        #[serde(default)]
        many: bool,
    },
    List {
        inner: Box<FieldSpec>,
    },
    Tuple {
        items: Vec<FieldSpec>,
    },
    Dict {
        #[serde(default)]
        keys: Option<Box<FieldSpec>>,
        #[serde(default)]
        values: Option<Box<FieldSpec>>,
    },
}

/// A built-in validator, tagged by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidatorSpec {
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        #[serde(default = "inclusive")]
        min_inclusive: bool,
        #[serde(default = "inclusive")]
        max_inclusive: bool,
        #[serde(default)]
        error: Option<String>,
    },
    Length {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
        #[serde(default)]
        equal: Option<usize>,
        #[serde(default)]
        error: Option<String>,
    },
    Equal {
        value: Value,
        #[serde(default)]
        error: Option<String>,
    },
    OneOf {
        choices: Vec<Value>,
        #[serde(default)]
        error: Option<String>,
    },
    NoneOf {
        values: Vec<Value>,
        #[serde(default)]
        error: Option<String>,
    },
    ContainsOnly {
        choices: Vec<Value>,
        #[serde(default)]
        error: Option<String>,
    },
    ContainsNoneOf {
        values: Vec<Value>,
        #[serde(default)]
        error: Option<String>,
    },
    Regexp {
        pattern: String,
        #[serde(default)]
        error: Option<String>,
    },
    Email {
        #[serde(default)]
        error: Option<String>,
    },
    Url {
        #[serde(default)]
        relative: bool,
        #[serde(default)]
        require_tld: Option<bool>,
        #[serde(default)]
        schemes: Vec<String>,
        #[serde(default)]
        error: Option<String>,
    },
}

fn inclusive() -> bool {
    true
}

/// Definition-level options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaSpec {
    #[serde(default)]
    pub fields: Option<NameList>,
    #[serde(default)]
    pub additional: Option<NameList>,
    #[serde(default)]
    pub exclude: Option<NameList>,
    #[serde(default)]
    pub ordered: Option<bool>,
    #[serde(default)]
    pub load_only: Option<NameList>,
    #[serde(default)]
    pub dump_only: Option<NameList>,
    #[serde(default)]
    pub unknown: Option<Unknown>,
    #[serde(default)]
    pub index_errors: Option<bool>,
    #[serde(default)]
    pub register: Option<bool>,
    #[serde(default)]
    pub datetime_format: Option<String>,
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default)]
    pub time_format: Option<String>,
    #[serde(default)]
    pub error_messages: BTreeMap<String, String>,
}

// =============================================================================
// Conversion to fields and options
// =============================================================================

impl MetaSpec {
    pub fn into_opts(self) -> SchemaResult<SchemaOpts> {
        let mut opts = SchemaOpts::new();
        opts.fields = names(self.fields, "fields")?;
        opts.additional = names(self.additional, "additional")?.unwrap_or_default();
        opts.exclude = names(self.exclude, "exclude")?.unwrap_or_default().into_iter().collect();
        opts.load_only = names(self.load_only, "load_only")?.unwrap_or_default().into_iter().collect();
        opts.dump_only = names(self.dump_only, "dump_only")?.unwrap_or_default().into_iter().collect();
        if let Some(ordered) = self.ordered {
            opts.ordered = ordered;
        }
        if let Some(unknown) = self.unknown {
            opts.unknown = unknown;
        }
        if let Some(index_errors) = self.index_errors {
            opts.index_errors = index_errors;
        }
        if let Some(register) = self.register {
            opts.register = register;
        }
        opts.datetime_format = self.datetime_format;
        opts.date_format = self.date_format;
        opts.time_format = self.time_format;
        opts.error_messages = self.error_messages;
        Ok(opts)
    }
}

impl ValidatorSpec {
    fn attach(self, field: Field) -> SchemaResult<Field> {
        macro_rules! with_error {
            ($validator:expr, $error:expr) => {
                match $error {
                    Some(error) => field.validate($validator.error(error)),
                    None => field.validate($validator),
                }
            };
        }
        let field = match self {
            ValidatorSpec::Range {
                min,
                max,
                min_inclusive,
                max_inclusive,
                error,
            } => {
                let mut range = Range::new()
                    .min_inclusive(min_inclusive)
                    .max_inclusive(max_inclusive);
                if let Some(min) = min {
                    range = range.min(min);
                }
                if let Some(max) = max {
                    range = range.max(max);
                }
                with_error!(range, error)
            }
            ValidatorSpec::Length {
                min,
                max,
                equal,
                error,
            } => {
                let mut length = Length::new();
                if let Some(min) = min {
                    length = length.min(min);
                }
                if let Some(max) = max {
                    length = length.max(max);
                }
                if let Some(equal) = equal {
                    length = length.equal(equal);
                }
                with_error!(length, error)
            }
            ValidatorSpec::Equal { value, error } => with_error!(Equal::new(value), error),
            ValidatorSpec::OneOf { choices, error } => with_error!(OneOf::new(choices), error),
            ValidatorSpec::NoneOf { values, error } => with_error!(NoneOf::new(values), error),
            ValidatorSpec::ContainsOnly { choices, error } => {
                with_error!(ContainsOnly::new(choices), error)
            }
            ValidatorSpec::ContainsNoneOf { values, error } => {
                with_error!(ContainsNoneOf::new(values), error)
            }
            ValidatorSpec::Regexp { pattern, error } => with_error!(Regexp::new(&pattern)?, error),
            ValidatorSpec::Email { error } => with_error!(Email::new(), error),
            ValidatorSpec::Url {
                relative,
                require_tld,
                schemes,
                error,
            } => {
                let mut url = Url::new()
                    .relative(relative)
                    .require_tld(require_tld.unwrap_or(true));
                if !schemes.is_empty() {
                    url = url.schemes(schemes);
                }
                with_error!(url, error)
            }
        };
        Ok(field)
    }
}

impl FieldSpec {
    /// Builds the unbound field this declaration describes.
    pub fn into_field(self) -> SchemaResult<Field> {
        let mut field = self.kind.into_field()?;
        if self.required {
            field = field.required();
        }
        if let Some(allow_none) = self.allow_none {
            field = field.allow_none(allow_none);
        }
        if self.load_only {
            field = field.load_only();
        }
        if self.dump_only {
            field = field.dump_only();
        }
        if let Some(data_key) = self.data_key {
            field = field.data_key(data_key);
        }
        if let Some(attribute) = self.attribute {
            field = field.attribute(attribute);
        }
        if let Some(value) = self.load_default {
            field = field.load_default(value);
        }
        if let Some(value) = self.dump_default {
            field = field.dump_default(value);
        }
        for (key, message) in self.error_messages {
            field = field.error_message(key, message);
        }
        for (key, value) in self.metadata {
            field = field.metadata(key, value);
        }
        for validator in self.validate {
            field = validator.attach(field)?;
        }
        Ok(field)
    }
}

impl FieldKind {
    fn into_field(self) -> SchemaResult<Field> {
        let field = match self {
            FieldKind::Raw => fields::raw(),
            FieldKind::String => fields::string(),
            FieldKind::Integer { strict, as_string } => fields::integer_with(
                IntegerOpts::default().strict(strict).as_string(as_string),
            ),
            FieldKind::Float {
                allow_nan,
                as_string,
            } => fields::float_with(FloatOpts::default().allow_nan(allow_nan).as_string(as_string)),
            FieldKind::Decimal { places, as_string } => {
                let mut opts = DecimalOpts::default().as_string(as_string);
                if let Some(places) = places {
                    opts = opts.places(places);
                }
                fields::decimal_with(opts)
            }
            FieldKind::Boolean { truthy, falsy } => {
                let mut opts = BooleanOpts::default();
                if let Some(truthy) = truthy {
                    opts.truthy = truthy;
                }
                if let Some(falsy) = falsy {
                    opts.falsy = falsy;
                }
                fields::boolean_with(opts)
            }
            FieldKind::DateTime { format } => match format {
                Some(format) => fields::datetime_format(format),
                None => fields::datetime(),
            },
            FieldKind::Date { format } => match format {
                Some(format) => fields::date_format(format),
                None => fields::date(),
            },
            FieldKind::Time { format } => match format {
                Some(format) => fields::time_format(format),
                None => fields::time(),
            },
            FieldKind::Uuid => fields::uuid(),
            FieldKind::Email => fields::email(),
            FieldKind::Url {
                relative,
                require_tld,
                schemes,
            } => fields::url_with(UrlOpts {
                relative,
                require_tld: require_tld.unwrap_or(true),
                schemes,
            }),
            FieldKind::Constant { value } => fields::constant(value),
            FieldKind::Inferred => fields::inferred(),
            FieldKind::Nested {
                schema,
                many,
                only,
                exclude,
                unknown,
            } => {
                let mut nested = NestedField::new(SchemaRef::from(schema.as_str())).many(many);
                if let Some(only) = names(only, "only")? {
                    nested = nested.only(only);
                }
                if let Some(exclude) = names(exclude, "exclude")? {
                    nested = nested.exclude(exclude);
                }
                if let Some(unknown) = unknown {
                    nested = nested.unknown(unknown);
                }
                fields::nested_with(nested)
            }
            FieldKind::Pluck {
                schema,
                field,
                many,
            } => fields::pluck_with(PluckField::new(SchemaRef::from(schema.as_str()), field).many(many)),
            FieldKind::List { inner } => fields::list(inner.into_field()?),
            FieldKind::Tuple { items } => fields::tuple(
                items
                    .into_iter()
                    .map(FieldSpec::into_field)
                    .collect::<SchemaResult<Vec<_>>>()?,
            ),
            FieldKind::Dict { keys, values } => fields::mapping(
                keys.map(|k| k.into_field()).transpose()?,
                values.map(|v| v.into_field()).transpose()?,
            ),
        };
        Ok(field)
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Reads definition files from a directory and builds them.
pub struct SchemaLoader {
    /// Directory containing definition files
    schema_dir: PathBuf,
    /// Built definitions by bare and qualified name
    definitions: HashMap<String, Arc<SchemaDef>>,
    /// Build order
    order: Vec<Arc<SchemaDef>>,
}

impl SchemaLoader {
    pub fn new(schema_dir: &Path) -> Self {
        Self {
            schema_dir: schema_dir.to_path_buf(),
            definitions: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn schema_dir(&self) -> &Path {
        &self.schema_dir
    }

    /// Reads and builds every `*.json` definition in the directory.
    ///
    /// Returns the definitions built by this call, bases before the
    /// definitions that extend them.
    pub fn load_all(&mut self) -> SchemaResult<Vec<Arc<SchemaDef>>> {
        let dir = self.schema_dir.display().to_string();
        let entries = fs::read_dir(&self.schema_dir).map_err(|e| SchemaError::Io {
            path: dir.clone(),
            reason: e.to_string(),
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| SchemaError::Io {
                    path: dir.clone(),
                    reason: e.to_string(),
                })?
                .path();
            if path.extension().map_or(true, |ext| ext != "json") {
                tracing::warn!(path = %path.display(), "skipping non-JSON file");
                continue;
            }
            paths.push(path);
        }
        paths.sort();

        let mut pending = Vec::with_capacity(paths.len());
        for path in paths {
            let definition = Self::read_definition(&path)?;
            pending.push((path.display().to_string(), definition));
        }
        self.build_pending(pending)
    }

    /// Builds one definition from JSON text.
    pub fn load_str(&mut self, text: &str) -> SchemaResult<Arc<SchemaDef>> {
        let definition = Self::parse("<string>", text)?;
        self.build_definition(definition)
    }

    /// Built definition by bare or qualified name.
    pub fn get(&self, name: &str) -> Option<&Arc<SchemaDef>> {
        self.definitions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// All built definitions, in build order.
    pub fn definitions(&self) -> impl Iterator<Item = &Arc<SchemaDef>> {
        self.order.iter()
    }

    pub fn schema_count(&self) -> usize {
        self.order.len()
    }

    fn read_definition(path: &Path) -> SchemaResult<SchemaDefinition> {
        let content = fs::read_to_string(path).map_err(|e| SchemaError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&path.display().to_string(), &content)
    }

    fn parse(path: &str, text: &str) -> SchemaResult<SchemaDefinition> {
        serde_json::from_str(text).map_err(|e| SchemaError::MalformedDefinition {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Builds definitions whose bases are available, pass after pass, until
    /// none are left or a pass makes no progress.
    fn build_pending(
        &mut self,
        mut pending: Vec<(String, SchemaDefinition)>,
    ) -> SchemaResult<Vec<Arc<SchemaDef>>> {
        let mut built = Vec::new();
        while !pending.is_empty() {
            let before = pending.len();
            let mut waiting = Vec::new();
            for (path, definition) in pending {
                if definition.bases.iter().all(|base| self.base_available(base)) {
                    built.push(self.build_definition(definition)?);
                } else {
                    waiting.push((path, definition));
                }
            }
            if waiting.len() == before {
                let (path, definition) = &waiting[0];
                let missing: Vec<&str> = definition
                    .bases
                    .iter()
                    .filter(|base| !self.base_available(base))
                    .map(String::as_str)
                    .collect();
                return Err(SchemaError::MalformedDefinition {
                    path: path.clone(),
                    reason: format!("unresolved bases: {}", missing.join(", ")),
                });
            }
            tracing::debug!(built = built.len(), waiting = waiting.len(), "definition pass complete");
            pending = waiting;
        }
        Ok(built)
    }

    fn base_available(&self, name: &str) -> bool {
        self.definitions.contains_key(name) || registry::global().contains(name)
    }

    fn resolve_base(&self, name: &str) -> SchemaResult<Arc<SchemaDef>> {
        match self.definitions.get(name) {
            Some(def) => Ok(Arc::clone(def)),
            None => registry::get_class(name),
        }
    }

    fn build_definition(&mut self, definition: SchemaDefinition) -> SchemaResult<Arc<SchemaDef>> {
        let mut builder = SchemaDef::builder(definition.name).module(definition.module);
        for base in &definition.bases {
            builder = builder.base(&self.resolve_base(base)?);
        }
        for (name, spec) in definition.fields {
            builder = builder.field(name, spec.into_field()?);
        }
        if let Some(meta) = definition.meta {
            builder = builder.opts(meta.into_opts()?);
        }
        let def = builder.build()?;

        self.definitions.insert(def.name().to_string(), Arc::clone(&def));
        self.definitions.insert(def.full_name(), Arc::clone(&def));
        self.order.push(Arc::clone(&def));
        Ok(def)
    }
}
