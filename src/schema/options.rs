//! Class-level, instance-level and call-level options.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// What a load does with input keys that match no field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unknown {
    /// Drop them silently
    Exclude,
    /// Copy them into the output unvalidated
    Include,
    /// Report each as "Unknown field."
    #[default]
    Raise,
}

/// Fields whose required check is suppressed during a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Partial {
    /// Every field, at every nesting level
    All,
    /// Named fields; dotted names reach into nested schemas
    Fields(BTreeSet<String>),
}

impl Partial {
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Partial::Fields(names.into_iter().map(Into::into).collect())
    }

    /// Whether a missing `name` may be skipped.
    pub fn includes(&self, name: &str) -> bool {
        match self {
            Partial::All => true,
            Partial::Fields(names) => names.contains(name),
        }
    }

    /// Policy for the nested schema under `name`: matching dotted names
    /// with the `name.` prefix removed.
    pub fn strip_prefix(&self, name: &str) -> Partial {
        match self {
            Partial::All => Partial::All,
            Partial::Fields(names) => {
                let prefix = format!("{}.", name);
                Partial::Fields(
                    names
                        .iter()
                        .filter_map(|n| n.strip_prefix(&prefix))
                        .map(str::to_string)
                        .collect(),
                )
            }
        }
    }
}

impl From<bool> for Partial {
    fn from(all: bool) -> Self {
        if all {
            Partial::All
        } else {
            Partial::Fields(BTreeSet::new())
        }
    }
}

fn names<I, S>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Into::into).collect()
}

/// Definition-level options (the `Meta` of a schema).
#[derive(Debug, Clone)]
pub struct SchemaOpts {
    /// Explicit field list; undeclared names get an inferred field
    pub fields: Option<Vec<String>>,
    /// Names added to the declared fields
    pub additional: Vec<String>,
    pub exclude: BTreeSet<String>,
    /// Keep declaration order; otherwise fields and output keys are sorted
    pub ordered: bool,
    pub load_only: BTreeSet<String>,
    pub dump_only: BTreeSet<String>,
    pub unknown: Unknown,
    /// Key many-mode errors by item position
    pub index_errors: bool,
    /// Add the definition to the class registry
    pub register: bool,
    pub datetime_format: Option<String>,
    pub date_format: Option<String>,
    pub time_format: Option<String>,
    /// Overrides for the record-level `type` and `unknown` messages
    pub error_messages: BTreeMap<String, String>,
}

impl Default for SchemaOpts {
    fn default() -> Self {
        Self {
            fields: None,
            additional: Vec::new(),
            exclude: BTreeSet::new(),
            ordered: false,
            load_only: BTreeSet::new(),
            dump_only: BTreeSet::new(),
            unknown: Unknown::Raise,
            index_errors: true,
            register: true,
            datetime_format: None,
            date_format: None,
            time_format: None,
            error_messages: BTreeMap::new(),
        }
    }
}

impl SchemaOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn additional<I, S>(mut self, additional: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional = additional.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = names(exclude);
        self
    }

    pub fn ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    pub fn load_only<I, S>(mut self, load_only: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.load_only = names(load_only);
        self
    }

    pub fn dump_only<I, S>(mut self, dump_only: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dump_only = names(dump_only);
        self
    }

    pub fn unknown(mut self, unknown: Unknown) -> Self {
        self.unknown = unknown;
        self
    }

    pub fn index_errors(mut self, index_errors: bool) -> Self {
        self.index_errors = index_errors;
        self
    }

    pub fn register(mut self, register: bool) -> Self {
        self.register = register;
        self
    }

    pub fn datetime_format(mut self, format: impl Into<String>) -> Self {
        self.datetime_format = Some(format.into());
        self
    }

    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = Some(format.into());
        self
    }

    pub fn time_format(mut self, format: impl Into<String>) -> Self {
        self.time_format = Some(format.into());
        self
    }

    pub fn error_message(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_messages.insert(key.into(), message.into());
        self
    }
}

/// Per-instance options.
#[derive(Debug, Clone, Default)]
pub struct SchemaOptions {
    /// Whitelist of field names; dotted names restrict nested schemas
    pub only: Option<BTreeSet<String>>,
    /// Added to the definition's `exclude`; dotted names reach nested schemas
    pub exclude: BTreeSet<String>,
    pub many: bool,
    pub load_only: BTreeSet<String>,
    pub dump_only: BTreeSet<String>,
    /// Default partial policy for loads
    pub partial: Option<Partial>,
    /// Default unknown policy, over the definition's
    pub unknown: Option<Unknown>,
}

impl SchemaOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn only<I, S>(mut self, only: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(names(only));
        self
    }

    pub fn exclude<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = names(exclude);
        self
    }

    pub fn many(mut self, many: bool) -> Self {
        self.many = many;
        self
    }

    pub fn load_only<I, S>(mut self, load_only: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.load_only = names(load_only);
        self
    }

    pub fn dump_only<I, S>(mut self, dump_only: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dump_only = names(dump_only);
        self
    }

    pub fn partial(mut self, partial: impl Into<Partial>) -> Self {
        self.partial = Some(partial.into());
        self
    }

    pub fn unknown(mut self, unknown: Unknown) -> Self {
        self.unknown = Some(unknown);
        self
    }
}

/// Per-call load options. Unset values fall back to the instance's.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub many: Option<bool>,
    pub partial: Option<Partial>,
    pub unknown: Option<Unknown>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn many(mut self, many: bool) -> Self {
        self.many = Some(many);
        self
    }

    pub fn partial(mut self, partial: impl Into<Partial>) -> Self {
        self.partial = Some(partial.into());
        self
    }

    pub fn unknown(mut self, unknown: Unknown) -> Self {
        self.unknown = Some(unknown);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = SchemaOpts::default();
        assert_eq!(opts.unknown, Unknown::Raise);
        assert!(opts.index_errors);
        assert!(opts.register);
        assert!(!opts.ordered);
    }

    #[test]
    fn test_partial_strip_prefix() {
        let partial = Partial::fields(["inner.x", "inner.deep.y", "other", "innerx"]);
        assert!(partial.includes("other"));
        assert!(!partial.includes("inner"));
        assert_eq!(
            partial.strip_prefix("inner"),
            Partial::fields(["x", "deep.y"])
        );
        assert_eq!(Partial::All.strip_prefix("inner"), Partial::All);
    }

    #[test]
    fn test_unknown_serde_names() {
        let unknown: Unknown = serde_json::from_str("\"include\"").unwrap();
        assert_eq!(unknown, Unknown::Include);
    }
}
