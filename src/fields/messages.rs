//! Default error message tables.
//!
//! Each field type contributes its own table on top of its ancestors'
//! (e.g. `Url` -> `String` -> base), and user overrides apply last.

use std::collections::BTreeMap;

pub const REQUIRED: &str = "required";
pub const NULL: &str = "null";
pub const VALIDATOR_FAILED: &str = "validator_failed";
pub const INVALID: &str = "invalid";

pub(crate) const BASE: &[(&str, &str)] = &[
    (REQUIRED, "Missing data for required field."),
    (NULL, "Field may not be null."),
    (VALIDATOR_FAILED, "Invalid value."),
];

pub(crate) const STRING: &[(&str, &str)] = &[
    (INVALID, "Not a valid string."),
    ("invalid_utf8", "Not a valid utf-8 string."),
];

pub(crate) const NUMBER: &[(&str, &str)] = &[
    (INVALID, "Not a valid number."),
    ("too_large", "Number too large."),
];

pub(crate) const INTEGER: &[(&str, &str)] = &[(INVALID, "Not a valid integer.")];

pub(crate) const SPECIAL_NUMBER: &[(&str, &str)] = &[(
    "special",
    "Special numeric values (nan or infinity) are not permitted.",
)];

pub(crate) const BOOLEAN: &[(&str, &str)] = &[(INVALID, "Not a valid boolean.")];

pub(crate) const TEMPORAL: &[(&str, &str)] = &[
    (INVALID, "Not a valid {obj_type}."),
    ("invalid_awareness", "Not a valid {awareness} {obj_type}."),
    ("format", "\"{input}\" cannot be formatted as a {obj_type}."),
];

pub(crate) const UUID: &[(&str, &str)] = &[("invalid_uuid", "Not a valid UUID.")];

pub(crate) const EMAIL: &[(&str, &str)] = &[(INVALID, "Not a valid email address.")];

pub(crate) const URL: &[(&str, &str)] = &[(INVALID, "Not a valid URL.")];

pub(crate) const NESTED: &[(&str, &str)] = &[("type", "Invalid type.")];

pub(crate) const LIST: &[(&str, &str)] = &[(INVALID, "Not a valid list.")];

pub(crate) const TUPLE: &[(&str, &str)] = &[(INVALID, "Not a valid tuple.")];

pub(crate) const MAPPING: &[(&str, &str)] = &[(INVALID, "Not a valid mapping type.")];

/// Builds a message table from an ancestor chain, most generic first.
pub(crate) fn merge_tables(chain: &[&[(&str, &str)]]) -> BTreeMap<String, String> {
    let mut table = BTreeMap::new();
    for layer in chain {
        for (key, message) in layer.iter() {
            table.insert((*key).to_string(), (*message).to_string());
        }
    }
    table
}

/// Substitutes `{name}` placeholders in a message template.
pub fn format_message(template: &str, args: &[(&str, String)]) -> String {
    let mut message = template.to_string();
    for (name, value) in args {
        message = message.replace(&format!("{{{}}}", name), value);
    }
    message
}
