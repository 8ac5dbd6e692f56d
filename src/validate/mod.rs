//! Field validators.
//!
//! A validator inspects an already-converted value and either accepts it or
//! fails with a [`ValidationError`]. Closures of the shape
//! `Fn(&Value) -> Result<(), ValidationError>` are validators too; plain
//! `bool` predicates are attached with `Field::check` instead.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::error_store::{ErrorMessages, ValidationError};
use crate::fields::format_message;
use crate::schema::{SchemaError, SchemaResult};

/// Accepts or rejects a converted value.
pub trait Validator: Send + Sync {
    fn validate(&self, value: &Value) -> Result<(), ValidationError>;
}

impl<F> Validator for F
where
    F: Fn(&Value) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        self(value)
    }
}

/// Renders a value for a message: strings bare, everything else as JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn display_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn join_choices(choices: &[Value]) -> String {
    choices
        .iter()
        .map(display_value)
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Range
// =============================================================================

/// Numeric bounds check.
#[derive(Debug, Clone, Default)]
pub struct Range {
    min: Option<f64>,
    max: Option<f64>,
    min_inclusive: bool,
    max_inclusive: bool,
    error: Option<String>,
}

impl Range {
    pub fn new() -> Self {
        Self {
            min_inclusive: true,
            max_inclusive: true,
            ..Self::default()
        }
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn min_inclusive(mut self, inclusive: bool) -> Self {
        self.min_inclusive = inclusive;
        self
    }

    pub fn max_inclusive(mut self, inclusive: bool) -> Self {
        self.max_inclusive = inclusive;
        self
    }

    /// Replaces the generated message; `{input}`, `{min}` and `{max}` are substituted.
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    fn min_op(&self) -> &'static str {
        if self.min_inclusive {
            "greater than or equal to"
        } else {
            "greater than"
        }
    }

    fn max_op(&self) -> &'static str {
        if self.max_inclusive {
            "less than or equal to"
        } else {
            "less than"
        }
    }

    fn fail(&self, value: &Value, template: String) -> ValidationError {
        let template = self.error.clone().unwrap_or(template);
        let args = [
            ("input", display_value(value)),
            ("min", self.min.map(display_number).unwrap_or_default()),
            ("max", self.max.map(display_number).unwrap_or_default()),
        ];
        ValidationError::new(format_message(&template, &args))
    }

    fn message_all(&self) -> String {
        format!("Must be {} {{min}} and {} {{max}}.", self.min_op(), self.max_op())
    }
}

impl Validator for Range {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let Some(number) = value.as_f64() else {
            return Err(self.fail(value, self.message_all()));
        };
        if let Some(min) = self.min {
            let below = if self.min_inclusive { number < min } else { number <= min };
            if below {
                let template = match self.max {
                    Some(_) => self.message_all(),
                    None => format!("Must be {} {{min}}.", self.min_op()),
                };
                return Err(self.fail(value, template));
            }
        }
        if let Some(max) = self.max {
            let above = if self.max_inclusive { number > max } else { number >= max };
            if above {
                let template = match self.min {
                    Some(_) => self.message_all(),
                    None => format!("Must be {} {{max}}.", self.max_op()),
                };
                return Err(self.fail(value, template));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Length
// =============================================================================

/// Length check for strings (in characters), lists and mappings.
#[derive(Debug, Clone, Default)]
pub struct Length {
    min: Option<usize>,
    max: Option<usize>,
    equal: Option<usize>,
    error: Option<String>,
}

impl Length {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, min: usize) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    pub fn equal(mut self, equal: usize) -> Self {
        self.equal = Some(equal);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    fn fail(&self, value: &Value, template: &str) -> ValidationError {
        let template = self.error.as_deref().unwrap_or(template);
        let args = [
            ("input", display_value(value)),
            ("min", self.min.map(|n| n.to_string()).unwrap_or_default()),
            ("max", self.max.map(|n| n.to_string()).unwrap_or_default()),
            ("equal", self.equal.map(|n| n.to_string()).unwrap_or_default()),
        ];
        ValidationError::new(format_message(template, &args))
    }

    fn template(&self) -> &'static str {
        match (self.equal, self.min, self.max) {
            (Some(_), _, _) => "Length must be {equal}.",
            (None, Some(_), Some(_)) => "Length must be between {min} and {max}.",
            (None, Some(_), None) => "Shorter than minimum length {min}.",
            _ => "Longer than maximum length {max}.",
        }
    }
}

impl Validator for Length {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let length = match value {
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            _ => return Err(self.fail(value, self.template())),
        };
        if let Some(equal) = self.equal {
            if length != equal {
                return Err(self.fail(value, "Length must be {equal}."));
            }
            return Ok(());
        }
        if let Some(min) = self.min {
            if length < min {
                let template = if self.max.is_some() {
                    "Length must be between {min} and {max}."
                } else {
                    "Shorter than minimum length {min}."
                };
                return Err(self.fail(value, template));
            }
        }
        if let Some(max) = self.max {
            if length > max {
                let template = if self.min.is_some() {
                    "Length must be between {min} and {max}."
                } else {
                    "Longer than maximum length {max}."
                };
                return Err(self.fail(value, template));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Equality and membership
// =============================================================================

/// Value must equal a fixed value.
#[derive(Debug, Clone)]
pub struct Equal {
    comparable: Value,
    error: Option<String>,
}

impl Equal {
    pub fn new(comparable: Value) -> Self {
        Self {
            comparable,
            error: None,
        }
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl Validator for Equal {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if value == &self.comparable {
            return Ok(());
        }
        let template = self.error.as_deref().unwrap_or("Must be equal to {other}.");
        let args = [
            ("input", display_value(value)),
            ("other", display_value(&self.comparable)),
        ];
        Err(ValidationError::new(format_message(template, &args)))
    }
}

/// Value must be one of the choices.
#[derive(Debug, Clone)]
pub struct OneOf {
    choices: Vec<Value>,
    error: Option<String>,
}

impl OneOf {
    pub fn new<I, V>(choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            choices: choices.into_iter().map(Into::into).collect(),
            error: None,
        }
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl Validator for OneOf {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if self.choices.contains(value) {
            return Ok(());
        }
        let template = self.error.as_deref().unwrap_or("Must be one of: {choices}.");
        let args = [
            ("input", display_value(value)),
            ("choices", join_choices(&self.choices)),
        ];
        Err(ValidationError::new(format_message(template, &args)))
    }
}

/// Value must not be any of the listed values.
#[derive(Debug, Clone)]
pub struct NoneOf {
    iterable: Vec<Value>,
    error: Option<String>,
}

impl NoneOf {
    pub fn new<I, V>(iterable: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            iterable: iterable.into_iter().map(Into::into).collect(),
            error: None,
        }
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl Validator for NoneOf {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if !self.iterable.contains(value) {
            return Ok(());
        }
        let template = self.error.as_deref().unwrap_or("Invalid input.");
        let args = [
            ("input", display_value(value)),
            ("values", join_choices(&self.iterable)),
        ];
        Err(ValidationError::new(format_message(template, &args)))
    }
}

/// Every element of a list must be one of the choices.
#[derive(Debug, Clone)]
pub struct ContainsOnly {
    choices: Vec<Value>,
    error: Option<String>,
}

impl ContainsOnly {
    pub fn new<I, V>(choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            choices: choices.into_iter().map(Into::into).collect(),
            error: None,
        }
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl Validator for ContainsOnly {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let ok = match value {
            Value::Array(items) => items.iter().all(|item| self.choices.contains(item)),
            _ => false,
        };
        if ok {
            return Ok(());
        }
        let template = self
            .error
            .as_deref()
            .unwrap_or("One or more of the choices you made was not in: {choices}.");
        let args = [
            ("input", display_value(value)),
            ("choices", join_choices(&self.choices)),
        ];
        Err(ValidationError::new(format_message(template, &args)))
    }
}

/// No element of a list may be one of the listed values.
#[derive(Debug, Clone)]
pub struct ContainsNoneOf {
    iterable: Vec<Value>,
    error: Option<String>,
}

impl ContainsNoneOf {
    pub fn new<I, V>(iterable: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            iterable: iterable.into_iter().map(Into::into).collect(),
            error: None,
        }
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl Validator for ContainsNoneOf {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let ok = match value {
            Value::Array(items) => !items.iter().any(|item| self.iterable.contains(item)),
            _ => false,
        };
        if ok {
            return Ok(());
        }
        let template = self
            .error
            .as_deref()
            .unwrap_or("One or more of the choices you made was in: {values}.");
        let args = [
            ("input", display_value(value)),
            ("values", join_choices(&self.iterable)),
        ];
        Err(ValidationError::new(format_message(template, &args)))
    }
}

// =============================================================================
// Pattern based
// =============================================================================

/// String must match a regular expression at its start.
#[derive(Debug, Clone)]
pub struct Regexp {
    regex: Regex,
    error: Option<String>,
}

impl Regexp {
    pub fn new(pattern: &str) -> SchemaResult<Self> {
        let regex = Regex::new(pattern).map_err(|e| SchemaError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { regex, error: None })
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl Validator for Regexp {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let matched = value
            .as_str()
            .and_then(|s| self.regex.find(s))
            .map_or(false, |m| m.start() == 0);
        if matched {
            return Ok(());
        }
        let template = self
            .error
            .as_deref()
            .unwrap_or("String does not match expected pattern.");
        let args = [
            ("input", display_value(value)),
            ("regex", self.regex.as_str().to_string()),
        ];
        Err(ValidationError::new(format_message(template, &args)))
    }
}

static EMAIL_USER: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(
        r#"(^[-!#$%&'*+/=?^`{}|~\w]+(\.[-!#$%&'*+/=?^`{}|~\w]+)*$)|(^"([\x01-\x08\x0b\x0c\x0e-\x1f!#-\[\]-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])*"$)"#,
    )
    .case_insensitive(true)
    .build()
    .expect("email user pattern compiles")
});

static EMAIL_DOMAIN: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(
        r"^(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+(?:[A-Z]{2,6}\.?|[A-Z0-9-]{2,}\.?)$",
    )
    .case_insensitive(true)
    .build()
    .expect("email domain pattern compiles")
});

const EMAIL_DOMAIN_WHITELIST: &[&str] = &["localhost"];

/// Returns true when `value` looks like an email address.
pub(crate) fn is_email(value: &str) -> bool {
    let Some((user, domain)) = value.rsplit_once('@') else {
        return false;
    };
    if !EMAIL_USER.is_match(user) {
        return false;
    }
    EMAIL_DOMAIN_WHITELIST.contains(&domain) || EMAIL_DOMAIN.is_match(domain)
}

/// String must be an email address.
#[derive(Debug, Clone, Default)]
pub struct Email {
    error: Option<String>,
}

impl Email {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl Validator for Email {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if value.as_str().map_or(false, is_email) {
            return Ok(());
        }
        let template = self.error.as_deref().unwrap_or("Not a valid email address.");
        Err(ValidationError::new(format_message(
            template,
            &[("input", display_value(value))],
        )))
    }
}

fn url_pattern(relative: bool, require_tld: bool) -> String {
    let mut pattern = String::from("^");
    if relative {
        pattern.push('(');
    }
    pattern.push_str(r"(?:[a-z0-9\.\-\+]*)://");
    pattern.push_str(r"(?:[^:@]+?(:[^:@]*?)?@|)");
    pattern.push_str(r"(?:(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+(?:[A-Z]{2,6}\.?|[A-Z0-9-]{2,}\.?)|");
    pattern.push_str("localhost|");
    if !require_tld {
        pattern.push_str(r"(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.?)|");
    }
    pattern.push_str(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}|");
    pattern.push_str(r"\[[A-F0-9]*:[A-F0-9:]+\])");
    pattern.push_str(r"(?::\d+)?");
    if relative {
        pattern.push_str(")?");
    }
    pattern.push_str(r"(?:/?|[/?]\S+)$");
    pattern
}

fn compile_url(relative: bool, require_tld: bool) -> Regex {
    RegexBuilder::new(&url_pattern(relative, require_tld))
        .case_insensitive(true)
        .build()
        .expect("url pattern compiles")
}

// Indexed by (relative, require_tld).
static URL_PATTERNS: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        compile_url(false, false),
        compile_url(false, true),
        compile_url(true, false),
        compile_url(true, true),
    ]
});

pub(crate) const DEFAULT_SCHEMES: &[&str] = &["http", "https", "ftp", "ftps"];

/// Returns true when `value` is a URL with an accepted scheme.
pub(crate) fn is_url(value: &str, relative: bool, require_tld: bool, schemes: &[String]) -> bool {
    if value.is_empty() {
        return false;
    }
    if value.contains("://") {
        let scheme = value
            .split("://")
            .next()
            .unwrap_or_default()
            .to_lowercase();
        let accepted = if schemes.is_empty() {
            DEFAULT_SCHEMES.contains(&scheme.as_str())
        } else {
            schemes.iter().any(|s| s.to_lowercase() == scheme)
        };
        if !accepted {
            return false;
        }
    }
    let index = (relative as usize) * 2 + (require_tld as usize);
    URL_PATTERNS[index].is_match(value)
}

/// String must be a URL.
#[derive(Debug, Clone)]
pub struct Url {
    relative: bool,
    require_tld: bool,
    schemes: Vec<String>,
    error: Option<String>,
}

impl Default for Url {
    fn default() -> Self {
        Self {
            relative: false,
            require_tld: true,
            schemes: Vec::new(),
            error: None,
        }
    }
}

impl Url {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relative(mut self, relative: bool) -> Self {
        self.relative = relative;
        self
    }

    pub fn require_tld(mut self, require_tld: bool) -> Self {
        self.require_tld = require_tld;
        self
    }

    pub fn schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemes = schemes.into_iter().map(Into::into).collect();
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl Validator for Url {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let ok = value
            .as_str()
            .map_or(false, |s| is_url(s, self.relative, self.require_tld, &self.schemes));
        if ok {
            return Ok(());
        }
        let template = self.error.as_deref().unwrap_or("Not a valid URL.");
        Err(ValidationError::new(format_message(
            template,
            &[("input", display_value(value))],
        )))
    }
}

// =============================================================================
// Composition
// =============================================================================

/// Runs every validator and reports all failures together.
#[derive(Clone, Default)]
pub struct And {
    validators: Vec<Arc<dyn Validator>>,
}

impl And {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }
}

impl Validator for And {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let mut collected: Vec<Value> = Vec::new();
        for validator in &self.validators {
            if let Err(err) = validator.validate(value) {
                collect_messages(&mut collected, err.into_messages());
            }
        }
        if collected.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::with_messages(ErrorMessages::List(collected)))
        }
    }
}

/// Flattens one validator's failure into a running message list.
///
/// Leaf messages are appended; a keyed node is kept as a single entry.
pub(crate) fn collect_messages(collected: &mut Vec<Value>, messages: ErrorMessages) {
    match messages {
        ErrorMessages::List(items) => collected.extend(items),
        node @ ErrorMessages::Map(_) => collected.push(node.to_value()),
    }
}
