#![forbid(unsafe_code)]

//! Field-schema validator fixture.
//!
//! Clean options and their defaults when unset:
//!
//! | option               | default | effect                                   |
//! |----------------------|---------|------------------------------------------|
//! | `filter`             | true    | drop undeclared keys                     |
//! | `autoConvert`        | true    | coerce strings/numbers/bools to the kind |
//! | `trimStrings`        | true    | trim string values                       |
//! | `removeEmptyStrings` | true    | drop keys whose value is `""`            |
//! | `getAutoValues`      | true    | insert declared defaults for absent keys |

use std::cell::{Cell, RefCell};

use indexmap::IndexMap;
use serde_json::{Number, Value};
use tmpl_controller::{CleanConfiguration, Data, PropertyValidator, ValidationFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Any,
}

impl FieldKind {
    fn label(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Number => "Number",
            Self::Integer => "Integer",
            Self::Boolean => "Boolean",
            Self::Array => "Array",
            Self::Object => "Object",
            Self::Any => "Any",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }

    fn convert(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (Self::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (Self::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            (Self::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (Self::Boolean, Value::String(s)) => match s.trim() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Field {
    kind: FieldKind,
    optional: bool,
    default: Option<Value>,
}

/// Declared fields, checked in declaration order.
#[derive(Debug, Default)]
pub struct SchemaValidator {
    fields: IndexMap<String, Field>,
    cleans: Cell<usize>,
    validations: Cell<usize>,
    last_clean: RefCell<Option<CleanConfiguration>>,
}

impl SchemaValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Required field.
    #[must_use]
    pub fn field(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.declare(name, kind, false, None)
    }

    #[must_use]
    pub fn optional(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.declare(name, kind, true, None)
    }

    /// Optional field filled with `default` when auto values are on.
    #[must_use]
    pub fn with_default(self, name: impl Into<String>, kind: FieldKind, default: Value) -> Self {
        self.declare(name, kind, true, Some(default))
    }

    fn declare(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        optional: bool,
        default: Option<Value>,
    ) -> Self {
        self.fields.insert(
            name.into(),
            Field {
                kind,
                optional,
                default,
            },
        );
        self
    }

    /// Number of `clean` calls so far.
    #[must_use]
    pub fn clean_calls(&self) -> usize {
        self.cleans.get()
    }

    #[must_use]
    pub fn validate_calls(&self) -> usize {
        self.validations.get()
    }

    /// Configuration passed to the most recent `clean`.
    #[must_use]
    pub fn last_clean(&self) -> Option<CleanConfiguration> {
        self.last_clean.borrow().clone()
    }
}

impl PropertyValidator for SchemaValidator {
    fn clean(&self, data: &mut Data, config: &CleanConfiguration) {
        self.cleans.set(self.cleans.get() + 1);
        *self.last_clean.borrow_mut() = Some(config.clone());

        if CleanConfiguration::flag(config.filter, true) {
            data.retain(|key, _| self.fields.contains_key(key));
        }
        let trim = CleanConfiguration::flag(config.trim_strings, true);
        let convert = CleanConfiguration::flag(config.auto_convert, true);
        for (key, value) in data.iter_mut() {
            if trim {
                if let Value::String(s) = value {
                    let trimmed = s.trim();
                    if trimmed.len() != s.len() {
                        *s = trimmed.to_owned();
                    }
                }
            }
            if convert {
                if let Some(field) = self.fields.get(key) {
                    if !field.kind.accepts(value) {
                        if let Some(converted) = field.kind.convert(value) {
                            *value = converted;
                        }
                    }
                }
            }
        }
        if CleanConfiguration::flag(config.remove_empty_strings, true) {
            data.retain(|_, value| value.as_str() != Some(""));
        }
        if CleanConfiguration::flag(config.get_auto_values, true) {
            for (key, field) in &self.fields {
                if let Some(default) = &field.default {
                    if !data.contains_key(key) {
                        data.insert(key.clone(), default.clone());
                    }
                }
            }
        }
    }

    fn validate(&self, data: &Data) -> Result<(), ValidationFailure> {
        self.validations.set(self.validations.get() + 1);
        for (key, field) in &self.fields {
            match data.get(key) {
                None | Some(Value::Null) if !field.optional => {
                    return Err(ValidationFailure::for_key(key, format!("{key} is required")));
                }
                Some(value) if !value.is_null() && !field.kind.accepts(value) => {
                    return Err(ValidationFailure::for_key(
                        key,
                        format!("{key} must be of type {}", field.kind.label()),
                    ));
                }
                _ => {}
            }
        }
        if let Some(key) = data.keys().find(|k| !self.fields.contains_key(*k)) {
            return Err(ValidationFailure::for_key(
                key,
                format!("{key} is not allowed by the schema"),
            ));
        }
        Ok(())
    }
}
