#![forbid(unsafe_code)]

//! Controller-wide options.
//!
//! Options are plain data so they can live in a config file next to the
//! application. JSON loading is always available; TOML needs the
//! `options-toml` feature.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tmpl_reactive::Equality;

use crate::validator::CleanConfiguration;

/// How reactive containers decide that a write is a change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeDetection {
    /// Values compare structurally; writing an equal value is a no-op.
    #[default]
    Structural,
    /// Only equal scalars (null, bool, number, string) are no-ops; every
    /// array or object write notifies.
    Primitive,
}

impl ChangeDetection {
    #[must_use]
    pub fn equality(self) -> Equality<Value> {
        match self {
            Self::Structural => <Value as PartialEq>::eq,
            Self::Primitive => primitive_eq,
        }
    }
}

fn primitive_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => a == b,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerOptions {
    /// Clean configuration for every props pass, unless a component
    /// overrides it.
    pub clean: CleanConfiguration,
    /// Change detection for state and props containers.
    pub change_detection: ChangeDetection,
}

impl ControllerOptions {
    pub fn from_json_str(source: &str) -> serde_json::Result<Self> {
        serde_json::from_str(source)
    }

    #[cfg(feature = "options-toml")]
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_empty() {
        let options = ControllerOptions::default();
        assert_eq!(options.clean, CleanConfiguration::default());
        assert_eq!(options.change_detection, ChangeDetection::Structural);
    }

    #[test]
    fn parses_json() {
        let options = ControllerOptions::from_json_str(
            r#"{"clean": {"filter": true, "removeEmptyStrings": false}, "changeDetection": "primitive"}"#,
        )
        .unwrap();
        assert_eq!(options.clean.filter, Some(true));
        assert_eq!(options.clean.remove_empty_strings, Some(false));
        assert_eq!(options.change_detection, ChangeDetection::Primitive);
    }

    #[test]
    fn primitive_detection_treats_composites_as_changed() {
        let eq = ChangeDetection::Primitive.equality();
        assert!(eq(&json!(1), &json!(1)));
        assert!(eq(&json!("a"), &json!("a")));
        assert!(!eq(&json!([1]), &json!([1])));
        assert!(!eq(&json!({"a": 1}), &json!({"a": 1})));

        let structural = ChangeDetection::Structural.equality();
        assert!(structural(&json!({"a": 1}), &json!({"a": 1})));
    }

    #[cfg(feature = "options-toml")]
    #[test]
    fn parses_toml() {
        let options = ControllerOptions::from_toml_str(
            "changeDetection = \"primitive\"\n[clean]\ntrimStrings = true\n",
        )
        .unwrap();
        assert_eq!(options.clean.trim_strings, Some(true));
        assert_eq!(options.change_detection, ChangeDetection::Primitive);
    }
}
