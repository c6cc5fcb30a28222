#![forbid(unsafe_code)]

//! Validator capability for component properties.
//!
//! The controller never validates data itself. It hands every external data
//! snapshot to a [`PropertyValidator`], which first normalizes the snapshot in
//! place ([`clean`](PropertyValidator::clean)) and then accepts or rejects it
//! ([`validate`](PropertyValidator::validate)).

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// An external data snapshot: property name to value.
pub type Data = serde_json::Map<String, Value>;

/// Options passed to [`PropertyValidator::clean`].
///
/// `None` leaves the choice to the validator's own default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CleanConfiguration {
    /// Drop keys the schema does not declare.
    pub filter: Option<bool>,
    /// Convert values to the declared type where possible.
    pub auto_convert: Option<bool>,
    /// Remove keys whose value is an empty string.
    pub remove_empty_strings: Option<bool>,
    /// Trim surrounding whitespace from strings.
    pub trim_strings: Option<bool>,
    /// Fill in declared default values.
    pub get_auto_values: Option<bool>,
    /// Validator-specific options.
    #[serde(flatten)]
    pub extra: Data,
}

impl CleanConfiguration {
    /// Resolve a flag against the validator's default.
    #[must_use]
    pub fn flag(option: Option<bool>, default: bool) -> bool {
        option.unwrap_or(default)
    }
}

/// Raw rejection produced by a validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationFailure {
    message: String,
    key: Option<String>,
}

impl ValidationFailure {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            key: None,
        }
    }

    /// Failure attributed to one property.
    #[must_use]
    pub fn for_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Offending property, when the validator reports one.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

/// Schema capability required by `props`.
pub trait PropertyValidator {
    /// Normalize `data` in place.
    fn clean(&self, data: &mut Data, config: &CleanConfiguration);

    /// Accept or reject a cleaned snapshot.
    fn validate(&self, data: &Data) -> Result<(), ValidationFailure>;
}

/// `props` section of a component configuration.
///
/// A `PropsConfig` without a validator is representable so that data-driven
/// configurations can be checked; using one fails with
/// `PropertyValidatorRequired`.
#[derive(Clone, Default)]
pub struct PropsConfig {
    validator: Option<Rc<dyn PropertyValidator>>,
    clean: Option<CleanConfiguration>,
}

impl PropsConfig {
    #[must_use]
    pub fn new(validator: impl PropertyValidator + 'static) -> Self {
        Self::shared(Rc::new(validator))
    }

    /// Use a validator shared with other components.
    #[must_use]
    pub fn shared(validator: Rc<dyn PropertyValidator>) -> Self {
        Self {
            validator: Some(validator),
            clean: None,
        }
    }

    /// Props declared without a validator.
    #[must_use]
    pub fn unvalidated() -> Self {
        Self::default()
    }

    /// Override the controller-wide clean configuration for this component.
    #[must_use]
    pub fn clean_configuration(mut self, config: CleanConfiguration) -> Self {
        self.clean = Some(config);
        self
    }

    #[must_use]
    pub fn validator(&self) -> Option<&Rc<dyn PropertyValidator>> {
        self.validator.as_ref()
    }

    #[must_use]
    pub fn clean_override(&self) -> Option<&CleanConfiguration> {
        self.clean.as_ref()
    }
}

impl fmt::Debug for PropsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropsConfig")
            .field("validator", &self.validator.is_some())
            .field("clean", &self.clean)
            .finish()
    }
}
