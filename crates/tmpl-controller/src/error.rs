use thiserror::Error;
use tmpl_reactive::ReactiveError;

use crate::host::NodeId;
use crate::validator::ValidationFailure;

pub type Result<T> = std::result::Result<T, ControllerError>;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("No template <{name}> found.")]
    TemplateNotFound { name: String },

    #[error("props of <{template}> must be a validator with clean and validate methods")]
    PropertyValidatorRequired { template: String },

    #[error("in <{template}> {source}")]
    PropertyValidation {
        template: String,
        #[source]
        source: ValidationFailure,
    },

    #[error(
        "Please define a single root DOM element for your template <{template}> (first node: {first:?}, last node: {last:?})."
    )]
    RootElementRequired {
        template: String,
        first: Option<NodeId>,
        last: Option<NodeId>,
    },

    #[error("no member <{name}> on <{template}>")]
    UnknownMember { template: String, name: String },

    #[error(transparent)]
    Reactive(#[from] ReactiveError),

    #[error("{message}")]
    Hook { message: String },
}

impl ControllerError {
    /// Stable name of the failure condition, for hosts that log by name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TemplateNotFound { .. } => "TemplateNotFoundError",
            Self::PropertyValidatorRequired { .. } => "PropertyValidatorRequired",
            Self::PropertyValidation { .. } => "PropertyValidationError",
            Self::RootElementRequired { .. } => "RootElementRequired",
            Self::UnknownMember { .. } => "UnknownMember",
            Self::Reactive(_) => "ReactiveError",
            Self::Hook { .. } => "HookError",
        }
    }

    /// Failure raised by user hooks, helpers, event handlers, or methods.
    #[must_use]
    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_is_prefixed_with_template() {
        let err = ControllerError::PropertyValidation {
            template: "userCard".into(),
            source: ValidationFailure::new("Name is required"),
        };
        assert_eq!(err.to_string(), "in <userCard> Name is required");
        assert_eq!(err.name(), "PropertyValidationError");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn template_not_found_message() {
        let err = ControllerError::TemplateNotFound {
            name: "missing".into(),
        };
        assert_eq!(err.to_string(), "No template <missing> found.");
        assert_eq!(err.name(), "TemplateNotFoundError");
    }

    #[test]
    fn reactive_errors_convert() {
        let err: ControllerError = ReactiveError::UnknownProperty { key: "x".into() }.into();
        assert_eq!(err.name(), "ReactiveError");
        assert!(err.to_string().contains('x'));
    }

    #[test]
    fn hook_constructor() {
        let err = ControllerError::hook("nope");
        assert_eq!(err.to_string(), "nope");
        assert_eq!(err.name(), "HookError");
    }
}
