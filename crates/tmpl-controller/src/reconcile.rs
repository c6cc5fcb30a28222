#![forbid(unsafe_code)]

//! Validated property reconciliation.
//!
//! [`PropertyReconciler`] keeps a component's `props` container in step with
//! the external data snapshot. Each pass:
//!
//! 1. reads the current snapshot (tracked; an empty map when absent),
//! 2. cleans it with the effective [`CleanConfiguration`],
//! 3. validates it, wrapping a rejection as `PropertyValidationError`
//!    prefixed with the component name,
//! 4. writes every key inside one batch: a new cell for an unseen key, an
//!    update of the existing cell otherwise.
//!
//! # Invariants
//!
//! - A key's cell is created once and reused on every later pass, so a
//!   reader of `x` reruns only when `x`'s cleaned value changes.
//! - Keys missing from a later snapshot keep their last value.
//! - A rejected snapshot writes nothing.
//!
//! When started with [`PropertyReconciler::start`], the pass is an autorun
//! rerun whenever the external data changes.

use std::rc::Rc;

use serde_json::Value;
use tmpl_reactive::{Computation, PropertyChange, ReactiveCell, ReactiveObject, batch};

use crate::error::{ControllerError, Result};
use crate::instance::ComponentInstance;
use crate::validator::{CleanConfiguration, Data, PropertyValidator};

/// Keys touched by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: usize,
}

impl ReconcileReport {
    /// Whether the pass changed any property.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.created.is_empty() || !self.updated.is_empty()
    }
}

pub struct PropertyReconciler {
    template: String,
    validator: Option<Rc<dyn PropertyValidator>>,
    clean: CleanConfiguration,
    data: ReactiveCell<Option<Data>>,
    props: ReactiveObject<Value>,
}

impl PropertyReconciler {
    #[must_use]
    pub fn new(
        template: impl Into<String>,
        validator: Option<Rc<dyn PropertyValidator>>,
        clean: CleanConfiguration,
        data: ReactiveCell<Option<Data>>,
        props: ReactiveObject<Value>,
    ) -> Self {
        Self {
            template: template.into(),
            validator,
            clean,
            data,
            props,
        }
    }

    /// Reconciler reading the instance's external data into `props`.
    #[must_use]
    pub fn for_instance(
        instance: &ComponentInstance,
        validator: Option<Rc<dyn PropertyValidator>>,
        clean: CleanConfiguration,
        props: ReactiveObject<Value>,
    ) -> Self {
        Self::new(instance.name(), validator, clean, instance.data_cell(), props)
    }

    #[must_use]
    pub fn props(&self) -> &ReactiveObject<Value> {
        &self.props
    }

    /// Run one pass.
    ///
    /// The validator is checked on every pass, not only at setup.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let validator =
            self.validator
                .as_ref()
                .ok_or_else(|| ControllerError::PropertyValidatorRequired {
                    template: self.template.clone(),
                })?;

        let mut data = self.data.get().unwrap_or_default();
        validator.clean(&mut data, &self.clean);
        validator
            .validate(&data)
            .map_err(|source| ControllerError::PropertyValidation {
                template: self.template.clone(),
                source,
            })?;

        let report = batch(|| {
            let mut report = ReconcileReport::default();
            for (key, value) in data {
                match self.props.upsert(&key, value) {
                    PropertyChange::Created => report.created.push(key),
                    PropertyChange::Updated => report.updated.push(key),
                    PropertyChange::Unchanged => report.unchanged += 1,
                }
            }
            report
        });

        tracing::trace!(
            message = "props.reconciled",
            template = %self.template,
            created = ?report.created,
            updated = ?report.updated,
            unchanged = report.unchanged
        );
        Ok(report)
    }

    /// Run the pass now and whenever the external data changes.
    ///
    /// The returned computation owns the reconciler.
    pub fn start(self) -> Result<Computation> {
        let template = self.template.clone();
        let computation = tmpl_reactive::autorun(move |_| self.reconcile().map(|_| ()))?;
        tracing::debug!(
            message = "props.reconciler.started",
            template = %template,
            computation = computation.id().raw()
        );
        Ok(computation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidationFailure;
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    /// Accepts objects whose `count` (if present) is a number; trims strings
    /// when asked to.
    #[derive(Default)]
    struct CountValidator {
        cleans: Cell<u32>,
        seen_configs: RefCell<Vec<CleanConfiguration>>,
    }

    impl PropertyValidator for CountValidator {
        fn clean(&self, data: &mut Data, config: &CleanConfiguration) {
            self.cleans.set(self.cleans.get() + 1);
            self.seen_configs.borrow_mut().push(config.clone());
            if CleanConfiguration::flag(config.trim_strings, false) {
                for value in data.values_mut() {
                    if let Value::String(s) = value {
                        *s = s.trim().to_owned();
                    }
                }
            }
        }

        fn validate(&self, data: &Data) -> std::result::Result<(), ValidationFailure> {
            match data.get("count") {
                Some(v) if !v.is_number() => {
                    Err(ValidationFailure::for_key("count", "Count must be a number"))
                }
                _ => Ok(()),
            }
        }
    }

    fn data(value: Value) -> Option<Data> {
        value.as_object().cloned()
    }

    fn reconciler(
        validator: Option<Rc<dyn PropertyValidator>>,
        clean: CleanConfiguration,
    ) -> (PropertyReconciler, ReactiveCell<Option<Data>>, ReactiveObject<Value>) {
        let source = ReactiveCell::new(None);
        let props = ReactiveObject::new();
        let r = PropertyReconciler::new("counter", validator, clean, source.clone(), props.clone());
        (r, source, props)
    }

    #[test]
    fn second_pass_reuses_and_creates_cells() {
        let (r, source, props) = reconciler(
            Some(Rc::new(CountValidator::default())),
            CleanConfiguration::default(),
        );

        source.set(data(json!({"a": 1})));
        let first = r.reconcile().unwrap();
        assert_eq!(first.created, ["a"]);
        let a_cell = props.cell("a").unwrap();

        source.set(data(json!({"a": 2, "b": 3})));
        let second = r.reconcile().unwrap();
        assert_eq!(second.updated, ["a"]);
        assert_eq!(second.created, ["b"]);
        assert!(props.cell("a").unwrap().ptr_eq(&a_cell));
        assert_eq!(props.get("a"), Some(json!(2)));
        assert_eq!(props.get("b"), Some(json!(3)));
    }

    #[test]
    fn absent_keys_are_sticky() {
        let (r, source, props) = reconciler(
            Some(Rc::new(CountValidator::default())),
            CleanConfiguration::default(),
        );
        source.set(data(json!({"a": 1, "b": 2})));
        r.reconcile().unwrap();
        source.set(data(json!({"a": 5})));
        let report = r.reconcile().unwrap();
        assert_eq!(report.unchanged, 0);
        assert_eq!(props.get("b"), Some(json!(2)));
        assert_eq!(props.keys(), ["a", "b"]);
    }

    #[test]
    fn missing_data_is_an_empty_snapshot() {
        let (r, _source, props) = reconciler(
            Some(Rc::new(CountValidator::default())),
            CleanConfiguration::default(),
        );
        let report = r.reconcile().unwrap();
        assert!(!report.changed());
        assert!(props.is_empty());
    }

    #[test]
    fn rejection_is_prefixed_and_writes_nothing() {
        let (r, source, props) = reconciler(
            Some(Rc::new(CountValidator::default())),
            CleanConfiguration::default(),
        );
        source.set(data(json!({"count": "many", "label": "x"})));
        let err = r.reconcile().unwrap_err();
        assert_eq!(err.name(), "PropertyValidationError");
        assert_eq!(err.to_string(), "in <counter> Count must be a number");
        assert!(props.is_empty());
    }

    #[test]
    fn validator_is_checked_every_pass() {
        let (r, _source, _props) = reconciler(None, CleanConfiguration::default());
        for _ in 0..2 {
            assert!(matches!(
                r.reconcile(),
                Err(ControllerError::PropertyValidatorRequired { .. })
            ));
        }
    }

    #[test]
    fn clean_configuration_is_passed_through() {
        let validator = Rc::new(CountValidator::default());
        let clean = CleanConfiguration {
            trim_strings: Some(true),
            ..CleanConfiguration::default()
        };
        let (r, source, props) = reconciler(Some(validator.clone()), clean.clone());
        source.set(data(json!({"label": "  hi  "})));
        r.reconcile().unwrap();
        assert_eq!(props.get("label"), Some(json!("hi")));
        assert_eq!(validator.seen_configs.borrow().as_slice(), [clean]);
    }

    #[test]
    fn started_reconciler_follows_data() {
        let validator = Rc::new(CountValidator::default());
        let (r, source, props) = reconciler(Some(validator.clone()), CleanConfiguration::default());
        let computation = r.start().unwrap();
        assert_eq!(validator.cleans.get(), 1);

        source.set(data(json!({"a": 1})));
        assert_eq!(props.get("a"), Some(json!(1)));
        assert_eq!(validator.cleans.get(), 2);

        computation.stop();
        source.set(data(json!({"a": 9})));
        assert_eq!(props.get("a"), Some(json!(1)));
    }

    #[test]
    fn start_fails_fast_without_validator() {
        let (r, _source, _props) = reconciler(None, CleanConfiguration::default());
        assert!(matches!(
            r.start(),
            Err(ControllerError::PropertyValidatorRequired { .. })
        ));
    }
}
