#![forbid(unsafe_code)]

//! Mounted component instance.
//!
//! The host creates one [`ComponentInstance`] per mounted component and
//! passes it to every lifecycle hook, helper, and event handler. The
//! controller's created hook fills it in: state and props containers,
//! pass-through and private members, the trigger map, and the computations
//! the instance owns.
//!
//! External data reaches the instance through [`ComponentInstance::set_data`].
//! The write is reactive: the props reconciler reruns synchronously, and any
//! failure raised by that rerun is returned from the same call.
//!
//! # Failure Modes
//!
//! - **Write inside a batch or a running computation**: the rerun is
//!   deferred, so `set_data` returns `Ok`. A failure from the deferred rerun
//!   is tagged with the data version it saw and stays in
//!   [`take_errors`](ComponentInstance::take_errors); a later write never
//!   returns it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;
use tmpl_reactive::{Computation, ReactiveCell, ReactiveObject, autorun_with_handler};

use crate::config::Member;
use crate::error::{ControllerError, Result};
use crate::host::DomHandle;
use crate::validator::Data;

pub struct ComponentInstance {
    name: String,
    dom: Rc<dyn DomHandle>,
    data: ReactiveCell<Option<Data>>,
    state: RefCell<Option<ReactiveObject<Value>>>,
    props: RefCell<Option<ReactiveObject<Value>>>,
    triggers: RefCell<Option<IndexMap<String, String>>>,
    members: RefCell<IndexMap<String, Member>>,
    computations: RefCell<Vec<Computation>>,
    errors: Rc<RefCell<Vec<(u64, ControllerError)>>>,
    destroyed: Cell<bool>,
}

impl ComponentInstance {
    #[must_use]
    pub fn new(name: impl Into<String>, dom: Rc<dyn DomHandle>) -> Self {
        Self {
            name: name.into(),
            dom,
            data: ReactiveCell::new(None),
            state: RefCell::new(None),
            props: RefCell::new(None),
            triggers: RefCell::new(None),
            members: RefCell::new(IndexMap::new()),
            computations: RefCell::new(Vec::new()),
            errors: Rc::new(RefCell::new(Vec::new())),
            destroyed: Cell::new(false),
        }
    }

    /// Seed the external data before any hook runs.
    #[must_use]
    pub fn with_data(self, data: Data) -> Self {
        self.data.set(Some(data));
        self
    }

    /// Component name this instance was mounted from.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current external data; subscribes the running computation.
    #[must_use]
    pub fn current_data(&self) -> Option<Data> {
        self.data.get()
    }

    /// Replace the external data.
    ///
    /// Returns the first error raised by computations this write reran;
    /// any further ones are logged. An equal write reruns nothing and
    /// returns `Ok`.
    pub fn set_data(&self, data: Option<Data>) -> Result<()> {
        if !self.data.set(data) {
            return Ok(());
        }
        self.take_first_error(self.data.version())
    }

    pub(crate) fn data_cell(&self) -> ReactiveCell<Option<Data>> {
        self.data.clone()
    }

    /// Errors raised by reruns and not yet returned from [`set_data`](Self::set_data).
    pub fn take_errors(&self) -> Vec<ControllerError> {
        std::mem::take(&mut *self.errors.borrow_mut())
            .into_iter()
            .map(|(_, err)| err)
            .collect()
    }

    /// Claim the errors raised while the data cell was at `version`.
    fn take_first_error(&self, version: u64) -> Result<()> {
        let claimed: Vec<ControllerError> = {
            let mut sink = self.errors.borrow_mut();
            let (mine, older): (Vec<_>, Vec<_>) =
                std::mem::take(&mut *sink).into_iter().partition(|(v, _)| *v == version);
            *sink = older;
            mine.into_iter().map(|(_, err)| err).collect()
        };
        let mut errors = claimed.into_iter();
        let Some(first) = errors.next() else {
            return Ok(());
        };
        for rest in errors {
            tracing::warn!(
                message = "instance.error.superseded",
                template = %self.name,
                error = %rest
            );
        }
        Err(first)
    }

    /// Reactive state container, if `state` was configured.
    #[must_use]
    pub fn state(&self) -> Option<ReactiveObject<Value>> {
        self.state.borrow().clone()
    }

    /// Reactive props container, if `props` was configured.
    #[must_use]
    pub fn props(&self) -> Option<ReactiveObject<Value>> {
        self.props.borrow().clone()
    }

    /// Trigger aliases, if `trigger` was configured.
    #[must_use]
    pub fn triggers(&self) -> Option<IndexMap<String, String>> {
        self.triggers.borrow().clone()
    }

    pub(crate) fn install_state(&self, state: ReactiveObject<Value>) {
        *self.state.borrow_mut() = Some(state);
    }

    pub(crate) fn install_props(&self, props: ReactiveObject<Value>) {
        *self.props.borrow_mut() = Some(props);
    }

    pub(crate) fn install_triggers(&self, triggers: IndexMap<String, String>) {
        *self.triggers.borrow_mut() = Some(triggers);
    }

    pub(crate) fn attach_member(&self, name: &str, member: Member) {
        self.members.borrow_mut().insert(name.to_owned(), member);
    }

    #[must_use]
    pub fn member(&self, name: &str) -> Option<Member> {
        self.members.borrow().get(name).cloned()
    }

    /// Value of a data member.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Value> {
        self.member(name).and_then(|m| m.as_value().cloned())
    }

    /// Insert or overwrite a data member.
    pub fn set_field(&self, name: &str, value: Value) {
        self.attach_member(name, Member::Value(value));
    }

    /// Invoke a method member. Data members are not callable.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        match self.member(name) {
            Some(Member::Method(method)) => method(self, args),
            _ => Err(ControllerError::UnknownMember {
                template: self.name.clone(),
                name: name.to_owned(),
            }),
        }
    }

    /// Dispatch `event` with `payload` on the single root node.
    ///
    /// Fails with `RootElementRequired` unless the first and last rendered
    /// nodes are the same node.
    pub fn trigger_event(&self, event: &str, payload: Value) -> Result<()> {
        let first = self.dom.first_node();
        let last = self.dom.last_node();
        match (first, last) {
            (Some(root), Some(end)) if root == end => {
                tracing::debug!(
                    message = "instance.trigger",
                    template = %self.name,
                    event,
                    node = root.raw()
                );
                self.dom.dispatch(root, event, &payload);
                Ok(())
            }
            _ => Err(ControllerError::RootElementRequired {
                template: self.name.clone(),
                first,
                last,
            }),
        }
    }

    /// Dispatch the event an alias maps to; unknown aliases are used as the
    /// event name.
    pub fn trigger(&self, alias: &str, payload: Value) -> Result<()> {
        let event = self
            .triggers
            .borrow()
            .as_ref()
            .and_then(|t| t.get(alias).cloned())
            .unwrap_or_else(|| alias.to_owned());
        self.trigger_event(&event, payload)
    }

    /// Register a tracked computation owned by this instance.
    ///
    /// A failure on the first run is returned. Later failures are logged and
    /// returned from the [`set_data`](Self::set_data) call that caused them.
    pub fn autorun(
        &self,
        body: impl FnMut(&Computation) -> Result<()> + 'static,
    ) -> Result<()> {
        let sink = Rc::clone(&self.errors);
        let data = self.data.clone();
        let template = self.name.clone();
        let computation = autorun_with_handler(body, move |err: ControllerError| {
            let version = data.version();
            tracing::error!(
                message = "instance.rerun_failed",
                template = %template,
                kind = err.name(),
                data_version = version,
                error = %err
            );
            sink.borrow_mut().push((version, err));
        })?;
        self.own(computation);
        Ok(())
    }

    pub(crate) fn own(&self, computation: Computation) {
        if self.destroyed.get() {
            computation.stop();
            return;
        }
        self.computations.borrow_mut().push(computation);
    }

    /// Number of live computations owned by this instance.
    #[must_use]
    pub fn computation_count(&self) -> usize {
        self.computations
            .borrow()
            .iter()
            .filter(|c| !c.is_stopped())
            .count()
    }

    /// Stop every owned computation. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.stop_computations();
        tracing::debug!(message = "instance.destroyed", template = %self.name);
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    fn stop_computations(&self) {
        let computations = std::mem::take(&mut *self.computations.borrow_mut());
        for computation in computations {
            computation.stop();
        }
    }
}

impl Drop for ComponentInstance {
    fn drop(&mut self) {
        self.stop_computations();
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("name", &self.name)
            .field("state", &self.state.borrow())
            .field("props", &self.props.borrow())
            .field("members", &self.members.borrow().keys().collect::<Vec<_>>())
            .field("computations", &self.computations.borrow().len())
            .field("destroyed", &self.destroyed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NodeId;
    use serde_json::json;

    #[derive(Default)]
    struct Roots {
        nodes: Vec<NodeId>,
        sent: RefCell<Vec<(NodeId, String, Value)>>,
    }

    impl DomHandle for Roots {
        fn first_node(&self) -> Option<NodeId> {
            self.nodes.first().copied()
        }

        fn last_node(&self) -> Option<NodeId> {
            self.nodes.last().copied()
        }

        fn dispatch(&self, node: NodeId, event: &str, payload: &Value) {
            self.sent
                .borrow_mut()
                .push((node, event.to_owned(), payload.clone()));
        }
    }

    fn instance_with_roots(nodes: Vec<NodeId>) -> (ComponentInstance, Rc<Roots>) {
        let dom = Rc::new(Roots {
            nodes,
            ..Roots::default()
        });
        (ComponentInstance::new("card", dom.clone()), dom)
    }

    #[test]
    fn trigger_event_on_single_root() {
        let (inst, dom) = instance_with_roots(vec![NodeId(1)]);
        inst.trigger_event("picked", json!({"id": 3})).unwrap();
        assert_eq!(
            dom.sent.borrow().as_slice(),
            [(NodeId(1), "picked".to_string(), json!({"id": 3}))]
        );
    }

    #[test]
    fn trigger_event_requires_single_root() {
        let (inst, dom) = instance_with_roots(vec![NodeId(1), NodeId(2)]);
        let err = inst.trigger_event("picked", Value::Null).unwrap_err();
        assert_eq!(err.name(), "RootElementRequired");
        assert!(dom.sent.borrow().is_empty());

        let (empty, _) = instance_with_roots(Vec::new());
        assert!(matches!(
            empty.trigger_event("picked", Value::Null),
            Err(ControllerError::RootElementRequired { first: None, .. })
        ));
    }

    #[test]
    fn trigger_alias_falls_back_to_name() {
        let (inst, dom) = instance_with_roots(vec![NodeId(5)]);
        inst.install_triggers(IndexMap::from([("save".to_string(), "card:save".to_string())]));
        inst.trigger("save", Value::Null).unwrap();
        inst.trigger("close", Value::Null).unwrap();
        let sent = dom.sent.borrow();
        assert_eq!(sent[0].1, "card:save");
        assert_eq!(sent[1].1, "close");
    }

    #[test]
    fn members_fields_and_methods() {
        let (inst, _) = instance_with_roots(vec![NodeId(1)]);
        inst.set_field("count", json!(2));
        inst.attach_member(
            "twice",
            Member::method(|this, _| {
                let n = this.field("count").and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(json!(n * 2))
            }),
        );
        assert_eq!(inst.call("twice", &[]).unwrap(), json!(4));
        assert_eq!(inst.field("count"), Some(json!(2)));
        assert!(matches!(
            inst.call("count", &[]),
            Err(ControllerError::UnknownMember { .. })
        ));
    }

    #[test]
    fn rerun_errors_surface_from_set_data() {
        let (inst, _) = instance_with_roots(vec![NodeId(1)]);
        let data = inst.data_cell();
        inst.autorun(move |_| match data.get() {
            Some(d) if d.contains_key("bad") => Err(ControllerError::hook("bad data")),
            _ => Ok(()),
        })
        .unwrap();

        let mut bad = Data::new();
        bad.insert("bad".into(), json!(true));
        let err = inst.set_data(Some(bad)).unwrap_err();
        assert_eq!(err.to_string(), "bad data");
        assert!(inst.set_data(None).is_ok());
    }

    #[test]
    fn deferred_rerun_error_is_not_blamed_on_next_write() {
        let (inst, _) = instance_with_roots(vec![NodeId(1)]);
        let data = inst.data_cell();
        inst.autorun(move |_| match data.get() {
            Some(d) if d.contains_key("bad") => Err(ControllerError::hook("bad data")),
            _ => Ok(()),
        })
        .unwrap();

        let mut bad = Data::new();
        bad.insert("bad".into(), json!(true));
        tmpl_reactive::batch(|| inst.set_data(Some(bad))).unwrap();
        assert!(inst.set_data(Some(Data::new())).is_ok());

        let stale = inst.take_errors();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].to_string(), "bad data");
        assert!(inst.take_errors().is_empty());
    }

    #[test]
    fn destroy_stops_computations() {
        let (inst, _) = instance_with_roots(vec![NodeId(1)]);
        let runs = Rc::new(Cell::new(0u32));
        let runs_in = Rc::clone(&runs);
        let data = inst.data_cell();
        inst.autorun(move |_| {
            let _ = data.get();
            runs_in.set(runs_in.get() + 1);
            Ok(())
        })
        .unwrap();
        assert_eq!(inst.computation_count(), 1);

        inst.destroy();
        inst.destroy();
        assert!(inst.is_destroyed());
        assert_eq!(inst.computation_count(), 0);
        inst.set_data(Some(Data::new())).unwrap();
        assert_eq!(runs.get(), 1);
    }
}
