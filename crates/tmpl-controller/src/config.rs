#![forbid(unsafe_code)]

//! Declarative component configuration.
//!
//! A [`ComponentConfiguration`] gathers everything a controller wires into a
//! component definition. The recognized sections are listed in
//! [`RECOGNIZED_KEYS`]; every other entry is a pass-through [`Member`]
//! attached verbatim onto each mounted instance.
//!
//! # Invariants
//!
//! - The pass-through set never contains a recognized key. Members added
//!   under a recognized name are dropped with a warning, so they can never
//!   shadow a lifecycle section.
//! - Building a configuration consumes the builder; nothing is removed from a
//!   value the caller still holds.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::Result;
use crate::host::{DomEvent, EventHandler, EventMap, Helper, HelperMap, HelperValue, LifecycleHook};
use crate::instance::ComponentInstance;
use crate::validator::PropsConfig;

/// Configuration sections consumed by the controller itself.
pub const RECOGNIZED_KEYS: [&str; 9] = [
    "state",
    "props",
    "helpers",
    "events",
    "onCreated",
    "onRendered",
    "onDestroyed",
    "private",
    "trigger",
];

/// Whether `key` names a configuration section rather than a member.
#[must_use]
pub fn is_recognized_key(key: &str) -> bool {
    RECOGNIZED_KEYS.contains(&key)
}

pub type Method = Rc<dyn Fn(&ComponentInstance, &[Value]) -> Result<Value>>;

/// A field or method attached to each mounted instance.
#[derive(Clone)]
pub enum Member {
    Value(Value),
    Method(Method),
}

impl Member {
    #[must_use]
    pub fn method(f: impl Fn(&ComponentInstance, &[Value]) -> Result<Value> + 'static) -> Self {
        Self::Method(Rc::new(f))
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Method(_) => None,
        }
    }
}

impl From<Value> for Member {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Method(_) => f.write_str("Method(..)"),
        }
    }
}

/// Everything a controller registers for one component.
#[derive(Clone, Default)]
pub struct ComponentConfiguration {
    pub(crate) state: Option<IndexMap<String, Value>>,
    pub(crate) props: Option<PropsConfig>,
    pub(crate) helpers: HelperMap,
    pub(crate) events: EventMap,
    pub(crate) on_created: Option<LifecycleHook>,
    pub(crate) on_rendered: Option<LifecycleHook>,
    pub(crate) on_destroyed: Option<LifecycleHook>,
    pub(crate) private: Option<IndexMap<String, Member>>,
    pub(crate) trigger: Option<IndexMap<String, String>>,
    pub(crate) members: IndexMap<String, Member>,
}

impl ComponentConfiguration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare reactive state with its default values.
    ///
    /// An empty iterator still gives every instance an (empty) state
    /// container.
    #[must_use]
    pub fn state<K, I>(mut self, defaults: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let state = self.state.get_or_insert_with(IndexMap::new);
        for (key, value) in defaults {
            state.insert(key.into(), value);
        }
        self
    }

    /// Declare validated props.
    #[must_use]
    pub fn props(mut self, props: PropsConfig) -> Self {
        self.props = Some(props);
        self
    }

    #[must_use]
    pub fn helper(
        mut self,
        name: impl Into<String>,
        helper: impl Fn(&ComponentInstance, &[Value]) -> HelperValue + 'static,
    ) -> Self {
        let helper: Helper = Rc::new(helper);
        self.helpers.insert(name.into(), helper);
        self
    }

    /// Handle a host event selector such as `"click .save"`.
    #[must_use]
    pub fn event(
        mut self,
        selector: impl Into<String>,
        handler: impl Fn(&ComponentInstance, &DomEvent) -> Result<()> + 'static,
    ) -> Self {
        let handler: EventHandler = Rc::new(handler);
        self.events.insert(selector.into(), handler);
        self
    }

    #[must_use]
    pub fn on_created(mut self, hook: impl Fn(&ComponentInstance) -> Result<()> + 'static) -> Self {
        self.on_created = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn on_rendered(
        mut self,
        hook: impl Fn(&ComponentInstance) -> Result<()> + 'static,
    ) -> Self {
        self.on_rendered = Some(Rc::new(hook));
        self
    }

    #[must_use]
    pub fn on_destroyed(
        mut self,
        hook: impl Fn(&ComponentInstance) -> Result<()> + 'static,
    ) -> Self {
        self.on_destroyed = Some(Rc::new(hook));
        self
    }

    /// Instance-private member, attached after pass-through members.
    #[must_use]
    pub fn private(mut self, name: impl Into<String>, member: impl Into<Member>) -> Self {
        self.private
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), member.into());
        self
    }

    /// Map a trigger alias to the DOM event it dispatches.
    #[must_use]
    pub fn trigger(mut self, alias: impl Into<String>, event: impl Into<String>) -> Self {
        self.trigger
            .get_or_insert_with(IndexMap::new)
            .insert(alias.into(), event.into());
        self
    }

    /// Pass-through member. Recognized section names are rejected.
    #[must_use]
    pub fn member(mut self, name: impl Into<String>, member: impl Into<Member>) -> Self {
        let name = name.into();
        if is_recognized_key(&name) {
            tracing::warn!(message = "config.member.reserved", name = %name);
            return self;
        }
        self.members.insert(name, member.into());
        self
    }

    /// Pass-through method.
    #[must_use]
    pub fn method(
        self,
        name: impl Into<String>,
        f: impl Fn(&ComponentInstance, &[Value]) -> Result<Value> + 'static,
    ) -> Self {
        self.member(name, Member::method(f))
    }

    /// Names of the pass-through members, in insertion order.
    #[must_use]
    pub fn residual_keys(&self) -> Vec<&str> {
        self.members.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn has_props(&self) -> bool {
        self.props.is_some()
    }
}

impl fmt::Debug for ComponentConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentConfiguration")
            .field("state", &self.state)
            .field("props", &self.props)
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .field("on_created", &self.on_created.is_some())
            .field("on_rendered", &self.on_rendered.is_some())
            .field("on_destroyed", &self.on_destroyed.is_some())
            .field("private", &self.private)
            .field("trigger", &self.trigger)
            .field("members", &self.members)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recognized_keys_are_filtered_from_members() {
        let config = ComponentConfiguration::new()
            .member("onCreated", json!(1))
            .member("state", json!(2))
            .member("title", json!("hello"))
            .method("double", |_, args| {
                Ok(json!(args.first().and_then(Value::as_i64).unwrap_or(0) * 2))
            });
        assert_eq!(config.residual_keys(), ["title", "double"]);
    }

    #[test]
    fn every_recognized_key_is_reserved() {
        for key in RECOGNIZED_KEYS {
            assert!(is_recognized_key(key));
        }
        assert!(!is_recognized_key("render"));
    }

    #[test]
    fn state_entries_accumulate() {
        let config = ComponentConfiguration::new()
            .state([("a", json!(1))])
            .state([("b", json!(2))]);
        let state = config.state.unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state["b"], json!(2));
    }

    #[test]
    fn empty_state_is_still_configured() {
        let config = ComponentConfiguration::new().state(Vec::<(String, Value)>::new());
        assert!(config.state.is_some_and(|s| s.is_empty()));
    }

    #[test]
    fn private_and_trigger_sections() {
        let config = ComponentConfiguration::new()
            .private("secret", json!(42))
            .trigger("save", "user:save");
        assert_eq!(config.private.as_ref().unwrap()["secret"].as_value(), Some(&json!(42)));
        assert_eq!(config.trigger.as_ref().unwrap()["save"], "user:save");
        let dbg = format!("{config:?}");
        assert!(dbg.contains("user:save"));
    }
}
