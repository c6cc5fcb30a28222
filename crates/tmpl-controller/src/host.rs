#![forbid(unsafe_code)]

//! Boundary with the host templating runtime.
//!
//! The host owns template registration, rendering, DOM diffing, and event
//! dispatch. The controller only needs to look a component definition up by
//! name, attach hooks/helpers/events to it, and reach the rendered root
//! nodes of a mounted instance.
//!
//! Every callback receives the owning [`ComponentInstance`] as an explicit
//! parameter; there is no ambient "current instance".

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;
use tmpl_reactive::ReactiveObject;

use crate::error::Result;
use crate::instance::ComponentInstance;

/// Identity of a rendered DOM node, assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Rendered DOM range of one mounted instance.
pub trait DomHandle {
    /// First top-level node the instance rendered.
    fn first_node(&self) -> Option<NodeId>;

    /// Last top-level node the instance rendered.
    fn last_node(&self) -> Option<NodeId>;

    /// Dispatch a custom event on `node`.
    fn dispatch(&self, node: NodeId, event: &str, payload: &Value);
}

/// A DOM event as delivered to an event handler.
#[derive(Debug, Clone, PartialEq)]
pub struct DomEvent {
    pub kind: String,
    pub target: Option<NodeId>,
    pub payload: Value,
}

impl DomEvent {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target: None,
            payload: Value::Null,
        }
    }

    #[must_use]
    pub fn target(mut self, node: NodeId) -> Self {
        self.target = Some(node);
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// What a helper hands to the view layer.
#[derive(Clone)]
pub enum HelperValue {
    /// Nothing to render.
    Undefined,
    /// A plain value.
    Value(Value),
    /// A reactive container (`state` or `props`).
    Object(ReactiveObject<Value>),
}

impl HelperValue {
    /// The plain value, if this is one.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// The reactive container, if this is one.
    #[must_use]
    pub fn as_object(&self) -> Option<&ReactiveObject<Value>> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

impl From<Value> for HelperValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Option<ReactiveObject<Value>>> for HelperValue {
    fn from(object: Option<ReactiveObject<Value>>) -> Self {
        object.map_or(Self::Undefined, Self::Object)
    }
}

impl fmt::Debug for HelperValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Object(object) => f.debug_tuple("Object").field(object).finish(),
        }
    }
}

pub type LifecycleHook = Rc<dyn Fn(&ComponentInstance) -> Result<()>>;
pub type Helper = Rc<dyn Fn(&ComponentInstance, &[Value]) -> HelperValue>;
pub type EventHandler = Rc<dyn Fn(&ComponentInstance, &DomEvent) -> Result<()>>;
pub type HelperMap = IndexMap<String, Helper>;
pub type EventMap = IndexMap<String, EventHandler>;

/// A host-registered component definition.
///
/// Registration methods append; calling them twice registers twice.
pub trait ComponentDefinition {
    fn name(&self) -> &str;

    fn on_created(&self, hook: LifecycleHook);

    fn on_rendered(&self, hook: LifecycleHook);

    fn on_destroyed(&self, hook: LifecycleHook);

    fn register_helpers(&self, helpers: HelperMap);

    /// Keys are host event selectors, e.g. `"click .save"`.
    fn register_events(&self, events: EventMap);
}

/// Component lookup on the host runtime.
pub trait HostRuntime {
    fn resolve_component(&self, name: &str) -> Option<Rc<dyn ComponentDefinition>>;
}

impl<H: HostRuntime + ?Sized> HostRuntime for Rc<H> {
    fn resolve_component(&self, name: &str) -> Option<Rc<dyn ComponentDefinition>> {
        (**self).resolve_component(name)
    }
}

impl<H: HostRuntime + ?Sized> HostRuntime for &H {
    fn resolve_component(&self, name: &str) -> Option<Rc<dyn ComponentDefinition>> {
        (**self).resolve_component(name)
    }
}
