#![forbid(unsafe_code)]

//! Declarative controllers for host-rendered templates.
//!
//! A controller takes one [`ComponentConfiguration`] and wires it into a
//! component definition owned by the host templating runtime:
//!
//! - `state`: per-instance reactive container seeded with defaults.
//! - `props`: per-instance reactive container kept in step with the external
//!   data through a [`PropertyValidator`].
//! - `helpers`, `events`, lifecycle hooks: registered on the definition, each
//!   receiving the [`ComponentInstance`] explicitly.
//! - `private`, `trigger`, and pass-through members: attached to the instance.
//!
//! # Example
//!
//! ```ignore
//! let controllers = TemplateControllers::new(host);
//! controllers.create(
//!     "counter",
//!     ComponentConfiguration::new()
//!         .state([("count", json!(0))])
//!         .event("click button", |this, _| {
//!             let state = this.state().ok_or_else(|| ControllerError::hook("no state"))?;
//!             let next = state.get("count").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
//!             state.set("count", json!(next))?;
//!             Ok(())
//!         }),
//! )?;
//! ```
//!
//! # Failure Modes
//!
//! Every failure is a [`ControllerError`]; [`ControllerError::name`] gives its
//! stable kind name.

pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod instance;
pub mod options;
pub mod reconcile;
pub mod validator;

pub use config::{ComponentConfiguration, Member, Method, RECOGNIZED_KEYS, is_recognized_key};
pub use controller::{TemplateControllers, create_controller};
pub use error::{ControllerError, Result};
pub use host::{
    ComponentDefinition, DomEvent, DomHandle, EventHandler, EventMap, Helper, HelperMap,
    HelperValue, HostRuntime, LifecycleHook, NodeId,
};
pub use instance::ComponentInstance;
pub use options::{ChangeDetection, ControllerOptions};
pub use reconcile::{PropertyReconciler, ReconcileReport};
pub use validator::{CleanConfiguration, Data, PropertyValidator, PropsConfig, ValidationFailure};

pub use tmpl_reactive as reactive;
