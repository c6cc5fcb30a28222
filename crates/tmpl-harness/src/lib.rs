#![forbid(unsafe_code)]

//! Test fixtures for template controllers.
//!
//! - [`TestHost`] / [`TestComponent`]: an in-memory host runtime that records
//!   what a controller registers and can mount, render, and destroy
//!   instances the way a real host would.
//! - [`TestDom`]: a rendered root range that logs dispatched events.
//! - [`SchemaValidator`]: a small field-schema [`PropertyValidator`] honoring
//!   every clean option.
//! - [`TraceCapture`]: a `tracing` layer collecting event message names.
//!
//! [`PropertyValidator`]: tmpl_controller::PropertyValidator

pub mod dom;
pub mod host;
pub mod schema;
pub mod trace;

pub use dom::{Dispatched, TestDom};
pub use host::{TestComponent, TestHost};
pub use schema::{FieldKind, SchemaValidator};
pub use trace::{TraceCapture, capture_traces};

use serde_json::Value;
use tmpl_controller::Data;

/// Build a [`Data`] snapshot from a JSON object literal.
///
/// Non-object values yield an empty snapshot.
#[must_use]
pub fn data(value: Value) -> Data {
    match value {
        Value::Object(map) => map,
        _ => Data::new(),
    }
}
