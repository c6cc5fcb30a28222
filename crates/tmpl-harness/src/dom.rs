#![forbid(unsafe_code)]

use std::cell::RefCell;

use serde_json::Value;
use tmpl_controller::{DomHandle, NodeId};

/// One `dispatch` call seen by a [`TestDom`].
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub node: NodeId,
    pub event: String,
    pub payload: Value,
}

/// Rendered top-level nodes of one instance.
#[derive(Debug, Default)]
pub struct TestDom {
    roots: RefCell<Vec<NodeId>>,
    log: RefCell<Vec<Dispatched>>,
}

impl TestDom {
    /// Nothing rendered yet.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A single root element.
    #[must_use]
    pub fn single(id: u64) -> Self {
        Self::with_roots([id])
    }

    #[must_use]
    pub fn with_roots(ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            roots: RefCell::new(ids.into_iter().map(NodeId::new).collect()),
            log: RefCell::new(Vec::new()),
        }
    }

    /// Replace the rendered roots, as a re-render would.
    pub fn set_roots(&self, ids: impl IntoIterator<Item = u64>) {
        *self.roots.borrow_mut() = ids.into_iter().map(NodeId::new).collect();
    }

    #[must_use]
    pub fn dispatched(&self) -> Vec<Dispatched> {
        self.log.borrow().clone()
    }

    /// Event names dispatched so far, in order.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        self.log.borrow().iter().map(|d| d.event.clone()).collect()
    }
}

impl DomHandle for TestDom {
    fn first_node(&self) -> Option<NodeId> {
        self.roots.borrow().first().copied()
    }

    fn last_node(&self) -> Option<NodeId> {
        self.roots.borrow().last().copied()
    }

    fn dispatch(&self, node: NodeId, event: &str, payload: &Value) {
        self.log.borrow_mut().push(Dispatched {
            node,
            event: event.to_owned(),
            payload: payload.clone(),
        });
    }
}
