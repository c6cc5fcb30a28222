#![forbid(unsafe_code)]

//! Named collections of reactive cells.
//!
//! A [`ReactiveObject`] maps property names to [`ReactiveCell`]s and exposes
//! them as plain get/set properties. Reading a present key subscribes only to
//! that key's cell; reading an absent key (or the key list) subscribes to the
//! object's shape, which changes when a key is added.
//!
//! # Invariants
//!
//! 1. Once a key exists its cell is reused for every later write. Cells are
//!    never replaced or removed, so subscribers are never lost.
//! 2. The shape version bumps exactly once per newly created key.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::cell::{Equality, ReactiveCell};
use crate::error::{ReactiveError, Result};

/// Outcome of [`ReactiveObject::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyChange {
    /// The key was absent; a new cell was created.
    Created,
    /// The existing cell took a different value.
    Updated,
    /// The existing cell already held an equal value.
    Unchanged,
}

/// A mapping from property name to [`ReactiveCell`].
///
/// Cloning creates a new handle to the **same** object.
pub struct ReactiveObject<T> {
    cells: Rc<RefCell<IndexMap<String, ReactiveCell<T>>>>,
    shape: ReactiveCell<u64>,
    equals: Equality<T>,
}

impl<T> Clone for ReactiveObject<T> {
    fn clone(&self) -> Self {
        Self {
            cells: Rc::clone(&self.cells),
            shape: self.shape.clone(),
            equals: self.equals,
        }
    }
}

impl<T> fmt::Debug for ReactiveObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells = self.cells.borrow();
        f.debug_struct("ReactiveObject")
            .field("keys", &cells.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<T: PartialEq + Clone + 'static> Default for ReactiveObject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> ReactiveObject<T> {
    /// Empty object whose cells compare writes with `PartialEq`.
    #[must_use]
    pub fn new() -> Self
    where
        T: PartialEq,
    {
        Self::with_equality(<T as PartialEq>::eq)
    }

    /// Empty object whose cells use `equals` for change detection.
    #[must_use]
    pub fn with_equality(equals: Equality<T>) -> Self {
        Self {
            cells: Rc::new(RefCell::new(IndexMap::new())),
            shape: ReactiveCell::new(0),
            equals,
        }
    }

    /// Define `key` seeded with `default` and return its cell.
    ///
    /// Redefining an existing key writes `default` into the existing cell
    /// instead of replacing it.
    pub fn add_property(&self, key: impl Into<String>, default: T) -> ReactiveCell<T> {
        let key = key.into();
        if let Some(cell) = self.cell(&key) {
            tracing::debug!(message = "reactive_object.redefine", key = %key);
            cell.set(default);
            return cell;
        }
        self.insert_cell(key, default)
    }

    /// Define `key` seeded with `T::default()`.
    pub fn add_empty_property(&self, key: impl Into<String>) -> ReactiveCell<T>
    where
        T: Default,
    {
        self.add_property(key, T::default())
    }

    /// [`add_property`](Self::add_property) once per entry.
    pub fn add_properties<K, I>(&self, entries: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, T)>,
    {
        for (key, value) in entries {
            self.add_property(key, value);
        }
    }

    /// Current value of `key`; subscribes the running computation.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<T> {
        match self.cell(key) {
            Some(cell) => Some(cell.get()),
            None => {
                let _ = self.shape.get();
                None
            }
        }
    }

    /// Write an existing key. Returns whether the value changed.
    pub fn set(&self, key: &str, value: T) -> Result<bool> {
        let cell = self.cell(key).ok_or_else(|| ReactiveError::UnknownProperty {
            key: key.to_owned(),
        })?;
        Ok(cell.set(value))
    }

    /// Create `key` if absent, otherwise update its existing cell.
    pub fn upsert(&self, key: &str, value: T) -> PropertyChange {
        let Some(cell) = self.cell(key) else {
            self.insert_cell(key.to_owned(), value);
            return PropertyChange::Created;
        };
        if cell.set(value) {
            PropertyChange::Updated
        } else {
            PropertyChange::Unchanged
        }
    }

    /// The cell behind `key`, without subscribing.
    #[must_use]
    pub fn cell(&self, key: &str) -> Option<ReactiveCell<T>> {
        self.cells.borrow().get(key).cloned()
    }

    /// Whether `key` exists; subscribes to the shape.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        let _ = self.shape.get();
        self.cells.borrow().contains_key(key)
    }

    /// Keys in definition order; subscribes to the shape.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let _ = self.shape.get();
        self.cells.borrow().keys().cloned().collect()
    }

    /// Number of keys; subscribes to the shape.
    #[must_use]
    pub fn len(&self) -> usize {
        let _ = self.shape.get();
        self.cells.borrow().len()
    }

    /// Whether the object has no keys; subscribes to the shape.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All values; subscribes to the shape and to every cell.
    #[must_use]
    pub fn snapshot(&self) -> IndexMap<String, T> {
        let _ = self.shape.get();
        let cells: Vec<(String, ReactiveCell<T>)> = self
            .cells
            .borrow()
            .iter()
            .map(|(k, c)| (k.clone(), c.clone()))
            .collect();
        cells.into_iter().map(|(k, c)| (k, c.get())).collect()
    }

    /// Number of keys ever created.
    #[must_use]
    pub fn shape_version(&self) -> u64 {
        self.shape.get_untracked()
    }

    /// Whether both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cells, &other.cells)
    }

    fn insert_cell(&self, key: String, value: T) -> ReactiveCell<T> {
        let cell = ReactiveCell::with_equality(value, self.equals);
        self.cells.borrow_mut().insert(key, cell.clone());
        self.shape.set(self.shape.get_untracked() + 1);
        cell
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
