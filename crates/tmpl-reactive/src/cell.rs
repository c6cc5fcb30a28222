#![forbid(unsafe_code)]

//! Observable mutable value with dependency-tracked reads.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per write that changes the value.
//! 2. A write equal to the current value (under the cell's equality
//!    function) is a no-op: no version bump, no reruns.
//! 3. Each dependent is notified at most once per write, then forgotten until
//!    it reads the cell again.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::tracker::{Observer, batch, current_observer};

/// Equality used to decide whether a write is a change.
pub type Equality<T> = fn(&T, &T) -> bool;

struct CellInner<T> {
    value: T,
    version: u64,
    equals: Equality<T>,
    dependents: Vec<Observer>,
    prune_at: usize,
}

const MIN_PRUNE_AT: usize = 32;

/// A single observable value.
///
/// Cloning a `ReactiveCell` creates a new handle to the **same** value.
pub struct ReactiveCell<T> {
    inner: Rc<RefCell<CellInner<T>>>,
}

impl<T> Clone for ReactiveCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReactiveCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ReactiveCell")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("dependents", &inner.dependents.len())
            .finish()
    }
}

impl<T: Default + PartialEq + Clone + 'static> Default for ReactiveCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + 'static> ReactiveCell<T> {
    /// Create a cell that compares writes with `PartialEq`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equality(value, <T as PartialEq>::eq)
    }

    /// Create a cell with a custom change-detection function.
    pub fn with_equality(value: T, equals: Equality<T>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(CellInner {
                value,
                version: 0,
                equals,
                dependents: Vec::new(),
                prune_at: MIN_PRUNE_AT,
            })),
        }
    }

    /// Current value; subscribes the running computation.
    #[must_use]
    pub fn get(&self) -> T {
        self.track();
        self.inner.borrow().value.clone()
    }

    /// Current value without subscribing.
    #[must_use]
    pub fn get_untracked(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the value by reference; subscribes the running computation.
    ///
    /// # Panics
    ///
    /// Panics if `f` writes to this same cell (re-entrant borrow).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        let inner = self.inner.borrow();
        f(&inner.value)
    }

    /// Store `value`. Returns whether it counted as a change.
    ///
    /// Dependents rerun once the outermost write or batch completes.
    pub fn set(&self, value: T) -> bool {
        let dependents = {
            let mut inner = self.inner.borrow_mut();
            if (inner.equals)(&inner.value, &value) {
                return false;
            }
            inner.value = value;
            inner.version += 1;
            inner.prune_at = MIN_PRUNE_AT;
            std::mem::take(&mut inner.dependents)
        };
        if !dependents.is_empty() {
            batch(|| {
                for observer in &dependents {
                    observer.notify();
                }
            });
        }
        true
    }

    /// Modify a copy of the value and write it back.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut next = self.get_untracked();
        f(&mut next);
        self.set(next)
    }

    /// Number of effective writes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of live computations subscribed to this cell.
    #[must_use]
    pub fn dependent_count(&self) -> usize {
        self.inner
            .borrow()
            .dependents
            .iter()
            .filter(|d| d.is_live())
            .count()
    }

    /// Whether both handles refer to the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn track(&self) {
        let Some(observer) = current_observer() else {
            return;
        };
        let mut inner = self.inner.borrow_mut();
        if inner.dependents.iter().any(|d| d.same_run(&observer)) {
            return;
        }
        // stale runs are dropped in bulk once the list doubles
        if inner.dependents.len() >= inner.prune_at {
            inner.dependents.retain(Observer::is_live);
            let live = inner.dependents.len();
            inner.prune_at = (live * 2).max(MIN_PRUNE_AT);
        }
        inner.dependents.push(observer);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::autorun;
    use std::cell::Cell;

    #[test]
    fn version_counts_effective_writes() {
        let cell = ReactiveCell::new(1);
        assert_eq!(cell.version(), 0);
        assert!(cell.set(2));
        assert!(!cell.set(2));
        assert!(cell.set(3));
        assert_eq!(cell.version(), 2);
        assert_eq!(cell.get(), 3);
    }

    #[test]
    fn custom_equality_always_notifies() {
        let cell = ReactiveCell::with_equality(vec![1], |_, _| false);
        let runs = Rc::new(Cell::new(0u32));
        let runs_in = Rc::clone(&runs);
        let c = cell.clone();
        let _comp = autorun(move |_| {
            c.with(|v| v.len());
            runs_in.set(runs_in.get() + 1);
            Ok::<_, String>(())
        })
        .unwrap();

        assert!(cell.set(vec![1]));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn repeated_reads_register_once() {
        let cell = ReactiveCell::new(0);
        let c = cell.clone();
        let _comp = autorun(move |_| {
            let _ = c.get() + c.get() + c.get();
            Ok::<_, String>(())
        })
        .unwrap();

        assert_eq!(cell.dependent_count(), 1);
    }

    #[test]
    fn update_applies_closure() {
        let cell = ReactiveCell::new(String::from("a"));
        assert!(cell.update(|s| s.push('b')));
        assert_eq!(cell.get_untracked(), "ab");
        assert!(!cell.update(|_| {}));
    }

    #[test]
    fn clones_share_identity() {
        let a = ReactiveCell::new(5);
        let b = a.clone();
        let c = ReactiveCell::new(5);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        b.set(6);
        assert_eq!(a.get(), 6);
    }

    #[test]
    fn debug_format() {
        let cell = ReactiveCell::new(42);
        let dbg = format!("{cell:?}");
        assert!(dbg.contains("ReactiveCell"));
        assert!(dbg.contains("42"));
    }
}
