#![forbid(unsafe_code)]

//! Reactive primitives for template controllers.
//!
//! - [`ReactiveCell`]: an observable value whose reads are dependency-tracked.
//! - [`Computation`] / [`autorun`]: a body rerun whenever a cell it read
//!   during its previous run changes.
//! - [`batch`], [`untracked`], [`flush`]: scheduler controls.
//! - [`ReactiveObject`]: a named collection of cells exposed as properties.
//!
//! # Architecture
//!
//! Everything is single-threaded. Handles share state through
//! `Rc<RefCell<..>>`; cells keep `Weak` references to the computations that
//! read them. The scheduler is thread-local and drains reruns synchronously
//! once the outermost write, batch, or running computation completes.
//!
//! # Invariants
//!
//! 1. A cell's version increments exactly once per effective write.
//! 2. Writing an equal value is a no-op (no version bump, no reruns).
//! 3. A computation reruns at most once per flush cycle per invalidation.
//! 4. Dropping every handle to a computation disposes it.
//! 5. Cells of a [`ReactiveObject`] are never replaced once created.

pub mod cell;
pub mod error;
pub mod object;
pub mod tracker;

pub use cell::{Equality, ReactiveCell};
pub use error::{ReactiveError, Result};
pub use object::{PropertyChange, ReactiveObject};
pub use tracker::{
    Computation, ComputationId, MAX_FLUSH_RERUNS, autorun, autorun_with_handler, batch,
    current_computation, flush, is_tracking, untracked,
};
