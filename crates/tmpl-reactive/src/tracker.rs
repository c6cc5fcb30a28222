#![forbid(unsafe_code)]

//! Tracked computations and the thread-local rerun scheduler.
//!
//! # Design
//!
//! A [`Computation`] wraps a body closure. While the body runs, every
//! [`ReactiveCell`](crate::ReactiveCell) it reads records the computation as a
//! dependent of that run. When one of those cells changes, the computation is
//! invalidated and queued; the queue is drained synchronously once the
//! outermost write, [`batch`], or running computation completes.
//!
//! Dependencies are one-shot: a rerun starts a new generation and re-records
//! exactly the cells it reads, so cells read only in a previous run no longer
//! trigger it.
//!
//! # Invariants
//!
//! 1. A computation is queued at most once per invalidation.
//! 2. Reruns never nest: a body is never re-entered while it is running.
//! 3. A stopped computation never runs again.
//! 4. Dropping the last [`Computation`] handle disposes the computation;
//!    cells only hold weak references to it.
//!
//! # Failure Modes
//!
//! - **Body fails on the first run**: the computation is stopped and the
//!   error is returned from [`autorun`].
//! - **Body fails on a rerun**: the error goes to the computation's error
//!   handler (by default a `tracing::error!` event). The computation keeps
//!   its dependencies from the failed run and stays live.
//! - **Self-invalidating body**: a computation rerun more than
//!   [`MAX_FLUSH_RERUNS`] times within one flush is cut off with a warning
//!   and left settled. Every other queued computation still reruns.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

/// Maximum number of times one computation reruns within a single flush.
pub const MAX_FLUSH_RERUNS: usize = 10_000;

/// Process-unique (per thread) identifier of a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputationId(u64);

impl ComputationId {
    /// Raw numeric value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "computation#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub(crate) trait Node {
    fn id(&self) -> ComputationId;
    fn generation(&self) -> u64;
    fn is_stopped(&self) -> bool;
    fn is_invalidated(&self) -> bool;
    fn run_count(&self) -> u64;
    fn invalidate(self: Rc<Self>);
    fn rerun(self: Rc<Self>);
    fn settle(&self);
    fn stop(&self);
    fn push_on_stop(&self, callback: Box<dyn FnOnce()>);
}

/// A dependent recorded by a cell: one specific run of one computation.
#[derive(Clone)]
pub(crate) struct Observer {
    id: ComputationId,
    generation: u64,
    node: Weak<dyn Node>,
}

impl Observer {
    pub(crate) fn same_run(&self, other: &Observer) -> bool {
        self.id == other.id && self.generation == other.generation
    }

    pub(crate) fn is_live(&self) -> bool {
        self.node
            .upgrade()
            .is_some_and(|node| !node.is_stopped() && node.generation() == self.generation)
    }

    pub(crate) fn notify(&self) {
        if let Some(node) = self.node.upgrade() {
            if node.generation() == self.generation {
                node.invalidate();
            }
        }
    }
}

#[derive(Default)]
struct Scheduler {
    current: RefCell<Option<Observer>>,
    pending: RefCell<VecDeque<Rc<dyn Node>>>,
    hold: Cell<usize>,
    flushing: Cell<bool>,
    next_id: Cell<u64>,
}

thread_local! {
    static SCHEDULER: Scheduler = Scheduler::default();
}

fn next_id() -> ComputationId {
    SCHEDULER.with(|s| {
        let id = s.next_id.get() + 1;
        s.next_id.set(id);
        ComputationId(id)
    })
}

pub(crate) fn current_observer() -> Option<Observer> {
    SCHEDULER.with(|s| s.current.borrow().clone())
}

fn schedule(node: Rc<dyn Node>) {
    let idle = SCHEDULER.with(|s| {
        s.pending.borrow_mut().push_back(node);
        s.hold.get() == 0 && !s.flushing.get()
    });
    if idle {
        flush();
    }
}

struct RestoreObserver(Option<Observer>);

impl Drop for RestoreObserver {
    fn drop(&mut self) {
        let previous = self.0.take();
        let _ = SCHEDULER.try_with(|s| s.current.replace(previous));
    }
}

fn with_observer<R>(observer: Option<Observer>, f: impl FnOnce() -> R) -> R {
    let previous = SCHEDULER.with(|s| s.current.replace(observer));
    let _restore = RestoreObserver(previous);
    f()
}

/// Defers flushing while alive; the outermost guard flushes on release.
struct HoldGuard;

impl HoldGuard {
    fn acquire() -> Self {
        SCHEDULER.with(|s| s.hold.set(s.hold.get() + 1));
        Self
    }
}

impl Drop for HoldGuard {
    fn drop(&mut self) {
        let outermost = SCHEDULER
            .try_with(|s| {
                let depth = s.hold.get().saturating_sub(1);
                s.hold.set(depth);
                depth == 0
            })
            .unwrap_or(false);
        if outermost && !std::thread::panicking() {
            flush();
        }
    }
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = SCHEDULER.try_with(|s| s.flushing.set(false));
    }
}

/// Whether a tracked computation is currently running on this thread.
#[must_use]
pub fn is_tracking() -> bool {
    SCHEDULER.with(|s| s.current.borrow().is_some())
}

/// Handle to the computation currently running, if any.
#[must_use]
pub fn current_computation() -> Option<Computation> {
    current_observer()
        .and_then(|observer| observer.node.upgrade())
        .map(|inner| Computation { inner })
}

/// Run `f` without recording any cell it reads as a dependency.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    with_observer(None, f)
}

/// Run `f` with reruns deferred until the outermost batch exits.
///
/// Cell values are updated immediately; only the reruns of dependents wait.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _hold = HoldGuard::acquire();
    f()
}

/// Drain the rerun queue.
///
/// A no-op inside a batch, inside a running computation, or inside another
/// flush: the queue is drained when those complete.
pub fn flush() {
    let busy = SCHEDULER.with(|s| s.hold.get() > 0 || s.flushing.replace(true));
    if busy {
        return;
    }
    let _reset = FlushGuard;
    let mut reruns: HashMap<ComputationId, usize> = HashMap::new();
    loop {
        let next = SCHEDULER.with(|s| s.pending.borrow_mut().pop_front());
        let Some(node) = next else {
            break;
        };
        let count = reruns.entry(node.id()).or_insert(0);
        *count += 1;
        if *count > MAX_FLUSH_RERUNS {
            node.settle();
            if *count == MAX_FLUSH_RERUNS + 1 {
                tracing::warn!(
                    message = "tracker.flush.runaway",
                    id = node.id().raw(),
                    limit = MAX_FLUSH_RERUNS
                );
            }
            continue;
        }
        node.rerun();
    }
}

// ---------------------------------------------------------------------------
// Computation
// ---------------------------------------------------------------------------

type Body<E> = Box<dyn FnMut(&Computation) -> Result<(), E>>;

struct ComputationInner<E> {
    id: ComputationId,
    body: RefCell<Body<E>>,
    on_error: RefCell<Box<dyn FnMut(E)>>,
    generation: Cell<u64>,
    invalidated: Cell<bool>,
    stopped: Cell<bool>,
    runs: Cell<u64>,
    on_stop: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl<E: 'static> ComputationInner<E> {
    fn run(self: &Rc<Self>) -> Result<(), E> {
        self.invalidated.set(false);
        let generation = self.generation.get() + 1;
        self.generation.set(generation);

        let weak: Weak<dyn Node> = Rc::downgrade(self) as Weak<dyn Node>;
        let observer = Observer {
            id: self.id,
            generation,
            node: weak,
        };
        let handle = Computation {
            inner: Rc::clone(self) as Rc<dyn Node>,
        };

        let _hold = HoldGuard::acquire();
        let result = with_observer(Some(observer), || {
            let mut body = self.body.borrow_mut();
            (*body)(&handle)
        });
        self.runs.set(self.runs.get() + 1);
        result
    }

    fn run_stop_callbacks(&self) {
        let callbacks = std::mem::take(&mut *self.on_stop.borrow_mut());
        for callback in callbacks {
            callback();
        }
    }
}

impl<E: 'static> Node for ComputationInner<E> {
    fn id(&self) -> ComputationId {
        self.id
    }

    fn generation(&self) -> u64 {
        self.generation.get()
    }

    fn is_stopped(&self) -> bool {
        self.stopped.get()
    }

    fn is_invalidated(&self) -> bool {
        self.invalidated.get()
    }

    fn run_count(&self) -> u64 {
        self.runs.get()
    }

    fn invalidate(self: Rc<Self>) {
        if self.stopped.get() || self.invalidated.replace(true) {
            return;
        }
        tracing::trace!(message = "computation.invalidated", id = self.id.raw());
        schedule(self);
    }

    fn rerun(self: Rc<Self>) {
        if self.stopped.get() || !self.invalidated.get() {
            return;
        }
        if let Err(err) = self.run() {
            (*self.on_error.borrow_mut())(err);
        }
    }

    fn settle(&self) {
        self.invalidated.set(false);
    }

    fn stop(&self) {
        if self.stopped.replace(true) {
            return;
        }
        self.invalidated.set(false);
        self.run_stop_callbacks();
        tracing::debug!(message = "computation.stopped", id = self.id.raw());
    }

    fn push_on_stop(&self, callback: Box<dyn FnOnce()>) {
        if self.stopped.get() {
            callback();
        } else {
            self.on_stop.borrow_mut().push(callback);
        }
    }
}

impl<E> Drop for ComputationInner<E> {
    fn drop(&mut self) {
        if !self.stopped.replace(true) {
            let callbacks = std::mem::take(self.on_stop.get_mut());
            for callback in callbacks {
                callback();
            }
        }
    }
}

/// Handle to a tracked computation.
///
/// Cloning creates another handle to the **same** computation. The
/// computation lives as long as at least one handle does.
#[derive(Clone)]
#[must_use = "dropping every handle to a computation disposes it"]
pub struct Computation {
    inner: Rc<dyn Node>,
}

impl Computation {
    /// Identifier of this computation.
    pub fn id(&self) -> ComputationId {
        self.inner.id()
    }

    /// Stop the computation. It will never run again. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.is_stopped()
    }

    /// Queue a rerun as if a dependency had changed.
    pub fn invalidate(&self) {
        Rc::clone(&self.inner).invalidate();
    }

    /// Whether a rerun is pending.
    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        self.inner.is_invalidated()
    }

    /// True while the body executes for the first time.
    #[must_use]
    pub fn is_first_run(&self) -> bool {
        self.inner.run_count() == 0
    }

    /// Number of completed runs, successful or not.
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.inner.run_count()
    }

    /// Register a callback invoked once when the computation stops.
    ///
    /// Runs immediately if the computation is already stopped.
    pub fn on_stop(&self, callback: impl FnOnce() + 'static) {
        self.inner.push_on_stop(Box::new(callback));
    }

    /// Whether both handles refer to the same computation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.inner.id())
            .field("runs", &self.inner.run_count())
            .field("invalidated", &self.inner.is_invalidated())
            .field("stopped", &self.inner.is_stopped())
            .finish()
    }
}

/// Run `body` now and again whenever a cell it read changes.
///
/// Rerun failures are logged with `tracing::error!`.
pub fn autorun<E, F>(body: F) -> Result<Computation, E>
where
    E: fmt::Display + 'static,
    F: FnMut(&Computation) -> Result<(), E> + 'static,
{
    autorun_with_handler(body, |err: E| {
        tracing::error!(message = "computation.rerun_failed", error = %err);
    })
}

/// Like [`autorun`], with rerun failures passed to `on_error`.
///
/// A failure on the first run stops the computation and is returned.
pub fn autorun_with_handler<E, F, H>(body: F, on_error: H) -> Result<Computation, E>
where
    E: 'static,
    F: FnMut(&Computation) -> Result<(), E> + 'static,
    H: FnMut(E) + 'static,
{
    let inner = Rc::new(ComputationInner {
        id: next_id(),
        body: RefCell::new(Box::new(body)),
        on_error: RefCell::new(Box::new(on_error)),
        generation: Cell::new(0),
        invalidated: Cell::new(false),
        stopped: Cell::new(false),
        runs: Cell::new(0),
        on_stop: RefCell::new(Vec::new()),
    });
    tracing::debug!(message = "computation.started", id = inner.id.raw());

    let _hold = HoldGuard::acquire();
    match inner.run() {
        Ok(()) => Ok(Computation { inner }),
        Err(err) => {
            Node::stop(&*inner);
            Err(err)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReactiveCell;

    fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let count = Rc::new(Cell::new(0));
        (Rc::clone(&count), count)
    }

    #[test]
    fn autorun_runs_immediately_and_on_change() {
        let source = ReactiveCell::new(1);
        let (seen, seen_in) = counter();
        let src = source.clone();
        let comp = autorun(move |_| {
            seen_in.set(src.get() as u32);
            Ok::<_, String>(())
        })
        .unwrap();

        assert_eq!(seen.get(), 1);
        source.set(7);
        assert_eq!(seen.get(), 7);
        assert_eq!(comp.run_count(), 2);
    }

    #[test]
    fn equal_write_does_not_rerun() {
        let source = ReactiveCell::new(3);
        let src = source.clone();
        let comp = autorun(move |_| {
            let _ = src.get();
            Ok::<_, String>(())
        })
        .unwrap();

        assert!(!source.set(3));
        assert_eq!(comp.run_count(), 1);
    }

    #[test]
    fn batch_coalesces_reruns() {
        let a = ReactiveCell::new(0);
        let b = ReactiveCell::new(0);
        let (runs, runs_in) = counter();
        let (a2, b2) = (a.clone(), b.clone());
        let _comp = autorun(move |_| {
            let _ = a2.get() + b2.get();
            runs_in.set(runs_in.get() + 1);
            Ok::<_, String>(())
        })
        .unwrap();

        batch(|| {
            a.set(1);
            b.set(2);
            assert_eq!(runs.get(), 1, "rerun must wait for the batch");
        });
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let source = ReactiveCell::new(0);
        let src = source.clone();
        let comp = autorun(move |_| {
            let _ = untracked(|| src.get());
            Ok::<_, String>(())
        })
        .unwrap();

        source.set(5);
        assert_eq!(comp.run_count(), 1);
        assert_eq!(source.dependent_count(), 0);
    }

    #[test]
    fn stop_prevents_reruns_and_fires_callbacks() {
        let source = ReactiveCell::new(0);
        let src = source.clone();
        let comp = autorun(move |_| {
            let _ = src.get();
            Ok::<_, String>(())
        })
        .unwrap();
        let (stopped, stopped_in) = counter();
        comp.on_stop(move || stopped_in.set(stopped_in.get() + 1));

        comp.stop();
        comp.stop();
        source.set(1);
        assert_eq!(comp.run_count(), 1);
        assert_eq!(stopped.get(), 1);
        assert!(comp.is_stopped());
    }

    #[test]
    fn dropping_last_handle_disposes() {
        let source = ReactiveCell::new(0);
        let (runs, runs_in) = counter();
        let src = source.clone();
        let comp = autorun(move |_| {
            let _ = src.get();
            runs_in.set(runs_in.get() + 1);
            Ok::<_, String>(())
        })
        .unwrap();
        drop(comp);

        source.set(1);
        assert_eq!(runs.get(), 1);
        assert_eq!(source.dependent_count(), 0);
    }

    #[test]
    fn first_run_failure_is_returned_and_stops() {
        let source = ReactiveCell::new(0);
        let src = source.clone();
        let (runs, runs_in) = counter();
        let result = autorun(move |_| {
            let _ = src.get();
            runs_in.set(runs_in.get() + 1);
            Err::<(), _>("boom".to_string())
        });

        assert_eq!(result.unwrap_err(), "boom");
        source.set(1);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn rerun_failure_goes_to_handler() {
        let source = ReactiveCell::new(0);
        let src = source.clone();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        let _comp = autorun_with_handler(
            move |_| {
                if src.get() > 0 {
                    Err(format!("bad value {}", src.get_untracked()))
                } else {
                    Ok(())
                }
            },
            move |err| sink.borrow_mut().push(err),
        )
        .unwrap();

        source.set(2);
        assert_eq!(errors.borrow().as_slice(), ["bad value 2".to_string()]);

        source.set(0);
        assert_eq!(errors.borrow().len(), 1, "computation stays live after a failed rerun");
    }

    #[test]
    fn first_run_flag() {
        let source = ReactiveCell::new(0);
        let src = source.clone();
        let flags = Rc::new(RefCell::new(Vec::new()));
        let flags_in = Rc::clone(&flags);
        let _comp = autorun(move |c| {
            let _ = src.get();
            flags_in.borrow_mut().push(c.is_first_run());
            Ok::<_, String>(())
        })
        .unwrap();

        source.set(1);
        assert_eq!(flags.borrow().as_slice(), [true, false]);
    }

    #[test]
    fn dependencies_are_rerecorded_each_run() {
        let switch = ReactiveCell::new(true);
        let left = ReactiveCell::new(0);
        let right = ReactiveCell::new(0);
        let (sw, l, r) = (switch.clone(), left.clone(), right.clone());
        let comp = autorun(move |_| {
            let _ = if sw.get() { l.get() } else { r.get() };
            Ok::<_, String>(())
        })
        .unwrap();

        switch.set(false);
        assert_eq!(comp.run_count(), 2);
        left.set(10);
        assert_eq!(comp.run_count(), 2, "left is no longer a dependency");
        right.set(10);
        assert_eq!(comp.run_count(), 3);
    }

    #[test]
    fn self_invalidating_body_is_cut_off() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("tmpl_reactive=warn"))
            .with_test_writer()
            .try_init();
        let source = ReactiveCell::new(0u64);
        let src = source.clone();
        let comp = autorun(move |_| {
            let next = src.get() + 1;
            src.set(next);
            Ok::<_, String>(())
        })
        .unwrap();

        assert_eq!(comp.run_count(), MAX_FLUSH_RERUNS as u64 + 1);
        assert!(!comp.is_invalidated());
    }

    #[test]
    fn runaway_cutoff_spares_other_computations() {
        let looping = ReactiveCell::new(0usize);
        let late = ReactiveCell::new(0u32);
        let (seen, seen_in) = counter();
        let l = late.clone();
        let _reader = autorun(move |_| {
            seen_in.set(l.get());
            Ok::<_, String>(())
        })
        .unwrap();

        // queues the reader behind the runaway just before the cutoff
        let (src, l) = (looping.clone(), late.clone());
        let runaway = autorun(move |_| {
            let next = src.get() + 1;
            src.set(next);
            if next == MAX_FLUSH_RERUNS {
                l.set(1);
            }
            Ok::<_, String>(())
        })
        .unwrap();

        assert_eq!(runaway.run_count(), MAX_FLUSH_RERUNS as u64 + 1);
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn fan_out_beyond_rerun_limit_reaches_every_dependent() {
        let source = ReactiveCell::new(0u32);
        let total = MAX_FLUSH_RERUNS + 1;
        let seen: Vec<Rc<Cell<u32>>> = (0..total).map(|_| Rc::new(Cell::new(0))).collect();
        let _comps: Vec<Computation> = seen
            .iter()
            .map(|slot| {
                let (src, slot) = (source.clone(), Rc::clone(slot));
                autorun(move |_| {
                    slot.set(src.get());
                    Ok::<_, String>(())
                })
                .unwrap()
            })
            .collect();

        source.set(1);
        let updated = seen.iter().filter(|slot| slot.get() == 1).count();
        assert_eq!(updated, total);
    }

    #[test]
    fn current_computation_inside_body() {
        let ids = Rc::new(RefCell::new(Vec::new()));
        let ids_in = Rc::clone(&ids);
        let comp = autorun(move |c| {
            assert!(is_tracking());
            let current = current_computation().expect("inside a computation");
            ids_in.borrow_mut().push(current.ptr_eq(c));
            Ok::<_, String>(())
        })
        .unwrap();

        assert!(!is_tracking());
        assert!(current_computation().is_none());
        assert_eq!(ids.borrow().as_slice(), [true]);
        assert_eq!(comp.id().to_string(), format!("computation#{}", comp.id().raw()));
    }

    #[test]
    fn manual_invalidate_reruns() {
        let comp = autorun(|_| Ok::<_, String>(())).unwrap();
        comp.invalidate();
        assert_eq!(comp.run_count(), 2);
    }
}
