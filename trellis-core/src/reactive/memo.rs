//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a dependency changes, the memo is marked stale, and anything
//!    reading the memo is marked "maybe stale".
//!
//! 4. On next access, the memo re-checks if inputs actually changed.
//!
//! 5. If inputs changed, recompute. Otherwise, mark clean and return cache.
//!
//! 6. If the recomputed value equals the cached one, readers are not
//!    notified.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually accessed will recompute
//! - Memos that are never read stay dirty (no wasted work)
//!
//! # Ownership
//!
//! The memo's state is owned by its handles. The runtime only holds a weak
//! reference, so a memo nobody can read any more is released with its last
//! handle.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::runtime::Runtime;
use crate::error::{BoxError, ReactiveError, RunFailure};
use crate::graph::{Computation, NodeId, NodeState};

struct MemoCore<T> {
    id: NodeId,
    runtime: Runtime,
    value: RefCell<Option<T>>,
    compute: RefCell<Box<dyn FnMut() -> T>>,
    equals: Box<dyn Fn(&T, &T) -> bool>,
}

impl<T> Computation for MemoCore<T> {
    fn run(&self) -> Result<bool, BoxError> {
        let next = (self.compute.borrow_mut())();

        let previous = {
            let mut value = self.value.borrow_mut();
            if let Some(current) = value.as_ref() {
                if (self.equals)(current, &next) {
                    return Ok(false);
                }
            }
            value.replace(next)
        };
        drop(previous);
        Ok(true)
    }

    fn has_value(&self) -> bool {
        self.value.borrow().is_some()
    }
}

impl<T> MemoCore<T> {
    /// Bring the cached value up to date and optionally track the read.
    ///
    /// A failed read is still tracked, so the reader runs again once the
    /// memo's inputs change. Reads refused as a cycle are not.
    fn refresh(&self, track: bool) -> Result<(), RunFailure> {
        let updated = self.runtime.update_if_necessary(self.id);
        if track && !updated.as_ref().is_err_and(RunFailure::is_cycle) {
            self.runtime.track(self.id);
        }
        self.runtime.flush_if_idle();
        updated
    }

    fn try_with<R>(&self, track: bool, f: impl FnOnce(&T) -> R) -> Result<R, ReactiveError> {
        self.refresh(track)?;
        let value = self.value.borrow();
        value
            .as_ref()
            .map(f)
            .ok_or(ReactiveError::ComputationDisposed(self.id))
    }

    fn with<R>(&self, track: bool, f: impl FnOnce(&T) -> R) -> R {
        if let Err(failure) = self.refresh(track) {
            failure.resume();
        }
        let value = self.value.borrow();
        match value.as_ref() {
            Some(value) => f(value),
            None => panic!("{}", ReactiveError::ComputationDisposed(self.id)),
        }
    }
}

impl<T> Drop for MemoCore<T> {
    fn drop(&mut self) {
        self.runtime.release_node(self.id);
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust
/// use trellis_core::{Memo, Signal};
///
/// let count = Signal::new(2);
/// let source = count.clone();
/// let squared = Memo::new(move || source.get() * source.get());
///
/// assert_eq!(squared.get(), 4);
/// count.set(3);
/// assert_eq!(squared.get(), 9);
/// ```
pub struct Memo<T> {
    core: Rc<MemoCore<T>>,
}

impl<T: 'static> Memo<T> {
    /// Create a new memo that compares values with `PartialEq`.
    ///
    /// The computation does not run until the memo is first read.
    pub fn new<F>(compute: F) -> Self
    where
        F: FnMut() -> T + 'static,
        T: PartialEq,
    {
        Self::with_equals(compute, T::eq)
    }

    /// Create a new memo with a custom equality function.
    ///
    /// Readers are notified only when `equals(previous, next)` is false.
    pub fn with_equals<F, E>(compute: F, equals: E) -> Self
    where
        F: FnMut() -> T + 'static,
        E: Fn(&T, &T) -> bool + 'static,
    {
        let runtime = Runtime::current();
        let core = Rc::new_cyclic(|weak: &Weak<MemoCore<T>>| {
            let body: Weak<dyn Computation> = weak.clone();
            MemoCore {
                id: runtime.create_memo(body),
                runtime: runtime.clone(),
                value: RefCell::new(None),
                compute: RefCell::new(Box::new(compute)),
                equals: Box::new(equals),
            }
        });
        Self { core }
    }

    /// Get the memo's node ID.
    pub fn id(&self) -> NodeId {
        self.core.id
    }

    /// Borrow the up-to-date value, tracking the read.
    ///
    /// # Panics
    ///
    /// Resumes the panic of a failed computation, and panics if the memo
    /// reads itself while recomputing.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.core.with(true, f)
    }

    /// Borrow the up-to-date value without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.core.with(false, f)
    }

    /// Like [`Memo::with`], returning computation failures as errors.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, ReactiveError> {
        self.core.try_with(true, f)
    }

    /// Lifecycle state of the memo's node.
    pub fn state(&self) -> NodeState {
        self.core.runtime.node_state(self.core.id)
    }

    /// Whether a read would have to recompute (or check) the value.
    ///
    /// Also true for a memo whose runs have all failed so far.
    pub fn is_stale(&self) -> bool {
        let missing = self
            .core
            .value
            .try_borrow()
            .is_ok_and(|value| value.is_none());
        missing || matches!(self.state(), NodeState::Stale | NodeState::MaybeStale)
    }

    /// Number of times the computation has run.
    pub fn run_count(&self) -> usize {
        self.core.runtime.node_runs(self.core.id).unwrap_or(0)
    }

    /// Number of computations that read this memo during their last run.
    pub fn dependent_count(&self) -> usize {
        self.core.runtime.dependent_count(self.core.id)
    }

    /// Number of nodes this memo read during its last run.
    pub fn dependency_count(&self) -> usize {
        self.core.runtime.dependency_count(self.core.id)
    }
}

impl<T: Clone + 'static> Memo<T> {
    /// Get the current value.
    ///
    /// Recomputes first if a dependency changed. If called within a reactive
    /// context, this also registers the current computation as a dependent.
    pub fn get(&self) -> T {
        self.core.with(true, T::clone)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.core.with(false, T::clone)
    }

    /// Like [`Memo::get`], returning computation failures as errors.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        self.core.try_with(true, T::clone)
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Memo");
        debug.field("id", &self.core.id);
        match self.core.value.try_borrow() {
            Ok(value) => debug.field("value", &*value),
            Err(_) => debug.field("value", &"<computing>"),
        };
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::ComputationError;
    use crate::reactive::Signal;

    fn counted<T: 'static>(
        runs: &Rc<Cell<usize>>,
        mut compute: impl FnMut() -> T + 'static,
    ) -> impl FnMut() -> T + 'static {
        let runs = runs.clone();
        move || {
            runs.set(runs.get() + 1);
            compute()
        }
    }

    #[test]
    fn memo_computes_on_first_access() {
        let runs = Rc::new(Cell::new(0));
        let memo = Memo::new(counted(&runs, || 42));

        assert_eq!(runs.get(), 0);
        assert!(memo.is_stale());

        assert_eq!(memo.get(), 42);
        assert_eq!(runs.get(), 1);
        assert_eq!(memo.state(), NodeState::Clean);
    }

    #[test]
    fn memo_caches_value_when_clean() {
        let runs = Rc::new(Cell::new(0));
        let memo = Memo::new(counted(&runs, || 42));

        memo.get();
        memo.get();
        memo.get();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn memo_recomputes_after_dependency_changes() {
        let runs = Rc::new(Cell::new(0));
        let signal = Signal::new(1);
        let source = signal.clone();
        let memo = Memo::new(counted(&runs, move || source.get() * 10));

        assert_eq!(memo.get(), 10);
        signal.set(2);
        assert!(memo.is_stale());
        assert_eq!(runs.get(), 1);

        assert_eq!(memo.get(), 20);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn equal_result_keeps_readers_clean() {
        let signal = Signal::new(3);
        let source = signal.clone();
        let parity = Memo::new(move || source.get() % 2);

        let outer_runs = Rc::new(Cell::new(0));
        let upstream = parity.clone();
        let outer = Memo::new(counted(&outer_runs, move || upstream.get() == 0));

        assert!(!outer.get());
        signal.set(5);
        assert_eq!(outer.state(), NodeState::MaybeStale);

        assert!(!outer.get());
        assert_eq!(outer_runs.get(), 1);
    }

    #[test]
    fn custom_equality_suppresses_updates() {
        let signal = Signal::new(1.0_f64);
        let source = signal.clone();
        let rounded = Memo::with_equals(move || source.get(), |a: &f64, b: &f64| {
            (a - b).abs() < 0.5
        });

        let seen = Rc::new(Cell::new(0));
        let reader = rounded.clone();
        let observed = seen.clone();
        let _effect = crate::reactive::Effect::new(move || {
            reader.get();
            observed.set(observed.get() + 1);
        });

        signal.set(1.2);
        assert_eq!(seen.get(), 1);
        assert_eq!(rounded.get(), 1.0);

        signal.set(2.0);
        assert_eq!(seen.get(), 2);
        assert_eq!(rounded.get(), 2.0);
    }

    #[test]
    fn memo_clone_shares_state() {
        let runs = Rc::new(Cell::new(0));
        let memo1 = Memo::new(counted(&runs, || "shared"));
        let memo2 = memo1.clone();

        assert_eq!(memo1.get(), "shared");
        assert_eq!(memo2.get(), "shared");
        assert_eq!(memo1.id(), memo2.id());
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn self_read_is_a_cycle() {
        let slot: Rc<RefCell<Option<Memo<i32>>>> = Rc::new(RefCell::new(None));
        let inner = slot.clone();
        let memo = Memo::new(move || {
            let this = inner.borrow().clone();
            match this {
                Some(memo) => memo.try_get().map_or(-1, |v| v + 1),
                None => 0,
            }
        });
        *slot.borrow_mut() = Some(memo.clone());

        // The self-read fails with a cycle, which the body turns into -1
        assert_eq!(memo.get(), -1);

        slot.borrow_mut().take();
    }

    #[test]
    fn failed_memo_propagates_to_reader() {
        let signal = Signal::new(0);
        let source = signal.clone();
        let memo = Memo::new(move || {
            let value = source.get();
            if value < 0 {
                panic!("negative input");
            }
            value
        });

        assert_eq!(memo.try_get().ok(), Some(0));
        signal.set(-1);

        let error = memo.try_get().unwrap_err();
        assert!(matches!(
            error,
            ReactiveError::Computation(ComputationError::Panicked { ref message, .. })
                if message == "negative input"
        ));

        // Stays readable with the previous value once the failure is settled
        assert_eq!(memo.get(), 0);

        signal.set(4);
        assert_eq!(memo.get(), 4);
    }

    #[test]
    fn failed_first_run_retries_on_next_read() {
        let attempts = Rc::new(Cell::new(0));
        let counter = attempts.clone();
        let memo = Memo::new(move || {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                panic!("not ready");
            }
            7
        });

        assert!(memo.try_get().is_err());
        assert!(memo.is_stale());
        assert_eq!(memo.get(), 7);
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn failed_read_still_subscribes_reader() {
        let signal = Signal::new(0);
        let source = signal.clone();
        let inner = Memo::new(move || match source.get() {
            0 => panic!("empty"),
            value => value,
        });
        let upstream = inner.clone();
        let outer = Memo::new(move || upstream.try_get().unwrap_or(-1));

        assert_eq!(outer.get(), -1);
        assert_eq!(inner.dependent_count(), 1);

        signal.set(2);
        assert!(outer.is_stale());
        assert_eq!(outer.get(), 2);
    }

    #[test]
    fn dropping_last_handle_releases_node() {
        let runtime = Runtime::new();
        runtime.enter(|| {
            let memo = Memo::new(|| 1);
            assert_eq!(memo.get(), 1);
            assert_eq!(runtime.stats().memos, 1);
            drop(memo);
            assert_eq!(runtime.stats().memos, 0);
        });
    }
}
