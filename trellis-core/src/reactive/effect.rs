//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued to re-run.
//!
//! 3. Before re-running, the effect runs its cleanups, clears its old
//!    dependencies and tracks new ones during execution.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos cache results; effects just run their side effect.
//!
//! # Cleanup
//!
//! Effects register teardown work with [`on_cleanup`](crate::on_cleanup).
//! Cleanups run before the effect re-runs and when the effect is disposed.
//!
//! # Lifetime
//!
//! The runtime owns the effect. Dropping the [`Effect`] handle does not stop
//! it; call [`Effect::dispose`] (or dispose the whole runtime).

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use super::batch::untrack;
use super::runtime::Runtime;
use crate::error::BoxError;
use crate::graph::{Computation, NodeId, NodeState};

struct EffectBody<F, E> {
    run: RefCell<F>,
    runs: Rc<Cell<usize>>,
    _error: PhantomData<fn() -> E>,
}

impl<F, E> Computation for EffectBody<F, E>
where
    F: FnMut() -> Result<(), E>,
    E: Into<BoxError>,
{
    fn run(&self) -> Result<bool, BoxError> {
        self.runs.set(self.runs.get() + 1);
        (self.run.borrow_mut())().map_err(Into::into)?;
        Ok(true)
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use trellis_core::{Effect, Signal};
///
/// let count = Signal::new(0);
/// let source = count.clone();
///
/// let effect = Effect::new(move || {
///     println!("Count is: {}", source.get());
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// assert_eq!(effect.run_count(), 2);
/// ```
#[derive(Clone)]
pub struct Effect {
    /// Node of this effect in the runtime arena.
    id: NodeId,

    /// The runtime that owns the node.
    runtime: Runtime,

    /// Number of times the effect has run.
    runs: Rc<Cell<usize>>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies,
    /// even inside a batch.
    pub fn new<F>(mut run: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self::try_new(move || {
            run();
            Ok::<(), Infallible>(())
        })
    }

    /// Create an effect whose body can fail.
    ///
    /// An `Err` is reported as
    /// [`ComputationError::Failed`](crate::ComputationError::Failed) through
    /// the error hook; the effect keeps the dependencies it read before failing
    /// and runs again when one of them changes.
    pub fn try_new<F, E>(run: F) -> Self
    where
        F: FnMut() -> Result<(), E> + 'static,
        E: Into<BoxError> + 'static,
    {
        let runtime = Runtime::current();
        let runs = Rc::new(Cell::new(0));
        let body = Rc::new(EffectBody {
            run: RefCell::new(run),
            runs: Rc::clone(&runs),
            _error: PhantomData,
        });
        let id = runtime.create_effect(body);
        Self { id, runtime, runs }
    }

    /// Create an effect that runs `run` once, untracked, and never again.
    ///
    /// Cleanups registered by `run` still run when the effect is disposed.
    pub fn once<F>(run: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        let mut run = Some(run);
        Self::new(move || {
            if let Some(run) = run.take() {
                untrack(run);
            }
        })
    }

    /// Get the effect's node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Dispose the effect.
    ///
    /// Runs its cleanups and removes it from the graph. The effect will not
    /// run again. Disposing twice is a no-op.
    pub fn dispose(&self) {
        self.runtime.dispose_node(self.id);
    }

    /// Check if the effect is disposed.
    pub fn is_disposed(&self) -> bool {
        !self.runtime.contains(self.id)
    }

    /// Lifecycle state of the effect's node.
    pub fn state(&self) -> NodeState {
        self.runtime.node_state(self.id)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.runs.get()
    }

    /// Number of nodes the effect read during its last run.
    pub fn dependency_count(&self) -> usize {
        self.runtime.dependency_count(self.id)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .finish()
    }
}

/// Run `callback` whenever the value produced by `source` changes.
///
/// `source` is tracked; `callback` is not, and receives the new value and
/// the previous one (`None` on the first call).
pub fn watch<T, S, C>(mut source: S, mut callback: C) -> Effect
where
    T: PartialEq + 'static,
    S: FnMut() -> T + 'static,
    C: FnMut(&T, Option<&T>) + 'static,
{
    let mut previous: Option<T> = None;
    Effect::new(move || {
        let value = source();
        if previous.as_ref() == Some(&value) {
            return;
        }
        untrack(|| callback(&value, previous.as_ref()));
        previous = Some(value);
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComputationError;
    use crate::reactive::{batch, Signal};

    #[test]
    fn effect_runs_on_creation() {
        let run_count = Rc::new(Cell::new(0));
        let counter = run_count.clone();

        let effect = Effect::new(move || counter.set(counter.get() + 1));

        // Effect should have run once on creation
        assert_eq!(run_count.get(), 1);
        assert_eq!(effect.run_count(), 1);
        assert_eq!(effect.state(), NodeState::Clean);
    }

    #[test]
    fn effect_runs_immediately_inside_batch() {
        let signal = Signal::new(0);
        let seen = Rc::new(Cell::new(-1));

        batch(|| {
            let source = signal.clone();
            let observed = seen.clone();
            Effect::new(move || observed.set(source.get()));
            assert_eq!(seen.get(), 0);

            signal.set(1);
            assert_eq!(seen.get(), 0);
        });

        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let signal = Signal::new(0);
        let source = signal.clone();
        let effect = Effect::new(move || {
            source.get();
        });

        assert_eq!(signal.subscriber_count(), 1);
        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(effect.state(), NodeState::Disposed);
        assert_eq!(signal.subscriber_count(), 0);

        signal.set(1);
        assert_eq!(effect.run_count(), 1);

        // Second dispose is a no-op
        effect.dispose();
    }

    #[test]
    fn dropping_handle_keeps_effect_alive() {
        let signal = Signal::new(0);
        let seen = Rc::new(Cell::new(0));

        let source = signal.clone();
        let observed = seen.clone();
        drop(Effect::new(move || observed.set(source.get())));

        signal.set(9);
        assert_eq!(seen.get(), 9);
    }

    #[test]
    fn effect_clone_shares_state() {
        let signal = Signal::new(0);
        let source = signal.clone();
        let effect1 = Effect::new(move || {
            source.get();
        });
        let effect2 = effect1.clone();

        assert_eq!(effect1.id(), effect2.id());
        signal.set(1);
        assert_eq!(effect1.run_count(), 2);
        assert_eq!(effect2.run_count(), 2);

        effect2.dispose();
        assert!(effect1.is_disposed());
    }

    #[test]
    fn fallible_effect_reports_and_recovers() {
        let runtime = Runtime::new();
        let failures = Rc::new(RefCell::new(Vec::new()));
        let sink = failures.clone();
        runtime.set_error_handler(move |error| {
            if let ComputationError::Failed { source, .. } = error {
                sink.borrow_mut().push(source.to_string());
            }
        });

        runtime.enter(|| {
            let signal = Signal::new(1);
            let source = signal.clone();
            let effect = Effect::try_new(move || {
                let value = source.get();
                if value % 2 == 0 {
                    return Err(format!("even value {value}"));
                }
                Ok(())
            });

            signal.set(2);
            assert_eq!(effect.state(), NodeState::Clean);
            assert_eq!(effect.dependency_count(), 1);

            signal.set(3);
            assert_eq!(effect.run_count(), 3);
        });

        assert_eq!(*failures.borrow(), vec!["even value 2".to_string()]);
    }

    #[test]
    fn once_runs_a_single_time() {
        let signal = Signal::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let cleaned = Rc::new(Cell::new(false));

        let (source, sink, flag) = (signal.clone(), seen.clone(), cleaned.clone());
        let effect = Effect::once(move || {
            sink.borrow_mut().push(source.get());
            crate::on_cleanup(move || flag.set(true));
        });

        signal.set(1);
        assert_eq!(*seen.borrow(), vec![0]);
        assert_eq!(effect.dependency_count(), 0);
        assert_eq!(signal.subscriber_count(), 0);

        effect.dispose();
        assert!(cleaned.get());
    }

    #[test]
    fn watch_reports_previous_value() {
        let signal = Signal::new(1);
        let log = Rc::new(RefCell::new(Vec::new()));

        let source = signal.clone();
        let sink = log.clone();
        let _watcher = watch(
            move || source.get() / 10,
            move |next, previous| sink.borrow_mut().push((*next, previous.copied())),
        );

        signal.set(5);
        signal.set(12);
        signal.set(15);
        signal.set(31);

        assert_eq!(*log.borrow(), vec![(0, None), (1, Some(0)), (3, Some(1))]);
    }

    #[test]
    fn watch_callback_is_untracked() {
        let trigger = Signal::new(0);
        let other = Signal::new(0);
        let calls = Rc::new(Cell::new(0));

        let source = trigger.clone();
        let unrelated = other.clone();
        let counter = calls.clone();
        let _watcher = watch(
            move || source.get(),
            move |_, _| {
                unrelated.get();
                counter.set(counter.get() + 1);
            },
        );

        other.set(1);
        assert_eq!(calls.get(), 1);
        trigger.set(1);
        assert_eq!(calls.get(), 2);
    }
}
