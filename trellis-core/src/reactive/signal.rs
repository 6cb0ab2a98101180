//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! is a source node in the runtime's dependency graph.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    runtime records an edge from the signal to that computation.
//!
//! 2. When a signal's value changes, its dependents are marked stale.
//!
//! 3. Stale effects are re-run by the scheduler, either right away or when
//!    the enclosing batch ends.
//!
//! Writes compare the new value with the current one and do nothing when
//! they are equal, so a write of an unchanged value never reruns anything.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A node ID in the runtime arena
//! - The value, behind an `Rc<RefCell<_>>` shared by all handles
//!
//! Subscribers live in the arena, not in the signal. The node is released
//! when the last handle is dropped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;
use crate::error::ReactiveError;
use crate::graph::NodeId;

struct SignalInner<T> {
    id: NodeId,
    runtime: Runtime,
    value: RefCell<T>,
    disposed: Cell<bool>,
}

impl<T> SignalInner<T> {
    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.runtime.track(self.id);
        f(&self.value.borrow())
    }

    fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    fn check_live(&self) -> Result<(), ReactiveError> {
        if self.disposed.get() {
            Err(ReactiveError::SignalDisposed(self.id))
        } else {
            Ok(())
        }
    }

    fn try_set(&self, value: T) -> Result<(), ReactiveError>
    where
        T: PartialEq,
    {
        self.check_live()?;

        let previous = {
            let mut current = self.value.borrow_mut();
            if *current == value {
                return Ok(());
            }
            std::mem::replace(&mut *current, value)
        };
        drop(previous);

        self.runtime.notify(self.id);
        Ok(())
    }

    fn try_update_in_place<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, ReactiveError> {
        self.check_live()?;
        let result = f(&mut self.value.borrow_mut());
        self.runtime.notify(self.id);
        Ok(result)
    }

    fn try_notify(&self) -> Result<(), ReactiveError> {
        self.check_live()?;
        self.runtime.notify(self.id);
        Ok(())
    }
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        if !self.disposed.get() {
            self.runtime.release_node(self.id);
        }
    }
}

/// Panic with a usage error, the way `set` reports writes to a disposed signal.
fn raise(result: Result<(), ReactiveError>) {
    if let Err(error) = result {
        panic!("{error}");
    }
}

/// A reactive signal holding a value of type T.
///
/// Cloning a signal produces another handle to the same value.
///
/// # Example
///
/// ```rust
/// use trellis_core::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal in the current runtime.
    pub fn new(value: T) -> Self {
        let runtime = Runtime::current();
        let id = runtime.create_source();
        Self {
            inner: Rc::new(SignalInner {
                id,
                runtime,
                value: RefCell::new(value),
                disposed: Cell::new(false),
            }),
        }
    }

    /// Get the signal's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Borrow the current value, tracking the read.
    ///
    /// The value stays borrowed while `f` runs; writing this signal from
    /// inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }

    /// Borrow the current value without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with_untracked(f)
    }

    /// Set a new value and notify subscribers.
    ///
    /// Does nothing if `value` equals the current value.
    ///
    /// # Panics
    ///
    /// Panics if the signal has been disposed. Use [`Signal::try_set`] to
    /// handle that case.
    pub fn set(&self, value: T)
    where
        T: PartialEq,
    {
        raise(self.inner.try_set(value));
    }

    /// Set a new value, failing if the signal has been disposed.
    pub fn try_set(&self, value: T) -> Result<(), ReactiveError>
    where
        T: PartialEq,
    {
        self.inner.try_set(value)
    }

    /// Compute the next value from the current one.
    ///
    /// Same equality rule as [`Signal::set`].
    pub fn update(&self, f: impl FnOnce(&T) -> T)
    where
        T: PartialEq,
    {
        let next = self.inner.with_untracked(f);
        self.set(next);
    }

    /// Mutate the value in place. Always notifies.
    pub fn update_in_place(&self, f: impl FnOnce(&mut T)) {
        raise(self.inner.try_update_in_place(f));
    }

    /// Mutate the value in place and return something from it. Always notifies.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        match self.inner.try_update_in_place(f) {
            Ok(result) => result,
            Err(error) => panic!("{error}"),
        }
    }

    /// Notify subscribers without changing the value.
    pub fn notify(&self) {
        raise(self.inner.try_notify());
    }

    /// Detach the signal from the graph.
    ///
    /// Computations that read it stop depending on it. Later writes fail
    /// with [`ReactiveError::SignalDisposed`]; reads still return the last
    /// value.
    pub fn dispose(&self) {
        if !self.inner.disposed.replace(true) {
            self.inner.runtime.dispose_node(self.inner.id);
        }
    }

    /// Check if the signal has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Number of computations that read this signal during their last run.
    pub fn subscriber_count(&self) -> usize {
        self.inner.runtime.dependent_count(self.inner.id)
    }

    /// A read-only handle to the same signal.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Split the signal into a read-only and a write-only handle.
    pub fn split(self) -> (ReadSignal<T>, WriteSignal<T>) {
        let read = self.read_only();
        (read, WriteSignal { inner: self.inner })
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a dependent.
    pub fn get(&self) -> T {
        self.inner.with(T::clone)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.with_untracked(T::clone)
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Default + 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: 'static> From<T> for Signal<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Signal");
        debug.field("id", &self.inner.id);
        match self.inner.value.try_borrow() {
            Ok(value) => debug.field("value", &*value),
            Err(_) => debug.field("value", &"<borrowed>"),
        };
        debug.finish()
    }
}

/// Read-only view of a [`Signal`].
pub struct ReadSignal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> ReadSignal<T> {
    /// Get the signal's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Borrow the current value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }

    /// Borrow the current value without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with_untracked(f)
    }
}

impl<T: Clone + 'static> ReadSignal<T> {
    /// Get the current value, tracking the read.
    pub fn get(&self) -> T {
        self.inner.with(T::clone)
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> T {
        self.inner.with_untracked(T::clone)
    }
}

impl<T> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadSignal")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

/// Write-only view of a [`Signal`].
pub struct WriteSignal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> WriteSignal<T> {
    /// Get the signal's node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// See [`Signal::set`].
    pub fn set(&self, value: T)
    where
        T: PartialEq,
    {
        raise(self.inner.try_set(value));
    }

    /// See [`Signal::try_set`].
    pub fn try_set(&self, value: T) -> Result<(), ReactiveError>
    where
        T: PartialEq,
    {
        self.inner.try_set(value)
    }

    /// See [`Signal::update`].
    pub fn update(&self, f: impl FnOnce(&T) -> T)
    where
        T: PartialEq,
    {
        let next = self.inner.with_untracked(f);
        raise(self.inner.try_set(next));
    }

    /// See [`Signal::update_in_place`].
    pub fn update_in_place(&self, f: impl FnOnce(&mut T)) {
        raise(self.inner.try_update_in_place(f));
    }

    /// See [`Signal::notify`].
    pub fn notify(&self) {
        raise(self.inner.try_notify());
    }
}

impl<T> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for WriteSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSignal")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;

    #[test]
    fn signal_basic() {
        let signal = Signal::new(42);
        assert_eq!(signal.get(), 42);

        signal.set(100);
        assert_eq!(signal.get(), 100);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v * 2);
        assert_eq!(signal.get(), 20);
    }

    #[test]
    fn signal_clone_shares_value() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn equal_write_does_not_notify() {
        let signal = Signal::new(String::from("a"));
        let runs = Rc::new(Cell::new(0));

        let source = signal.clone();
        let counter = runs.clone();
        let effect = Effect::new(move || {
            source.with(|_| ());
            counter.set(counter.get() + 1);
        });

        signal.set(String::from("a"));
        assert_eq!(runs.get(), 1);

        signal.set(String::from("b"));
        assert_eq!(runs.get(), 2);
        effect.dispose();
    }

    #[test]
    fn in_place_updates_always_notify() {
        let signal = Signal::new(vec![1, 2]);
        let lengths = Rc::new(RefCell::new(Vec::new()));

        let source = signal.clone();
        let log = lengths.clone();
        let effect = Effect::new(move || log.borrow_mut().push(source.with(Vec::len)));

        signal.update_in_place(|items| items.push(3));
        let popped = signal.with_mut(Vec::pop);
        signal.notify();

        assert_eq!(popped, Some(3));
        assert_eq!(*lengths.borrow(), vec![2, 3, 2, 2]);
        effect.dispose();
    }

    #[test]
    fn disposed_signal_rejects_writes() {
        let signal = Signal::new(1);
        signal.dispose();

        assert!(signal.is_disposed());
        assert!(matches!(
            signal.try_set(2),
            Err(ReactiveError::SignalDisposed(id)) if id == signal.id()
        ));
        assert_eq!(signal.get(), 1);
    }

    #[test]
    #[should_panic(expected = "has been disposed")]
    fn set_on_disposed_signal_panics() {
        let signal = Signal::new(1);
        signal.dispose();
        signal.set(2);
    }

    #[test]
    fn split_handles_share_the_node() {
        let (read, write) = Signal::new(1).split();
        assert_eq!(read.id(), write.id());

        write.update(|v| v + 1);
        assert_eq!(read.get(), 2);
        assert_eq!(read.get_untracked(), 2);
    }

    #[test]
    fn dropping_last_handle_releases_node() {
        let runtime = Runtime::new();
        runtime.enter(|| {
            let signal = Signal::new(0);
            let reader = signal.read_only();
            drop(signal);
            assert_eq!(runtime.stats().signals, 1);
            drop(reader);
            assert_eq!(runtime.stats().signals, 0);
        });
    }

    #[test]
    fn debug_shows_value() {
        let signal = Signal::new(7);
        let output = format!("{signal:?}");
        assert!(output.contains("value: 7"));
    }
}
