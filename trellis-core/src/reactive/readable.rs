//! The shared read capability of signals and memos.

use super::batch::untrack;
use super::effect::Effect;
use super::memo::Memo;
use super::signal::{ReadSignal, Signal};
use crate::graph::NodeId;

/// Anything a computation can read and depend on.
///
/// Implemented by [`Signal`], [`ReadSignal`] and [`Memo`], so code can take
/// any readable source without caring whether it is stored or derived.
pub trait Readable<T: 'static> {
    /// Node ID of the source.
    fn id(&self) -> NodeId;

    /// Borrow the value, tracking the read.
    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R;

    /// Borrow the value without tracking.
    fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R;

    /// Clone the value, tracking the read.
    fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Clone the value without tracking.
    fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.with_untracked(T::clone)
    }

    /// Call `callback` with the current value now and on every change.
    ///
    /// The callback itself is untracked. Dispose the returned effect to
    /// unsubscribe.
    fn subscribe<F>(&self, mut callback: F) -> Effect
    where
        Self: Clone + 'static,
        T: Clone,
        F: FnMut(T) + 'static,
    {
        let source = self.clone();
        Effect::new(move || {
            let value = source.get();
            untrack(|| callback(value));
        })
    }
}

impl<T: 'static> Readable<T> for Signal<T> {
    fn id(&self) -> NodeId {
        Signal::id(self)
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Signal::with(self, f)
    }

    fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Signal::with_untracked(self, f)
    }
}

impl<T: 'static> Readable<T> for ReadSignal<T> {
    fn id(&self) -> NodeId {
        ReadSignal::id(self)
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        ReadSignal::with(self, f)
    }

    fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        ReadSignal::with_untracked(self, f)
    }
}

impl<T: 'static> Readable<T> for Memo<T> {
    fn id(&self) -> NodeId {
        Memo::id(self)
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Memo::with(self, f)
    }

    fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Memo::with_untracked(self, f)
    }
}
