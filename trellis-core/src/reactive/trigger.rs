//! Trigger
//!
//! A signal without a value. Computations `track()` it and whoever owns the
//! external state calls `notify()` when that state changes.

use super::signal::Signal;
use crate::graph::NodeId;

/// A valueless signal.
#[derive(Clone, Debug, Default)]
pub struct Trigger {
    signal: Signal<()>,
}

impl Trigger {
    /// Create a new trigger in the current runtime.
    pub fn new() -> Self {
        Self {
            signal: Signal::new(()),
        }
    }

    /// Get the trigger's node ID.
    pub fn id(&self) -> NodeId {
        self.signal.id()
    }

    /// Make the running computation depend on this trigger.
    pub fn track(&self) {
        self.signal.with(|_| ());
    }

    /// Re-run everything that tracked this trigger.
    pub fn notify(&self) {
        self.signal.notify();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::reactive::{Effect, Memo};

    #[test]
    fn trigger_reruns_trackers() {
        let trigger = Trigger::new();
        let external = Rc::new(RefCell::new(vec![1]));
        let runs = Rc::new(Cell::new(0));

        let (tracked, items, counter) = (trigger.clone(), external.clone(), runs.clone());
        let length = Memo::new(move || {
            tracked.track();
            counter.set(counter.get() + 1);
            items.borrow().len()
        });

        assert_eq!(length.get(), 1);
        external.borrow_mut().push(2);
        assert_eq!(length.get(), 1);

        trigger.notify();
        assert_eq!(length.get(), 2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn untracked_trigger_does_nothing() {
        let trigger = Trigger::new();
        let runs = Rc::new(Cell::new(0));

        let counter = runs.clone();
        let _effect = Effect::new(move || counter.set(counter.get() + 1));
        trigger.notify();

        assert_eq!(runs.get(), 1);
    }
}
