//! Stored Value
//!
//! A shared, non-reactive cell. Reads are never tracked and writes never
//! notify, so it can hold state that computations use without depending on
//! it (caches, handles to external resources, counters for logging).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A value shared between handles that takes no part in the graph.
///
/// # Example
///
/// ```rust
/// use trellis_core::{Effect, Signal, StoredValue};
///
/// let count = Signal::new(0);
/// let history = StoredValue::new(Vec::new());
///
/// let (source, log) = (count.clone(), history.clone());
/// let _effect = Effect::new(move || log.update(|h| h.push(source.get())));
///
/// count.set(1);
/// history.set(vec![]);  // Does not re-run the effect
/// assert_eq!(history.with(Vec::len), 0);
/// ```
pub struct StoredValue<T> {
    value: Rc<RefCell<T>>,
}

impl<T> StoredValue<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Rc::new(RefCell::new(value)),
        }
    }

    /// Borrow the value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        *self.value.borrow_mut() = value;
    }

    /// Mutate the value in place.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.value.borrow_mut());
    }

    /// Mutate the value in place and return something from it.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.value.borrow_mut())
    }

    /// Replace the value unless it is borrowed right now.
    ///
    /// Returns whether the value was replaced.
    pub fn try_set(&self, value: T) -> bool {
        match self.value.try_borrow_mut() {
            Ok(mut current) => {
                *current = value;
                true
            }
            Err(_) => false,
        }
    }
}

impl<T: Clone> StoredValue<T> {
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Get the value, or `None` while it is mutably borrowed.
    pub fn try_get(&self) -> Option<T> {
        self.value.try_borrow().ok().map(|value| value.clone())
    }
}

impl<T> Clone for StoredValue<T> {
    fn clone(&self) -> Self {
        Self {
            value: Rc::clone(&self.value),
        }
    }
}

impl<T: Default> Default for StoredValue<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for StoredValue<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for StoredValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.try_borrow() {
            Ok(value) => f.debug_tuple("StoredValue").field(&*value).finish(),
            Err(_) => f.debug_tuple("StoredValue").field(&"<borrowed>").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::reactive::{Effect, Signal};

    #[test]
    fn stored_value_is_shared_between_clones() {
        let stored = StoredValue::new(1);
        let other = stored.clone();

        other.set(2);
        assert_eq!(stored.get(), 2);

        stored.update(|v| *v += 1);
        assert_eq!(other.with_mut(|v| std::mem::replace(v, 10)), 3);
        assert_eq!(stored.get(), 10);
    }

    #[test]
    fn reads_and_writes_are_not_reactive() {
        let signal = Signal::new(0);
        let stored = StoredValue::new(0);
        let runs = Rc::new(Cell::new(0));

        let (source, cell, counter) = (signal.clone(), stored.clone(), runs.clone());
        let effect = Effect::new(move || {
            source.get();
            cell.get();
            counter.set(counter.get() + 1);
        });

        stored.set(5);
        assert_eq!(runs.get(), 1);
        assert_eq!(effect.dependency_count(), 1);

        signal.set(1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn try_access_fails_while_borrowed() {
        let stored = StoredValue::new(String::from("a"));
        let inner = stored.clone();

        stored.with_mut(|_| {
            assert_eq!(inner.try_get(), None);
            assert!(!inner.try_set(String::from("b")));
        });

        assert!(stored.try_set(String::from("c")));
        assert_eq!(stored.try_get().as_deref(), Some("c"));
    }
}
