//! Batching and untracked reads on the current runtime.

use super::runtime::Runtime;

/// Run `f` as one batch on the current runtime.
///
/// Writes inside `f` only mark and queue work. Every affected effect runs
/// at most once, after `f` returns, and sees the final values. Batches nest;
/// only the outermost one flushes.
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use trellis_core::{batch, Effect, Signal};
///
/// let a = Signal::new(1);
/// let b = Signal::new(2);
/// let runs = Rc::new(Cell::new(0));
///
/// let (ra, rb, counter) = (a.clone(), b.clone(), runs.clone());
/// let _sum = Effect::new(move || {
///     let _ = ra.get() + rb.get();
///     counter.set(counter.get() + 1);
/// });
///
/// batch(|| {
///     a.set(10);
///     b.set(20);
/// });
/// assert_eq!(runs.get(), 2);
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::current().batch(f)
}

/// Run `f` without registering dependencies for the running computation.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    Runtime::current().untrack(f)
}

/// Check if a batch is open on the current runtime.
pub fn is_batching() -> bool {
    Runtime::current().is_batching()
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::reactive::{Effect, Signal};

    #[test]
    fn batch_returns_value() {
        assert_eq!(batch(|| 42), 42);
        assert!(!is_batching());
    }

    #[test]
    fn batch_closes_on_panic() {
        let result = std::panic::catch_unwind(|| {
            batch(|| panic!("inside batch"));
        });
        assert!(result.is_err());
        assert!(!is_batching());
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let signal = Signal::new(0);
        let runs = Rc::new(Cell::new(0));

        let source = signal.clone();
        let counter = runs.clone();
        let _effect = Effect::new(move || {
            untrack(|| source.get());
            counter.set(counter.get() + 1);
        });

        signal.set(1);
        assert_eq!(runs.get(), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }
}
