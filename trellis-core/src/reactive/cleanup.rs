//! Cleanup Registry
//!
//! Teardown callbacks attach to the computation that is running when they
//! are registered. They run in registration order, right before the
//! computation's next run and when it is disposed.

use super::runtime::Runtime;
use crate::error::ReactiveError;

/// Register a cleanup for the running memo or effect.
///
/// Reads inside [`untrack`](crate::untrack) still belong to the enclosing
/// computation, so a cleanup registered there attaches to it as well.
///
/// # Panics
///
/// Panics with [`ReactiveError::CleanupOutsideComputation`] when no
/// computation is running. Use [`try_on_cleanup`] to handle that case.
pub fn on_cleanup(cleanup: impl FnOnce() + 'static) {
    if let Err(error) = try_on_cleanup(cleanup) {
        panic!("{error}");
    }
}

/// Register a cleanup for the running memo or effect.
pub fn try_on_cleanup(cleanup: impl FnOnce() + 'static) -> Result<(), ReactiveError> {
    Runtime::current().add_cleanup(Box::new(cleanup))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::reactive::{untrack, Effect, Signal};

    #[test]
    fn cleanup_outside_computation_is_an_error() {
        let result = try_on_cleanup(|| {});
        assert!(matches!(result, Err(ReactiveError::CleanupOutsideComputation)));
    }

    #[test]
    #[should_panic(expected = "outside of a running computation")]
    fn on_cleanup_outside_computation_panics() {
        on_cleanup(|| {});
    }

    #[test]
    fn cleanups_run_before_rerun_and_on_dispose() {
        let signal = Signal::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let source = signal.clone();
        let sink = log.clone();
        let effect = Effect::new(move || {
            let value = source.get();
            sink.borrow_mut().push(format!("run {value}"));
            let sink = sink.clone();
            untrack(|| on_cleanup(move || sink.borrow_mut().push(format!("cleanup {value}"))));
        });

        signal.set(1);
        effect.dispose();

        assert_eq!(
            *log.borrow(),
            vec!["run 0", "cleanup 0", "run 1", "cleanup 1"]
        );
    }
}
