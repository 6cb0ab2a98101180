//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, and effects.
//! These primitives form the foundation of Trellis' fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal automatically
//! registers that context as a dependent. When the signal's value changes, all
//! dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes, and only once something reads it.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects are used to synchronize reactive state with external systems.
//!
//! # Implementation Notes
//!
//! Every primitive is a node in the arena of a [`Runtime`]. Each runtime keeps
//! a stack of tracking frames: when a signal is read, the runtime checks the
//! top frame and, if a computation is running, records the edge.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod batch;
mod cleanup;
mod context;
mod effect;
mod memo;
mod readable;
mod runtime;
mod signal;
mod stored;
mod trigger;

pub use batch::{batch, is_batching, untrack};
pub use cleanup::{on_cleanup, try_on_cleanup};
pub use effect::{watch, Effect};
pub use memo::Memo;
pub use readable::Readable;
pub use runtime::Runtime;
pub use signal::{ReadSignal, Signal, WriteSignal};
pub use stored::StoredValue;
pub use trigger::Trigger;

/// Create a signal in the current runtime. Same as [`Signal::new`].
pub fn create_signal<T: 'static>(value: T) -> Signal<T> {
    Signal::new(value)
}

/// Create a memo in the current runtime. Same as [`Memo::new`].
pub fn create_memo<T, F>(compute: F) -> Memo<T>
where
    T: PartialEq + 'static,
    F: FnMut() -> T + 'static,
{
    Memo::new(compute)
}

/// Create an effect in the current runtime. Same as [`Effect::new`].
pub fn create_effect<F>(run: F) -> Effect
where
    F: FnMut() + 'static,
{
    Effect::new(run)
}
