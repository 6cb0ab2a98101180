//! Trellis Core
//!
//! This crate provides the fine-grained reactivity engine of Trellis.
//! It implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - Automatic dependency tracking
//! - Batched, glitch-free propagation of changes
//! - Cleanup and disposal of computations
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Reactive primitives, the runtime and the scheduler entry points
//! - `graph`: Dependency graph arena, node states and the batch queue
//! - `error`: Error types and the error hook
//! - `config`: Runtime configuration and statistics
//!
//! Everything runs synchronously on the thread that owns the runtime.
//! Handles are `!Send`.
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use trellis_core::{Effect, Memo, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let source = count.clone();
//! let doubled = Memo::new(move || source.get() * 2);
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let sink = log.clone();
//! let _effect = Effect::new(move || sink.borrow_mut().push(doubled.get()));
//!
//! // Update the signal
//! count.set(5);
//! count.set(5);
//! assert_eq!(*log.borrow(), vec![0, 10]);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::{RuntimeConfig, RuntimeStats, DEFAULT_MAX_FLUSH_PASSES};
pub use error::{
    set_error_hook, take_error_hook, BoxError, ComputationError, ErrorHook, ReactiveError,
};
pub use graph::{NodeId, NodeKind, NodeState};
pub use reactive::{
    batch, create_effect, create_memo, create_signal, is_batching, on_cleanup, try_on_cleanup,
    untrack, watch, Effect, Memo, ReadSignal, Readable, Runtime, Signal, StoredValue, Trigger,
    WriteSignal,
};
