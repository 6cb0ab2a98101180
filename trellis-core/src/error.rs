//! Error Types
//!
//! Two families of errors exist:
//!
//! - [`ReactiveError`]: misuse of the API, returned to the caller right away
//!   (registering a cleanup outside a computation, writing a disposed signal).
//! - [`ComputationError`]: a memo or effect body failed while the scheduler
//!   was running it. These are caught, reported through the error hook and
//!   do not stop the rest of the flush.
//!
//! # Error Hook
//!
//! Computation errors go to the first of:
//!
//! 1. the runtime's own handler (`Runtime::set_error_handler`),
//! 2. the process-wide hook installed with [`set_error_hook`],
//! 3. a `tracing::error!` event.

use std::any::Any;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::graph::NodeId;

/// Boxed error returned by fallible effect bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced synchronously to the caller.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// `on_cleanup` was called while no computation was running.
    #[error("on_cleanup called outside of a running computation")]
    CleanupOutsideComputation,

    /// The computation the call refers to has already been disposed.
    #[error("computation {0} has been disposed")]
    ComputationDisposed(NodeId),

    /// The signal was written after being disposed.
    #[error("signal {0} has been disposed")]
    SignalDisposed(NodeId),

    /// A computation failed while producing the requested value.
    #[error(transparent)]
    Computation(#[from] ComputationError),
}

/// Errors raised by memo and effect bodies.
#[derive(Debug, Error)]
pub enum ComputationError {
    /// A fallible effect body returned `Err`.
    #[error("computation {node} failed: {source}")]
    Failed {
        /// The failing computation.
        node: NodeId,
        /// The error returned by the body.
        #[source]
        source: BoxError,
    },

    /// A body panicked. The panic was caught so other work could continue.
    #[error("computation {node} panicked: {message}")]
    Panicked {
        /// The failing computation.
        node: NodeId,
        /// The panic message, when it was a string.
        message: String,
    },

    /// A memo was read while it was recomputing (directly or through other
    /// memos it depends on).
    #[error("cycle detected: memo {node} was read while it was recomputing")]
    Cycle {
        /// The memo that was read re-entrantly.
        node: NodeId,
    },

    /// A flush kept producing new work and was cut off.
    #[error("flush did not settle after {passes} passes; dropped {pending} queued computations")]
    Unsettled {
        /// Passes executed before giving up.
        passes: usize,
        /// Computations dropped from the queue.
        pending: usize,
    },
}

impl ComputationError {
    /// The node the error originated from, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            ComputationError::Failed { node, .. }
            | ComputationError::Panicked { node, .. }
            | ComputationError::Cycle { node } => Some(*node),
            ComputationError::Unsettled { .. } => None,
        }
    }
}

/// Why a run did not complete, before it is turned into a public error.
///
/// Panic payloads are kept so that a memo read from user code can resume
/// the original panic instead of replacing it with a message.
pub(crate) enum FailureCause {
    Failed(BoxError),
    Panicked(Box<dyn Any + Send>),
    Cycle,
}

/// A failed run of `node`.
pub(crate) struct RunFailure {
    pub(crate) node: NodeId,
    pub(crate) cause: FailureCause,
}

impl RunFailure {
    pub(crate) fn new(node: NodeId, cause: FailureCause) -> Self {
        Self { node, cause }
    }

    /// Whether the run was refused because the node was already running.
    pub(crate) fn is_cycle(&self) -> bool {
        matches!(self.cause, FailureCause::Cycle)
    }

    /// Convert into the error reported through hooks.
    pub(crate) fn into_computation_error(self) -> ComputationError {
        let node = self.node;
        match self.cause {
            FailureCause::Failed(source) => ComputationError::Failed { node, source },
            FailureCause::Panicked(payload) => ComputationError::Panicked {
                node,
                message: panic_message(payload.as_ref()),
            },
            FailureCause::Cycle => ComputationError::Cycle { node },
        }
    }

    /// Re-raise the failure on the calling thread.
    pub(crate) fn resume(self) -> ! {
        match self.cause {
            FailureCause::Panicked(payload) => std::panic::resume_unwind(payload),
            cause => {
                let error = RunFailure::new(self.node, cause).into_computation_error();
                panic!("{error}")
            }
        }
    }
}

impl From<RunFailure> for ReactiveError {
    fn from(failure: RunFailure) -> Self {
        ReactiveError::Computation(failure.into_computation_error())
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ----------------------------------------------------------------------------
// Process-wide hook
// ----------------------------------------------------------------------------

/// Callback receiving computation errors.
pub type ErrorHook = Arc<dyn Fn(&ComputationError) + Send + Sync>;

static ERROR_HOOK: RwLock<Option<ErrorHook>> = parking_lot::const_rwlock(None);

/// Install the process-wide error hook, replacing any previous one.
///
/// The hook is used by every runtime that has no handler of its own.
pub fn set_error_hook<F>(hook: F)
where
    F: Fn(&ComputationError) + Send + Sync + 'static,
{
    *ERROR_HOOK.write() = Some(Arc::new(hook));
}

/// Remove the process-wide error hook, returning it.
pub fn take_error_hook() -> Option<ErrorHook> {
    ERROR_HOOK.write().take()
}

/// The currently installed process-wide hook.
pub(crate) fn error_hook() -> Option<ErrorHook> {
    ERROR_HOOK.read().clone()
}
