//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! Each runtime owns a stack of frames. When a computation runs, we push a
//! tracking frame for it; when it completes (or panics), the guard pops it.
//! `untrack` pushes a sentinel frame that hides the computations below it
//! from signal reads.
//!
//! This design supports nested reactive contexts (e.g., a memo that is
//! recomputed because an effect read it).

use std::cell::RefCell;

use crate::graph::NodeId;

/// An entry in the reactive context stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Frame {
    /// Reads register a dependency of this computation.
    Tracking(NodeId),
    /// Reads are plain reads.
    Untracked,
}

/// The stack of frames of one runtime.
#[derive(Debug, Default)]
pub(crate) struct TrackingStack {
    frames: RefCell<Vec<Frame>>,
}

impl TrackingStack {
    /// The computation reads should be attributed to, if any.
    ///
    /// `None` when the stack is empty or its top is an untracked frame.
    pub(crate) fn observer(&self) -> Option<NodeId> {
        match self.frames.borrow().last() {
            Some(Frame::Tracking(node)) => Some(*node),
            _ => None,
        }
    }

    /// The innermost running computation, looking through untracked frames.
    ///
    /// Cleanups belong to the computation that is running even when the
    /// registration happens inside `untrack`.
    pub(crate) fn owner(&self) -> Option<NodeId> {
        self.frames.borrow().iter().rev().find_map(|frame| match frame {
            Frame::Tracking(node) => Some(*node),
            Frame::Untracked => None,
        })
    }

    /// Check if reads are currently tracked.
    pub(crate) fn is_tracking(&self) -> bool {
        self.observer().is_some()
    }

    /// Number of frames, for tests and debug output.
    pub(crate) fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    fn push(&self, frame: Frame) {
        self.frames.borrow_mut().push(frame);
    }

    fn pop(&self) -> Option<Frame> {
        self.frames.borrow_mut().pop()
    }
}

/// Guard that pops the frame when dropped.
///
/// This ensures the stack is properly maintained even if the computation
/// panics.
pub(crate) struct ReactiveContext<'a> {
    stack: &'a TrackingStack,
    frame: Frame,
}

impl<'a> ReactiveContext<'a> {
    /// Enter a tracking frame for the given computation.
    ///
    /// While this context is active, any signals that are read will
    /// register the computation as a dependent.
    pub(crate) fn enter(stack: &'a TrackingStack, node: NodeId) -> Self {
        Self::push(stack, Frame::Tracking(node))
    }

    /// Enter an untracked frame.
    pub(crate) fn untracked(stack: &'a TrackingStack) -> Self {
        Self::push(stack, Frame::Untracked)
    }

    fn push(stack: &'a TrackingStack, frame: Frame) -> Self {
        stack.push(frame);
        Self { stack, frame }
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        let popped = self.stack.pop();

        // Verify we're popping the right frame.
        // This helps catch bugs where contexts are mismatched.
        debug_assert_eq!(
            popped,
            Some(self.frame),
            "ReactiveContext mismatch: expected {:?}, got {:?}",
            self.frame,
            popped
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_observer() {
        let stack = TrackingStack::default();
        let id = NodeId::new();

        assert!(!stack.is_tracking());
        assert!(stack.observer().is_none());

        {
            let _ctx = ReactiveContext::enter(&stack, id);

            assert!(stack.is_tracking());
            assert_eq!(stack.observer(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!stack.is_tracking());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn nested_contexts() {
        let stack = TrackingStack::default();
        let id1 = NodeId::new();
        let id2 = NodeId::new();

        {
            let _ctx1 = ReactiveContext::enter(&stack, id1);
            assert_eq!(stack.observer(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(&stack, id2);
                assert_eq!(stack.observer(), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(stack.observer(), Some(id1));
        }

        assert!(stack.observer().is_none());
    }

    #[test]
    fn untracked_frame_hides_observer_but_not_owner() {
        let stack = TrackingStack::default();
        let id = NodeId::new();

        let _ctx = ReactiveContext::enter(&stack, id);
        {
            let _untracked = ReactiveContext::untracked(&stack);
            assert!(stack.observer().is_none());
            assert_eq!(stack.owner(), Some(id));
        }
        assert_eq!(stack.observer(), Some(id));
    }

    #[test]
    fn context_pops_on_panic() {
        let stack = TrackingStack::default();
        let id = NodeId::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ctx = ReactiveContext::enter(&stack, id);
            panic!("body failed");
        }));

        assert!(result.is_err());
        assert_eq!(stack.depth(), 0);
    }
}
