//! Update Scheduler
//!
//! The scheduler holds the batch depth and the queue of effects waiting to
//! run. It only does bookkeeping; running nodes is the runtime's job.
//!
//! # Algorithm
//!
//! 1. A write marks dependents and enqueues the effects that became dirty.
//!    The queue is an ordered set, so an effect marked several times in a
//!    batch is queued once.
//! 2. When the outermost batch ends (depth returns to 0), the runtime
//!    flushes the queue in *passes*: each pass takes everything queued so
//!    far, and work enqueued while the pass runs waits for the next pass.
//! 3. A node therefore runs at most once per pass, and the flush ends when a
//!    pass finds the queue empty.
//!
//! We do not sort topologically. Before an effect runs, the runtime brings
//! its upstream memos up to date in read order, which gives the same
//! "dependencies first" guarantee without a global sort.

use indexmap::IndexSet;

use super::node::NodeId;

/// Batch depth and pending-effect queue of one runtime.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    /// Number of `batch` scopes (explicit or implicit) currently open.
    depth: usize,

    /// Effects waiting to run, in the order they were marked.
    pending: IndexSet<NodeId>,

    /// Whether a flush loop is currently draining the queue.
    flushing: bool,
}

impl Scheduler {
    /// Create a new idle scheduler.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enter a batch scope.
    pub(crate) fn begin_batch(&mut self) {
        self.depth += 1;
    }

    /// Leave a batch scope. Returns `true` when the outermost scope closed.
    pub(crate) fn end_batch(&mut self) -> bool {
        debug_assert!(self.depth > 0, "end_batch without begin_batch");
        self.depth = self.depth.saturating_sub(1);
        self.depth == 0
    }

    /// Current batch depth.
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    /// Queue an effect. Already-queued effects keep their position.
    pub(crate) fn enqueue(&mut self, node_id: NodeId) -> bool {
        self.pending.insert(node_id)
    }

    /// Drop a queued effect (used on disposal).
    pub(crate) fn remove(&mut self, node_id: NodeId) {
        self.pending.shift_remove(&node_id);
    }

    /// Number of queued effects.
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Take everything queued so far as the next flush pass.
    pub(crate) fn take_pass(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// Whether the queue should be flushed right now: no batch is open and
    /// no flush loop is already running further up the stack.
    pub(crate) fn can_flush(&self) -> bool {
        self.depth == 0 && !self.flushing && !self.pending.is_empty()
    }

    /// Claim the flush loop. Returns `false` if a flush is already running.
    pub(crate) fn start_flush(&mut self) -> bool {
        if self.flushing {
            return false;
        }
        self.flushing = true;
        true
    }

    /// Release the flush loop.
    pub(crate) fn finish_flush(&mut self) {
        self.flushing = false;
    }

    /// Whether a flush loop is running.
    pub(crate) fn is_flushing(&self) -> bool {
        self.flushing
    }

    /// Drop all queued work.
    pub(crate) fn clear(&mut self) -> Vec<NodeId> {
        self.take_pass()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_batches_only_close_at_depth_zero() {
        let mut scheduler = Scheduler::new();

        scheduler.begin_batch();
        scheduler.begin_batch();
        assert_eq!(scheduler.depth(), 2);

        assert!(!scheduler.end_batch());
        assert!(scheduler.end_batch());
        assert_eq!(scheduler.depth(), 0);
    }

    #[test]
    fn queue_deduplicates_and_keeps_order() {
        let mut scheduler = Scheduler::new();
        let a = NodeId::new();
        let b = NodeId::new();
        let c = NodeId::new();

        assert!(scheduler.enqueue(b));
        assert!(scheduler.enqueue(a));
        assert!(!scheduler.enqueue(b));
        assert!(scheduler.enqueue(c));
        scheduler.remove(a);

        assert_eq!(scheduler.pending_len(), 2);
        assert_eq!(scheduler.take_pass(), vec![b, c]);
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[test]
    fn flush_is_blocked_by_batches_and_running_flushes() {
        let mut scheduler = Scheduler::new();
        assert!(!scheduler.can_flush());

        scheduler.enqueue(NodeId::new());
        assert!(scheduler.can_flush());

        scheduler.begin_batch();
        assert!(!scheduler.can_flush());
        scheduler.end_batch();

        assert!(scheduler.start_flush());
        assert!(!scheduler.start_flush());
        assert!(!scheduler.can_flush());
        scheduler.finish_flush();
        assert!(scheduler.can_flush());
    }
}
