//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph, the tracking stack and the batch
//! queue, and it implements the run protocol every computation goes through.
//!
//! # How It Works
//!
//! 1. When a signal, memo or effect is created, it registers a node with the
//!    runtime and keeps the node's ID.
//!
//! 2. When a computation reads a signal or memo, the runtime records the
//!    edge between the two nodes.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Marks direct dependents stale and everything further down maybe-stale
//!    b. Queues the effects among them
//!    c. Flushes the queue unless a batch is open
//!    d. Memos are lazy - they recompute when an effect (or anyone) pulls them
//!
//! # Run Protocol
//!
//! Every memo and effect run goes through [`Runtime::run_node`]: cleanups,
//! unsubscribe, run the body inside a tracking frame, then settle the node
//! and apply any mark that arrived while it was running.
//!
//! # Threading
//!
//! A runtime is confined to the thread that created it. Each thread gets a
//! default runtime lazily; isolated runtimes can be created and made current
//! for a scope with [`Runtime::enter`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{debug, error, trace, trace_span, warn};

use super::context::{ReactiveContext, TrackingStack};
use crate::config::{RuntimeConfig, RuntimeStats};
use crate::error::{error_hook, ComputationError, FailureCause, ReactiveError, RunFailure};
use crate::graph::{
    Cleanup, Computation, Graph, Marks, Node, NodeId, NodeKind, NodeState, Scheduler,
};

thread_local! {
    static DEFAULT_RUNTIME: Runtime = Runtime::new();
    static ENTERED: RefCell<Vec<Runtime>> = const { RefCell::new(Vec::new()) };
}

/// Handler for computation errors owned by one runtime.
type ErrorHandler = Rc<dyn Fn(&ComputationError)>;

struct RuntimeInner {
    graph: RefCell<Graph>,
    scheduler: RefCell<Scheduler>,
    tracking: TrackingStack,
    config: RefCell<RuntimeConfig>,
    error_handler: RefCell<Option<ErrorHandler>>,
    flushes: Cell<u64>,
    runs: Cell<u64>,
    cycle_warnings: Cell<u64>,
}

/// Handle to one reactive graph.
///
/// Cloning the handle is cheap and every clone refers to the same graph.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a new, isolated runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new, isolated runtime.
    pub fn with_config(config: RuntimeConfig) -> Self {
        debug!(?config, "runtime created");
        Self {
            inner: Rc::new(RuntimeInner {
                graph: RefCell::new(Graph::new()),
                scheduler: RefCell::new(Scheduler::new()),
                tracking: TrackingStack::default(),
                config: RefCell::new(config),
                error_handler: RefCell::new(None),
                flushes: Cell::new(0),
                runs: Cell::new(0),
                cycle_warnings: Cell::new(0),
            }),
        }
    }

    /// The runtime new primitives attach to on this thread.
    ///
    /// This is the innermost runtime passed to [`Runtime::enter`], or the
    /// thread's default runtime.
    pub fn current() -> Runtime {
        ENTERED
            .with(|stack| stack.borrow().last().cloned())
            .unwrap_or_else(|| DEFAULT_RUNTIME.with(Runtime::clone))
    }

    /// Make this runtime current while `f` runs.
    ///
    /// Primitives created inside `f` belong to this runtime. Dependencies
    /// only form within one runtime: a computation that reads a signal or
    /// memo of another runtime does not re-run when it changes.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        ENTERED.with(|stack| stack.borrow_mut().push(self.clone()));
        let _guard = EnterGuard;
        f()
    }

    /// Whether two handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> RuntimeConfig {
        self.inner.config.borrow().clone()
    }

    /// Replace the configuration.
    pub fn set_config(&self, config: RuntimeConfig) {
        *self.inner.config.borrow_mut() = config;
    }

    /// Install a handler for computation errors raised in this runtime.
    ///
    /// It takes precedence over the process-wide hook.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&ComputationError) + 'static,
    {
        *self.inner.error_handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Remove this runtime's error handler.
    pub fn clear_error_handler(&self) {
        self.inner.error_handler.borrow_mut().take();
    }

    /// Run `f` as one batch: writes inside only queue work, and the queue is
    /// flushed once when the outermost batch ends.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.scheduler.borrow_mut().begin_batch();
        let _guard = BatchGuard {
            runtime: self,
            flush: true,
        };
        f()
    }

    /// Run `f` without registering any dependency for the running computation.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let _ctx = ReactiveContext::untracked(&self.inner.tracking);
        f()
    }

    /// Check if reads are currently tracked.
    pub fn is_tracking(&self) -> bool {
        self.inner.tracking.is_tracking()
    }

    /// Check if a batch (explicit or implicit) is open.
    pub fn is_batching(&self) -> bool {
        self.inner.scheduler.borrow().depth() > 0
    }

    /// Snapshot of the graph and counters.
    pub fn stats(&self) -> RuntimeStats {
        let graph = self.inner.graph.borrow();
        RuntimeStats {
            signals: graph.count_of_kind(NodeKind::Source),
            memos: graph.count_of_kind(NodeKind::Derived),
            effects: graph.count_of_kind(NodeKind::Effect),
            pending: self.inner.scheduler.borrow().pending_len(),
            flushes: self.inner.flushes.get(),
            runs: self.inner.runs.get(),
            cycle_warnings: self.inner.cycle_warnings.get(),
        }
    }

    /// Tear down every memo and effect of this runtime.
    ///
    /// Cleanups run, all edges are removed and queued work is dropped.
    /// Signals stay usable; effects created afterwards work normally.
    pub fn dispose(&self) {
        let mut ids: Vec<NodeId> = {
            let graph = self.inner.graph.borrow();
            graph
                .ids_of_kind(NodeKind::Effect)
                .chain(graph.ids_of_kind(NodeKind::Derived))
                .collect()
        };
        ids.sort_unstable();

        let dropped = self.inner.scheduler.borrow_mut().clear();
        debug!(computations = ids.len(), dropped = dropped.len(), "runtime disposed");

        for node_id in ids {
            self.dispose_node(node_id);
        }
    }

    // ------------------------------------------------------------------------
    // Node registration
    // ------------------------------------------------------------------------

    pub(crate) fn create_source(&self) -> NodeId {
        self.inner.graph.borrow_mut().add_node(Node::source())
    }

    pub(crate) fn create_memo(&self, body: Weak<dyn Computation>) -> NodeId {
        let node_id = self.inner.graph.borrow_mut().add_node(Node::derived(body));
        trace!(node = %node_id, "memo created");
        node_id
    }

    /// Register an effect and run it once right away.
    pub(crate) fn create_effect(&self, body: Rc<dyn Computation>) -> NodeId {
        let node_id = self.inner.graph.borrow_mut().add_node(Node::effect(body));
        trace!(node = %node_id, "effect created");

        if let Err(failure) = self.run_node(node_id) {
            self.report(failure.into_computation_error());
        }
        self.flush_if_idle();
        node_id
    }

    /// Remove a node, run its cleanups and drop its body.
    ///
    /// Returns `false` if the node was already gone.
    pub(crate) fn dispose_node(&self, node_id: NodeId) -> bool {
        let removed = self.inner.graph.borrow_mut().remove_node(node_id);
        self.inner.scheduler.borrow_mut().remove(node_id);

        let Some(mut node) = removed else {
            return false;
        };
        debug!(node = %node_id, kind = ?node.kind(), "node disposed");

        run_cleanups(node.take_cleanups());
        drop(node);
        true
    }

    /// Drop path of signal and memo handles.
    ///
    /// Never panics: if the graph is busy the node is left for
    /// [`Runtime::dispose`].
    pub(crate) fn release_node(&self, node_id: NodeId) {
        let removed = match self.inner.graph.try_borrow_mut() {
            Ok(mut graph) => graph.remove_node(node_id),
            Err(_) => {
                debug!(node = %node_id, "graph busy, node not released");
                return;
            }
        };
        if let Ok(mut scheduler) = self.inner.scheduler.try_borrow_mut() {
            scheduler.remove(node_id);
        }
        if let Some(mut node) = removed {
            trace!(node = %node_id, "node released");
            run_cleanups(node.take_cleanups());
        }
    }

    // ------------------------------------------------------------------------
    // Tracking and notification
    // ------------------------------------------------------------------------

    /// Record that the running computation read `source`.
    ///
    /// Only computations of this runtime can subscribe. A read from a
    /// computation of another runtime is logged and otherwise untracked.
    pub(crate) fn track(&self, source: NodeId) {
        if let Some(observer) = self.inner.tracking.observer() {
            self.inner.graph.borrow_mut().add_edge(source, observer);
            return;
        }

        let current = Runtime::current();
        if !current.ptr_eq(self) {
            if let Some(observer) = current.inner.tracking.observer() {
                debug!(
                    %source,
                    %observer,
                    "read crosses runtimes; no dependency recorded"
                );
            }
        }
    }

    /// Propagate a change of `source` and flush unless a batch is open.
    pub(crate) fn notify(&self, source: NodeId) {
        let mut marks = Marks::default();
        self.inner
            .graph
            .borrow_mut()
            .mark_dependents(source, NodeState::Stale, &mut marks);
        trace!(%source, queued = marks.queued.len(), "notify");

        self.apply_marks(marks);
        self.flush_if_idle();
    }

    /// Append a cleanup to the innermost running computation.
    pub(crate) fn add_cleanup(&self, cleanup: Cleanup) -> Result<(), ReactiveError> {
        let owner = self
            .inner
            .tracking
            .owner()
            .ok_or(ReactiveError::CleanupOutsideComputation)?;

        let mut graph = self.inner.graph.borrow_mut();
        let node = graph
            .get_mut(owner)
            .ok_or(ReactiveError::ComputationDisposed(owner))?;
        node.push_cleanup(cleanup);
        Ok(())
    }

    fn apply_marks(&self, marks: Marks) {
        if !marks.queued.is_empty() {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            for node_id in marks.queued {
                scheduler.enqueue(node_id);
            }
        }

        for node_id in marks.reentrant {
            self.inner
                .cycle_warnings
                .set(self.inner.cycle_warnings.get() + 1);
            if self.inner.config.borrow().strict {
                warn!(
                    node = %node_id,
                    "computation was marked stale while running; it will run again"
                );
            }
        }
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Flush the queue if no batch is open and no flush is running.
    pub(crate) fn flush_if_idle(&self) {
        let ready = self.inner.scheduler.borrow().can_flush();
        if ready {
            self.flush();
        }
    }

    fn flush(&self) {
        if !self.inner.scheduler.borrow_mut().start_flush() {
            return;
        }
        let _span = trace_span!("flush").entered();
        let _guard = FlushGuard { runtime: self };

        let max_passes = self.inner.config.borrow().max_flush_passes.max(1);
        let mut passes = 0;
        loop {
            let pass = self.inner.scheduler.borrow_mut().take_pass();
            if pass.is_empty() {
                break;
            }
            if passes == max_passes {
                self.abandon(&pass);
                self.report(ComputationError::Unsettled {
                    passes,
                    pending: pass.len(),
                });
                break;
            }
            passes += 1;
            debug!(pass = passes, queued = pass.len(), "flush pass");

            for node_id in pass {
                if let Err(failure) = self.update_if_necessary(node_id) {
                    self.report(failure.into_computation_error());
                }
            }
        }

        self.inner.flushes.set(self.inner.flushes.get() + 1);
    }

    /// Settle dropped work so later writes can queue it again.
    fn abandon(&self, pass: &[NodeId]) {
        for &node_id in pass {
            self.settle(node_id, NodeState::Clean);
        }
    }

    /// Move a node that still has pending work back to `state`.
    fn settle(&self, node_id: NodeId, state: NodeState) {
        let mut graph = self.inner.graph.borrow_mut();
        if let Some(node) = graph.get_mut(node_id) {
            if matches!(node.state(), NodeState::MaybeStale | NodeState::Stale) {
                node.set_state(state);
            }
        }
    }

    /// Bring a node up to date, running it only if something it read changed.
    ///
    /// Stale nodes run. Maybe-stale nodes first update their upstream memos
    /// in the order they were read; the first memo whose value changed marks
    /// the node stale and it runs, otherwise it goes back to clean without
    /// running.
    pub(crate) fn update_if_necessary(&self, node_id: NodeId) -> Result<(), RunFailure> {
        let (state, upstream) = {
            let graph = self.inner.graph.borrow();
            let Some(node) = graph.get(node_id) else {
                return Ok(());
            };
            // A memo whose runs all failed has nothing cached to return
            let state = match node.state() {
                state @ (NodeState::Clean | NodeState::MaybeStale)
                    if node.kind() == NodeKind::Derived && !node.has_value() =>
                {
                    trace!(node = %node_id, ?state, "memo has no value, running");
                    NodeState::Stale
                }
                state => state,
            };
            let upstream: SmallVec<[NodeId; 8]> = if state == NodeState::MaybeStale {
                node.dependencies()
                    .iter()
                    .copied()
                    .filter(|dep| graph.kind(*dep) == Some(NodeKind::Derived))
                    .collect()
            } else {
                SmallVec::new()
            };
            (state, upstream)
        };

        match state {
            NodeState::Clean | NodeState::Disposed => return Ok(()),
            NodeState::Stale => return self.run_node(node_id),
            NodeState::Running => return Err(RunFailure::new(node_id, FailureCause::Cycle)),
            NodeState::MaybeStale => {
                for dep in upstream {
                    if let Err(failure) = self.update_if_necessary(dep) {
                        self.settle(node_id, NodeState::Clean);
                        return Err(failure);
                    }
                    if self.inner.graph.borrow().state(node_id) != NodeState::MaybeStale {
                        break;
                    }
                }

                // None of the upstream memos changed
                let mut graph = self.inner.graph.borrow_mut();
                if let Some(node) = graph.get_mut(node_id) {
                    if node.state() == NodeState::MaybeStale {
                        node.set_state(NodeState::Clean);
                        return Ok(());
                    }
                }
            }
        }

        if self.inner.graph.borrow().state(node_id) == NodeState::Stale {
            self.run_node(node_id)
        } else {
            Ok(())
        }
    }

    /// Execute one run of a memo or effect.
    fn run_node(&self, node_id: NodeId) -> Result<(), RunFailure> {
        // 1. Cleanups from the previous run, in registration order
        let cleanups = match self.inner.graph.borrow_mut().get_mut(node_id) {
            Some(node) => node.take_cleanups(),
            None => return Ok(()),
        };
        if !cleanups.is_empty() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| run_cleanups(cleanups))) {
                self.settle(node_id, NodeState::Clean);
                return Err(RunFailure::new(node_id, FailureCause::Panicked(payload)));
            }
        }

        // 2. Unsubscribe from everything the previous run read, 3. start running
        let body = {
            let mut graph = self.inner.graph.borrow_mut();
            graph.clear_dependencies(node_id);
            let Some(node) = graph.get_mut(node_id) else {
                return Ok(());
            };
            node.start_run()
        };
        let Some(body) = body else {
            // Every handle of this memo is gone
            self.dispose_node(node_id);
            return Ok(());
        };
        self.inner.runs.set(self.inner.runs.get() + 1);
        trace!(node = %node_id, "run");

        // 4. Run the body with tracking, as an implicit batch
        let outcome = {
            self.inner.scheduler.borrow_mut().begin_batch();
            let _batch = BatchGuard {
                runtime: self,
                flush: false,
            };
            let _ctx = ReactiveContext::enter(&self.inner.tracking, node_id);
            self.enter(|| panic::catch_unwind(AssertUnwindSafe(|| body.run())))
        };

        let (failure, changed) = match outcome {
            Ok(Ok(changed)) => (None, changed),
            Ok(Err(source)) => (Some(FailureCause::Failed(source)), false),
            Err(payload) => (Some(FailureCause::Panicked(payload)), false),
        };

        // 5. Settle, 6. re-queue if marked while running
        let mut marks = Marks::default();
        {
            let mut graph = self.inner.graph.borrow_mut();
            if let Some(node) = graph.get_mut(node_id) {
                // A failed memo settles clean too, so later writes reach its
                // readers; without a value it runs again on the next read
                let rerun = node.take_mark_while_running();
                node.set_state(NodeState::Clean);

                if changed {
                    graph.mark_dependents(node_id, NodeState::Stale, &mut marks);
                }
                if let Some(state) = rerun {
                    graph.mark(node_id, state, &mut marks);
                }
            }
        }
        self.apply_marks(marks);
        drop(body);

        match failure {
            Some(cause) => Err(RunFailure::new(node_id, cause)),
            None => Ok(()),
        }
    }

    /// Send a computation error to the first handler that wants it.
    pub(crate) fn report(&self, error: ComputationError) {
        debug!(%error, "computation error");

        let handler = self.inner.error_handler.borrow().clone();
        if let Some(handler) = handler {
            handler(&error);
        } else if let Some(hook) = error_hook() {
            hook(&error);
        } else {
            error!(%error, "unhandled computation error");
        }
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub(crate) fn node_state(&self, node_id: NodeId) -> NodeState {
        self.inner.graph.borrow().state(node_id)
    }

    pub(crate) fn contains(&self, node_id: NodeId) -> bool {
        self.inner.graph.borrow().contains(node_id)
    }

    pub(crate) fn dependent_count(&self, node_id: NodeId) -> usize {
        self.inner
            .graph
            .borrow()
            .get(node_id)
            .map_or(0, |node| node.dependents().len())
    }

    pub(crate) fn dependency_count(&self, node_id: NodeId) -> usize {
        self.inner
            .graph
            .borrow()
            .get(node_id)
            .map_or(0, |node| node.dependencies().len())
    }

    pub(crate) fn node_runs(&self, node_id: NodeId) -> Option<usize> {
        self.inner.graph.borrow().get(node_id).map(Node::runs)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.inner.graph.borrow().node_count())
            .field("tracking_depth", &self.inner.tracking.depth())
            .field("batch_depth", &self.inner.scheduler.borrow().depth())
            .field("flushing", &self.inner.scheduler.borrow().is_flushing())
            .finish()
    }
}

fn run_cleanups(cleanups: SmallVec<[Cleanup; 2]>) {
    for cleanup in cleanups {
        cleanup();
    }
}

/// Pops the entered runtime, even on panic.
struct EnterGuard;

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let popped = ENTERED
            .try_with(|stack| stack.borrow_mut().pop())
            .ok()
            .flatten();
        drop(popped);
    }
}

/// Closes a batch scope, flushing when the outermost scope closes.
///
/// No flush happens while unwinding: a panic inside a batch leaves the
/// queued work for the next write.
struct BatchGuard<'a> {
    runtime: &'a Runtime,
    flush: bool,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let closed = self.runtime.inner.scheduler.borrow_mut().end_batch();
        if closed && self.flush && !std::thread::panicking() {
            self.runtime.flush_if_idle();
        }
    }
}

/// Releases the flush loop, even on panic.
struct FlushGuard<'a> {
    runtime: &'a Runtime,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.runtime.inner.scheduler.borrow_mut().finish_flush();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
