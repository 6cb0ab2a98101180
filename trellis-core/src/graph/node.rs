//! Graph Nodes
//!
//! This module defines the node types that live in the reactive arena.
//!
//! A node is either a source (signal), a derived value (memo) or an effect.
//! Nodes never point at each other directly: edges are stored as sets of
//! [`NodeId`] handles on both ends, so the arena owns every node and the
//! signal/computation cycle never turns into an ownership cycle.

use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::error::BoxError;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (signal). These are the roots of the graph.
    /// They have no dependencies, only dependents.
    Source,

    /// A derived node (memo). These have dependencies and may have dependents.
    /// They cache their computed value.
    Derived,

    /// An effect node. These are leaves of the graph.
    /// They have dependencies but no dependents.
    Effect,
}

/// Lifecycle state of a node.
///
/// Sources are always `Clean`. Computations move through
/// `Clean -> MaybeStale/Stale -> Running -> Clean`; `Disposed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// The node is up-to-date.
    Clean,

    /// An upstream memo might have changed. The node has to check its memo
    /// dependencies before deciding whether to run.
    MaybeStale,

    /// A direct dependency changed. The node must run again.
    Stale,

    /// The node's body is executing right now.
    Running,

    /// The node has been torn down and ignores further notifications.
    Disposed,
}

impl NodeState {
    /// Rank of the pending-work states, used to only ever upgrade a mark.
    fn rank(self) -> u8 {
        match self {
            NodeState::Clean => 0,
            NodeState::MaybeStale => 1,
            NodeState::Stale => 2,
            NodeState::Running | NodeState::Disposed => 3,
        }
    }

    /// Whether `self` is at least as dirty as `other`.
    pub(crate) fn covers(self, other: NodeState) -> bool {
        self.rank() >= other.rank()
    }
}

/// A teardown callback registered with `on_cleanup`.
pub(crate) type Cleanup = Box<dyn FnOnce()>;

/// The body of a memo or an effect, with its type erased.
pub(crate) trait Computation {
    /// Run the body once.
    ///
    /// Returns whether the observable value changed. Effects always report
    /// a change; memos compare against their cached value.
    fn run(&self) -> Result<bool, BoxError>;

    /// Whether a previous run left a usable value behind.
    fn has_value(&self) -> bool {
        true
    }
}

/// How the arena holds on to a node's body.
///
/// Effects are owned by the graph and live until disposed. Memos are owned
/// by their handles, so the arena only keeps a weak reference.
pub(crate) enum ComputationRef {
    Owned(Rc<dyn Computation>),
    Weak(Weak<dyn Computation>),
}

impl ComputationRef {
    fn upgrade(&self) -> Option<Rc<dyn Computation>> {
        match self {
            ComputationRef::Owned(rc) => Some(Rc::clone(rc)),
            ComputationRef::Weak(weak) => weak.upgrade(),
        }
    }
}

/// A node in the dependency graph.
pub(crate) struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// What kind of node this is.
    kind: NodeKind,

    /// Current lifecycle state.
    state: NodeState,

    /// Strongest mark received while `Running`. Applied once the run ends.
    marked_while_running: Option<NodeState>,

    /// Nodes that this node read during its most recent run.
    dependencies: IndexSet<NodeId>,

    /// Nodes that read this node during their most recent run.
    dependents: IndexSet<NodeId>,

    /// Teardown callbacks, in registration order.
    cleanups: SmallVec<[Cleanup; 2]>,

    /// The body, for memos and effects.
    computation: Option<ComputationRef>,

    /// Number of times the body started running.
    runs: usize,
}

impl Node {
    /// Create a new source (signal) node.
    pub(crate) fn source() -> Self {
        Self::new(NodeKind::Source, None)
    }

    /// Create a new derived (memo) node. The arena only keeps it weakly.
    pub(crate) fn derived(body: Weak<dyn Computation>) -> Self {
        Self::new(NodeKind::Derived, Some(ComputationRef::Weak(body)))
    }

    /// Create a new effect node owned by the arena.
    pub(crate) fn effect(body: Rc<dyn Computation>) -> Self {
        Self::new(NodeKind::Effect, Some(ComputationRef::Owned(body)))
    }

    fn new(kind: NodeKind, computation: Option<ComputationRef>) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            state: match kind {
                NodeKind::Source => NodeState::Clean,
                // Start stale to ensure the first computation
                NodeKind::Derived | NodeKind::Effect => NodeState::Stale,
            },
            marked_while_running: None,
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
            cleanups: SmallVec::new(),
            computation,
            runs: 0,
        }
    }

    /// Get the node's ID.
    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's kind.
    pub(crate) fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Get the current state.
    pub(crate) fn state(&self) -> NodeState {
        self.state
    }

    /// Set the current state.
    pub(crate) fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }

    /// Number of times the body started running.
    pub(crate) fn runs(&self) -> usize {
        self.runs
    }

    /// Record a mark that arrived while the body was running.
    pub(crate) fn mark_while_running(&mut self, state: NodeState) {
        let merged = match self.marked_while_running {
            Some(previous) if previous.covers(state) => previous,
            _ => state,
        };
        self.marked_while_running = Some(merged);
    }

    /// Take the mark recorded during the last run, if any.
    pub(crate) fn take_mark_while_running(&mut self) -> Option<NodeState> {
        self.marked_while_running.take()
    }

    /// Whether the body holds a usable value. Sources always do.
    pub(crate) fn has_value(&self) -> bool {
        self.computation
            .as_ref()
            .and_then(ComputationRef::upgrade)
            .map_or(true, |body| body.has_value())
    }

    /// Transition into `Running` and hand out the body to execute.
    ///
    /// Returns `None` when a memo's handles have all been dropped.
    pub(crate) fn start_run(&mut self) -> Option<Rc<dyn Computation>> {
        let body = self.computation.as_ref().and_then(ComputationRef::upgrade)?;
        self.state = NodeState::Running;
        self.runs += 1;
        Some(body)
    }

    /// Add a dependency (a node that this node reads from).
    pub(crate) fn add_dependency(&mut self, node_id: NodeId) {
        self.dependencies.insert(node_id);
    }

    /// Remove a dependency.
    pub(crate) fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.shift_remove(&node_id);
    }

    /// Get all dependencies, in the order they were first read.
    pub(crate) fn dependencies(&self) -> &IndexSet<NodeId> {
        &self.dependencies
    }

    /// Add a dependent (a node that reads from this node).
    pub(crate) fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    /// Remove a dependent.
    pub(crate) fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }

    /// Get all dependents, in subscription order.
    pub(crate) fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }

    /// Clear all dependencies, returning them.
    pub(crate) fn take_dependencies(&mut self) -> IndexSet<NodeId> {
        std::mem::take(&mut self.dependencies)
    }

    /// Append a teardown callback.
    pub(crate) fn push_cleanup(&mut self, cleanup: Cleanup) {
        self.cleanups.push(cleanup);
    }

    /// Take all pending teardown callbacks, in registration order.
    pub(crate) fn take_cleanups(&mut self) -> SmallVec<[Cleanup; 2]> {
        std::mem::take(&mut self.cleanups)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .field("cleanups", &self.cleanups.len())
            .field("runs", &self.runs)
            .finish()
    }
}
