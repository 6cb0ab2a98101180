//! Node Arena
//!
//! The arena owns every node of one runtime and maintains the edges between
//! them. Edges are kept on both ends: a source knows its dependents (so a
//! write can find who to notify) and a computation knows its dependencies
//! (so a re-run can unsubscribe from everything it read last time).
//!
//! # Marking
//!
//! A write marks the direct dependents of the written node `Stale` and pushes
//! `MaybeStale` through derived nodes to everything further downstream:
//!
//! 1. Direct dependents become `Stale`.
//! 2. Each node that leaves `Clean` forwards `MaybeStale` to its dependents.
//! 3. Effects that leave `Clean` are collected for the scheduler queue.
//! 4. Nodes that are `Running` only remember the mark; the runtime applies it
//!    when their run ends.
//!
//! Memos are never recomputed here. Recomputation is pulled later by whoever
//! reads them.

use std::collections::{HashMap, VecDeque};

use smallvec::SmallVec;
use tracing::trace;

use super::node::{Node, NodeId, NodeKind, NodeState};

/// Outcome of a marking pass.
#[derive(Debug, Default)]
pub(crate) struct Marks {
    /// Effects that left `Clean` and must be queued, in marking order.
    pub(crate) queued: SmallVec<[NodeId; 4]>,

    /// Computations that were marked while running.
    pub(crate) reentrant: SmallVec<[NodeId; 2]>,
}

/// All nodes of one runtime, indexed by ID.
#[derive(Debug, Default)]
pub(crate) struct Graph {
    nodes: HashMap<NodeId, Node>,
}

impl Graph {
    /// Create a new empty graph.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph.
    pub(crate) fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node. The removed node is
    /// returned so the caller can run its cleanups and drop its body once no
    /// borrow of the graph is held.
    pub(crate) fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let mut node = self.nodes.remove(&node_id)?;

        // Remove this node from its dependencies' dependent lists
        for dep_id in node.take_dependencies() {
            if let Some(dep) = self.nodes.get_mut(&dep_id) {
                dep.remove_dependent(node_id);
            }
        }

        // Remove this node from its dependents' dependency lists
        for dependent_id in node.dependents() {
            if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                dependent.remove_dependency(node_id);
            }
        }

        node.set_state(NodeState::Disposed);
        Some(node)
    }

    /// Get a reference to a node.
    pub(crate) fn get(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable reference to a node.
    pub(crate) fn get_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Check whether a node is still alive.
    pub(crate) fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// State of a node; `Disposed` once it has left the arena.
    pub(crate) fn state(&self, node_id: NodeId) -> NodeState {
        self.nodes
            .get(&node_id)
            .map_or(NodeState::Disposed, Node::state)
    }

    /// Kind of a node, if it is still alive.
    pub(crate) fn kind(&self, node_id: NodeId) -> Option<NodeKind> {
        self.nodes.get(&node_id).map(Node::kind)
    }

    /// Add a dependency edge: `dependent` read `source`.
    ///
    /// Both ends must be alive; edges towards disposed nodes are dropped.
    pub(crate) fn add_edge(&mut self, source: NodeId, dependent: NodeId) -> bool {
        if source == dependent || !self.contains(source) || !self.contains(dependent) {
            return false;
        }
        if let Some(source_node) = self.nodes.get_mut(&source) {
            source_node.add_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.add_dependency(source);
        }
        trace!(%source, %dependent, "edge added");
        true
    }

    /// Remove every dependency edge of `node_id`.
    ///
    /// Called before re-running a computation so that it only stays
    /// subscribed to what the new run actually reads.
    pub(crate) fn clear_dependencies(&mut self, node_id: NodeId) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        for dep_id in node.take_dependencies() {
            if let Some(dep) = self.nodes.get_mut(&dep_id) {
                dep.remove_dependent(node_id);
            }
        }
    }

    /// Mark the direct dependents of `source` with `state` and propagate
    /// `MaybeStale` further downstream.
    pub(crate) fn mark_dependents(&mut self, source: NodeId, state: NodeState, marks: &mut Marks) {
        let Some(node) = self.nodes.get(&source) else {
            return;
        };
        let direct: SmallVec<[NodeId; 8]> = node.dependents().iter().copied().collect();
        let mut queue: VecDeque<(NodeId, NodeState)> =
            direct.into_iter().map(|id| (id, state)).collect();
        self.propagate(&mut queue, marks);
    }

    /// Mark a single node with `state` and propagate downstream.
    pub(crate) fn mark(&mut self, node_id: NodeId, state: NodeState, marks: &mut Marks) {
        let mut queue = VecDeque::from([(node_id, state)]);
        self.propagate(&mut queue, marks);
    }

    fn propagate(&mut self, queue: &mut VecDeque<(NodeId, NodeState)>, marks: &mut Marks) {
        // BFS, forwarding only from nodes that just left `Clean`. A node that
        // was already marked has already forwarded its mark.
        while let Some((node_id, state)) = queue.pop_front() {
            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };

            let previous = node.state();
            match previous {
                NodeState::Disposed => continue,
                NodeState::Running => {
                    node.mark_while_running(state);
                    if !marks.reentrant.contains(&node_id) {
                        marks.reentrant.push(node_id);
                    }
                    continue;
                }
                current if current.covers(state) => continue,
                _ => node.set_state(state),
            }

            if previous != NodeState::Clean {
                continue;
            }

            if node.kind() == NodeKind::Effect {
                marks.queued.push(node_id);
            }
            for &dependent_id in node.dependents() {
                queue.push_back((dependent_id, NodeState::MaybeStale));
            }
        }
    }

    /// Iterate over the IDs of all nodes of a given kind.
    pub(crate) fn ids_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .values()
            .filter(move |node| node.kind() == kind)
            .map(Node::id)
    }

    /// Count the nodes of a given kind.
    pub(crate) fn count_of_kind(&self, kind: NodeKind) -> usize {
        self.nodes.values().filter(|node| node.kind() == kind).count()
    }

    /// Get the total number of nodes in the graph.
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
