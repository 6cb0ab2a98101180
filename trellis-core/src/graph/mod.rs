//! Dependency Graph
//!
//! This module implements the arena that stores the reactive dependency
//! graph and the queue that schedules re-runs.
//!
//! # Overview
//!
//! The dependency graph is a directed graph where:
//!
//! - Nodes represent reactive values (signals) or computations (memos, effects)
//! - Edges represent dependencies: if A read B during its last run, there is
//!   an edge from B to A
//!
//! When a signal changes, we traverse the graph to find all affected nodes
//! and mark them. Effects are queued; memos are only marked and recompute
//! when someone pulls their value.
//!
//! # Design Decisions
//!
//! 1. We use a centralized arena rather than per-signal subscriber lists
//!    because it keeps every edge as a pair of handles. Nothing in the graph
//!    owns anything else, so cycles between signals and computations cannot
//!    leak.
//!
//! 2. The arena is indexed by node ID for O(1) lookups.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable efficient traversal in both directions.

mod arena;
mod node;
mod scheduler;

pub(crate) use arena::{Graph, Marks};
pub(crate) use node::{Cleanup, Computation, Node};
pub use node::{NodeId, NodeKind, NodeState};
pub(crate) use scheduler::Scheduler;
