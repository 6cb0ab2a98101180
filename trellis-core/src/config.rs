//! Runtime Configuration
//!
//! Knobs that change how a runtime schedules work, plus the statistics it
//! exposes for debug tooling. Both are plain serde types so hosts can load
//! a configuration from JSON and ship stats to whatever inspector they use.

use serde::{Deserialize, Serialize};

/// Default cap on flush passes before a flush is considered runaway.
pub const DEFAULT_MAX_FLUSH_PASSES: usize = 100;

/// Configuration of a reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Report computations that are marked stale while they are running.
    ///
    /// Writing a signal from the effect that reads it is legal but almost
    /// always a logic bug, so strict mode logs a warning each time.
    /// On by default in debug builds.
    pub strict: bool,

    /// Maximum number of flush passes before the remaining queue is dropped
    /// and a `ComputationError::Unsettled` is reported.
    pub max_flush_passes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            strict: cfg!(debug_assertions),
            max_flush_passes: DEFAULT_MAX_FLUSH_PASSES,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from a JSON string.
    ///
    /// Missing fields take their default value.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Enable or disable strict mode.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the flush pass limit. A limit of zero is treated as one.
    pub fn max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes.max(1);
        self
    }
}

/// Snapshot of a runtime's graph and counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    /// Live signal nodes.
    pub signals: usize,
    /// Live memo nodes.
    pub memos: usize,
    /// Live effect nodes.
    pub effects: usize,
    /// Effects waiting in the queue.
    pub pending: usize,
    /// Flushes completed since the runtime was created.
    pub flushes: u64,
    /// Memo and effect runs since the runtime was created.
    pub runs: u64,
    /// Computations marked stale while running.
    pub cycle_warnings: u64,
}
