//! Configuration of the exploration.

use std::time::Duration;

/// Bounds of the close-state search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseStateOptions {
    /// Maximal number of trie edges between the query node and a candidate node.
    pub depth_limit: usize,
    /// Maximal number of trie nodes visited by one search.
    pub max_processed_nodes: usize,
    /// Candidates farther than this in the control-flow graph are ignored.
    pub max_cfg_distance: u32,
}

impl Default for CloseStateOptions {
    fn default() -> Self {
        Self {
            depth_limit: 5,
            max_processed_nodes: 100,
            max_cfg_distance: 20,
        }
    }
}

/// Configuration of the merging path selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Failed merge attempts in a row before the selector lets its underlying candidate through.
    pub advance_limit: u32,
    pub close_states: CloseStateOptions,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            advance_limit: 3,
            close_states: CloseStateOptions::default(),
        }
    }
}

/// Which call edges count when deciding whether a target is still reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReachabilityPolicy {
    /// Follow intraprocedural successors only.
    Intraprocedural,
    /// Also enter the methods called along the way.
    Interprocedural,
}

/// Termination conditions. Every `None` or `false` disables the corresponding strategy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StopOptions {
    /// Stop after this many steps in total.
    pub step_limit: Option<u64>,
    /// Stop when no new statement was covered for more than this many steps.
    pub steps_from_last_covered: Option<u64>,
    /// Stop after this much wall-clock time.
    pub timeout: Option<Duration>,
    /// Stop once this many states have terminated.
    pub collected_states_limit: Option<usize>,
    /// Stop once every target was reached.
    pub stop_on_targets_reached: bool,
    /// Stop once no live state can reach a remaining target.
    pub stop_on_unreachable_targets: Option<ReachabilityPolicy>,
}

/// Scheduling policy wrapped by the merging selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathSelectionStrategy {
    #[default]
    Bfs,
    Dfs,
}

/// What to do with a state whose step failed in the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Forget the state.
    #[default]
    Drop,
    /// Count the state as terminated.
    Keep,
}

/// Configuration of a [`Machine`][crate::machine::Machine] run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MachineOptions {
    pub path_selection: PathSelectionStrategy,
    /// Wrap the path selector into the merging selector.
    pub use_merging: bool,
    pub merge: MergeOptions,
    pub stop: StopOptions,
    pub failure_policy: FailurePolicy,
}
