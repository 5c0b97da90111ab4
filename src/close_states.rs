//! Search for merge partners near a state in the execution tree.

use std::cell::Cell;
use std::collections::{HashSet, VecDeque};

use log::{debug, trace};

use crate::graph::{CfgDistanceOracle, Distance};
use crate::options::CloseStateOptions;
use crate::state::ExecutionState;
use crate::tree::ExecutionTree;

/// Finds states resting near a given state, both in the execution tree and in the control-flow
/// graph of its method.
#[derive(Debug)]
pub struct CloseStatesSearcher<O> {
    oracle: O,
    options: CloseStateOptions,
    oracle_calls: Cell<usize>,
}

impl<O> CloseStatesSearcher<O> {
    pub fn new(oracle: O, options: CloseStateOptions) -> Self {
        Self {
            oracle,
            options,
            oracle_calls: Cell::new(0),
        }
    }

    pub fn options(&self) -> &CloseStateOptions {
        &self.options
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Number of distance queries issued so far.
    pub fn oracle_calls(&self) -> usize {
        self.oracle_calls.get()
    }

    /// States close to `state`, nearest first.
    ///
    /// The trie is walked breadth-first from the node of `state` along child and parent edges, at
    /// most [`depth_limit`][CloseStateOptions::depth_limit] edges away and over at most
    /// [`max_processed_nodes`][CloseStateOptions::max_processed_nodes] nodes. For every visited node
    /// holding other states of the same method, the distance from the node's statement to the
    /// statement of `state` is queried once. Candidates farther than
    /// [`max_cfg_distance`][CloseStateOptions::max_cfg_distance] are dropped; the rest are ordered by
    /// distance, then by discovery order.
    pub fn find_close_states<St>(&self, tree: &ExecutionTree<St>, state: &St) -> Vec<St>
    where
        St: ExecutionState,
        O: CfgDistanceOracle<St::Method, St::Statement>,
    {
        debug!("find_close_states(state = {})", state.id());
        let Some(start) = tree.node_of(state.id()) else {
            return Vec::new();
        };
        let method = state.method();
        let target = state.current_statement();
        let cap = Distance::new(self.options.max_cfg_distance);

        let mut candidates: Vec<(Distance, St)> = Vec::new();
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut processed = 0;

        while let Some((node, depth)) = queue.pop_front() {
            if processed >= self.options.max_processed_nodes {
                trace!("processed node limit reached");
                break;
            }
            processed += 1;

            if let Some(statement) = tree.statement_of(node) {
                let residents: Vec<&St> = tree
                    .states_at(node)
                    .filter(|s| s.id() != state.id() && s.method() == method)
                    .collect();
                if !residents.is_empty() {
                    self.oracle_calls.set(self.oracle_calls.get() + 1);
                    let distance = self.oracle.shortest_distance(&method, statement, target);
                    trace!("node {} is {} away", node, distance);
                    if distance <= cap {
                        candidates.extend(residents.into_iter().map(|s| (distance, s.clone())));
                    }
                }
            }

            if depth == self.options.depth_limit {
                continue;
            }
            let neighbours = tree.children_of(node).iter().copied().chain(tree.parent_of(node));
            for next in neighbours {
                if visited.insert(next) {
                    queue.push_back((next, depth + 1));
                }
            }
        }

        candidates.sort_by_key(|(distance, _)| *distance);
        debug!("found {} close states", candidates.len());
        candidates.into_iter().map(|(_, s)| s).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use test_log::test;

    use super::*;
    use crate::expr::ExprManager;
    use crate::graph::tests::diamond;
    use crate::graph::MemoizedCfgDistance;
    use crate::state::tests::{state_at, TestState};

    fn searcher(options: CloseStateOptions) -> CloseStatesSearcher<MemoizedCfgDistance<crate::graph::ExplicitGraph>> {
        CloseStatesSearcher::new(MemoizedCfgDistance::new(Rc::new(diamond())), options)
    }

    /// Two states at 3 and 4 after the branch at 2, one lagging state at 2, one at 5 after 3.
    fn forest(ctx: &Rc<ExprManager>) -> (ExecutionTree<TestState>, Vec<TestState>) {
        let mut tree = ExecutionTree::new();
        let mut base = state_at(ctx, 1);
        base.advance(2);
        let lagging = base.fork();
        let mut left = base.fork();
        left.advance(3);
        let mut right = base.fork();
        right.advance(4);
        let mut ahead = left.fork();
        ahead.advance(5);
        let states = vec![lagging, left, right, ahead];
        for s in &states {
            tree.add(s.clone());
        }
        (tree, states)
    }

    #[test]
    fn test_ordering_by_distance() {
        let ctx = Rc::new(ExprManager::new());
        let (tree, states) = forest(&ctx);
        let ahead = &states[3];
        let s = searcher(CloseStateOptions::default());
        let found: Vec<_> = s.find_close_states(&tree, ahead).iter().map(|st| st.id()).collect();
        // 3 -> 5 and 4 -> 5 are one edge, 2 -> 5 is two.
        assert_eq!(found, vec![states[1].id(), states[2].id(), states[0].id()]);
    }

    #[test]
    fn test_unreachable_candidates_are_dropped() {
        let ctx = Rc::new(ExprManager::new());
        let (tree, states) = forest(&ctx);
        let left = &states[1];
        let s = searcher(CloseStateOptions::default());
        let found: Vec<_> = s.find_close_states(&tree, left).iter().map(|st| st.id()).collect();
        // 4 and 5 cannot reach 3.
        assert_eq!(found, vec![states[0].id()]);
    }

    #[test]
    fn test_distance_cap() {
        let ctx = Rc::new(ExprManager::new());
        let (tree, states) = forest(&ctx);
        let options = CloseStateOptions {
            max_cfg_distance: 1,
            ..CloseStateOptions::default()
        };
        let found = searcher(options).find_close_states(&tree, &states[3]);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_oracle_call_bound() {
        let ctx = Rc::new(ExprManager::new());
        let (tree, states) = forest(&ctx);
        let options = CloseStateOptions {
            max_processed_nodes: 2,
            ..CloseStateOptions::default()
        };
        let s = searcher(options);
        s.find_close_states(&tree, &states[3]);
        assert!(s.oracle_calls() <= 2);

        let options = CloseStateOptions {
            depth_limit: 0,
            ..CloseStateOptions::default()
        };
        let s = searcher(options);
        assert!(s.find_close_states(&tree, &states[3]).is_empty());
        assert_eq!(s.oracle_calls(), 0);
    }

    #[test]
    fn test_untracked_state() {
        let ctx = Rc::new(ExprManager::new());
        let (tree, _) = forest(&ctx);
        let stranger = state_at(&ctx, 1);
        assert!(searcher(CloseStateOptions::default()).find_close_states(&tree, &stranger).is_empty());
    }
}
