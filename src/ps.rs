//! Path selectors: which state the interpreter steps next.

use std::collections::{HashMap, VecDeque};
use std::fmt::{self, Debug, Formatter};

use log::{debug, trace};

use crate::close_states::CloseStatesSearcher;
use crate::graph::CfgDistanceOracle;
use crate::options::{MergeOptions, PathSelectionStrategy};
use crate::state::{ExecutionState, StateId};
use crate::tree::ExecutionTree;

/// Scheduling policy over live states.
///
/// The run loop calls [`peek`][PathSelector::peek], steps the returned state, and reports the
/// outcome through [`update`][PathSelector::update], [`add`][PathSelector::add] and
/// [`remove`][PathSelector::remove].
pub trait PathSelector<St: ExecutionState> {
    /// The state to step next, or `None` when no state is left.
    fn peek(&mut self) -> Option<St>;

    /// The state `state.id()` has advanced.
    fn update(&mut self, state: St);

    fn add(&mut self, state: St);

    fn remove(&mut self, id: StateId) -> Option<St>;

    fn len(&self) -> usize;

    /// Live states in scheduling order.
    fn states(&self) -> Vec<&St>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Breadth-first: the state stepped the longest time ago goes next.
#[derive(Debug)]
pub struct BfsPathSelector<St> {
    queue: VecDeque<StateId>,
    states: HashMap<StateId, St>,
}

impl<St> Default for BfsPathSelector<St> {
    fn default() -> Self {
        Self::new()
    }
}

impl<St> BfsPathSelector<St> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            states: HashMap::new(),
        }
    }
}

impl<St: ExecutionState> PathSelector<St> for BfsPathSelector<St> {
    fn peek(&mut self) -> Option<St> {
        let id = self.queue.front()?;
        self.states.get(id).cloned()
    }

    fn update(&mut self, state: St) {
        let id = state.id();
        if let Some(pos) = self.queue.iter().position(|&s| s == id) {
            self.queue.remove(pos);
            self.queue.push_back(id);
            self.states.insert(id, state);
        }
    }

    fn add(&mut self, state: St) {
        self.queue.push_back(state.id());
        self.states.insert(state.id(), state);
    }

    fn remove(&mut self, id: StateId) -> Option<St> {
        let state = self.states.remove(&id)?;
        self.queue.retain(|&s| s != id);
        Some(state)
    }

    fn len(&self) -> usize {
        self.states.len()
    }

    fn states(&self) -> Vec<&St> {
        self.queue.iter().filter_map(|id| self.states.get(id)).collect()
    }
}

/// Depth-first: the most recently added state goes next and keeps going until it is removed.
#[derive(Debug)]
pub struct DfsPathSelector<St> {
    stack: Vec<StateId>,
    states: HashMap<StateId, St>,
}

impl<St> Default for DfsPathSelector<St> {
    fn default() -> Self {
        Self::new()
    }
}

impl<St> DfsPathSelector<St> {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            states: HashMap::new(),
        }
    }
}

impl<St: ExecutionState> PathSelector<St> for DfsPathSelector<St> {
    fn peek(&mut self) -> Option<St> {
        let id = self.stack.last()?;
        self.states.get(id).cloned()
    }

    fn update(&mut self, state: St) {
        if let Some(slot) = self.states.get_mut(&state.id()) {
            *slot = state;
        }
    }

    fn add(&mut self, state: St) {
        self.stack.push(state.id());
        self.states.insert(state.id(), state);
    }

    fn remove(&mut self, id: StateId) -> Option<St> {
        let state = self.states.remove(&id)?;
        self.stack.retain(|&s| s != id);
        Some(state)
    }

    fn len(&self) -> usize {
        self.states.len()
    }

    fn states(&self) -> Vec<&St> {
        self.stack.iter().rev().filter_map(|id| self.states.get(id)).collect()
    }
}

/// Plain selector for a strategy.
pub fn create_path_selector<St: ExecutionState + 'static>(strategy: PathSelectionStrategy) -> Box<dyn PathSelector<St>> {
    match strategy {
        PathSelectionStrategy::Bfs => Box::new(BfsPathSelector::new()),
        PathSelectionStrategy::Dfs => Box::new(DfsPathSelector::new()),
    }
}

impl<St: ExecutionState> PathSelector<St> for Box<dyn PathSelector<St>> {
    fn peek(&mut self) -> Option<St> {
        (**self).peek()
    }

    fn update(&mut self, state: St) {
        (**self).update(state)
    }

    fn add(&mut self, state: St) {
        (**self).add(state)
    }

    fn remove(&mut self, id: StateId) -> Option<St> {
        (**self).remove(id)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn states(&self) -> Vec<&St> {
        (**self).states()
    }
}

/// Mode of the [`MergingPathSelector`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SelectorMode {
    /// Try to merge the underlying candidate; `retries` merge attempts failed in a row.
    Advancing { retries: u32 },
    /// Let the next underlying candidate through unchanged.
    Peeking,
}

/// Path selector that merges the underlying candidate with a close state before handing it out.
///
/// Every state added to the selector is also tracked in an [`ExecutionTree`], which the
/// close-state search walks to find merge partners. When a merge succeeds, both sides leave the
/// underlying selector and the tree, and the merged state takes their place. When it fails, the
/// partner is handed out instead so that it can catch up; after
/// [`advance_limit`][MergeOptions::advance_limit] failures in a row the selector lets one underlying
/// candidate through.
pub struct MergingPathSelector<St: ExecutionState, P, O> {
    selector: P,
    tree: ExecutionTree<St>,
    searcher: CloseStatesSearcher<O>,
    advance_limit: u32,
    mode: SelectorMode,
    merges: usize,
}

impl<St: ExecutionState, P, O> Debug for MergingPathSelector<St, P, O> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergingPathSelector")
            .field("mode", &self.mode)
            .field("tree", &self.tree)
            .field("merges", &self.merges)
            .finish()
    }
}

impl<St, P, O> MergingPathSelector<St, P, O>
where
    St: ExecutionState,
    P: PathSelector<St>,
    O: CfgDistanceOracle<St::Method, St::Statement>,
{
    pub fn new(selector: P, oracle: O, options: MergeOptions) -> Self {
        Self {
            selector,
            tree: ExecutionTree::new(),
            searcher: CloseStatesSearcher::new(oracle, options.close_states),
            advance_limit: options.advance_limit,
            mode: SelectorMode::Advancing { retries: 0 },
            merges: 0,
        }
    }

    pub fn mode(&self) -> SelectorMode {
        self.mode
    }

    pub fn tree(&self) -> &ExecutionTree<St> {
        &self.tree
    }

    pub fn searcher(&self) -> &CloseStatesSearcher<O> {
        &self.searcher
    }

    /// Number of successful merges.
    pub fn merges(&self) -> usize {
        self.merges
    }

    fn replace_by_merged(&mut self, left: StateId, right: StateId, merged: St) {
        self.selector.remove(left);
        self.tree.remove(left);
        self.selector.remove(right);
        self.tree.remove(right);
        self.tree.add(merged.clone());
        self.selector.add(merged);
    }
}

impl<St, P, O> PathSelector<St> for MergingPathSelector<St, P, O>
where
    St: ExecutionState,
    P: PathSelector<St>,
    O: CfgDistanceOracle<St::Method, St::Statement>,
{
    fn peek(&mut self) -> Option<St> {
        let candidate = self.selector.peek()?;
        let retries = match self.mode {
            SelectorMode::Peeking => {
                trace!("peeking {}", candidate.id());
                self.mode = SelectorMode::Advancing { retries: 0 };
                return Some(candidate);
            }
            SelectorMode::Advancing { retries } => retries,
        };

        let Some(partner) = self.searcher.find_close_states(&self.tree, &candidate).into_iter().next() else {
            return Some(candidate);
        };
        debug!("try to merge {} with {}", candidate.id(), partner.id());
        match candidate.merge_with(&partner) {
            Some(merged) => {
                debug!("merged {} and {} into {}", candidate.id(), partner.id(), merged.id());
                self.replace_by_merged(candidate.id(), partner.id(), merged.clone());
                self.mode = SelectorMode::Advancing { retries: 0 };
                self.merges += 1;
                Some(merged)
            }
            None => {
                let retries = retries + 1;
                self.mode = if retries >= self.advance_limit {
                    debug!("advance limit reached, switching to peeking");
                    SelectorMode::Peeking
                } else {
                    SelectorMode::Advancing { retries }
                };
                Some(partner)
            }
        }
    }

    fn update(&mut self, state: St) {
        self.tree.update(state.clone());
        self.selector.update(state);
    }

    fn add(&mut self, state: St) {
        self.tree.add(state.clone());
        self.selector.add(state);
    }

    fn remove(&mut self, id: StateId) -> Option<St> {
        self.tree.remove(id);
        self.selector.remove(id)
    }

    fn len(&self) -> usize {
        self.selector.len()
    }

    fn states(&self) -> Vec<&St> {
        self.selector.states()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use test_log::test;

    use super::*;
    use crate::expr::ExprManager;
    use crate::graph::tests::diamond;
    use crate::graph::{ExplicitGraph, MemoizedCfgDistance};
    use crate::state::tests::{state_at, TestState};

    type Merging = MergingPathSelector<TestState, BfsPathSelector<TestState>, MemoizedCfgDistance<ExplicitGraph>>;

    fn merging(advance_limit: u32) -> Merging {
        let options = MergeOptions {
            advance_limit,
            ..MergeOptions::default()
        };
        MergingPathSelector::new(BfsPathSelector::new(), MemoizedCfgDistance::new(Rc::new(diamond())), options)
    }

    #[test]
    fn test_bfs() {
        let ctx = Rc::new(ExprManager::new());
        let a = state_at(&ctx, 1);
        let b = state_at(&ctx, 1);
        let mut ps = BfsPathSelector::new();
        ps.add(a.clone());
        ps.add(b.clone());
        assert_eq!(ps.peek().map(|s| s.id()), Some(a.id()));
        ps.update(a.clone());
        assert_eq!(ps.peek().map(|s| s.id()), Some(b.id()));
        assert!(ps.remove(b.id()).is_some());
        assert_eq!(ps.peek().map(|s| s.id()), Some(a.id()));
        assert_eq!(ps.len(), 1);
    }

    #[test]
    fn test_dfs() {
        let ctx = Rc::new(ExprManager::new());
        let a = state_at(&ctx, 1);
        let mut b = state_at(&ctx, 1);
        let mut ps = DfsPathSelector::new();
        ps.add(a.clone());
        ps.add(b.clone());
        b.advance(2);
        ps.update(b.clone());
        assert_eq!(ps.peek().map(|s| *s.current_statement()), Some(2));
        ps.remove(b.id());
        assert_eq!(ps.peek().map(|s| s.id()), Some(a.id()));
        ps.remove(a.id());
        assert!(ps.is_empty());
        assert!(ps.peek().is_none());
    }

    #[test]
    fn test_merge_on_peek() {
        let ctx = Rc::new(ExprManager::new());
        let mut base = state_at(&ctx, 1);
        base.advance(2);
        let mut left = base.fork();
        left.memory_mut().write_local(0, ctx.mk_int(1));
        left.advance(3);
        let mut right = base.fork();
        right.memory_mut().write_local(0, ctx.mk_int(2));
        right.advance(3);

        let mut ps = merging(3);
        ps.add(left.clone());
        ps.add(right.clone());
        let merged = ps.peek().unwrap();
        assert_ne!(merged.id(), left.id());
        assert_ne!(merged.id(), right.id());
        assert_eq!(ps.len(), 1);
        assert_eq!(ps.tree().len(), 1);
        assert_eq!(ps.merges(), 1);
        assert!(ps.tree().get(left.id()).is_none());
        assert_eq!(ps.peek().map(|s| s.id()), Some(merged.id()));
    }

    #[test]
    fn test_advance_limit() {
        let ctx = Rc::new(ExprManager::new());
        let mut ahead = state_at(&ctx, 1);
        ahead.advance(2);
        let lagging = ahead.fork();
        ahead.advance(3);

        let mut ps = merging(3);
        ps.add(ahead.clone());
        ps.add(lagging.clone());

        for retries in 1..=2 {
            assert_eq!(ps.peek().map(|s| s.id()), Some(lagging.id()));
            assert_eq!(ps.mode(), SelectorMode::Advancing { retries });
        }
        assert_eq!(ps.peek().map(|s| s.id()), Some(lagging.id()));
        assert_eq!(ps.mode(), SelectorMode::Peeking);

        assert_eq!(ps.peek().map(|s| s.id()), Some(ahead.id()));
        assert_eq!(ps.mode(), SelectorMode::Advancing { retries: 0 });
        assert_eq!(ps.merges(), 0);
    }

    #[test]
    fn test_no_partner() {
        let ctx = Rc::new(ExprManager::new());
        let s = state_at(&ctx, 1);
        let mut ps = merging(3);
        ps.add(s.clone());
        assert_eq!(ps.peek().map(|st| st.id()), Some(s.id()));
        assert_eq!(ps.mode(), SelectorMode::Advancing { retries: 0 });

        let mut moved = s.clone();
        moved.advance(2);
        ps.update(moved);
        assert_eq!(ps.tree().get(s.id()).map(|st| *st.current_statement()), Some(2));
        ps.remove(s.id());
        assert!(ps.peek().is_none());
    }
}
