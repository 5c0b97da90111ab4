//! Stop strategies: when the run loop should halt.
//!
//! A strategy is a zero-argument predicate over counters shared with the run loop. Every strategy
//! here is latched: once it answered `true`, it keeps answering `true`.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::fmt::{self, Debug, Formatter};
use std::hash::Hash;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, info, trace};

use crate::graph::ApplicationGraph;
use crate::options::{ReachabilityPolicy, StopOptions};

pub trait StopStrategy {
    fn should_stop(&self) -> bool;

    /// Short name for diagnostics.
    fn name(&self) -> &'static str;
}

impl StopStrategy for Box<dyn StopStrategy> {
    fn should_stop(&self) -> bool {
        (**self).should_stop()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[derive(Debug, Default)]
struct Latch(Cell<bool>);

impl Latch {
    fn check(&self, condition: impl FnOnce() -> bool) -> bool {
        if !self.0.get() && condition() {
            self.0.set(true);
        }
        self.0.get()
    }
}

/// Number of interpreter steps.
#[derive(Debug, Default)]
pub struct StepsStatistics {
    steps: Cell<u64>,
}

impl StepsStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_step(&self) {
        self.steps.set(self.steps.get() + 1);
    }

    pub fn total_steps(&self) -> u64 {
        self.steps.get()
    }
}

/// Covered statements and the number of steps since one was covered for the first time.
#[derive(Debug)]
pub struct CoverageStatistics<S> {
    covered: RefCell<HashSet<S>>,
    steps_from_last_covered: Cell<u64>,
}

impl<S: Eq + Hash> Default for CoverageStatistics<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Eq + Hash> CoverageStatistics<S> {
    pub fn new() -> Self {
        Self {
            covered: RefCell::new(HashSet::new()),
            steps_from_last_covered: Cell::new(0),
        }
    }

    /// Mark `statement` covered without counting a step. Returns `true` if it was not covered before.
    pub fn cover(&self, statement: &S) -> bool
    where
        S: Clone,
    {
        self.covered.borrow_mut().insert(statement.clone())
    }

    /// Count a step; `covered_new` resets the counter of steps since the last newly covered statement.
    pub fn record_step(&self, covered_new: bool) {
        if covered_new {
            self.steps_from_last_covered.set(0);
        } else {
            self.steps_from_last_covered.set(self.steps_from_last_covered.get() + 1);
        }
    }

    /// Record a step that executed `statement`. Returns `true` if it was not covered before.
    pub fn on_step(&self, statement: &S) -> bool
    where
        S: Clone,
    {
        let fresh = self.cover(statement);
        self.record_step(fresh);
        fresh
    }

    pub fn is_covered(&self, statement: &S) -> bool {
        self.covered.borrow().contains(statement)
    }

    pub fn covered_count(&self) -> usize {
        self.covered.borrow().len()
    }

    pub fn steps_from_last_covered(&self) -> u64 {
        self.steps_from_last_covered.get()
    }
}

/// Targets not reached yet and the statements live states rest at.
#[derive(Debug)]
pub struct TargetsStatistics<S> {
    remaining: RefCell<HashSet<S>>,
    frontier: RefCell<HashSet<S>>,
}

impl<S: Clone + Eq + Hash> TargetsStatistics<S> {
    pub fn new(targets: impl IntoIterator<Item = S>) -> Self {
        Self {
            remaining: RefCell::new(targets.into_iter().collect()),
            frontier: RefCell::new(HashSet::new()),
        }
    }

    /// Record that some state executed `statement`. Returns `true` if it was a remaining target.
    pub fn on_visit(&self, statement: &S) -> bool {
        self.remaining.borrow_mut().remove(statement)
    }

    pub fn remaining(&self) -> Vec<S> {
        self.remaining.borrow().iter().cloned().collect()
    }

    pub fn all_reached(&self) -> bool {
        self.remaining.borrow().is_empty()
    }

    /// Replace the statements live states rest at.
    pub fn set_frontier(&self, statements: impl IntoIterator<Item = S>) {
        *self.frontier.borrow_mut() = statements.into_iter().collect();
    }

    /// Statements with at least one live state.
    pub fn frontier(&self) -> Vec<S> {
        self.frontier.borrow().iter().cloned().collect()
    }
}

/// Stops after more than `limit` steps in total.
#[derive(Debug)]
pub struct StepLimitStopStrategy {
    limit: u64,
    steps: Rc<StepsStatistics>,
    latch: Latch,
}

impl StepLimitStopStrategy {
    pub fn new(limit: u64, steps: Rc<StepsStatistics>) -> Self {
        Self {
            limit,
            steps,
            latch: Latch::default(),
        }
    }
}

impl StopStrategy for StepLimitStopStrategy {
    fn should_stop(&self) -> bool {
        self.latch.check(|| self.steps.total_steps() > self.limit)
    }

    fn name(&self) -> &'static str {
        "step-limit"
    }
}

/// Stops when no statement was newly covered for more than `limit` steps.
#[derive(Debug)]
pub struct StepsFromLastCoveredStopStrategy<S> {
    limit: u64,
    coverage: Rc<CoverageStatistics<S>>,
    latch: Latch,
}

impl<S> StepsFromLastCoveredStopStrategy<S> {
    pub fn new(limit: u64, coverage: Rc<CoverageStatistics<S>>) -> Self {
        Self {
            limit,
            coverage,
            latch: Latch::default(),
        }
    }
}

impl<S: Eq + Hash> StopStrategy for StepsFromLastCoveredStopStrategy<S> {
    fn should_stop(&self) -> bool {
        self.latch.check(|| self.coverage.steps_from_last_covered() > self.limit)
    }

    fn name(&self) -> &'static str {
        "steps-from-last-covered"
    }
}

/// Stops once `timeout` of wall-clock time elapsed since construction.
#[derive(Debug)]
pub struct TimeoutStopStrategy {
    deadline: Instant,
    latch: Latch,
}

impl TimeoutStopStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            latch: Latch::default(),
        }
    }
}

impl StopStrategy for TimeoutStopStrategy {
    fn should_stop(&self) -> bool {
        self.latch.check(|| Instant::now() >= self.deadline)
    }

    fn name(&self) -> &'static str {
        "timeout"
    }
}

/// Stops once at least `limit` states were collected.
pub struct CollectedStatesLimitStopStrategy {
    limit: usize,
    collected: Box<dyn Fn() -> usize>,
    latch: Latch,
}

impl Debug for CollectedStatesLimitStopStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectedStatesLimitStopStrategy")
            .field("limit", &self.limit)
            .field("collected", &(self.collected)())
            .finish()
    }
}

impl CollectedStatesLimitStopStrategy {
    pub fn new(limit: usize, collected: impl Fn() -> usize + 'static) -> Self {
        Self {
            limit,
            collected: Box::new(collected),
            latch: Latch::default(),
        }
    }
}

impl StopStrategy for CollectedStatesLimitStopStrategy {
    fn should_stop(&self) -> bool {
        self.latch.check(|| (self.collected)() >= self.limit)
    }

    fn name(&self) -> &'static str {
        "collected-states-limit"
    }
}

/// Stops once every target was reached.
#[derive(Debug)]
pub struct TargetsReachedStopStrategy<S> {
    targets: Rc<TargetsStatistics<S>>,
    latch: Latch,
}

impl<S> TargetsReachedStopStrategy<S> {
    pub fn new(targets: Rc<TargetsStatistics<S>>) -> Self {
        Self {
            targets,
            latch: Latch::default(),
        }
    }
}

impl<S: Clone + Eq + Hash> StopStrategy for TargetsReachedStopStrategy<S> {
    fn should_stop(&self) -> bool {
        self.latch.check(|| self.targets.all_reached())
    }

    fn name(&self) -> &'static str {
        "targets-reached"
    }
}

/// Stops once targets remain but no live state can reach any of them.
///
/// Reachability follows [`ApplicationGraph::successors`]; with
/// [`ReachabilityPolicy::Interprocedural`] it also enters the entry points of callees. Returns into
/// callers are not followed under either policy.
pub struct UnreachableTargetsStopStrategy<G: ApplicationGraph> {
    graph: Rc<G>,
    targets: Rc<TargetsStatistics<G::Statement>>,
    policy: ReachabilityPolicy,
    latch: Latch,
}

impl<G: ApplicationGraph> Debug for UnreachableTargetsStopStrategy<G> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnreachableTargetsStopStrategy")
            .field("policy", &self.policy)
            .field("remaining", &self.targets.remaining())
            .finish()
    }
}

impl<G: ApplicationGraph> UnreachableTargetsStopStrategy<G> {
    pub fn new(graph: Rc<G>, targets: Rc<TargetsStatistics<G::Statement>>, policy: ReachabilityPolicy) -> Self {
        Self {
            graph,
            targets,
            policy,
            latch: Latch::default(),
        }
    }

    fn any_target_reachable(&self) -> bool {
        let remaining: HashSet<G::Statement> = self.targets.remaining().into_iter().collect();
        if remaining.is_empty() {
            return false;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        for s in self.targets.frontier() {
            if visited.insert(s.clone()) {
                queue.push_back(s);
            }
        }
        while let Some(s) = queue.pop_front() {
            if remaining.contains(&s) {
                trace!("target {:?} is still reachable", s);
                return true;
            }
            let mut next = self.graph.successors(&s);
            if self.policy == ReachabilityPolicy::Interprocedural {
                for callee in self.graph.callees(&s) {
                    next.extend(self.graph.entry_points(&callee));
                }
            }
            for n in next {
                if visited.insert(n.clone()) {
                    queue.push_back(n);
                }
            }
        }
        false
    }
}

impl<G: ApplicationGraph> StopStrategy for UnreachableTargetsStopStrategy<G> {
    fn should_stop(&self) -> bool {
        self.latch
            .check(|| !self.targets.all_reached() && !self.any_target_reachable())
    }

    fn name(&self) -> &'static str {
        "unreachable-targets"
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NeverStopStrategy;

impl StopStrategy for NeverStopStrategy {
    fn should_stop(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "never"
    }
}

/// Disjunction of strategies.
#[derive(Default)]
pub struct GroupedStopStrategy {
    strategies: Vec<Box<dyn StopStrategy>>,
}

impl Debug for GroupedStopStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("GroupedStopStrategy").field("strategies", &names).finish()
    }
}

impl GroupedStopStrategy {
    pub fn new(strategies: Vec<Box<dyn StopStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn push(&mut self, strategy: impl StopStrategy + 'static) {
        self.strategies.push(Box::new(strategy));
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Names of the strategies answering `true` right now.
    pub fn fired(&self) -> Vec<&'static str> {
        self.strategies
            .iter()
            .filter(|s| s.should_stop())
            .map(|s| s.name())
            .collect()
    }
}

impl StopStrategy for GroupedStopStrategy {
    fn should_stop(&self) -> bool {
        // Poll every member so that each one latches on its own.
        let mut stop = false;
        for s in &self.strategies {
            stop |= s.should_stop();
        }
        stop
    }

    fn name(&self) -> &'static str {
        "grouped"
    }
}

/// Counters and program structure the stop strategies observe.
pub struct StopSources<G: ApplicationGraph> {
    pub graph: Rc<G>,
    pub steps: Rc<StepsStatistics>,
    pub coverage: Rc<CoverageStatistics<G::Statement>>,
    pub targets: Rc<TargetsStatistics<G::Statement>>,
    pub collected: Rc<Cell<usize>>,
}

impl<G: ApplicationGraph> Clone for StopSources<G> {
    fn clone(&self) -> Self {
        Self {
            graph: Rc::clone(&self.graph),
            steps: Rc::clone(&self.steps),
            coverage: Rc::clone(&self.coverage),
            targets: Rc::clone(&self.targets),
            collected: Rc::clone(&self.collected),
        }
    }
}

impl<G: ApplicationGraph> StopSources<G> {
    pub fn new(graph: Rc<G>, targets: impl IntoIterator<Item = G::Statement>) -> Self {
        Self {
            graph,
            steps: Rc::new(StepsStatistics::new()),
            coverage: Rc::new(CoverageStatistics::new()),
            targets: Rc::new(TargetsStatistics::new(targets)),
            collected: Rc::new(Cell::new(0)),
        }
    }
}

/// Group every strategy enabled in `options`.
///
/// With nothing enabled the group never stops, and the run ends when no state is left.
pub fn create_stop_strategy<G>(options: &StopOptions, sources: &StopSources<G>) -> GroupedStopStrategy
where
    G: ApplicationGraph + 'static,
{
    debug!("create_stop_strategy(options = {:?})", options);
    let mut group = GroupedStopStrategy::default();
    if let Some(limit) = options.step_limit {
        group.push(StepLimitStopStrategy::new(limit, Rc::clone(&sources.steps)));
    }
    if let Some(limit) = options.steps_from_last_covered {
        group.push(StepsFromLastCoveredStopStrategy::new(limit, Rc::clone(&sources.coverage)));
    }
    if let Some(timeout) = options.timeout {
        group.push(TimeoutStopStrategy::new(timeout));
    }
    if let Some(limit) = options.collected_states_limit {
        let collected = Rc::clone(&sources.collected);
        group.push(CollectedStatesLimitStopStrategy::new(limit, move || collected.get()));
    }
    if options.stop_on_targets_reached {
        group.push(TargetsReachedStopStrategy::new(Rc::clone(&sources.targets)));
    }
    if let Some(policy) = options.stop_on_unreachable_targets {
        group.push(UnreachableTargetsStopStrategy::new(
            Rc::clone(&sources.graph),
            Rc::clone(&sources.targets),
            policy,
        ));
    }
    if group.is_empty() {
        group.push(NeverStopStrategy);
    }
    info!("stop strategies: {:?}", group);
    group
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::graph::tests::diamond;

    #[test]
    fn test_grouped_is_order_independent() {
        let coverage = Rc::new(CoverageStatistics::<u32>::new());
        let make = |reversed: bool| {
            let mut strategies: Vec<Box<dyn StopStrategy>> = vec![
                Box::new(StepsFromLastCoveredStopStrategy::new(5, Rc::clone(&coverage))),
                Box::new(NeverStopStrategy),
            ];
            if reversed {
                strategies.reverse();
            }
            GroupedStopStrategy::new(strategies)
        };
        let forward = make(false);
        let backward = make(true);

        coverage.on_step(&1u32);
        for step in 1..=8u64 {
            coverage.on_step(&1u32);
            let expected = step > 5;
            assert_eq!(forward.should_stop(), expected, "step {}", step);
            assert_eq!(backward.should_stop(), expected, "step {}", step);
        }
        assert_eq!(forward.fired(), vec!["steps-from-last-covered"]);
    }

    #[test]
    fn test_latched() {
        let coverage = Rc::new(CoverageStatistics::new());
        let s = StepsFromLastCoveredStopStrategy::new(1, Rc::clone(&coverage));
        coverage.on_step(&1u32);
        coverage.on_step(&1u32);
        coverage.on_step(&1u32);
        assert!(s.should_stop());
        // Covering something new resets the counter but not the answer.
        assert!(coverage.on_step(&2u32));
        assert_eq!(coverage.steps_from_last_covered(), 0);
        assert!(s.should_stop());
    }

    #[test]
    fn test_step_limit() {
        let steps = Rc::new(StepsStatistics::new());
        let s = StepLimitStopStrategy::new(2, Rc::clone(&steps));
        steps.on_step();
        steps.on_step();
        assert!(!s.should_stop());
        steps.on_step();
        assert!(s.should_stop());
    }

    #[test]
    fn test_timeout() {
        assert!(TimeoutStopStrategy::new(Duration::ZERO).should_stop());
        assert!(!TimeoutStopStrategy::new(Duration::from_secs(3600)).should_stop());
    }

    #[test]
    fn test_collected_states() {
        let collected = Rc::new(Cell::new(0));
        let c = Rc::clone(&collected);
        let s = CollectedStatesLimitStopStrategy::new(2, move || c.get());
        collected.set(1);
        assert!(!s.should_stop());
        collected.set(2);
        assert!(s.should_stop());
    }

    #[test]
    fn test_targets_reached() {
        let targets = Rc::new(TargetsStatistics::new([3u32, 4]));
        let s = TargetsReachedStopStrategy::new(Rc::clone(&targets));
        assert!(targets.on_visit(&3));
        assert!(!targets.on_visit(&3));
        assert!(!s.should_stop());
        targets.on_visit(&4);
        assert!(s.should_stop());
    }

    #[test]
    fn test_unreachable_targets_policies() {
        let graph = Rc::new(diamond());
        // 11 is in helper, called from 2.
        let targets = Rc::new(TargetsStatistics::new([11u32]));
        targets.set_frontier([2]);

        let intra = UnreachableTargetsStopStrategy::new(
            Rc::clone(&graph),
            Rc::clone(&targets),
            ReachabilityPolicy::Intraprocedural,
        );
        let inter = UnreachableTargetsStopStrategy::new(
            Rc::clone(&graph),
            Rc::clone(&targets),
            ReachabilityPolicy::Interprocedural,
        );
        assert!(!inter.should_stop());
        assert!(intra.should_stop());

        // Past the call site the helper is out of reach for both.
        targets.set_frontier([5]);
        let inter = UnreachableTargetsStopStrategy::new(graph, Rc::clone(&targets), ReachabilityPolicy::Interprocedural);
        assert!(inter.should_stop());
    }

    #[test]
    fn test_unreachable_targets_needs_remaining_targets() {
        let targets = Rc::new(TargetsStatistics::new(Vec::<u32>::new()));
        let s = UnreachableTargetsStopStrategy::new(Rc::new(diamond()), targets, ReachabilityPolicy::Intraprocedural);
        assert!(!s.should_stop());
    }

    #[test]
    fn test_create_stop_strategy() {
        let sources = StopSources::new(Rc::new(diamond()), [5u32]);
        let nothing = create_stop_strategy(&StopOptions::default(), &sources);
        assert_eq!(nothing.fired(), Vec::<&str>::new());
        assert!(!nothing.should_stop());

        let options = StopOptions {
            step_limit: Some(1),
            stop_on_targets_reached: true,
            ..StopOptions::default()
        };
        let group = create_stop_strategy(&options, &sources);
        assert_eq!(group.len(), 2);
        sources.targets.on_visit(&5);
        assert_eq!(group.fired(), vec!["targets-reached"]);
    }
}
