//! Application graph and control-flow distances.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;
use std::rc::Rc;

use log::{debug, trace};

use crate::cache::Cache;

/// Program structure supplied by a front-end.
pub trait ApplicationGraph {
    type Method: Clone + Eq + Hash + Debug;
    type Statement: Clone + Eq + Hash + Debug;

    /// Intraprocedural successors of `stmt`.
    fn successors(&self, stmt: &Self::Statement) -> Vec<Self::Statement>;

    /// Methods `stmt` may call.
    fn callees(&self, stmt: &Self::Statement) -> Vec<Self::Method>;

    fn entry_points(&self, method: &Self::Method) -> Vec<Self::Statement>;

    fn method_of(&self, stmt: &Self::Statement) -> Self::Method;
}

/// Number of control-flow edges between two statements, or infinity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Distance(u32);

impl Distance {
    pub const ZERO: Distance = Distance(0);
    pub const INFINITE: Distance = Distance(u32::MAX);

    pub const fn new(edges: u32) -> Self {
        Distance(edges)
    }

    pub fn is_finite(self) -> bool {
        self != Self::INFINITE
    }

    /// The number of edges, if finite.
    pub fn get(self) -> Option<u32> {
        self.is_finite().then_some(self.0)
    }
}

impl Display for Distance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_finite() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "∞")
        }
    }
}

/// Shortest intraprocedural distance between statements of one method.
pub trait CfgDistanceOracle<M, S> {
    fn shortest_distance(&self, method: &M, from: &S, to: &S) -> Distance;
}

/// Distance oracle running a breadth-first search over [`ApplicationGraph::successors`] and
/// remembering every answer.
pub struct MemoizedCfgDistance<G: ApplicationGraph> {
    graph: Rc<G>,
    cache: RefCell<Cache<(G::Statement, G::Statement), Distance>>,
}

impl<G: ApplicationGraph> Debug for MemoizedCfgDistance<G> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let cache = self.cache.borrow();
        f.debug_struct("MemoizedCfgDistance")
            .field("cached", &cache.len())
            .field("hits", &cache.hits())
            .field("misses", &cache.misses())
            .finish()
    }
}

impl<G: ApplicationGraph> MemoizedCfgDistance<G> {
    pub fn new(graph: Rc<G>) -> Self {
        Self {
            graph,
            cache: RefCell::new(Cache::new()),
        }
    }

    pub fn graph(&self) -> &Rc<G> {
        &self.graph
    }

    /// Number of searches actually run.
    pub fn searches(&self) -> usize {
        self.cache.borrow().misses()
    }

    fn search(&self, method: &G::Method, from: &G::Statement, to: &G::Statement) -> Distance {
        trace!("search(from = {:?}, to = {:?})", from, to);
        let mut visited = HashSet::from([from.clone()]);
        let mut queue = VecDeque::from([(from.clone(), 0u32)]);
        while let Some((stmt, dist)) = queue.pop_front() {
            if stmt == *to {
                return Distance::new(dist);
            }
            for next in self.graph.successors(&stmt) {
                if self.graph.method_of(&next) == *method && visited.insert(next.clone()) {
                    queue.push_back((next, dist + 1));
                }
            }
        }
        Distance::INFINITE
    }
}

impl<G: ApplicationGraph> CfgDistanceOracle<G::Method, G::Statement> for MemoizedCfgDistance<G> {
    fn shortest_distance(&self, method: &G::Method, from: &G::Statement, to: &G::Statement) -> Distance {
        debug!("shortest_distance(from = {:?}, to = {:?})", from, to);
        let key = (from.clone(), to.clone());
        if let Some(d) = self.cache.borrow_mut().get(&key) {
            return d;
        }
        let d = self.search(method, from, to);
        self.cache.borrow_mut().insert(key, d);
        d
    }
}

/// Application graph given by explicit statements and edges.
///
/// Statements are numbers, methods are names. The first statement added to a method is its entry
/// point.
///
/// ```
/// use symex_rs::graph::{ApplicationGraph, ExplicitGraph};
///
/// let mut g = ExplicitGraph::new();
/// g.add_statements("main", [1, 2, 3]);
/// g.add_edge(1, 2);
/// g.add_edge(2, 3);
/// assert_eq!(g.entry_points(&"main".to_string()), vec![1]);
/// assert_eq!(g.successors(&2), vec![3]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExplicitGraph {
    methods: HashMap<u32, String>,
    entries: HashMap<String, Vec<u32>>,
    successors: HashMap<u32, Vec<u32>>,
    callees: HashMap<u32, Vec<String>>,
}

impl ExplicitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if a statement already belongs to a method.
    pub fn add_statements(&mut self, method: &str, stmts: impl IntoIterator<Item = u32>) {
        for stmt in stmts {
            if let Some(owner) = self.methods.get(&stmt) {
                panic!("Statement {} already belongs to {}", stmt, owner);
            }
            self.methods.insert(stmt, method.to_string());
            let entries = self.entries.entry(method.to_string()).or_default();
            if entries.is_empty() {
                entries.push(stmt);
            }
        }
    }

    pub fn add_edge(&mut self, from: u32, to: u32) {
        self.check_known(from);
        self.check_known(to);
        self.successors.entry(from).or_default().push(to);
    }

    pub fn add_call(&mut self, stmt: u32, callee: &str) {
        self.check_known(stmt);
        self.callees.entry(stmt).or_default().push(callee.to_string());
    }

    fn check_known(&self, stmt: u32) {
        assert!(self.methods.contains_key(&stmt), "Statement {} is not registered", stmt);
    }
}

impl ApplicationGraph for ExplicitGraph {
    type Method = String;
    type Statement = u32;

    fn successors(&self, stmt: &u32) -> Vec<u32> {
        self.successors.get(stmt).cloned().unwrap_or_default()
    }

    fn callees(&self, stmt: &u32) -> Vec<String> {
        self.callees.get(stmt).cloned().unwrap_or_default()
    }

    fn entry_points(&self, method: &String) -> Vec<u32> {
        self.entries.get(method).cloned().unwrap_or_default()
    }

    fn method_of(&self, stmt: &u32) -> String {
        match self.methods.get(stmt) {
            Some(method) => method.clone(),
            None => panic!("Statement {} is not registered", stmt),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use test_log::test;

    use super::*;

    /// ```text
    /// main: 1 -> 2 -> 3 -> 5
    ///            \-> 4 -/
    ///       2 calls helper
    /// helper: 10 -> 11
    /// ```
    pub(crate) fn diamond() -> ExplicitGraph {
        let mut g = ExplicitGraph::new();
        g.add_statements("main", [1, 2, 3, 4, 5]);
        g.add_statements("helper", [10, 11]);
        g.add_edge(1, 2);
        g.add_edge(2, 3);
        g.add_edge(2, 4);
        g.add_edge(3, 5);
        g.add_edge(4, 5);
        g.add_edge(10, 11);
        g.add_call(2, "helper");
        g
    }

    #[test]
    fn test_explicit_graph() {
        let g = diamond();
        assert_eq!(g.successors(&2), vec![3, 4]);
        assert_eq!(g.successors(&5), Vec::<u32>::new());
        assert_eq!(g.callees(&2), vec!["helper".to_string()]);
        assert_eq!(g.entry_points(&"helper".to_string()), vec![10]);
        assert_eq!(g.method_of(&11), "helper");
    }

    #[test]
    #[should_panic(expected = "Statement 7 is not registered")]
    fn test_unknown_statement() {
        let mut g = diamond();
        g.add_edge(1, 7);
    }

    #[test]
    fn test_distances() {
        let oracle = MemoizedCfgDistance::new(Rc::new(diamond()));
        let main = "main".to_string();
        assert_eq!(oracle.shortest_distance(&main, &1, &5), Distance::new(3));
        assert_eq!(oracle.shortest_distance(&main, &3, &3), Distance::ZERO);
        assert_eq!(oracle.shortest_distance(&main, &5, &1), Distance::INFINITE);
        assert_eq!(oracle.shortest_distance(&main, &1, &5), Distance::new(3));
        assert_eq!(oracle.searches(), 3);
    }

    #[test]
    fn test_distance_display() {
        assert_eq!(Distance::new(4).to_string(), "4");
        assert_eq!(Distance::INFINITE.to_string(), "∞");
        assert_eq!(Distance::INFINITE.get(), None);
        assert!(Distance::new(1) < Distance::INFINITE);
    }
}
