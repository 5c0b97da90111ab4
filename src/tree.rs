//! Execution tree: a trie of executed statements shared by all live states.
//!
//! Nodes live in an arena and are addressed by [`TrieNodeId`]. Each node knows its parent index,
//! its children in discovery order, and the states currently resting at it. Two states that
//! executed the same statement sequence rest at the same node, even if their [`PathNode`]s are
//! different objects.

use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};

use log::{debug, trace};

use crate::path::PathNode;
use crate::state::{ExecutionState, StateId};

/// Index of a node in an [`ExecutionTree`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TrieNodeId(u32);

impl TrieNodeId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for TrieNodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug)]
struct TrieNode<S> {
    /// `None` only for the root, which precedes every first statement.
    statement: Option<S>,
    parent: Option<TrieNodeId>,
    children: Vec<TrieNodeId>,
    child_index: HashMap<S, TrieNodeId>,
    depth: usize,
    residents: Vec<StateId>,
}

#[derive(Debug)]
struct Resident<St> {
    node: TrieNodeId,
    /// Id of the path node the state was tracked with.
    path: u64,
    state: St,
}

#[derive(Debug, Copy, Clone)]
struct Representative {
    node: TrieNodeId,
    /// Tracked states whose path node this is.
    holders: usize,
}

/// Trie of statement sequences with the live states resting at its nodes.
pub struct ExecutionTree<St: ExecutionState> {
    nodes: Vec<TrieNode<St::Statement>>,
    states: HashMap<StateId, Resident<St>>,
    /// Trie nodes of the path nodes held by tracked states.
    representatives: HashMap<u64, Representative>,
}

impl<St: ExecutionState> Default for ExecutionTree<St> {
    fn default() -> Self {
        Self::new()
    }
}

impl<St: ExecutionState> Debug for ExecutionTree<St> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionTree")
            .field("nodes", &self.nodes.len())
            .field("states", &self.states.len())
            .finish()
    }
}

impl<St: ExecutionState> ExecutionTree<St> {
    pub fn new() -> Self {
        let root = TrieNode {
            statement: None,
            parent: None,
            children: Vec::new(),
            child_index: HashMap::new(),
            depth: 0,
            residents: Vec::new(),
        };
        Self {
            nodes: vec![root],
            states: HashMap::new(),
            representatives: HashMap::new(),
        }
    }

    pub fn root(&self) -> TrieNodeId {
        TrieNodeId(0)
    }

    /// Number of trie nodes, the root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn node(&self, id: TrieNodeId) -> &TrieNode<St::Statement> {
        &self.nodes[id.index()]
    }

    pub fn children_of(&self, id: TrieNodeId) -> &[TrieNodeId] {
        &self.node(id).children
    }

    pub fn parent_of(&self, id: TrieNodeId) -> Option<TrieNodeId> {
        self.node(id).parent
    }

    pub fn statement_of(&self, id: TrieNodeId) -> Option<&St::Statement> {
        self.node(id).statement.as_ref()
    }

    /// Number of statements from the root to `id`.
    pub fn depth_of(&self, id: TrieNodeId) -> usize {
        self.node(id).depth
    }

    /// States resting at `id`, in arrival order.
    pub fn states_at(&self, id: TrieNodeId) -> impl Iterator<Item = &St> + '_ {
        self.node(id)
            .residents
            .iter()
            .filter_map(move |sid| self.states.get(sid).map(|r| &r.state))
    }

    pub fn get(&self, id: StateId) -> Option<&St> {
        self.states.get(&id).map(|r| &r.state)
    }

    /// Node the state `id` rests at.
    pub fn node_of(&self, id: StateId) -> Option<TrieNodeId> {
        self.states.get(&id).map(|r| r.node)
    }

    /// Number of path nodes with a remembered trie node. Bounded by the number of live states.
    pub fn representative_count(&self) -> usize {
        self.representatives.len()
    }

    /// Canonical trie node of a path: the node reached by its statement sequence.
    pub fn representative(&mut self, path: &PathNode<St::Statement>) -> TrieNodeId {
        // Climb to the nearest path node held by a tracked state.
        let mut pending = Vec::new();
        let mut known = self.root();
        for node in path.ancestors() {
            if let Some(r) = self.representatives.get(&node.id()) {
                known = r.node;
                break;
            }
            pending.push(node);
        }
        for node in pending.into_iter().rev() {
            known = self.child_or_insert(known, node.statement());
        }
        known
    }

    fn hold(&mut self, path: u64, node: TrieNodeId) {
        self.representatives
            .entry(path)
            .or_insert(Representative { node, holders: 0 })
            .holders += 1;
    }

    fn release(&mut self, path: u64) {
        if let Some(r) = self.representatives.get_mut(&path) {
            r.holders -= 1;
            if r.holders == 0 {
                self.representatives.remove(&path);
            }
        }
    }

    fn child_or_insert(&mut self, parent: TrieNodeId, statement: &St::Statement) -> TrieNodeId {
        if let Some(&child) = self.node(parent).child_index.get(statement) {
            return child;
        }
        let id = TrieNodeId(self.nodes.len() as u32);
        trace!("new trie node {} under {} for {:?}", id, parent, statement);
        let depth = self.node(parent).depth + 1;
        self.nodes.push(TrieNode {
            statement: Some(statement.clone()),
            parent: Some(parent),
            children: Vec::new(),
            child_index: HashMap::new(),
            depth,
            residents: Vec::new(),
        });
        let p = &mut self.nodes[parent.index()];
        p.children.push(id);
        p.child_index.insert(statement.clone(), id);
        id
    }

    /// Start tracking a new state.
    ///
    /// # Panics
    ///
    /// Panics if the state is already tracked.
    pub fn add(&mut self, state: St) {
        debug!("add(state = {})", state.id());
        assert!(
            !self.states.contains_key(&state.id()),
            "State {} is already in the tree",
            state.id()
        );
        let node = self.representative(state.path());
        let path = state.path().id();
        self.hold(path, node);
        self.nodes[node.index()].residents.push(state.id());
        self.states.insert(state.id(), Resident { node, path, state });
    }

    /// Move a tracked state to its new position.
    ///
    /// # Panics
    ///
    /// Panics if the state is not tracked.
    pub fn update(&mut self, state: St) {
        debug!("update(state = {})", state.id());
        let (old, old_path) = match self.states.get(&state.id()) {
            Some(r) => (r.node, r.path),
            None => panic!("State {} is not in the tree", state.id()),
        };
        let node = self.representative(state.path());
        let path = state.path().id();
        self.hold(path, node);
        self.release(old_path);
        if node != old {
            self.unlink(old, state.id());
            self.nodes[node.index()].residents.push(state.id());
        }
        self.states.insert(state.id(), Resident { node, path, state });
    }

    /// Stop tracking a state and return it.
    pub fn remove(&mut self, id: StateId) -> Option<St> {
        debug!("remove(state = {})", id);
        let resident = self.states.remove(&id)?;
        self.release(resident.path);
        self.unlink(resident.node, id);
        Some(resident.state)
    }

    fn unlink(&mut self, node: TrieNodeId, id: StateId) {
        let residents = &mut self.nodes[node.index()].residents;
        if let Some(pos) = residents.iter().position(|&r| r == id) {
            residents.remove(pos);
        }
    }
}
