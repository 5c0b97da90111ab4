//! Persistent execution paths.

use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PATH_ID: AtomicU64 = AtomicU64::new(0);

struct PathNodeData<S> {
    id: u64,
    statement: S,
    parent: Option<PathNode<S>>,
    depth: usize,
}

/// The last statement executed by a state, linked to the path that led there.
///
/// Extending a path is constant time and shares the prefix, so forked states keep sharing their
/// common history. Every node has a process-unique id.
pub struct PathNode<S> {
    inner: Rc<PathNodeData<S>>,
}

impl<S> Clone for PathNode<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S> PartialEq for PathNode<S> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<S> Eq for PathNode<S> {}

impl<S: Debug> Debug for PathNode<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathNode")
            .field("id", &self.inner.id)
            .field("statement", &self.inner.statement)
            .field("depth", &self.inner.depth)
            .finish()
    }
}

impl<S> Drop for PathNode<S> {
    fn drop(&mut self) {
        // Unlink uniquely owned ancestors one by one, long paths would overflow the stack otherwise.
        let mut parent = match Rc::get_mut(&mut self.inner) {
            Some(data) => data.parent.take(),
            None => return,
        };
        while let Some(mut node) = parent {
            parent = match Rc::get_mut(&mut node.inner) {
                Some(data) => data.parent.take(),
                None => None,
            };
        }
    }
}

impl<S> PathNode<S> {
    /// Path consisting of a single statement.
    pub fn root(statement: S) -> Self {
        Self::new(statement, None, 0)
    }

    fn new(statement: S, parent: Option<PathNode<S>>, depth: usize) -> Self {
        Self {
            inner: Rc::new(PathNodeData {
                id: NEXT_PATH_ID.fetch_add(1, Ordering::Relaxed),
                statement,
                parent,
                depth,
            }),
        }
    }

    /// This path extended with `statement`.
    pub fn child(&self, statement: S) -> Self {
        Self::new(statement, Some(self.clone()), self.inner.depth + 1)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn statement(&self) -> &S {
        &self.inner.statement
    }

    pub fn parent(&self) -> Option<&PathNode<S>> {
        self.inner.parent.as_ref()
    }

    /// Number of statements before this one.
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Iterate from this node up to the first statement.
    pub fn ancestors(&self) -> Ancestors<'_, S> {
        Ancestors { cur: Some(self) }
    }

    /// Statements of the path, first to last.
    pub fn statements(&self) -> Vec<S>
    where
        S: Clone,
    {
        let mut result: Vec<S> = self.ancestors().map(|node| node.statement().clone()).collect();
        result.reverse();
        result
    }
}

pub struct Ancestors<'a, S> {
    cur: Option<&'a PathNode<S>>,
}

impl<'a, S> Iterator for Ancestors<'a, S> {
    type Item = &'a PathNode<S>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.cur?;
        self.cur = node.parent();
        Some(node)
    }
}
