//! Execution states.

use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};

use crate::constraints::PathConstraints;
use crate::expr::ExprManager;
use crate::memory::Memory;
use crate::merge::{MergeGuard, Merger};
use crate::path::PathNode;
use crate::types::TypeSystem;

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a state. Forks and merges get new ids.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StateId(u64);

impl StateId {
    pub fn fresh() -> Self {
        StateId(NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for StateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// What the scheduling layer needs to know about a state.
pub trait ExecutionState: Clone + Debug {
    type Method: Clone + Eq + Hash + Debug;
    type Statement: Clone + Eq + Hash + Debug;

    fn id(&self) -> StateId;

    /// The last executed statement and the path leading to it.
    fn path(&self) -> &PathNode<Self::Statement>;

    fn current_statement(&self) -> &Self::Statement {
        self.path().statement()
    }

    /// Method executing the current statement.
    fn method(&self) -> Self::Method;

    /// A state covering both `self` and `other`, or `None` when they cannot be merged.
    fn merge_with(&self, other: &Self) -> Option<Self>;
}

/// One activation record of the call stack.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CallFrame<M, S> {
    pub method: M,
    /// Statement to continue with after the method returns.
    pub return_site: Option<S>,
}

/// State of the symbolic interpreter: call stack, path constraints, memory and path.
pub struct SymbolicState<TS: TypeSystem, M, S> {
    id: StateId,
    ctx: Rc<ExprManager>,
    call_stack: Vec<CallFrame<M, S>>,
    constraints: PathConstraints<TS>,
    memory: Memory<TS::Type>,
    path: PathNode<S>,
}

impl<TS: TypeSystem, M: Clone, S: Clone> Clone for SymbolicState<TS, M, S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            ctx: Rc::clone(&self.ctx),
            call_stack: self.call_stack.clone(),
            constraints: self.constraints.clone(),
            memory: self.memory.clone(),
            path: self.path.clone(),
        }
    }
}

impl<TS: TypeSystem, M: Debug, S: Debug> Debug for SymbolicState<TS, M, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolicState")
            .field("id", &self.id)
            .field("statement", self.path.statement())
            .field("depth", &self.call_stack.len())
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

impl<TS: TypeSystem, M: Clone, S: Clone> SymbolicState<TS, M, S> {
    /// State about to execute `entry`, the first statement of `method`.
    pub fn new(ctx: Rc<ExprManager>, type_system: Rc<TS>, method: M, entry: S) -> Self {
        Self {
            id: StateId::fresh(),
            ctx,
            call_stack: vec![CallFrame {
                method,
                return_site: None,
            }],
            constraints: PathConstraints::new(type_system),
            memory: Memory::new(),
            path: PathNode::root(entry),
        }
    }

    pub fn ctx(&self) -> &Rc<ExprManager> {
        &self.ctx
    }

    pub fn call_stack(&self) -> &[CallFrame<M, S>] {
        &self.call_stack
    }

    pub fn constraints(&self) -> &PathConstraints<TS> {
        &self.constraints
    }

    pub fn constraints_mut(&mut self) -> &mut PathConstraints<TS> {
        &mut self.constraints
    }

    pub fn memory(&self) -> &Memory<TS::Type> {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory<TS::Type> {
        &mut self.memory
    }

    /// Copy of this state with a new id.
    pub fn fork(&self) -> Self {
        let mut forked = self.clone();
        forked.id = StateId::fresh();
        trace!("fork {} -> {}", self.id, forked.id);
        forked
    }

    /// Move on to `statement` within the current method.
    pub fn advance(&mut self, statement: S) {
        self.path = self.path.child(statement);
    }

    /// Enter `method` at `entry`, returning to `return_site` afterwards.
    pub fn push_call(&mut self, method: M, entry: S, return_site: S) {
        self.call_stack.push(CallFrame {
            method,
            return_site: Some(return_site),
        });
        self.memory.push_frame();
        self.advance(entry);
    }

    /// Leave the current method and continue at its return site.
    ///
    /// Returns `false` when the outermost method returns; the state then stays where it is.
    pub fn pop_call(&mut self) -> bool {
        if self.call_stack.len() <= 1 {
            return false;
        }
        if let Some(CallFrame {
            return_site: Some(site),
            ..
        }) = self.call_stack.pop()
        {
            self.memory.pop_frame();
            self.advance(site);
        }
        true
    }
}

impl<TS, M, S> ExecutionState for SymbolicState<TS, M, S>
where
    TS: TypeSystem,
    M: Clone + Eq + Hash + Debug,
    S: Clone + Eq + Hash + Debug,
{
    type Method = M;
    type Statement = S;

    fn id(&self) -> StateId {
        self.id
    }

    fn path(&self) -> &PathNode<S> {
        &self.path
    }

    fn method(&self) -> M {
        match self.call_stack.last() {
            Some(frame) => frame.method.clone(),
            None => panic!("State {} has an empty call stack", self.id),
        }
    }

    /// States merge when they have the same call stack and the same current statement.
    ///
    /// The merged state's path constraints are the common ones plus the disjunction of each side's
    /// own constraints, and its memory reads as `self` under `self`'s own constraints and as `other`
    /// otherwise.
    fn merge_with(&self, other: &Self) -> Option<Self> {
        debug!("merge_with(left = {}, right = {})", self.id, other.id);
        if self.call_stack != other.call_stack || self.current_statement() != other.current_statement() {
            trace!("states {} and {} are at different locations", self.id, other.id);
            return None;
        }
        let ctx = self.ctx.as_ref();
        let mut guard = MergeGuard::new();
        let constraints = ctx.merge(&self.constraints, &other.constraints, &mut guard)?;
        let memory = ctx.merge(&self.memory, &other.memory, &mut guard)?;
        let merged = Self {
            id: StateId::fresh(),
            ctx: Rc::clone(&self.ctx),
            call_stack: self.call_stack.clone(),
            constraints,
            memory,
            path: self.path.clone(),
        };
        debug!("merged {} and {} into {}", self.id, other.id, merged.id);
        Some(merged)
    }
}
