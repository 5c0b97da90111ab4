//! Guarded merge bookkeeping.

use std::cell::Cell;

use log::trace;

use crate::expr::{ExprManager, ExprRef, Sort};

/// Merges two entities of type `T` into one, or reports them as non-mergeable.
///
/// Mergeability is decided by the entity: a merger returns `None` when the entities differ in
/// structure (call stacks, frame layouts, allocated types, ...). On success the merger must have
/// recorded in `by` every constraint that distinguishes `left` from `right`.
pub trait Merger<T> {
    fn merge(&self, left: &T, right: &T, by: &mut MergeGuard) -> Option<T>;
}

/// The two formulas telling which side of a merge a value comes from.
///
/// `this` collects the constraints only the left entity has, `other` those only the right entity
/// has. Their conjunctions are built on demand and memoized until the next append.
#[derive(Debug, Default)]
pub struct MergeGuard {
    this: Vec<ExprRef>,
    other: Vec<ExprRef>,
    this_memo: Cell<Option<ExprRef>>,
    other_memo: Cell<Option<ExprRef>>,
}

impl MergeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_this(&mut self, constraint: ExprRef) {
        self.this.push(constraint);
        self.this_memo.set(None);
    }

    pub fn append_other(&mut self, constraint: ExprRef) {
        self.other.push(constraint);
        self.other_memo.set(None);
    }

    pub fn this(&self) -> &[ExprRef] {
        &self.this
    }

    pub fn other(&self) -> &[ExprRef] {
        &self.other
    }

    /// Whether no constraint distinguishes the sides yet.
    pub fn is_empty(&self) -> bool {
        self.this.is_empty() && self.other.is_empty()
    }

    /// Conjunction of the left-only constraints.
    pub fn this_constraint(&self, ctx: &ExprManager) -> ExprRef {
        Self::memoized(&self.this_memo, || ctx.mk_and(self.this.iter().copied()))
    }

    /// Conjunction of the right-only constraints.
    pub fn other_constraint(&self, ctx: &ExprManager) -> ExprRef {
        Self::memoized(&self.other_memo, || ctx.mk_and(self.other.iter().copied()))
    }

    fn memoized(memo: &Cell<Option<ExprRef>>, build: impl FnOnce() -> ExprRef) -> ExprRef {
        if let Some(e) = memo.get() {
            return e;
        }
        let e = build();
        memo.set(Some(e));
        e
    }

    /// Make the sides mutually exclusive when one of them has no constraint of its own.
    ///
    /// A side without own constraints is implied by the other one, so a merged value would always
    /// read as the left one where both apply. A fresh boolean selects between the sides instead.
    pub fn ensure_distinguished(&mut self, ctx: &ExprManager) {
        if !self.this.is_empty() && !self.other.is_empty() {
            return;
        }
        let selector = ctx.mk_fresh("merge", Sort::Bool);
        trace!("distinguish merged sides by {}", ctx.display(selector));
        self.append_this(selector);
        self.append_other(ctx.mk_not(selector));
    }
}
