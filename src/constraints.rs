//! Path constraints of one execution state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use log::{debug, trace};

use crate::expr::{Expr, ExprManager, ExprRef};
use crate::merge::{MergeGuard, Merger};
use crate::types::{TypeRegion, TypeSystem};

struct ConstraintCell {
    constraint: ExprRef,
    next: Option<Rc<ConstraintCell>>,
}

/// Persistent conjunction of boolean constraints plus the type region of every constrained
/// reference.
///
/// Forking a state clones its constraints in constant time: the constraint list is shared.
pub struct PathConstraints<TS: TypeSystem> {
    head: Option<Rc<ConstraintCell>>,
    len: usize,
    types: BTreeMap<ExprRef, TypeRegion<TS>>,
    type_system: Rc<TS>,
    unsat: bool,
}

impl<TS: TypeSystem> Clone for PathConstraints<TS> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
            types: self.types.clone(),
            type_system: Rc::clone(&self.type_system),
            unsat: self.unsat,
        }
    }
}

impl<TS: TypeSystem> Debug for PathConstraints<TS> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathConstraints")
            .field("constraints", &self.constraints())
            .field("types", &self.types)
            .field("unsat", &self.unsat)
            .finish()
    }
}

impl<TS: TypeSystem> PathConstraints<TS> {
    pub fn new(type_system: Rc<TS>) -> Self {
        Self {
            head: None,
            len: 0,
            types: BTreeMap::new(),
            type_system,
            unsat: false,
        }
    }

    pub fn type_system(&self) -> &Rc<TS> {
        &self.type_system
    }

    /// Number of boolean constraints.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the constraints are known to be contradictory.
    pub fn is_unsat(&self) -> bool {
        self.unsat
    }

    /// Boolean constraints in the order they were added.
    pub fn constraints(&self) -> Vec<ExprRef> {
        let mut result = Vec::with_capacity(self.len);
        let mut cur = self.head.as_deref();
        while let Some(cell) = cur {
            result.push(cell.constraint);
            cur = cell.next.as_deref();
        }
        result.reverse();
        result
    }

    /// The boolean constraints as one formula.
    pub fn conjunction(&self, ctx: &ExprManager) -> ExprRef {
        if self.unsat {
            return ctx.mk_false();
        }
        ctx.mk_and(self.constraints())
    }

    /// Add a boolean constraint. Conjunctions are split into their operands.
    pub fn add(&mut self, ctx: &ExprManager, constraint: ExprRef) {
        debug!("add(constraint = {})", ctx.display(constraint));
        match &*ctx.expr(constraint) {
            Expr::True => {}
            Expr::False => {
                trace!("constraints became unsat");
                self.unsat = true;
            }
            Expr::And(args) => {
                for &a in args {
                    self.add(ctx, a);
                }
            }
            _ => self.push(constraint),
        }
    }

    fn push(&mut self, constraint: ExprRef) {
        self.head = Some(Rc::new(ConstraintCell {
            constraint,
            next: self.head.take(),
        }));
        self.len += 1;
    }

    /// Type region of `r`; the top region when `r` is unconstrained.
    pub fn type_region(&self, r: ExprRef) -> TypeRegion<TS> {
        match self.types.get(&r) {
            Some(region) => region.clone(),
            None => TypeRegion::top(Rc::clone(&self.type_system)),
        }
    }

    /// Add `type(r) <: ty`.
    pub fn add_is_subtype(&mut self, r: ExprRef, ty: &TS::Type) {
        debug!("add_is_subtype(ref = {}, ty = {:?})", r, ty);
        let region = self.type_region(r).add_supertype(ty);
        self.set_type_region(r, region);
    }

    /// Add `type(r) </: ty`.
    pub fn add_not_subtype(&mut self, r: ExprRef, ty: &TS::Type) {
        debug!("add_not_subtype(ref = {}, ty = {:?})", r, ty);
        let region = self.type_region(r).exclude_supertype(ty);
        self.set_type_region(r, region);
    }

    fn set_type_region(&mut self, r: ExprRef, region: TypeRegion<TS>) {
        if region.is_contradiction() {
            trace!("type constraints on {} are contradictory", r);
            self.unsat = true;
        }
        self.types.insert(r, region);
    }

    /// References with a type region.
    pub fn constrained_refs(&self) -> impl Iterator<Item = ExprRef> + '_ {
        self.types.keys().copied()
    }

    /// Constraints holding on both sides, with each side's own constraints recorded in `by`.
    ///
    /// The merged constraints keep the common boolean constraints and require one of the sides to
    /// hold. Type regions equal on both sides are kept; differing ones are dropped. Returns `None`
    /// when either side is unsatisfiable.
    pub fn merge(ctx: &ExprManager, left: &Self, right: &Self, by: &mut MergeGuard) -> Option<Self> {
        debug!("merge(left = {}, right = {})", left.len, right.len);
        if left.unsat || right.unsat {
            return None;
        }
        let left_constraints = left.constraints();
        let right_constraints = right.constraints();
        let left_set: BTreeSet<ExprRef> = left_constraints.iter().copied().collect();
        let right_set: BTreeSet<ExprRef> = right_constraints.iter().copied().collect();

        let mut merged = Self::new(Rc::clone(&left.type_system));
        for &c in &left_constraints {
            if right_set.contains(&c) {
                merged.push(c);
            } else {
                by.append_this(c);
            }
        }
        for &c in &right_constraints {
            if !left_set.contains(&c) {
                by.append_other(c);
            }
        }
        by.ensure_distinguished(ctx);
        trace!("merge overlap: {} constraints", merged.len);

        merged.add(ctx, ctx.mk_or2(by.this_constraint(ctx), by.other_constraint(ctx)));
        merged.types = left
            .types
            .iter()
            .filter(|&(r, region)| right.types.get(r) == Some(region))
            .map(|(&r, region)| (r, region.clone()))
            .collect();
        Some(merged)
    }
}

impl<TS: TypeSystem> Merger<PathConstraints<TS>> for ExprManager {
    fn merge(&self, left: &PathConstraints<TS>, right: &PathConstraints<TS>, by: &mut MergeGuard) -> Option<PathConstraints<TS>> {
        PathConstraints::merge(self, left, right, by)
    }
}
