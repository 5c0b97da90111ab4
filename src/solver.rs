//! Satisfiability checks of path constraints.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::RangeInclusive;

use log::{debug, trace};

use crate::error::SolverError;
use crate::expr::{Expr, ExprManager, ExprRef, Sort, NULL_ADDRESS};
use crate::model::{Model, Value};

/// Answer of a satisfiability check.
#[derive(Debug, Clone)]
pub enum SolverResult {
    Sat(Model),
    Unsat,
    Unknown,
}

impl SolverResult {
    pub fn is_sat(&self) -> bool {
        matches!(self, SolverResult::Sat(_))
    }

    pub fn is_unsat(&self) -> bool {
        matches!(self, SolverResult::Unsat)
    }
}

/// Decision procedure for conjunctions of boolean expressions.
pub trait Solver {
    fn check(&mut self, assertions: &[ExprRef]) -> Result<SolverResult, SolverError>;
}

impl<T: Solver + ?Sized> Solver for Box<T> {
    fn check(&mut self, assertions: &[ExprRef]) -> Result<SolverResult, SolverError> {
        (**self).check(assertions)
    }
}

/// Model search over a bounded domain.
///
/// Boolean constants take both values. Integer constants range over `int_domain`, except those an
/// assertion pins to a literal (`x = 5`), which take only that value. Address constants range over
/// `null`, the addresses mentioned in the assertions and one unmentioned address per address
/// constant, which covers every way of aliasing them.
///
/// A failed search answers `Unsat` only when every domain was complete, that is when no unpinned
/// integer constant occurs. Otherwise the answer is `Unknown`, as it is when there are more than
/// `max_candidates` assignments to try.
///
/// Reads of input collections are not supported.
#[derive(Debug)]
pub struct BoundedSolver<'a> {
    ctx: &'a ExprManager,
    int_domain: RangeInclusive<i64>,
    max_candidates: u64,
    checks: usize,
}

/// Constants of a query and the addresses it mentions.
struct Vocabulary {
    constants: Vec<ExprRef>,
    addresses: BTreeSet<u64>,
}

impl<'a> BoundedSolver<'a> {
    pub fn new(ctx: &'a ExprManager, int_domain: RangeInclusive<i64>) -> Self {
        Self {
            ctx,
            int_domain,
            max_candidates: 1 << 20,
            checks: 0,
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: u64) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    /// Number of `check` calls so far.
    pub fn checks(&self) -> usize {
        self.checks
    }

    fn collect(&self, assertions: &[ExprRef]) -> Result<Vocabulary, SolverError> {
        let mut constants = BTreeSet::new();
        let mut addresses = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<ExprRef> = assertions.to_vec();
        while let Some(e) = stack.pop() {
            if !visited.insert(e) {
                continue;
            }
            match &*self.ctx.expr(e) {
                Expr::True | Expr::False | Expr::Int(_) => {}
                Expr::Addr(a) => {
                    addresses.insert(*a);
                }
                Expr::Const { .. } => {
                    constants.insert(e);
                }
                Expr::Not(x) => stack.push(*x),
                Expr::And(xs) | Expr::Or(xs) => stack.extend(xs.iter().copied()),
                Expr::Eq(a, b) | Expr::Le(a, b) | Expr::Add(a, b) => stack.extend([*a, *b]),
                Expr::Ite(c, t, f) => stack.extend([*c, *t, *f]),
                Expr::InputRead { collection, .. } => {
                    return Err(SolverError::Unsupported(format!(
                        "read of input collection {}",
                        self.ctx.collection_name(*collection)
                    )));
                }
            }
        }
        Ok(Vocabulary {
            constants: constants.into_iter().collect(),
            addresses,
        })
    }

    /// Integer constants fixed by a top-level `x = literal` assertion.
    ///
    /// Returns `None` when some constant is pinned to two different values.
    fn pinned_ints(&self, assertions: &[ExprRef]) -> Option<HashMap<ExprRef, i64>> {
        let is_int_const = |e: ExprRef| matches!(*self.ctx.expr(e), Expr::Const { sort: Sort::Int, .. });
        let mut pins = HashMap::new();
        for &a in assertions {
            let (c, v) = match *self.ctx.expr(a) {
                Expr::Eq(l, r) => match (self.ctx.as_int(l), self.ctx.as_int(r)) {
                    (None, Some(v)) if is_int_const(l) => (l, v),
                    (Some(v), None) if is_int_const(r) => (r, v),
                    _ => continue,
                },
                _ => continue,
            };
            if *pins.entry(c).or_insert(v) != v {
                trace!("{} is pinned to two values", self.ctx.display(c));
                return None;
            }
        }
        Some(pins)
    }

    /// Candidate values of a constant, and whether they cover every value that matters.
    fn domain_of(&self, c: ExprRef, vocabulary: &Vocabulary, pins: &HashMap<ExprRef, i64>) -> (Vec<Value>, bool) {
        match self.ctx.sort(c) {
            Sort::Bool => (vec![Value::Bool(false), Value::Bool(true)], true),
            Sort::Int => match pins.get(&c) {
                Some(&v) => (vec![Value::Int(v)], true),
                None => (self.int_domain.clone().map(Value::Int).collect(), false),
            },
            Sort::Addr => {
                let mut values = vocabulary.addresses.clone();
                values.insert(NULL_ADDRESS);
                let address_constants = vocabulary
                    .constants
                    .iter()
                    .filter(|&&k| self.ctx.sort(k) == Sort::Addr)
                    .count() as u64;
                let first_unused = values.iter().max().map_or(1, |&m| m + 1);
                values.extend(first_unused..first_unused + address_constants);
                (values.into_iter().map(Value::Addr).collect(), true)
            }
        }
    }
}

impl Solver for BoundedSolver<'_> {
    fn check(&mut self, assertions: &[ExprRef]) -> Result<SolverResult, SolverError> {
        debug!("check({} assertions)", assertions.len());
        self.checks += 1;
        if self.ctx.is_false(self.ctx.mk_and(assertions.iter().copied())) {
            return Ok(SolverResult::Unsat);
        }
        let vocabulary = self.collect(assertions)?;
        let pins = match self.pinned_ints(assertions) {
            Some(pins) => pins,
            None => return Ok(SolverResult::Unsat),
        };
        let mut complete = true;
        let domains: Vec<Vec<Value>> = vocabulary
            .constants
            .iter()
            .map(|&c| {
                let (values, covers) = self.domain_of(c, &vocabulary, &pins);
                complete &= covers;
                values
            })
            .collect();

        let total = domains
            .iter()
            .try_fold(1u64, |acc, d| acc.checked_mul(d.len() as u64));
        match total {
            Some(n) if n <= self.max_candidates => trace!("{} candidate assignments", n),
            _ => {
                debug!("too many candidate assignments");
                return Ok(SolverResult::Unknown);
            }
        }
        let exhausted = if complete {
            SolverResult::Unsat
        } else {
            SolverResult::Unknown
        };
        if domains.iter().any(|d| d.is_empty()) {
            return Ok(exhausted);
        }

        // Odometer over the domains.
        let constants = &vocabulary.constants;
        let mut digits = vec![0usize; constants.len()];
        loop {
            let mut model = Model::new();
            for (i, &c) in constants.iter().enumerate() {
                model.assign(c, domains[i][digits[i]]);
            }
            if assertions.iter().all(|&a| self.ctx.eval(a, &model).as_bool()) {
                debug!("found a model");
                return Ok(SolverResult::Sat(model));
            }
            let mut pos = 0;
            loop {
                if pos == digits.len() {
                    debug!("no model in the bounded domain, complete = {}", complete);
                    return Ok(exhausted);
                }
                digits[pos] += 1;
                if digits[pos] < domains[pos].len() {
                    break;
                }
                digits[pos] = 0;
                pos += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::collection::CollectionId;

    #[test]
    fn test_sat_and_unsat() {
        let ctx = ExprManager::new();
        let x = ctx.mk_const("x", Sort::Int);
        let y = ctx.mk_const("y", Sort::Int);
        let mut solver = BoundedSolver::new(&ctx, -4..=4);

        // 0 < x, x + y = 1, y < 0
        let assertions = [
            ctx.mk_lt(ctx.mk_int(0), x),
            ctx.mk_eq(ctx.mk_add(x, y), ctx.mk_int(1)),
            ctx.mk_lt(y, ctx.mk_int(0)),
        ];
        match solver.check(&assertions).unwrap() {
            SolverResult::Sat(model) => {
                for a in assertions {
                    assert_eq!(ctx.eval(a, &model), Value::Bool(true));
                }
            }
            other => panic!("expected a model, got {:?}", other),
        }

        let p = ctx.mk_lt(ctx.mk_int(0), x);
        assert!(solver.check(&[p, ctx.mk_not(p)]).unwrap().is_unsat());
        assert!(solver.check(&[ctx.mk_false()]).unwrap().is_unsat());
        assert!(solver.check(&[]).unwrap().is_sat());
        assert_eq!(solver.checks(), 4);
    }

    #[test]
    fn test_addresses() {
        let ctx = ExprManager::new();
        let r = ctx.mk_const("r", Sort::Addr);
        let mut solver = BoundedSolver::new(&ctx, 0..=0);
        let not_null = ctx.mk_not(ctx.mk_eq(r, ctx.null()));
        let not_a = ctx.mk_not(ctx.mk_eq(r, ctx.mk_addr(1)));
        assert!(solver.check(&[not_null, not_a]).unwrap().is_sat());
    }

    #[test]
    fn test_distinct_non_null_addresses() {
        let ctx = ExprManager::new();
        let a = ctx.mk_const("a", Sort::Addr);
        let b = ctx.mk_const("b", Sort::Addr);
        let mut solver = BoundedSolver::new(&ctx, 0..=0);
        let assertions = [
            ctx.mk_not(ctx.mk_eq(a, ctx.null())),
            ctx.mk_not(ctx.mk_eq(b, ctx.null())),
            ctx.mk_not(ctx.mk_eq(a, b)),
        ];
        match solver.check(&assertions).unwrap() {
            SolverResult::Sat(model) => {
                assert_ne!(ctx.eval(a, &model), ctx.eval(b, &model));
            }
            other => panic!("expected a model, got {:?}", other),
        }

        // Addresses are covered exhaustively, so a failed search is a proof.
        let aliased_null = [assertions[0], ctx.mk_eq(a, b), ctx.mk_eq(b, ctx.null())];
        assert!(solver.check(&aliased_null).unwrap().is_unsat());
    }

    #[test]
    fn test_witness_outside_domain_is_unknown() {
        let ctx = ExprManager::new();
        let x = ctx.mk_const("x", Sort::Int);
        let mut solver = BoundedSolver::new(&ctx, -2..=2);
        let e = ctx.mk_lt(ctx.mk_int(5), x);
        assert!(matches!(solver.check(&[e]).unwrap(), SolverResult::Unknown));
    }

    #[test]
    fn test_pinned_integers() {
        let ctx = ExprManager::new();
        let x = ctx.mk_const("x", Sort::Int);
        let mut solver = BoundedSolver::new(&ctx, 0..=1);

        // The pin lies outside the domain but is still tried.
        let pinned = ctx.mk_eq(x, ctx.mk_int(7));
        assert!(solver.check(&[pinned, ctx.mk_lt(ctx.mk_int(5), x)]).unwrap().is_sat());
        assert!(solver.check(&[pinned, ctx.mk_lt(x, ctx.mk_int(5))]).unwrap().is_unsat());
        assert!(solver.check(&[pinned, ctx.mk_eq(x, ctx.mk_int(8))]).unwrap().is_unsat());
    }

    #[test]
    fn test_candidate_limit() {
        let ctx = ExprManager::new();
        let x = ctx.mk_const("x", Sort::Int);
        let y = ctx.mk_const("y", Sort::Int);
        let mut solver = BoundedSolver::new(&ctx, 0..=9).with_max_candidates(50);
        let e = ctx.mk_eq(x, y);
        assert!(matches!(solver.check(&[e]).unwrap(), SolverResult::Unknown));
    }

    #[test]
    fn test_input_reads_unsupported() {
        let ctx = ExprManager::new();
        let id: CollectionId = ctx.new_collection("field:value", Sort::Int);
        let read = ctx.mk_input_read(id, vec![ctx.mk_addr(1)]);
        let mut solver = BoundedSolver::new(&ctx, 0..=1);
        let e = ctx.mk_eq(read, ctx.mk_int(1));
        assert!(matches!(solver.check(&[e]), Err(SolverError::Unsupported(_))));
    }
}
