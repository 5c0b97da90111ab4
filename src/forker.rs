//! Splitting a state on a branch condition.

use log::{debug, warn};

use crate::expr::ExprRef;
use crate::solver::{Solver, SolverResult};
use crate::state::{ExecutionState, SymbolicState};
use crate::types::TypeSystem;

/// Successors of a state split on a condition. Infeasible sides are `None`.
#[derive(Debug, Clone)]
pub struct ForkResult<St> {
    /// Keeps the id of the forked state.
    pub positive: Option<St>,
    pub negative: Option<St>,
}

impl<St> ForkResult<St> {
    /// Feasible successors, positive side first.
    pub fn into_states(self) -> Vec<St> {
        self.positive.into_iter().chain(self.negative).collect()
    }
}

/// Whether the path constraints of `state` may be satisfiable.
///
/// Solver failures and `Unknown` answers count as feasible.
fn is_feasible<TS, M, S>(state: &SymbolicState<TS, M, S>, solver: &mut dyn Solver) -> bool
where
    TS: TypeSystem,
    M: Clone,
    S: Clone,
{
    if state.constraints().is_unsat() {
        return false;
    }
    match solver.check(&state.constraints().constraints()) {
        Ok(SolverResult::Sat(_)) => true,
        Ok(SolverResult::Unsat) => false,
        Ok(SolverResult::Unknown) => {
            warn!("solver gave up, keeping the path");
            true
        }
        Err(e) => {
            warn!("solver failed, keeping the path: {}", e);
            true
        }
    }
}

/// Split `state` into the paths where `condition` holds and where it does not.
pub fn fork<TS, M, S>(
    state: SymbolicState<TS, M, S>,
    condition: ExprRef,
    solver: &mut dyn Solver,
) -> ForkResult<SymbolicState<TS, M, S>>
where
    SymbolicState<TS, M, S>: ExecutionState,
    TS: TypeSystem,
    M: Clone,
    S: Clone,
{
    debug!("fork(state = {}, condition = {})", state.id(), condition);
    let ctx = state.ctx().clone();

    let mut negative = state.fork();
    negative.constraints_mut().add(&ctx, ctx.mk_not(condition));
    let mut positive = state;
    positive.constraints_mut().add(&ctx, condition);

    let positive = is_feasible(&positive, solver).then_some(positive);
    let negative = is_feasible(&negative, solver).then_some(negative);
    debug!(
        "fork result: positive = {}, negative = {}",
        positive.is_some(),
        negative.is_some()
    );
    ForkResult { positive, negative }
}

/// Continue `state` only where `condition` holds.
pub fn assume<TS, M, S>(
    mut state: SymbolicState<TS, M, S>,
    condition: ExprRef,
    solver: &mut dyn Solver,
) -> Option<SymbolicState<TS, M, S>>
where
    SymbolicState<TS, M, S>: ExecutionState,
    TS: TypeSystem,
    M: Clone,
    S: Clone,
{
    debug!("assume(state = {}, condition = {})", state.id(), condition);
    let ctx = state.ctx().clone();
    state.constraints_mut().add(&ctx, condition);
    is_feasible(&state, solver).then_some(state)
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use test_log::test;

    use super::*;
    use crate::error::SolverError;
    use crate::expr::{ExprManager, Sort};
    use crate::solver::BoundedSolver;
    use crate::state::tests::state_at;

    struct Failing;

    impl Solver for Failing {
        fn check(&mut self, _: &[ExprRef]) -> Result<SolverResult, SolverError> {
            Err(SolverError::Backend("unavailable".to_string()))
        }
    }

    #[test]
    fn test_fork_both_sides() {
        let ctx = Rc::new(ExprManager::new());
        let x = ctx.mk_const("x", Sort::Int);
        let state = state_at(&ctx, 1);
        let id = state.id();
        let mut solver = BoundedSolver::new(&ctx, -2..=2);
        let result = fork(state, ctx.mk_lt(ctx.mk_int(0), x), &mut solver);
        let positive = result.positive.as_ref().unwrap();
        let negative = result.negative.as_ref().unwrap();
        assert_eq!(positive.id(), id);
        assert_ne!(negative.id(), id);
        assert_eq!(result.into_states().len(), 2);
    }

    #[test]
    fn test_fork_drops_infeasible_side() {
        let ctx = Rc::new(ExprManager::new());
        let x = ctx.mk_const("x", Sort::Int);
        let mut state = state_at(&ctx, 1);
        let positive = ctx.mk_lt(ctx.mk_int(0), x);
        state.constraints_mut().add(&ctx, positive);
        let mut solver = BoundedSolver::new(&ctx, -2..=2);

        // x <= 0 contradicts 0 < x.
        let result = fork(state, ctx.mk_le(x, ctx.mk_int(0)), &mut solver);
        assert!(result.positive.is_none());
        assert!(result.negative.is_some());
    }

    #[test]
    fn test_solver_failure_keeps_both() {
        let ctx = Rc::new(ExprManager::new());
        let x = ctx.mk_const("x", Sort::Int);
        let result = fork(state_at(&ctx, 1), ctx.mk_lt(ctx.mk_int(0), x), &mut Failing);
        assert_eq!(result.into_states().len(), 2);
    }

    #[test]
    fn test_trivially_false_side_skips_solver() {
        let ctx = Rc::new(ExprManager::new());
        let result = fork(state_at(&ctx, 1), ctx.mk_true(), &mut Failing);
        assert!(result.positive.is_some());
        assert!(result.negative.is_none());
    }

    #[test]
    fn test_fork_keeps_side_with_witness_outside_domain() {
        let ctx = Rc::new(ExprManager::new());
        let x = ctx.mk_const("x", Sort::Int);
        let mut solver = BoundedSolver::new(&ctx, -2..=2);
        let result = fork(state_at(&ctx, 1), ctx.mk_lt(ctx.mk_int(5), x), &mut solver);
        assert!(result.positive.is_some());
        assert!(result.negative.is_some());
    }

    #[test]
    fn test_fork_on_aliasing() {
        let ctx = Rc::new(ExprManager::new());
        let a = ctx.mk_const("a", Sort::Addr);
        let b = ctx.mk_const("b", Sort::Addr);
        let c = ctx.mk_const("c", Sort::Addr);
        let mut state = state_at(&ctx, 1);
        for r in [a, b, c] {
            state.constraints_mut().add(&ctx, ctx.mk_not(ctx.mk_eq(r, ctx.null())));
        }
        state.constraints_mut().add(&ctx, ctx.mk_not(ctx.mk_eq(a, b)));
        let mut solver = BoundedSolver::new(&ctx, 0..=0);

        // Three pairwise distinct non-null references need three fresh addresses.
        let all_distinct = ctx.mk_and([ctx.mk_not(ctx.mk_eq(a, c)), ctx.mk_not(ctx.mk_eq(b, c))]);
        let result = fork(state, all_distinct, &mut solver);
        assert!(result.positive.is_some());
        assert!(result.negative.is_some());
    }

    #[test]
    fn test_fork_drops_side_refuted_by_pin() {
        let ctx = Rc::new(ExprManager::new());
        let x = ctx.mk_const("x", Sort::Int);
        let mut state = state_at(&ctx, 1);
        state.constraints_mut().add(&ctx, ctx.mk_eq(x, ctx.mk_int(40)));
        let mut solver = BoundedSolver::new(&ctx, -2..=2);
        let result = fork(state, ctx.mk_lt(ctx.mk_int(0), x), &mut solver);
        assert!(result.positive.is_some());
        assert!(result.negative.is_none());
    }

    #[test]
    fn test_assume() {
        let ctx = Rc::new(ExprManager::new());
        let x = ctx.mk_const("x", Sort::Int);
        let mut solver = BoundedSolver::new(&ctx, 0..=3);
        let s = assume(state_at(&ctx, 1), ctx.mk_eq(x, ctx.mk_int(2)), &mut solver).unwrap();
        assert!(assume(s, ctx.mk_eq(x, ctx.mk_int(3)), &mut solver).is_none());
    }
}
