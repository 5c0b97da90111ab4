//! The run loop.

use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use log::{debug, info, warn};

use crate::error::InterpreterError;
use crate::graph::{ApplicationGraph, MemoizedCfgDistance};
use crate::options::{FailurePolicy, MachineOptions};
use crate::ps::{create_path_selector, MergingPathSelector, PathSelector};
use crate::state::{ExecutionState, StateId};
use crate::stop::{create_stop_strategy, GroupedStopStrategy, StopSources, StopStrategy};

/// Outcome of one interpreter step.
#[derive(Debug, Clone)]
pub enum StepResult<St> {
    /// The state moved on.
    Continue(St),
    /// The state split. A successor with the id of the stepped state replaces it; the others are
    /// new. If none has that id, the stepped state is gone.
    Fork(Vec<St>),
    /// The state finished its path.
    Terminate(St),
}

/// Instruction semantics of a front-end.
pub trait Interpreter<St: ExecutionState> {
    fn step(&mut self, state: St) -> Result<StepResult<St>, InterpreterError>;
}

/// Summary of a run.
#[derive(Debug, Clone)]
pub struct RunReport<St> {
    pub steps: u64,
    /// States that finished, in termination order.
    pub terminated: Vec<St>,
    /// States forgotten after a failed step.
    pub dropped: usize,
    /// Failed interpreter steps.
    pub failures: usize,
    pub merges: usize,
    /// Number of distinct statements reached.
    pub covered: usize,
    /// Live states left when the run ended.
    pub remaining: usize,
    /// Stop strategies that ended the run; empty when it ran out of states.
    pub stopped_by: Vec<&'static str>,
}

impl<St> RunReport<St> {
    fn new() -> Self {
        Self {
            steps: 0,
            terminated: Vec::new(),
            dropped: 0,
            failures: 0,
            merges: 0,
            covered: 0,
            remaining: 0,
            stopped_by: Vec::new(),
        }
    }
}

/// Drives states through an [`Interpreter`] until no state is left or a stop strategy fires.
pub struct Machine<G: ApplicationGraph> {
    graph: Rc<G>,
    options: MachineOptions,
    targets: Vec<G::Statement>,
}

impl<G: ApplicationGraph> Debug for Machine<G> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("options", &self.options)
            .field("targets", &self.targets)
            .finish()
    }
}

impl<G: ApplicationGraph + 'static> Machine<G> {
    pub fn new(graph: Rc<G>, options: MachineOptions) -> Self {
        Self {
            graph,
            options,
            targets: Vec::new(),
        }
    }

    /// Statements the targets-based stop strategies watch.
    pub fn with_targets(mut self, targets: impl IntoIterator<Item = G::Statement>) -> Self {
        self.targets.extend(targets);
        self
    }

    pub fn options(&self) -> &MachineOptions {
        &self.options
    }

    pub fn graph(&self) -> &Rc<G> {
        &self.graph
    }

    /// Explore from `initial` until the states run out or a stop strategy fires.
    pub fn run<St, I>(&self, interpreter: &mut I, initial: impl IntoIterator<Item = St>) -> RunReport<St>
    where
        St: ExecutionState<Method = G::Method, Statement = G::Statement> + 'static,
        I: Interpreter<St>,
    {
        info!("run(options = {:?})", self.options);
        let sources = StopSources::new(Rc::clone(&self.graph), self.targets.iter().cloned());
        let stop = create_stop_strategy(&self.options.stop, &sources);
        let base = create_path_selector(self.options.path_selection);

        let mut report = if self.options.use_merging {
            let oracle = MemoizedCfgDistance::new(Rc::clone(&self.graph));
            let mut selector = MergingPathSelector::new(base, oracle, self.options.merge);
            let mut report = self.drive(&mut selector, interpreter, initial, &sources, &stop);
            report.merges = selector.merges();
            report
        } else {
            let mut selector = base;
            self.drive(&mut selector, interpreter, initial, &sources, &stop)
        };
        report.covered = sources.coverage.covered_count();
        info!(
            "run finished: {} steps, {} terminated, {} dropped, {} merges, {} statements covered",
            report.steps,
            report.terminated.len(),
            report.dropped,
            report.merges,
            report.covered
        );
        report
    }

    fn drive<St, I, P>(
        &self,
        selector: &mut P,
        interpreter: &mut I,
        initial: impl IntoIterator<Item = St>,
        sources: &StopSources<G>,
        stop: &GroupedStopStrategy,
    ) -> RunReport<St>
    where
        St: ExecutionState<Method = G::Method, Statement = G::Statement>,
        I: Interpreter<St>,
        P: PathSelector<St>,
    {
        let mut report = RunReport::new();
        for state in initial {
            self.observe(sources, &[&state]);
            selector.add(state);
        }

        loop {
            sources
                .targets
                .set_frontier(selector.states().into_iter().map(|s| s.current_statement().clone()));
            if stop.should_stop() {
                report.stopped_by = stop.fired();
                info!("stopping after {} steps: {:?}", report.steps, report.stopped_by);
                break;
            }
            let Some(state) = selector.peek() else {
                info!("no states left after {} steps", report.steps);
                break;
            };
            let id = state.id();
            debug!("step {} on {} at {:?}", report.steps, id, state.current_statement());
            report.steps += 1;
            sources.steps.on_step();

            match interpreter.step(state) {
                Ok(StepResult::Continue(next)) => {
                    assert_eq!(next.id(), id, "Interpreter changed the id of state {}", id);
                    self.record_step(sources, &[&next]);
                    selector.update(next);
                }
                Ok(StepResult::Fork(successors)) => {
                    self.record_step(sources, &successors.iter().collect::<Vec<_>>());
                    let mut kept = false;
                    for s in successors {
                        if s.id() == id {
                            kept = true;
                            selector.update(s);
                        } else {
                            selector.add(s);
                        }
                    }
                    if !kept {
                        selector.remove(id);
                    }
                }
                Ok(StepResult::Terminate(last)) => {
                    self.record_step(sources, &[&last]);
                    selector.remove(id);
                    debug!("state {} terminated", id);
                    self.collect(sources, &mut report, last);
                }
                Err(e) => {
                    warn!("step of state {} failed: {}", id, e);
                    sources.coverage.record_step(false);
                    report.failures += 1;
                    self.handle_failure(selector, sources, &mut report, id);
                }
            }
        }
        report.remaining = selector.len();
        report
    }

    fn handle_failure<St, P>(&self, selector: &mut P, sources: &StopSources<G>, report: &mut RunReport<St>, id: StateId)
    where
        St: ExecutionState<Method = G::Method, Statement = G::Statement>,
        P: PathSelector<St>,
    {
        let Some(state) = selector.remove(id) else {
            return;
        };
        match self.options.failure_policy {
            FailurePolicy::Drop => {
                debug!("dropping state {}", id);
                report.dropped += 1;
            }
            FailurePolicy::Keep => self.collect(sources, report, state),
        }
    }

    fn collect<St>(&self, sources: &StopSources<G>, report: &mut RunReport<St>, state: St) {
        sources.collected.set(sources.collected.get() + 1);
        report.terminated.push(state);
    }

    fn observe<St>(&self, sources: &StopSources<G>, states: &[&St]) -> bool
    where
        St: ExecutionState<Statement = G::Statement>,
    {
        let mut fresh = false;
        for s in states {
            let statement = s.current_statement();
            fresh |= sources.coverage.cover(statement);
            if sources.targets.on_visit(statement) {
                info!("target {:?} reached by {}", statement, s.id());
            }
        }
        fresh
    }

    fn record_step<St>(&self, sources: &StopSources<G>, states: &[&St])
    where
        St: ExecutionState<Statement = G::Statement>,
    {
        let fresh = self.observe(sources, states);
        sources.coverage.record_step(fresh);
    }
}
