//! State merging on a chain of if-then-else diamonds.
//!
//! Every diamond branches on `0 < x_i` and increments a counter on the positive side. Without
//! merging the number of paths doubles with every diamond; with merging the states meet again at
//! every join point.
//!
//! Run with:
//! ```bash
//! cargo run --example merge_demo -- --diamonds 8 --merging
//! ```

use std::rc::Rc;
use std::time::Instant;

use clap::Parser;
use log::info;
use symex_rs::error::InterpreterError;
use symex_rs::expr::{ExprManager, Sort};
use symex_rs::forker::{fork, ForkResult};
use symex_rs::graph::{ApplicationGraph, ExplicitGraph};
use symex_rs::machine::{Interpreter, Machine, StepResult};
use symex_rs::model::{Model, Value};
use symex_rs::options::{FailurePolicy, MachineOptions, MergeOptions, PathSelectionStrategy, StopOptions};
use symex_rs::solver::BoundedSolver;
use symex_rs::state::{ExecutionState, SymbolicState};
use symex_rs::tree::ExecutionTree;
use symex_rs::types::HierarchyTypeSystem;

type DemoState = SymbolicState<HierarchyTypeSystem<&'static str>, String, u32>;

#[derive(Debug, Parser)]
#[command(author, version, about = "State merging on a chain of diamonds")]
struct Cli {
    /// Number of diamonds in the program
    #[arg(long, default_value = "6")]
    diamonds: u32,

    /// Merge states at join points
    #[arg(long)]
    merging: bool,

    /// Use depth-first instead of breadth-first path selection
    #[arg(long)]
    dfs: bool,

    /// Failed merge attempts before a state is let through
    #[arg(long, default_value = "3")]
    advance_limit: u32,

    /// Stop after this many steps
    #[arg(long)]
    step_limit: Option<u64>,

    /// Write the execution tree of the finished states to this DOT file
    #[arg(long)]
    dot: Option<String>,
}

/// `main`: for every diamond i, `b -> t -> j` and `b -> e -> j`, then an exit statement.
fn build_program(diamonds: u32) -> (ExplicitGraph, Vec<u32>) {
    let mut g = ExplicitGraph::new();
    let exit = 4 * diamonds + 1;
    g.add_statements("main", 1..=exit);
    let mut branches = Vec::new();
    for i in 0..diamonds {
        let b = 4 * i + 1;
        let (t, e, j) = (b + 1, b + 2, b + 3);
        g.add_edge(b, t);
        g.add_edge(b, e);
        g.add_edge(t, j);
        g.add_edge(e, j);
        g.add_edge(j, j + 1);
        branches.push(b);
    }
    (g, branches)
}

struct ChainInterpreter {
    graph: Rc<ExplicitGraph>,
    ctx: Rc<ExprManager>,
}

impl Interpreter<DemoState> for ChainInterpreter {
    fn step(&mut self, mut state: DemoState) -> Result<StepResult<DemoState>, InterpreterError> {
        let stmt = *state.current_statement();
        let ctx = Rc::clone(&self.ctx);
        match self.graph.successors(&stmt).as_slice() {
            [] => Ok(StepResult::Terminate(state)),
            [next] => {
                state.advance(*next);
                Ok(StepResult::Continue(state))
            }
            [then, other] => {
                let x = ctx.mk_const(&format!("x{}", stmt), Sort::Int);
                let mut solver = BoundedSolver::new(&ctx, 0..=1);
                let ForkResult { positive, negative } = fork(state, ctx.mk_lt(ctx.mk_int(0), x), &mut solver);
                let mut successors = Vec::new();
                if let Some(mut s) = positive {
                    let count = read_counter(&s)?;
                    s.memory_mut().write_local(0, ctx.mk_add(count, ctx.mk_int(1)));
                    s.advance(*then);
                    successors.push(s);
                }
                if let Some(mut s) = negative {
                    s.advance(*other);
                    successors.push(s);
                }
                Ok(StepResult::Fork(successors))
            }
            _ => Err(InterpreterError::Unsupported {
                state: state.id(),
                message: format!("statement {} has more than two successors", stmt),
            }),
        }
    }
}

fn read_counter(state: &DemoState) -> Result<symex_rs::expr::ExprRef, InterpreterError> {
    state.memory().read_local(0).ok_or_else(|| InterpreterError::MissingInstruction {
        state: state.id(),
        statement: "counter initialization".to_string(),
    })
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let cli = Cli::parse();
    info!("cli = {:?}", cli);

    let (graph, branches) = build_program(cli.diamonds);
    let graph = Rc::new(graph);
    let ctx = Rc::new(ExprManager::new());

    let mut initial: DemoState = SymbolicState::new(
        Rc::clone(&ctx),
        Rc::new(HierarchyTypeSystem::new("Object")),
        "main".to_string(),
        1,
    );
    initial.memory_mut().write_local(0, ctx.mk_int(0));

    let options = MachineOptions {
        path_selection: if cli.dfs {
            PathSelectionStrategy::Dfs
        } else {
            PathSelectionStrategy::Bfs
        },
        use_merging: cli.merging,
        merge: MergeOptions {
            advance_limit: cli.advance_limit,
            ..MergeOptions::default()
        },
        stop: StopOptions {
            step_limit: cli.step_limit,
            ..StopOptions::default()
        },
        failure_policy: FailurePolicy::Drop,
    };

    let mut interpreter = ChainInterpreter {
        graph: Rc::clone(&graph),
        ctx: Rc::clone(&ctx),
    };
    let time_run = Instant::now();
    let report = Machine::new(Rc::clone(&graph), options).run(&mut interpreter, [initial]);
    let elapsed = time_run.elapsed();

    println!("steps:      {}", report.steps);
    println!("terminated: {}", report.terminated.len());
    println!("merges:     {}", report.merges);
    println!("covered:    {}", report.covered);
    println!("terms:      {}", ctx.size());
    println!("time:       {:.2} ms", elapsed.as_secs_f64() * 1000.0);
    if !report.stopped_by.is_empty() {
        println!("stopped by: {:?}", report.stopped_by);
    }

    // Evaluate the counter of every finished state on the all-positive input.
    let mut all_positive = Model::new();
    for b in &branches {
        all_positive.assign(ctx.mk_const(&format!("x{}", b), Sort::Int), Value::Int(1));
    }
    for state in &report.terminated {
        if let Some(counter) = state.memory().read_local(0) {
            let feasible = ctx.eval(state.constraints().conjunction(&ctx), &all_positive);
            println!(
                "{}: counter = {} (all-positive input: {}, on this path: {})",
                state.id(),
                ctx.display(counter),
                ctx.eval(counter, &all_positive),
                feasible
            );
        }
    }

    if let Some(path) = cli.dot {
        let mut tree = ExecutionTree::new();
        for state in report.terminated {
            tree.add(state);
        }
        std::fs::write(&path, tree.to_dot()?)?;
        println!("execution tree written to {}", path);
    }

    Ok(())
}
