use std::cell::Cell;
use std::rc::Rc;

use symex_rs::close_states::CloseStatesSearcher;
use symex_rs::collection::SymbolicCollection;
use symex_rs::expr::{ExprManager, Sort};
use symex_rs::graph::{CfgDistanceOracle, Distance, ExplicitGraph, MemoizedCfgDistance};
use symex_rs::key_info::HeapRefKeyInfo;
use symex_rs::model::{Model, Value};
use symex_rs::options::{CloseStateOptions, MergeOptions};
use symex_rs::ps::{BfsPathSelector, MergingPathSelector, PathSelector, SelectorMode};
use symex_rs::region::{Region, SetRegion};
use symex_rs::state::{ExecutionState, SymbolicState};
use symex_rs::stop::{
    CoverageStatistics, GroupedStopStrategy, NeverStopStrategy, StepsFromLastCoveredStopStrategy, StopStrategy,
};
use symex_rs::tree::ExecutionTree;
use symex_rs::types::{HierarchyTypeSystem, TypeKind, TypeStream, TypeSystem, TypesResult};

type State = SymbolicState<HierarchyTypeSystem<&'static str>, String, u32>;

fn shapes() -> HierarchyTypeSystem<&'static str> {
    let mut ts = HierarchyTypeSystem::new("Object");
    ts.register("Named", [], TypeKind::Interface);
    ts.register("Shape", [], TypeKind::ABSTRACT_CLASS);
    ts.register("Circle", ["Shape", "Named"], TypeKind::CLASS);
    ts.register("Rect", ["Shape"], TypeKind::CLASS);
    ts.register("Square", ["Rect"], TypeKind::FINAL_CLASS);
    ts
}

fn state_at(ctx: &Rc<ExprManager>, entry: u32) -> State {
    SymbolicState::new(Rc::clone(ctx), Rc::new(shapes()), "main".to_string(), entry)
}

#[test]
fn region_lattice_laws() {
    let samples = [
        SetRegion::empty(),
        SetRegion::universe(),
        SetRegion::singleton(1u64),
        SetRegion::of([1, 2, 3]),
    ];
    for a in &samples {
        for b in &samples {
            assert_eq!(a.union(b), b.union(a));
        }
        assert_eq!(&a.intersect(&SetRegion::top()), a);
        assert!(a.intersect(&SetRegion::bottom()).is_empty());
    }
    assert!(SetRegion::singleton(1u64).intersect(&SetRegion::singleton(2)).is_empty());
}

#[test]
fn collection_read_write() {
    let ctx = ExprManager::new();
    let c = SymbolicCollection::allocated(&ctx, "field:value", Sort::Int, HeapRefKeyInfo);
    let (k1, k2) = (ctx.mk_addr(1), ctx.mk_addr(2));
    let (v1, v2) = (ctx.mk_int(10), ctx.mk_int(20));
    let t = ctx.mk_true();

    assert_eq!(c.write(&ctx, k1, v1, t).read(&ctx, &k1), v1);
    assert_eq!(c.write(&ctx, k1, v1, t).write(&ctx, k1, v2, t).read(&ctx, &k1), v2);
    assert_eq!(c.write(&ctx, k1, v1, t).read(&ctx, &k2), c.read(&ctx, &k2));
}

#[test]
fn type_stream_monotonicity() {
    let stream = TypeStream::top(Rc::new(shapes()));
    let ts = shapes();
    for t in stream.filter_by_supertype(&"Shape").take(10).types() {
        assert!(ts.is_supertype(&"Shape", t));
    }

    let mut ab = stream
        .filter_by_supertype(&"Shape")
        .filter_by_supertype(&"Named")
        .take(10)
        .into_types();
    let mut ba = stream
        .filter_by_supertype(&"Named")
        .filter_by_supertype(&"Shape")
        .take(10)
        .into_types();
    ab.sort();
    ba.sort();
    assert_eq!(ab, vec!["Circle"]);
    assert_eq!(ab, ba);
}

#[test]
fn type_contradiction() {
    let stream = TypeStream::top(Rc::new(shapes()));
    let result = stream.filter_by_supertype(&"Circle").filter_by_supertype(&"Rect").take(1);
    assert_eq!(result, TypesResult::Empty);
}

/// Oracle that answers 0 and counts its calls.
struct CountingOracle(Cell<usize>);

impl CfgDistanceOracle<String, u32> for CountingOracle {
    fn shortest_distance(&self, _: &String, _: &u32, _: &u32) -> Distance {
        self.0.set(self.0.get() + 1);
        Distance::ZERO
    }
}

#[test]
fn close_state_search_bound() {
    // Complete binary trie of depth 4, a state resting at every node.
    let ctx = Rc::new(ExprManager::new());
    let mut tree = ExecutionTree::new();
    let root = state_at(&ctx, 1);
    let mut level = vec![(1u32, root)];
    for _ in 0..4 {
        let mut next = Vec::new();
        for (stmt, state) in &level {
            for child in [2 * stmt, 2 * stmt + 1] {
                let mut s = state.fork();
                s.advance(child);
                next.push((child, s));
            }
        }
        for (_, s) in &level {
            tree.add(s.clone());
        }
        level = next;
    }
    for (_, s) in &level {
        tree.add(s.clone());
    }
    let query = level[0].1.clone();

    for (depth_limit, max_processed_nodes) in [(1, 100), (2, 100), (3, 4), (4, 10)] {
        let options = CloseStateOptions {
            depth_limit,
            max_processed_nodes,
            max_cfg_distance: 20,
        };
        let searcher = CloseStatesSearcher::new(CountingOracle(Cell::new(0)), options);
        let found = searcher.find_close_states(&tree, &query);
        let bound = max_processed_nodes.min(2usize.pow(depth_limit as u32 + 1));
        assert!(searcher.oracle_calls() <= bound);
        assert_eq!(searcher.oracle().0.get(), searcher.oracle_calls());
        assert!(found.iter().all(|s| s.id() != query.id()));
    }
}

#[test]
fn merge_soundness() {
    let ctx = Rc::new(ExprManager::new());
    let y = ctx.mk_const("y", Sort::Int);
    let zero = ctx.mk_int(0);

    let base = state_at(&ctx, 1);
    let mut left = base.fork();
    left.constraints_mut().add(&ctx, ctx.mk_lt(zero, y));
    left.memory_mut().write_local(0, ctx.mk_int(1));
    let mut right = base.fork();
    right.constraints_mut().add(&ctx, ctx.mk_le(y, zero));
    right.memory_mut().write_local(0, ctx.mk_int(2));

    let merged = left.merge_with(&right).unwrap();
    let x = merged.memory().read_local(0).unwrap();
    for (value, expected) in [(3, 1), (1, 1), (0, 2), (-5, 2)] {
        let model = Model::new().with(y, Value::Int(value));
        assert_eq!(ctx.eval(x, &model), Value::Int(expected), "y = {}", value);
        assert_eq!(ctx.eval(merged.constraints().conjunction(&ctx), &model), Value::Bool(true));
    }
}

#[test]
fn advance_limit() {
    let mut graph = ExplicitGraph::new();
    graph.add_statements("main", [1, 2, 3]);
    graph.add_edge(1, 2);
    graph.add_edge(2, 3);
    let oracle = MemoizedCfgDistance::new(Rc::new(graph));
    let options = MergeOptions {
        advance_limit: 3,
        ..MergeOptions::default()
    };
    let mut ps = MergingPathSelector::new(BfsPathSelector::new(), oracle, options);

    // `ahead` is the underlying candidate; `lagging` is close to it but never mergeable.
    let ctx = Rc::new(ExprManager::new());
    let mut ahead = state_at(&ctx, 1);
    ahead.advance(2);
    let lagging = ahead.fork();
    ahead.advance(3);
    ps.add(ahead.clone());
    ps.add(lagging.clone());

    for _ in 0..3 {
        assert_eq!(ps.peek().map(|s| s.id()), Some(lagging.id()));
    }
    assert_eq!(ps.mode(), SelectorMode::Peeking);
    assert_eq!(ps.peek().map(|s| s.id()), Some(ahead.id()));
    assert_eq!(ps.merges(), 0);
}

#[test]
fn stop_strategy_composition() {
    let coverage = Rc::new(CoverageStatistics::<u32>::new());
    let steps = || -> Box<dyn StopStrategy> { Box::new(StepsFromLastCoveredStopStrategy::new(5, Rc::clone(&coverage))) };
    let forward = GroupedStopStrategy::new(vec![steps(), Box::new(NeverStopStrategy)]);
    let backward = GroupedStopStrategy::new(vec![Box::new(NeverStopStrategy), steps()]);

    coverage.on_step(&1);
    for step in 1..=10u64 {
        coverage.on_step(&1);
        assert_eq!(forward.should_stop(), step > 5);
        assert_eq!(backward.should_stop(), step > 5);
    }
}
