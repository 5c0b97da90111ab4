//! # symex-rs: symbolic memory and state merging for symbolic execution
//!
//! **`symex-rs`** is the language-independent core of a symbolic execution engine. A front-end
//! supplies instruction semantics, a type system and an application graph; this crate supplies the
//! symbolic heap, the stream of feasible types of a reference, the execution tree, guarded merging
//! of states, and the scheduling loop around them.
//!
//! ## Key Features
//!
//! - **Manager-Centric Terms**: Every expression lives in an [`ExprManager`][crate::expr::ExprManager]
//!   and is addressed by a copyable [`ExprRef`][crate::expr::ExprRef] handle. Smart constructors
//!   simplify eagerly, so trivially true guards stay `true`.
//! - **Persistent Collections**: A [`SymbolicCollection`][crate::collection::SymbolicCollection] is a
//!   history of guarded writes. Reads fold the history newest first and stop at the first write that
//!   definitely covers the key.
//! - **Type Streams**: Lazy, filterable enumeration of the concrete types a reference may have.
//! - **State Merging**: Two states at the same location merge into one whose memory reads through
//!   `ite` on a guard distinguishing the two paths.
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use symex_rs::expr::{ExprManager, Sort};
//! use symex_rs::model::{Model, Value};
//! use symex_rs::state::{ExecutionState, SymbolicState};
//! use symex_rs::types::HierarchyTypeSystem;
//!
//! // 1. Initialize the manager
//! let ctx = Rc::new(ExprManager::new());
//! let types = Rc::new(HierarchyTypeSystem::new("Object"));
//! let y = ctx.mk_const("y", Sort::Int);
//! let positive = ctx.mk_lt(ctx.mk_int(0), y);
//!
//! // 2. Split a state on `0 < y` and store different values
//! let base = SymbolicState::new(Rc::clone(&ctx), types, "main", 1u32);
//! let mut left = base.fork();
//! left.constraints_mut().add(&ctx, positive);
//! left.memory_mut().write_local(0, ctx.mk_int(1));
//! let mut right = base.fork();
//! right.constraints_mut().add(&ctx, ctx.mk_not(positive));
//! right.memory_mut().write_local(0, ctx.mk_int(2));
//!
//! // 3. Merge them back
//! let merged = left.merge_with(&right).unwrap();
//! let x = merged.memory().read_local(0).unwrap();
//!
//! // 4. The merged value depends on the path
//! let model = Model::new().with(y, Value::Int(7));
//! assert_eq!(ctx.eval(x, &model), Value::Int(1));
//! ```
//!
//! ## Core Components
//!
//! - **[`expr`]**, **[`model`]**: terms, their manager and concrete evaluation.
//! - **[`region`]**, **[`key_info`]**, **[`collection`]**: key sets, key semantics and symbolic
//!   collections.
//! - **[`memory`]**, **[`constraints`]**, **[`types`]**: the parts of a symbolic state.
//! - **[`merge`]**, **[`state`]**: guarded merging and execution states.
//! - **[`path`]**, **[`tree`]**, **[`graph`]**, **[`close_states`]**: paths, the execution tree and
//!   the search for merge partners.
//! - **[`ps`]**, **[`stop`]**, **[`machine`]**: path selection, stop strategies and the run loop.
//! - **[`solver`]**, **[`forker`]**: satisfiability checks and forking on branch conditions.
//! - **[`dot`]**: Graphviz rendering of the execution tree.

pub mod cache;
pub mod close_states;
pub mod collection;
pub mod constraints;
pub mod dot;
pub mod error;
pub mod expr;
pub mod forker;
pub mod graph;
pub mod key_info;
pub mod machine;
pub mod memory;
pub mod merge;
pub mod model;
pub mod options;
pub mod path;
pub mod ps;
pub mod region;
pub mod solver;
pub mod state;
pub mod stop;
pub mod tree;
pub mod types;
