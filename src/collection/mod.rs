//! Persistent symbolic collections.
//!
//! A [`SymbolicCollection`] models a heap region (object fields, array cells, map entries) as a base
//! value plus a log of guarded writes. Collections are values: [`write`][SymbolicCollection::write]
//! returns a new collection sharing the old log, so forking a state copies nothing.
//!
//! A read walks the log from the newest write to the oldest:
//! - writes whose key region is disjoint from the read key's region are skipped;
//! - a write that certainly covers the key ends the walk and provides the value;
//! - any other write contributes an `ite(guard ∧ key = k, value, ...)` layer.
//!
//! ```
//! use symex_rs::collection::SymbolicCollection;
//! use symex_rs::expr::{ExprManager, Sort};
//! use symex_rs::key_info::IndexKeyInfo;
//!
//! let ctx = ExprManager::new();
//! let c = SymbolicCollection::allocated(&ctx, "a", Sort::Int, IndexKeyInfo);
//! let (k1, k2) = (ctx.mk_int(1), ctx.mk_int(2));
//! let c = c.write(&ctx, k1, ctx.mk_int(10), ctx.mk_true());
//! assert_eq!(c.read(&ctx, &k1), ctx.mk_int(10));
//! assert_eq!(c.read(&ctx, &k2), ctx.mk_int(0));
//! ```

mod map;
mod update;

use std::fmt::{self, Display, Formatter};

use log::{debug, trace};

pub use map::{SymbolicMap, SymbolicSet};
pub use update::{KeyMapping, KeySet, MergeAdapter, UpdateLog, UpdateLogIter, UpdateNode};

use crate::expr::{ExprManager, ExprRef, Sort};
use crate::key_info::KeyInfo;
use crate::region::Region;

/// Identifier of a collection, registered in the [`ExprManager`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CollectionId(u32);

impl CollectionId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for CollectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Value of keys that were never written.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BaseValue {
    /// Every unwritten key holds this expression (fresh allocations).
    Default(ExprRef),
    /// Unwritten keys hold unknown input values.
    Symbolic,
}

#[derive(Debug, Clone)]
pub struct SymbolicCollection<KI: KeyInfo> {
    id: CollectionId,
    sort: Sort,
    base: BaseValue,
    updates: UpdateLog<KI>,
    key_info: KI,
}

impl<KI: KeyInfo> SymbolicCollection<KI> {
    pub fn new(id: CollectionId, sort: Sort, base: BaseValue, key_info: KI) -> Self {
        Self {
            id,
            sort,
            base,
            updates: UpdateLog::new(),
            key_info,
        }
    }

    /// Collection of freshly allocated memory: unwritten keys hold the default value of `sort`.
    pub fn allocated(ctx: &ExprManager, name: &str, sort: Sort, key_info: KI) -> Self {
        let id = ctx.new_collection(name, sort);
        Self::new(id, sort, BaseValue::Default(ctx.mk_default(sort)), key_info)
    }

    /// Collection of input memory: unwritten keys hold unknown values.
    pub fn input(ctx: &ExprManager, name: &str, sort: Sort, key_info: KI) -> Self {
        let id = ctx.new_collection(name, sort);
        Self::new(id, sort, BaseValue::Symbolic, key_info)
    }

    pub fn id(&self) -> CollectionId {
        self.id
    }

    pub fn sort(&self) -> Sort {
        self.sort
    }

    pub fn base(&self) -> BaseValue {
        self.base
    }

    pub fn key_info(&self) -> &KI {
        &self.key_info
    }

    pub fn updates(&self) -> &UpdateLog<KI> {
        &self.updates
    }

    /// Number of update nodes.
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    fn with_update(&self, node: UpdateNode<KI>) -> Self {
        Self {
            id: self.id,
            sort: self.sort,
            base: self.base,
            updates: self.updates.push(node),
            key_info: self.key_info.clone(),
        }
    }

    fn check_value(&self, ctx: &ExprManager, value: ExprRef) {
        let sort = ctx.sort(value);
        assert_eq!(
            sort, self.sort,
            "Value {} has sort {}, but collection {} holds {}",
            value, sort, self.id, self.sort
        );
    }

    fn base_read(&self, ctx: &ExprManager, key: &KI::Key) -> ExprRef {
        match self.base {
            BaseValue::Default(value) => value,
            BaseValue::Symbolic => ctx.mk_input_read(self.id, self.key_info.key_exprs(key)),
        }
    }

    /// Value stored at `key`.
    pub fn read(&self, ctx: &ExprManager, key: &KI::Key) -> ExprRef {
        debug!("read(collection = {}, key = {:?})", self.id, key);

        let region = self.key_info.key_to_region(ctx, key);
        let mut layers = Vec::new();
        let mut terminal = None;

        for node in self.updates.iter() {
            if node.region(ctx, &self.key_info).is_disjoint(&region) {
                trace!("skip disjoint update {:?}", node);
                continue;
            }
            if node.includes_concretely(ctx, &self.key_info, key) {
                terminal = Some(node.value(ctx, &self.key_info, key));
                break;
            }
            let cond = node.includes_symbolically(ctx, &self.key_info, key);
            if ctx.is_false(cond) {
                continue;
            }
            let value = node.value(ctx, &self.key_info, key);
            if ctx.is_true(cond) {
                terminal = Some(value);
                break;
            }
            layers.push((cond, value));
        }

        let mut result = match terminal {
            Some(value) => value,
            None => self.base_read(ctx, key),
        };
        for (cond, value) in layers.into_iter().rev() {
            result = ctx.mk_ite(cond, value, result);
        }
        result
    }

    /// Store `value` at `key` under `guard`. A `false` guard leaves the collection unchanged.
    pub fn write(&self, ctx: &ExprManager, key: KI::Key, value: ExprRef, guard: ExprRef) -> Self {
        debug!("write(collection = {}, key = {:?}, value = {})", self.id, key, value);
        self.check_value(ctx, value);
        if ctx.is_false(guard) {
            return self.clone();
        }
        self.with_update(UpdateNode::Pinpoint { key, value, guard })
    }

    /// Store `value` at every key in `[from, to]` under `guard`.
    ///
    /// # Panics
    ///
    /// Panics if the key domain is unordered.
    pub fn write_range(
        &self,
        ctx: &ExprManager,
        from: KI::Key,
        to: KI::Key,
        value: ExprRef,
        guard: ExprRef,
    ) -> Self {
        debug!(
            "write_range(collection = {}, from = {:?}, to = {:?}, value = {})",
            self.id, from, to, value
        );
        self.check_value(ctx, value);
        if ctx.is_false(guard) {
            return self.clone();
        }
        // Fail fast on unordered domains instead of at the first read.
        self.key_info.key_range_region(ctx, &from, &to);
        self.with_update(UpdateNode::Ranged {
            from,
            to,
            value,
            guard,
        })
    }

    /// Graft `source` behind this collection: when `guard` holds, keys in `key_set` (after mapping)
    /// read from `source`.
    pub fn apply_merge_adapter(
        &self,
        ctx: &ExprManager,
        mapping: KeyMapping,
        key_set: KeySet<KI>,
        source: SymbolicCollection<KI>,
        guard: ExprRef,
    ) -> Self {
        debug!(
            "apply_merge_adapter(collection = {}, source = {}, mapping = {:?})",
            self.id, source.id, mapping
        );
        assert_eq!(
            source.sort, self.sort,
            "Cannot merge collection {} of sort {} into collection {} of sort {}",
            source.id, source.sort, self.id, self.sort
        );
        if ctx.is_false(guard) {
            return self.clone();
        }
        self.with_update(UpdateNode::Merge {
            adapter: MergeAdapter {
                mapping,
                key_set,
                source,
            },
            guard,
        })
    }

    /// Collection reading as `left` when `guard` holds and as `right` otherwise.
    pub fn guarded_merge(ctx: &ExprManager, left: &Self, right: &Self, guard: ExprRef) -> Self {
        assert_eq!(
            left.id, right.id,
            "Cannot merge different collections {} and {}",
            left.id, right.id
        );
        if left.base == right.base && left.updates.ptr_eq(&right.updates) {
            return left.clone();
        }
        right.apply_merge_adapter(ctx, KeyMapping::Identity, KeySet::All, left.clone(), guard)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::expr::Expr;
    use crate::key_info::{ArrayIndexKeyInfo, HeapRefKeyInfo, IndexKeyInfo};
    use crate::model::{Model, Value};

    #[test]
    fn test_read_after_write() {
        let ctx = ExprManager::new();
        let c = SymbolicCollection::input(&ctx, "f", Sort::Int, HeapRefKeyInfo);
        let k = ctx.mk_addr(3);
        let v = ctx.mk_const("v", Sort::Int);
        let c = c.write(&ctx, k, v, ctx.mk_true());
        assert_eq!(c.read(&ctx, &k), v);
    }

    #[test]
    fn test_shadowing() {
        let ctx = ExprManager::new();
        let c = SymbolicCollection::allocated(&ctx, "a", Sort::Int, IndexKeyInfo);
        let k = ctx.mk_int(4);
        let c = c
            .write(&ctx, k, ctx.mk_int(1), ctx.mk_true())
            .write(&ctx, k, ctx.mk_int(2), ctx.mk_true());
        assert_eq!(c.read(&ctx, &k), ctx.mk_int(2));
    }

    #[test]
    fn test_disjoint_write_is_transparent() {
        let ctx = ExprManager::new();
        let c = SymbolicCollection::input(&ctx, "f", Sort::Int, HeapRefKeyInfo);
        let (k1, k2) = (ctx.mk_addr(1), ctx.mk_addr(2));
        let written = c.write(&ctx, k1, ctx.mk_int(7), ctx.mk_true());
        assert_eq!(written.read(&ctx, &k2), c.read(&ctx, &k2));
        assert!(matches!(*ctx.expr(c.read(&ctx, &k2)), Expr::InputRead { .. }));
    }

    #[test]
    fn test_symbolic_key_builds_ite() {
        let ctx = ExprManager::new();
        let c = SymbolicCollection::allocated(&ctx, "a", Sort::Int, IndexKeyInfo);
        let i = ctx.mk_const("i", Sort::Int);
        let c = c.write(&ctx, ctx.mk_int(0), ctx.mk_int(5), ctx.mk_true());
        let r = c.read(&ctx, &i);
        assert_eq!(r, ctx.mk_ite(ctx.mk_eq(ctx.mk_int(0), i), ctx.mk_int(5), ctx.mk_int(0)));

        let mut model = Model::new();
        model.assign(i, Value::Int(0));
        assert_eq!(ctx.eval(r, &model), Value::Int(5));
        model.assign(i, Value::Int(1));
        assert_eq!(ctx.eval(r, &model), Value::Int(0));
    }

    #[test]
    fn test_guarded_write() {
        let ctx = ExprManager::new();
        let c = SymbolicCollection::allocated(&ctx, "a", Sort::Int, IndexKeyInfo);
        let k = ctx.mk_int(0);
        let g = ctx.mk_const("g", Sort::Bool);

        assert!(c.write(&ctx, k, ctx.mk_int(1), ctx.mk_false()).is_empty());

        let c = c.write(&ctx, k, ctx.mk_int(1), g);
        assert_eq!(c.read(&ctx, &k), ctx.mk_ite(g, ctx.mk_int(1), ctx.mk_int(0)));
    }

    #[test]
    fn test_persistence() {
        let ctx = ExprManager::new();
        let c0 = SymbolicCollection::allocated(&ctx, "a", Sort::Int, IndexKeyInfo);
        let k = ctx.mk_int(0);
        let c1 = c0.write(&ctx, k, ctx.mk_int(1), ctx.mk_true());
        let c2 = c1.write(&ctx, k, ctx.mk_int(2), ctx.mk_true());
        assert_eq!(c0.read(&ctx, &k), ctx.mk_int(0));
        assert_eq!(c1.read(&ctx, &k), ctx.mk_int(1));
        assert_eq!(c2.read(&ctx, &k), ctx.mk_int(2));
    }

    #[test]
    fn test_write_range() {
        let ctx = ExprManager::new();
        let ki = ArrayIndexKeyInfo::default();
        let arr = ctx.mk_addr(1);
        let c = SymbolicCollection::allocated(&ctx, "int[]", Sort::Int, ki);
        let c = c.write(&ctx, (arr, ctx.mk_int(3)), ctx.mk_int(30), ctx.mk_true());
        let c = c.write_range(
            &ctx,
            (arr, ctx.mk_int(0)),
            (arr, ctx.mk_int(9)),
            ctx.mk_int(-1),
            ctx.mk_true(),
        );
        assert_eq!(c.read(&ctx, &(arr, ctx.mk_int(3))), ctx.mk_int(-1));
        assert_eq!(c.read(&ctx, &(arr, ctx.mk_int(10))), ctx.mk_int(0));
        assert_eq!(c.read(&ctx, &(ctx.mk_addr(2), ctx.mk_int(3))), ctx.mk_int(0));
    }

    #[test]
    #[should_panic(expected = "Heap references should not be compared!")]
    fn test_range_over_refs_panics() {
        let ctx = ExprManager::new();
        let c = SymbolicCollection::allocated(&ctx, "f", Sort::Int, HeapRefKeyInfo);
        c.write_range(&ctx, ctx.mk_addr(1), ctx.mk_addr(2), ctx.mk_int(0), ctx.mk_true());
    }

    #[test]
    fn test_guarded_merge() {
        let ctx = ExprManager::new();
        let base = SymbolicCollection::allocated(&ctx, "f", Sort::Int, HeapRefKeyInfo);
        let k = ctx.mk_addr(1);
        let g = ctx.mk_const("g", Sort::Bool);

        let left = base.write(&ctx, k, ctx.mk_int(1), ctx.mk_true());
        let right = base.write(&ctx, k, ctx.mk_int(2), ctx.mk_true());
        let merged = SymbolicCollection::guarded_merge(&ctx, &left, &right, g);
        assert_eq!(merged.read(&ctx, &k), ctx.mk_ite(g, ctx.mk_int(1), ctx.mk_int(2)));

        let same = SymbolicCollection::guarded_merge(&ctx, &left, &left.clone(), g);
        assert_eq!(same.len(), left.len());
    }

    #[test]
    #[should_panic(expected = "has sort Bool, but collection")]
    fn test_value_sort_checked() {
        let ctx = ExprManager::new();
        let c = SymbolicCollection::allocated(&ctx, "a", Sort::Int, IndexKeyInfo);
        c.write(&ctx, ctx.mk_int(0), ctx.mk_true(), ctx.mk_true());
    }
}
