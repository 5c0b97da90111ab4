//! Symbolic maps and sets on top of [`SymbolicCollection`].

use log::debug;

use crate::collection::{KeyMapping, KeySet, SymbolicCollection};
use crate::expr::{ExprManager, ExprRef, Sort};
use crate::key_info::{CompositeKeyInfo, HeapRefKeyInfo, KeyInfo};

/// Collection of booleans telling which keys are members.
#[derive(Debug, Clone)]
pub struct SymbolicSet<KI: KeyInfo> {
    members: SymbolicCollection<KI>,
}

impl<KI: KeyInfo> SymbolicSet<KI> {
    /// Set that is empty until written.
    pub fn empty(ctx: &ExprManager, name: &str, key_info: KI) -> Self {
        Self {
            members: SymbolicCollection::allocated(ctx, name, Sort::Bool, key_info),
        }
    }

    /// Set with unknown initial members.
    pub fn input(ctx: &ExprManager, name: &str, key_info: KI) -> Self {
        Self {
            members: SymbolicCollection::input(ctx, name, Sort::Bool, key_info),
        }
    }

    pub fn collection(&self) -> &SymbolicCollection<KI> {
        &self.members
    }

    pub fn contains(&self, ctx: &ExprManager, key: &KI::Key) -> ExprRef {
        self.members.read(ctx, key)
    }

    pub fn add(&self, ctx: &ExprManager, key: KI::Key, guard: ExprRef) -> Self {
        Self {
            members: self.members.write(ctx, key, ctx.mk_true(), guard),
        }
    }

    pub fn remove(&self, ctx: &ExprManager, key: KI::Key, guard: ExprRef) -> Self {
        Self {
            members: self.members.write(ctx, key, ctx.mk_false(), guard),
        }
    }

    pub fn guarded_merge(ctx: &ExprManager, left: &Self, right: &Self, guard: ExprRef) -> Self {
        Self {
            members: SymbolicCollection::guarded_merge(ctx, &left.members, &right.members, guard),
        }
    }
}

/// Key info of map entries: `(map ref, map key)`.
pub type MapKeyInfo<KI> = CompositeKeyInfo<HeapRefKeyInfo, KI>;

/// All maps of one map type, keyed by `(map ref, key)`.
///
/// Values and membership are kept in two collections over the same keys; an entry is present iff
/// the key set reads `true`.
#[derive(Debug, Clone)]
pub struct SymbolicMap<KI: KeyInfo> {
    values: SymbolicCollection<MapKeyInfo<KI>>,
    keys: SymbolicSet<MapKeyInfo<KI>>,
}

impl<KI: KeyInfo> SymbolicMap<KI> {
    /// Maps that are empty until written.
    pub fn empty(ctx: &ExprManager, name: &str, value_sort: Sort, key_info: KI) -> Self {
        let key_info = CompositeKeyInfo::new(HeapRefKeyInfo, key_info);
        Self {
            values: SymbolicCollection::allocated(ctx, name, value_sort, key_info.clone()),
            keys: SymbolicSet::empty(ctx, &format!("{}.keys", name), key_info),
        }
    }

    /// Maps with unknown initial entries.
    pub fn input(ctx: &ExprManager, name: &str, value_sort: Sort, key_info: KI) -> Self {
        let key_info = CompositeKeyInfo::new(HeapRefKeyInfo, key_info);
        Self {
            values: SymbolicCollection::input(ctx, name, value_sort, key_info.clone()),
            keys: SymbolicSet::input(ctx, &format!("{}.keys", name), key_info),
        }
    }

    pub fn values(&self) -> &SymbolicCollection<MapKeyInfo<KI>> {
        &self.values
    }

    pub fn keys(&self) -> &SymbolicSet<MapKeyInfo<KI>> {
        &self.keys
    }

    /// Value stored under `key` in map `map`. Absent keys read as the values' base.
    pub fn get(&self, ctx: &ExprManager, map: ExprRef, key: KI::Key) -> ExprRef {
        self.values.read(ctx, &(map, key))
    }

    pub fn contains(&self, ctx: &ExprManager, map: ExprRef, key: KI::Key) -> ExprRef {
        self.keys.contains(ctx, &(map, key))
    }

    pub fn put(&self, ctx: &ExprManager, map: ExprRef, key: KI::Key, value: ExprRef, guard: ExprRef) -> Self {
        Self {
            values: self.values.write(ctx, (map, key.clone()), value, guard),
            keys: self.keys.add(ctx, (map, key), guard),
        }
    }

    pub fn remove(&self, ctx: &ExprManager, map: ExprRef, key: KI::Key, guard: ExprRef) -> Self {
        Self {
            values: self.values.clone(),
            keys: self.keys.remove(ctx, (map, key), guard),
        }
    }

    /// Copy every entry of map `src` in `donor` into map `dst` of `self`, when `guard` holds.
    ///
    /// Entries of `dst` whose key is absent from `src` are kept.
    pub fn merge_from(
        &self,
        ctx: &ExprManager,
        dst: ExprRef,
        donor: &SymbolicMap<KI>,
        src: ExprRef,
        guard: ExprRef,
    ) -> Self {
        debug!("merge_from(dst = {}, src = {})", dst, src);
        let mapping = KeyMapping::SubstituteRef { from: dst, to: src };
        let donor_keys = KeySet::Collection(donor.keys.collection().clone());
        let values = self.values.apply_merge_adapter(
            ctx,
            mapping,
            donor_keys.clone(),
            donor.values.clone(),
            guard,
        );
        let members = self.keys.collection().apply_merge_adapter(
            ctx,
            mapping,
            donor_keys,
            donor.keys.collection().clone(),
            guard,
        );
        Self {
            values,
            keys: SymbolicSet { members },
        }
    }

    pub fn guarded_merge(ctx: &ExprManager, left: &Self, right: &Self, guard: ExprRef) -> Self {
        Self {
            values: SymbolicCollection::guarded_merge(ctx, &left.values, &right.values, guard),
            keys: SymbolicSet::guarded_merge(ctx, &left.keys, &right.keys, guard),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::key_info::IndexKeyInfo;

    #[test]
    fn test_set() {
        let ctx = ExprManager::new();
        let s = SymbolicSet::empty(&ctx, "s", IndexKeyInfo);
        let (a, b) = (ctx.mk_int(1), ctx.mk_int(2));
        let s = s.add(&ctx, a, ctx.mk_true());
        assert!(ctx.is_true(s.contains(&ctx, &a)));
        assert!(ctx.is_false(s.contains(&ctx, &b)));
        let s = s.remove(&ctx, a, ctx.mk_true());
        assert!(ctx.is_false(s.contains(&ctx, &a)));
    }

    #[test]
    fn test_map_put_get() {
        let ctx = ExprManager::new();
        let m = SymbolicMap::empty(&ctx, "m", Sort::Int, IndexKeyInfo);
        let (m1, m2) = (ctx.mk_addr(1), ctx.mk_addr(2));
        let k = ctx.mk_int(5);

        let m = m.put(&ctx, m1, k, ctx.mk_int(50), ctx.mk_true());
        assert_eq!(m.get(&ctx, m1, k), ctx.mk_int(50));
        assert!(ctx.is_true(m.contains(&ctx, m1, k)));
        assert!(ctx.is_false(m.contains(&ctx, m2, k)));

        let m = m.remove(&ctx, m1, k, ctx.mk_true());
        assert!(ctx.is_false(m.contains(&ctx, m1, k)));
    }

    #[test]
    fn test_merge_from() {
        let ctx = ExprManager::new();
        let m = SymbolicMap::empty(&ctx, "m", Sort::Int, IndexKeyInfo);
        let (dst, src) = (ctx.mk_addr(1), ctx.mk_addr(2));
        let (k1, k2, k3) = (ctx.mk_int(1), ctx.mk_int(2), ctx.mk_int(3));

        let m = m
            .put(&ctx, dst, k1, ctx.mk_int(10), ctx.mk_true())
            .put(&ctx, dst, k2, ctx.mk_int(20), ctx.mk_true())
            .put(&ctx, src, k2, ctx.mk_int(200), ctx.mk_true())
            .put(&ctx, src, k3, ctx.mk_int(300), ctx.mk_true());
        let merged = m.merge_from(&ctx, dst, &m, src, ctx.mk_true());

        assert_eq!(merged.get(&ctx, dst, k1), ctx.mk_int(10));
        assert_eq!(merged.get(&ctx, dst, k2), ctx.mk_int(200));
        assert_eq!(merged.get(&ctx, dst, k3), ctx.mk_int(300));
        assert!(ctx.is_true(merged.contains(&ctx, dst, k3)));
        assert!(ctx.is_false(merged.contains(&ctx, src, k1)));
    }
}
