//! Key-domain strategies for symbolic collections.
//!
//! A [`KeyInfo`] tells a collection how to compare its keys, both symbolically (producing a formula)
//! and concretely (a fast path answered without building terms), and how to map a key onto a
//! [`Region`] so that reads can skip writes to provably different keys.
//!
//! Three domains are provided:
//! - [`HeapRefKeyInfo`]: heap references, unordered, regions are sets of concrete addresses;
//! - [`IndexKeyInfo`]: 64-bit signed indices, ordered, regions are interval unions;
//! - [`CompositeKeyInfo`]: pairs of keys, ordered lexicographically within a fixed first component.

use std::fmt::Debug;

use crate::expr::{ExprManager, ExprRef};
use crate::region::{IntervalsRegion, ProductRegion, Region, SetRegion};

/// Key-domain contract consumed by [`SymbolicCollection`][crate::collection::SymbolicCollection].
pub trait KeyInfo: Clone + Debug {
    type Key: Clone + Debug + Eq;
    type Region: Region;

    /// Formula that holds iff the two keys denote the same cell.
    fn eq_symbolic(&self, ctx: &ExprManager, a: &Self::Key, b: &Self::Key) -> ExprRef;

    /// Whether the two keys are known to be equal without consulting a solver.
    fn eq_concrete(&self, a: &Self::Key, b: &Self::Key) -> bool;

    /// Formula for `a <= b`.
    ///
    /// # Panics
    ///
    /// Panics for unordered key domains.
    fn cmp_symbolic_le(&self, ctx: &ExprManager, a: &Self::Key, b: &Self::Key) -> ExprRef;

    /// Whether `a <= b` is known without consulting a solver.
    ///
    /// # Panics
    ///
    /// Panics for unordered key domains.
    fn cmp_concrete_le(&self, ctx: &ExprManager, a: &Self::Key, b: &Self::Key) -> bool;

    fn key_to_region(&self, ctx: &ExprManager, key: &Self::Key) -> Self::Region;

    /// Region covering every key in `[from, to]`.
    fn key_range_region(&self, ctx: &ExprManager, from: &Self::Key, to: &Self::Key) -> Self::Region;

    fn top_region(&self) -> Self::Region {
        Self::Region::top()
    }

    fn bottom_region(&self) -> Self::Region {
        Self::Region::bottom()
    }

    /// Flatten a key into the expressions it is made of.
    fn key_exprs(&self, key: &Self::Key) -> Vec<ExprRef>;

    /// Replace the heap reference `from` by `to` wherever the key mentions it.
    fn substitute_ref(&self, key: &Self::Key, from: ExprRef, to: ExprRef) -> Self::Key;

    /// Formula that holds iff every heap reference in the key equals `r`.
    fn ref_matches(&self, ctx: &ExprManager, key: &Self::Key, r: ExprRef) -> ExprRef;
}

/// Keys are heap references (address-sorted expressions).
#[derive(Debug, Copy, Clone, Default)]
pub struct HeapRefKeyInfo;

impl KeyInfo for HeapRefKeyInfo {
    type Key = ExprRef;
    type Region = SetRegion<u64>;

    fn eq_symbolic(&self, ctx: &ExprManager, a: &ExprRef, b: &ExprRef) -> ExprRef {
        ctx.mk_eq(*a, *b)
    }

    fn eq_concrete(&self, a: &ExprRef, b: &ExprRef) -> bool {
        a == b
    }

    fn cmp_symbolic_le(&self, _: &ExprManager, _: &ExprRef, _: &ExprRef) -> ExprRef {
        panic!("Heap references should not be compared!")
    }

    fn cmp_concrete_le(&self, _: &ExprManager, _: &ExprRef, _: &ExprRef) -> bool {
        panic!("Heap references should not be compared!")
    }

    fn key_to_region(&self, ctx: &ExprManager, key: &ExprRef) -> SetRegion<u64> {
        match ctx.addr_candidates(*key) {
            Some(addresses) => SetRegion::Finite(addresses),
            None => SetRegion::universe(),
        }
    }

    fn key_range_region(&self, _: &ExprManager, _: &ExprRef, _: &ExprRef) -> SetRegion<u64> {
        panic!("Heap references should not be compared!")
    }

    fn key_exprs(&self, key: &ExprRef) -> Vec<ExprRef> {
        vec![*key]
    }

    fn substitute_ref(&self, key: &ExprRef, from: ExprRef, to: ExprRef) -> ExprRef {
        if *key == from {
            to
        } else {
            *key
        }
    }

    fn ref_matches(&self, ctx: &ExprManager, key: &ExprRef, r: ExprRef) -> ExprRef {
        ctx.mk_eq(*key, r)
    }
}

/// Keys are integer-sorted expressions: array indices, sizes, map keys of primitive type.
#[derive(Debug, Copy, Clone, Default)]
pub struct IndexKeyInfo;

impl KeyInfo for IndexKeyInfo {
    type Key = ExprRef;
    type Region = IntervalsRegion;

    fn eq_symbolic(&self, ctx: &ExprManager, a: &ExprRef, b: &ExprRef) -> ExprRef {
        ctx.mk_eq(*a, *b)
    }

    fn eq_concrete(&self, a: &ExprRef, b: &ExprRef) -> bool {
        a == b
    }

    fn cmp_symbolic_le(&self, ctx: &ExprManager, a: &ExprRef, b: &ExprRef) -> ExprRef {
        ctx.mk_le(*a, *b)
    }

    fn cmp_concrete_le(&self, ctx: &ExprManager, a: &ExprRef, b: &ExprRef) -> bool {
        if a == b {
            return true;
        }
        match (ctx.as_int(*a), ctx.as_int(*b)) {
            (Some(x), Some(y)) => x <= y,
            _ => false,
        }
    }

    fn key_to_region(&self, ctx: &ExprManager, key: &ExprRef) -> IntervalsRegion {
        match ctx.int_candidates(*key) {
            Some(values) => IntervalsRegion::of_points(values),
            None => IntervalsRegion::top(),
        }
    }

    fn key_range_region(&self, ctx: &ExprManager, from: &ExprRef, to: &ExprRef) -> IntervalsRegion {
        match (ctx.as_int(*from), ctx.as_int(*to)) {
            (Some(from), Some(to)) => IntervalsRegion::closed(from, to),
            _ => IntervalsRegion::top(),
        }
    }

    fn key_exprs(&self, key: &ExprRef) -> Vec<ExprRef> {
        vec![*key]
    }

    fn substitute_ref(&self, key: &ExprRef, _: ExprRef, _: ExprRef) -> ExprRef {
        *key
    }

    fn ref_matches(&self, ctx: &ExprManager, _: &ExprRef, _: ExprRef) -> ExprRef {
        ctx.mk_true()
    }
}

/// Pairs of keys, e.g. `(array ref, index)` or `(map ref, map key)`.
///
/// Ordering compares the second components and requires the first ones to be equal.
#[derive(Debug, Copy, Clone, Default)]
pub struct CompositeKeyInfo<A, B> {
    first: A,
    second: B,
}

impl<A, B> CompositeKeyInfo<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

/// Key info of array cells: `(array ref, index)`.
pub type ArrayIndexKeyInfo = CompositeKeyInfo<HeapRefKeyInfo, IndexKeyInfo>;

impl<A: KeyInfo, B: KeyInfo> KeyInfo for CompositeKeyInfo<A, B> {
    type Key = (A::Key, B::Key);
    type Region = ProductRegion<A::Region, B::Region>;

    fn eq_symbolic(&self, ctx: &ExprManager, a: &Self::Key, b: &Self::Key) -> ExprRef {
        ctx.mk_and2(
            self.first.eq_symbolic(ctx, &a.0, &b.0),
            self.second.eq_symbolic(ctx, &a.1, &b.1),
        )
    }

    fn eq_concrete(&self, a: &Self::Key, b: &Self::Key) -> bool {
        self.first.eq_concrete(&a.0, &b.0) && self.second.eq_concrete(&a.1, &b.1)
    }

    fn cmp_symbolic_le(&self, ctx: &ExprManager, a: &Self::Key, b: &Self::Key) -> ExprRef {
        ctx.mk_and2(
            self.first.eq_symbolic(ctx, &a.0, &b.0),
            self.second.cmp_symbolic_le(ctx, &a.1, &b.1),
        )
    }

    fn cmp_concrete_le(&self, ctx: &ExprManager, a: &Self::Key, b: &Self::Key) -> bool {
        self.first.eq_concrete(&a.0, &b.0) && self.second.cmp_concrete_le(ctx, &a.1, &b.1)
    }

    fn key_to_region(&self, ctx: &ExprManager, key: &Self::Key) -> Self::Region {
        ProductRegion::new(
            self.first.key_to_region(ctx, &key.0),
            self.second.key_to_region(ctx, &key.1),
        )
    }

    fn key_range_region(&self, ctx: &ExprManager, from: &Self::Key, to: &Self::Key) -> Self::Region {
        assert_eq!(
            from.0, to.0,
            "Ranges over composite keys must share the first component"
        );
        ProductRegion::new(
            self.first.key_to_region(ctx, &from.0),
            self.second.key_range_region(ctx, &from.1, &to.1),
        )
    }

    fn key_exprs(&self, key: &Self::Key) -> Vec<ExprRef> {
        let mut exprs = self.first.key_exprs(&key.0);
        exprs.extend(self.second.key_exprs(&key.1));
        exprs
    }

    fn substitute_ref(&self, key: &Self::Key, from: ExprRef, to: ExprRef) -> Self::Key {
        (
            self.first.substitute_ref(&key.0, from, to),
            self.second.substitute_ref(&key.1, from, to),
        )
    }

    fn ref_matches(&self, ctx: &ExprManager, key: &Self::Key, r: ExprRef) -> ExprRef {
        ctx.mk_and2(
            self.first.ref_matches(ctx, &key.0, r),
            self.second.ref_matches(ctx, &key.1, r),
        )
    }
}
