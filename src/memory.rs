//! Memory snapshot of one execution state.
//!
//! Every heap location lives in a [`SymbolicCollection`]: one collection per field, one per array
//! type, and one for the lengths of each array type. A collection is split in two halves: writes and
//! reads through a concrete address go to the *allocated* half (unwritten keys hold the default
//! value), and writes and reads through a symbolic reference go to the *input* half (unwritten keys
//! hold unknown input values). References that are `ite` terms are split along their branches.
//!
//! Collection identifiers are derived from field and array-type names, so two snapshots forked from
//! the same ancestor, or built independently over the same [`ExprManager`], can be merged.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use log::{debug, trace};

use crate::collection::SymbolicCollection;
use crate::expr::{Expr, ExprManager, ExprRef, Sort};
use crate::key_info::{ArrayIndexKeyInfo, HeapRefKeyInfo, KeyInfo};
use crate::merge::{MergeGuard, Merger};

/// Collection pair split by the kind of reference used to access it.
#[derive(Debug, Clone)]
struct SplitRegion<KI: KeyInfo> {
    allocated: SymbolicCollection<KI>,
    input: SymbolicCollection<KI>,
}

impl<KI: KeyInfo> SplitRegion<KI> {
    fn new(ctx: &ExprManager, name: &str, sort: Sort, key_info: KI) -> Self {
        Self {
            allocated: SymbolicCollection::allocated(ctx, name, sort, key_info.clone()),
            input: SymbolicCollection::input(ctx, &format!("{}.input", name), sort, key_info),
        }
    }

    /// Region with the same collections and no updates.
    fn empty_like(&self) -> Self {
        let fresh = |c: &SymbolicCollection<KI>| {
            SymbolicCollection::new(c.id(), c.sort(), c.base(), c.key_info().clone())
        };
        Self {
            allocated: fresh(&self.allocated),
            input: fresh(&self.input),
        }
    }

    fn sort(&self) -> Sort {
        self.allocated.sort()
    }

    fn read(&self, ctx: &ExprManager, r: ExprRef, key: &dyn Fn(ExprRef) -> KI::Key) -> ExprRef {
        match *ctx.expr(r) {
            Expr::Ite(c, a, b) => ctx.mk_ite(c, self.read(ctx, a, key), self.read(ctx, b, key)),
            Expr::Addr(_) => self.allocated.read(ctx, &key(r)),
            _ => self.input.read(ctx, &key(r)),
        }
    }

    /// Apply `update` to the half addressed by every leaf of `r`, with the guard under which `r`
    /// evaluates to that leaf.
    fn update(
        &self,
        ctx: &ExprManager,
        r: ExprRef,
        guard: ExprRef,
        update: &dyn Fn(&SymbolicCollection<KI>, ExprRef, ExprRef) -> SymbolicCollection<KI>,
    ) -> Self {
        if ctx.is_false(guard) {
            return self.clone();
        }
        match *ctx.expr(r) {
            Expr::Ite(c, a, b) => {
                let this = self.update(ctx, a, ctx.mk_and2(guard, c), update);
                this.update(ctx, b, ctx.mk_and2(guard, ctx.mk_not(c)), update)
            }
            Expr::Addr(_) => Self {
                allocated: update(&self.allocated, r, guard),
                input: self.input.clone(),
            },
            _ => Self {
                allocated: self.allocated.clone(),
                input: update(&self.input, r, guard),
            },
        }
    }

    fn guarded_merge(ctx: &ExprManager, left: &Self, right: &Self, guard: ExprRef) -> Self {
        Self {
            allocated: SymbolicCollection::guarded_merge(ctx, &left.allocated, &right.allocated, guard),
            input: SymbolicCollection::guarded_merge(ctx, &left.input, &right.input, guard),
        }
    }
}

fn merge_regions<KI: KeyInfo>(
    ctx: &ExprManager,
    left: &BTreeMap<String, SplitRegion<KI>>,
    right: &BTreeMap<String, SplitRegion<KI>>,
    guard: ExprRef,
) -> BTreeMap<String, SplitRegion<KI>> {
    let names: BTreeSet<&String> = left.keys().chain(right.keys()).collect();
    names
        .into_iter()
        .map(|name| {
            let merged = match (left.get(name), right.get(name)) {
                (Some(l), Some(r)) => SplitRegion::guarded_merge(ctx, l, r, guard),
                (Some(l), None) => SplitRegion::guarded_merge(ctx, l, &l.empty_like(), guard),
                (None, Some(r)) => SplitRegion::guarded_merge(ctx, &r.empty_like(), r, guard),
                (None, None) => unreachable!(),
            };
            (name.clone(), merged)
        })
        .collect()
}

/// Heap, arrays and local registers of one state.
///
/// `T` is the type recorded for each allocated object.
#[derive(Debug, Clone)]
pub struct Memory<T> {
    fields: BTreeMap<String, SplitRegion<HeapRefKeyInfo>>,
    arrays: BTreeMap<String, SplitRegion<ArrayIndexKeyInfo>>,
    lengths: BTreeMap<String, SplitRegion<HeapRefKeyInfo>>,
    frames: Vec<BTreeMap<u32, ExprRef>>,
    types: BTreeMap<u64, T>,
    next_address: u64,
}

impl<T> Default for Memory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Memory<T> {
    /// Empty memory with a single frame of locals.
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            arrays: BTreeMap::new(),
            lengths: BTreeMap::new(),
            frames: vec![BTreeMap::new()],
            types: BTreeMap::new(),
            next_address: 1,
        }
    }

    /// Allocate a fresh object of type `ty` and return its address.
    pub fn alloc(&mut self, ctx: &ExprManager, ty: T) -> ExprRef
    where
        T: Debug,
    {
        let address = self.next_address;
        debug!("alloc(ty = {:?}) -> {}", ty, address);
        self.next_address += 1;
        self.types.insert(address, ty);
        ctx.mk_addr(address)
    }

    /// Allocate an array of type `ty` holding `length` elements of `array_type`.
    pub fn alloc_array(&mut self, ctx: &ExprManager, ty: T, array_type: &str, length: ExprRef) -> ExprRef
    where
        T: Debug,
    {
        let r = self.alloc(ctx, ty);
        self.set_array_length(ctx, r, array_type, length, ctx.mk_true());
        r
    }

    /// Type recorded for a concrete address.
    pub fn type_of(&self, address: u64) -> Option<&T> {
        self.types.get(&address)
    }

    /// Next address [`alloc`][Memory::alloc] will return.
    pub fn next_address(&self) -> u64 {
        self.next_address
    }

    pub fn read_field(&self, ctx: &ExprManager, r: ExprRef, field: &str, sort: Sort) -> ExprRef {
        debug!("read_field(ref = {}, field = {})", r, field);
        let key = |leaf: ExprRef| leaf;
        match self.fields.get(field) {
            Some(region) => region.read(ctx, r, &key),
            None => SplitRegion::new(ctx, &field_name(field), sort, HeapRefKeyInfo).read(ctx, r, &key),
        }
    }

    pub fn write_field(&mut self, ctx: &ExprManager, r: ExprRef, field: &str, value: ExprRef, guard: ExprRef) {
        debug!("write_field(ref = {}, field = {}, value = {})", r, field, value);
        let region = self
            .fields
            .entry(field.to_string())
            .or_insert_with(|| SplitRegion::new(ctx, &field_name(field), ctx.sort(value), HeapRefKeyInfo));
        *region = region.update(ctx, r, guard, &|c, leaf, g| c.write(ctx, leaf, value, g));
    }

    pub fn read_array(&self, ctx: &ExprManager, r: ExprRef, index: ExprRef, array_type: &str, sort: Sort) -> ExprRef {
        debug!("read_array(ref = {}, index = {}, array = {})", r, index, array_type);
        let key = |leaf: ExprRef| (leaf, index);
        match self.arrays.get(array_type) {
            Some(region) => region.read(ctx, r, &key),
            None => SplitRegion::new(ctx, &array_name(array_type), sort, ArrayIndexKeyInfo::default())
                .read(ctx, r, &key),
        }
    }

    pub fn write_array(
        &mut self,
        ctx: &ExprManager,
        r: ExprRef,
        index: ExprRef,
        array_type: &str,
        value: ExprRef,
        guard: ExprRef,
    ) {
        debug!(
            "write_array(ref = {}, index = {}, array = {}, value = {})",
            r, index, array_type, value
        );
        let region = self.array_region(ctx, array_type, ctx.sort(value));
        *region = region.update(ctx, r, guard, &|c, leaf, g| c.write(ctx, (leaf, index), value, g));
    }

    /// Store `value` at every index in `[from, to]` of the array `r`.
    pub fn fill_array(
        &mut self,
        ctx: &ExprManager,
        r: ExprRef,
        from: ExprRef,
        to: ExprRef,
        array_type: &str,
        value: ExprRef,
        guard: ExprRef,
    ) {
        debug!(
            "fill_array(ref = {}, from = {}, to = {}, array = {}, value = {})",
            r, from, to, array_type, value
        );
        let region = self.array_region(ctx, array_type, ctx.sort(value));
        *region = region.update(ctx, r, guard, &|c, leaf, g| {
            c.write_range(ctx, (leaf, from), (leaf, to), value, g)
        });
    }

    fn array_region(&mut self, ctx: &ExprManager, array_type: &str, sort: Sort) -> &mut SplitRegion<ArrayIndexKeyInfo> {
        self.arrays
            .entry(array_type.to_string())
            .or_insert_with(|| SplitRegion::new(ctx, &array_name(array_type), sort, ArrayIndexKeyInfo::default()))
    }

    pub fn array_length(&self, ctx: &ExprManager, r: ExprRef, array_type: &str) -> ExprRef {
        let key = |leaf: ExprRef| leaf;
        match self.lengths.get(array_type) {
            Some(region) => region.read(ctx, r, &key),
            None => SplitRegion::new(ctx, &length_name(array_type), Sort::Int, HeapRefKeyInfo).read(ctx, r, &key),
        }
    }

    pub fn set_array_length(&mut self, ctx: &ExprManager, r: ExprRef, array_type: &str, length: ExprRef, guard: ExprRef) {
        trace!("set_array_length(ref = {}, array = {}, length = {})", r, array_type, length);
        let region = self
            .lengths
            .entry(array_type.to_string())
            .or_insert_with(|| SplitRegion::new(ctx, &length_name(array_type), Sort::Int, HeapRefKeyInfo));
        *region = region.update(ctx, r, guard, &|c, leaf, g| c.write(ctx, leaf, length, g));
    }

    /// Number of local frames.
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_frame(&mut self) {
        self.frames.push(BTreeMap::new());
    }

    /// # Panics
    ///
    /// Panics if only the outermost frame is left.
    pub fn pop_frame(&mut self) {
        assert!(self.frames.len() > 1, "Cannot pop the outermost frame");
        self.frames.pop();
    }

    /// Local register `index` of the innermost frame.
    pub fn read_local(&self, index: u32) -> Option<ExprRef> {
        self.frames.last().and_then(|frame| frame.get(&index).copied())
    }

    pub fn write_local(&mut self, index: u32, value: ExprRef) {
        trace!("write_local(index = {}, value = {})", index, value);
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(index, value);
        }
    }

    /// Memory reading as `left` when `guard` holds and as `right` otherwise.
    ///
    /// Returns `None` when the snapshots have different frame layouts, disagree on the sort of a
    /// local, or allocated the same address with different types.
    pub fn merge(ctx: &ExprManager, left: &Self, right: &Self, guard: ExprRef) -> Option<Self>
    where
        T: Clone + Eq + Debug,
    {
        debug!("merge(guard = {})", guard);
        if left.frames.len() != right.frames.len() {
            trace!("frame depths differ: {} vs {}", left.frames.len(), right.frames.len());
            return None;
        }
        let mut frames = Vec::with_capacity(left.frames.len());
        for (l, r) in left.frames.iter().zip(&right.frames) {
            if !l.keys().eq(r.keys()) {
                trace!("local sets differ");
                return None;
            }
            let mut frame = BTreeMap::new();
            for ((&index, &a), &b) in l.iter().zip(r.values()) {
                if ctx.sort(a) != ctx.sort(b) {
                    trace!("local {} has sorts {} and {}", index, ctx.sort(a), ctx.sort(b));
                    return None;
                }
                frame.insert(index, ctx.mk_ite(guard, a, b));
            }
            frames.push(frame);
        }

        let mut types = left.types.clone();
        for (&address, ty) in &right.types {
            match types.get(&address) {
                Some(known) if known != ty => {
                    trace!("address {} has types {:?} and {:?}", address, known, ty);
                    return None;
                }
                Some(_) => {}
                None => {
                    types.insert(address, ty.clone());
                }
            }
        }

        Some(Self {
            fields: merge_regions(ctx, &left.fields, &right.fields, guard),
            arrays: merge_regions(ctx, &left.arrays, &right.arrays, guard),
            lengths: merge_regions(ctx, &left.lengths, &right.lengths, guard),
            frames,
            types,
            next_address: left.next_address.max(right.next_address),
        })
    }

    /// Names and sorts of the fields written so far.
    pub fn fields(&self) -> impl Iterator<Item = (&str, Sort)> {
        self.fields.iter().map(|(name, region)| (name.as_str(), region.sort()))
    }
}

impl<T: Clone + Eq + Debug> Merger<Memory<T>> for ExprManager {
    /// Merges under the left-only constraints of `by`, which must be complete already.
    fn merge(&self, left: &Memory<T>, right: &Memory<T>, by: &mut MergeGuard) -> Option<Memory<T>> {
        Memory::merge(self, left, right, by.this_constraint(self))
    }
}

fn field_name(field: &str) -> String {
    format!("field:{}", field)
}

fn array_name(array_type: &str) -> String {
    format!("array:{}", array_type)
}

fn length_name(array_type: &str) -> String {
    format!("length:{}", array_type)
}
