//! Region lattices over key spaces.
//!
//! A region over-approximates the set of keys a symbolic key may denote. Collections compare the
//! region of a write with the region of a read to skip writes that cannot affect the read.
//!
//! | Implementation | Keys | Unknown key |
//! |----------------|------|-------------|
//! | [`SetRegion`] | concrete heap addresses | universe |
//! | [`IntervalsRegion`] | signed 64-bit indices | `[i64::MIN, i64::MAX]` |
//! | [`ProductRegion`] | pairs, e.g. `(ref, index)` | top in both components |
//!
//! # Lattice Properties
//!
//! Every region must satisfy:
//! - `a ∪ b = b ∪ a`, `a ∩ b = b ∩ a`, both associative and idempotent
//! - `a ∩ ⊤ = a`, `a ∪ ⊥ = a`
//! - `⊥` is empty
//!
//! Regions are immutable values: every operation returns a new region.

mod intervals;
mod product;
mod set;

use std::fmt::Debug;

pub use intervals::IntervalsRegion;
pub use product::ProductRegion;
pub use set::SetRegion;

/// Relation between two regions, as seen from the first one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RegionComparison {
    /// The regions have no common key.
    Disjoint,
    /// The first region contains every key of the second one.
    Includes,
    /// The regions share some, but not all, keys of the second one.
    Intersects,
}

/// Region lattice interface.
pub trait Region: Clone + Debug + PartialEq + Sized {
    /// The region containing every key (⊤).
    fn top() -> Self;

    /// The empty region (⊥).
    fn bottom() -> Self;

    fn is_empty(&self) -> bool;

    /// Least upper bound. Implementations may over-approximate.
    fn union(&self, other: &Self) -> Self;

    /// Greatest lower bound.
    fn intersect(&self, other: &Self) -> Self;

    /// Keys of `self` that are not in `other`. Implementations may over-approximate.
    fn subtract(&self, other: &Self) -> Self;

    fn compare(&self, other: &Self) -> RegionComparison {
        if self.intersect(other).is_empty() {
            RegionComparison::Disjoint
        } else if other.subtract(self).is_empty() {
            RegionComparison::Includes
        } else {
            RegionComparison::Intersects
        }
    }

    /// Whether `self` and `other` share no key.
    fn is_disjoint(&self, other: &Self) -> bool {
        self.intersect(other).is_empty()
    }
}
