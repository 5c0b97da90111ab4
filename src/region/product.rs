use std::fmt::{self, Display, Formatter};

use super::{Region, RegionComparison};

/// Cartesian product of two independent regions.
///
/// A product is empty iff either component is empty; every empty product is stored as
/// `(⊥, ⊥)` so that equality stays structural.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ProductRegion<A, B> {
    first: A,
    second: B,
}

impl<A: Region, B: Region> ProductRegion<A, B> {
    pub fn new(first: A, second: B) -> Self {
        if first.is_empty() || second.is_empty() {
            Self {
                first: A::bottom(),
                second: B::bottom(),
            }
        } else {
            Self { first, second }
        }
    }

    pub fn first(&self) -> &A {
        &self.first
    }

    pub fn second(&self) -> &B {
        &self.second
    }
}

impl<A: Region, B: Region> Region for ProductRegion<A, B> {
    fn top() -> Self {
        Self::new(A::top(), B::top())
    }

    fn bottom() -> Self {
        Self::new(A::bottom(), B::bottom())
    }

    fn is_empty(&self) -> bool {
        self.first.is_empty() || self.second.is_empty()
    }

    /// Component-wise union. Over-approximates unless one side is empty.
    fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        Self::new(self.first.union(&other.first), self.second.union(&other.second))
    }

    fn intersect(&self, other: &Self) -> Self {
        Self::new(
            self.first.intersect(&other.first),
            self.second.intersect(&other.second),
        )
    }

    /// Exact when `other` covers one of our components completely, otherwise `self`.
    fn subtract(&self, other: &Self) -> Self {
        if self.is_disjoint(other) {
            return self.clone();
        }
        if other.first.compare(&self.first) == RegionComparison::Includes {
            return Self::new(self.first.clone(), self.second.subtract(&other.second));
        }
        if other.second.compare(&self.second) == RegionComparison::Includes {
            return Self::new(self.first.subtract(&other.first), self.second.clone());
        }
        self.clone()
    }

    fn compare(&self, other: &Self) -> RegionComparison {
        if self.is_disjoint(other) {
            return RegionComparison::Disjoint;
        }
        let first = self.first.compare(&other.first);
        let second = self.second.compare(&other.second);
        if first == RegionComparison::Includes && second == RegionComparison::Includes {
            RegionComparison::Includes
        } else {
            RegionComparison::Intersects
        }
    }
}

impl<A: Display, B: Display> Display for ProductRegion<A, B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} × {}", self.first, self.second)
    }
}
