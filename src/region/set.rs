use std::collections::BTreeSet;
use std::fmt::{self, Debug, Display, Formatter};

use super::Region;

/// Region of discrete points: either a finite set, or the universe minus a finite set.
///
/// Used for heap addresses: a concrete address maps to a singleton, a symbolic address to the
/// universe. Keeping co-finite sets makes `subtract` exact.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum SetRegion<T: Ord> {
    Finite(BTreeSet<T>),
    /// Every point except the listed ones.
    CoFinite(BTreeSet<T>),
}

impl<T: Ord + Clone> SetRegion<T> {
    pub fn empty() -> Self {
        SetRegion::Finite(BTreeSet::new())
    }

    pub fn universe() -> Self {
        SetRegion::CoFinite(BTreeSet::new())
    }

    pub fn singleton(point: T) -> Self {
        SetRegion::Finite(BTreeSet::from([point]))
    }

    pub fn of(points: impl IntoIterator<Item = T>) -> Self {
        SetRegion::Finite(points.into_iter().collect())
    }

    pub fn contains(&self, point: &T) -> bool {
        match self {
            SetRegion::Finite(points) => points.contains(point),
            SetRegion::CoFinite(excluded) => !excluded.contains(point),
        }
    }

    pub fn is_universe(&self) -> bool {
        matches!(self, SetRegion::CoFinite(excluded) if excluded.is_empty())
    }
}

impl<T: Ord + Clone + Debug> Region for SetRegion<T> {
    fn top() -> Self {
        Self::universe()
    }

    fn bottom() -> Self {
        Self::empty()
    }

    fn is_empty(&self) -> bool {
        matches!(self, SetRegion::Finite(points) if points.is_empty())
    }

    fn union(&self, other: &Self) -> Self {
        use SetRegion::*;
        match (self, other) {
            (Finite(a), Finite(b)) => Finite(a.union(b).cloned().collect()),
            (Finite(a), CoFinite(b)) | (CoFinite(b), Finite(a)) => {
                CoFinite(b.difference(a).cloned().collect())
            }
            (CoFinite(a), CoFinite(b)) => CoFinite(a.intersection(b).cloned().collect()),
        }
    }

    fn intersect(&self, other: &Self) -> Self {
        use SetRegion::*;
        match (self, other) {
            (Finite(a), Finite(b)) => Finite(a.intersection(b).cloned().collect()),
            (Finite(a), CoFinite(b)) | (CoFinite(b), Finite(a)) => {
                Finite(a.difference(b).cloned().collect())
            }
            (CoFinite(a), CoFinite(b)) => CoFinite(a.union(b).cloned().collect()),
        }
    }

    fn subtract(&self, other: &Self) -> Self {
        use SetRegion::*;
        match (self, other) {
            (Finite(a), Finite(b)) => Finite(a.difference(b).cloned().collect()),
            (Finite(a), CoFinite(b)) => Finite(a.intersection(b).cloned().collect()),
            (CoFinite(a), Finite(b)) => CoFinite(a.union(b).cloned().collect()),
            (CoFinite(a), CoFinite(b)) => Finite(b.difference(a).cloned().collect()),
        }
    }
}

impl<T: Ord + Display> Display for SetRegion<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (prefix, points) = match self {
            SetRegion::Finite(points) => ("", points),
            SetRegion::CoFinite(points) if points.is_empty() => return write!(f, "⊤"),
            SetRegion::CoFinite(points) => ("⊤ \\ ", points),
        };
        write!(f, "{}{{", prefix)?;
        for (i, p) in points.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, "}}")
    }
}
