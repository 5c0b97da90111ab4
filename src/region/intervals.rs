use std::fmt::{self, Display, Formatter};

use super::Region;

/// Finite union of closed `i64` intervals.
///
/// Intervals are kept sorted, disjoint and non-adjacent, so structurally equal regions denote the
/// same set of points.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct IntervalsRegion {
    intervals: Vec<(i64, i64)>,
}

impl IntervalsRegion {
    /// The closed interval `[from, to]`, empty when `from > to`.
    pub fn closed(from: i64, to: i64) -> Self {
        if from > to {
            Self::bottom()
        } else {
            Self {
                intervals: vec![(from, to)],
            }
        }
    }

    pub fn point(value: i64) -> Self {
        Self::closed(value, value)
    }

    pub fn of_points(points: impl IntoIterator<Item = i64>) -> Self {
        Self::normalized(points.into_iter().map(|p| (p, p)).collect())
    }

    pub fn contains(&self, value: i64) -> bool {
        self.intervals
            .iter()
            .any(|&(from, to)| from <= value && value <= to)
    }

    pub fn intervals(&self) -> &[(i64, i64)] {
        &self.intervals
    }

    fn normalized(mut intervals: Vec<(i64, i64)>) -> Self {
        intervals.retain(|&(from, to)| from <= to);
        intervals.sort_unstable();
        let mut result: Vec<(i64, i64)> = Vec::with_capacity(intervals.len());
        for (from, to) in intervals {
            match result.last_mut() {
                Some(last) if from <= last.1.saturating_add(1) => last.1 = last.1.max(to),
                _ => result.push((from, to)),
            }
        }
        Self { intervals: result }
    }

    fn complement(&self) -> Self {
        let mut result = Vec::with_capacity(self.intervals.len() + 1);
        let mut start = Some(i64::MIN);
        for &(from, to) in &self.intervals {
            let Some(s) = start else { break };
            if from > s {
                result.push((s, from - 1));
            }
            start = to.checked_add(1);
        }
        if let Some(s) = start {
            result.push((s, i64::MAX));
        }
        Self { intervals: result }
    }
}

impl Region for IntervalsRegion {
    fn top() -> Self {
        Self::closed(i64::MIN, i64::MAX)
    }

    fn bottom() -> Self {
        Self {
            intervals: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    fn union(&self, other: &Self) -> Self {
        let mut all = self.intervals.clone();
        all.extend_from_slice(&other.intervals);
        Self::normalized(all)
    }

    fn intersect(&self, other: &Self) -> Self {
        let (a, b) = (&self.intervals, &other.intervals);
        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            let from = a[i].0.max(b[j].0);
            let to = a[i].1.min(b[j].1);
            if from <= to {
                result.push((from, to));
            }
            if a[i].1 < b[j].1 {
                i += 1;
            } else {
                j += 1;
            }
        }
        Self { intervals: result }
    }

    fn subtract(&self, other: &Self) -> Self {
        self.intersect(&other.complement())
    }
}

impl Display for IntervalsRegion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "∅");
        }
        for (i, &(from, to)) in self.intervals.iter().enumerate() {
            if i > 0 {
                write!(f, " ∪ ")?;
            }
            if from == to {
                write!(f, "{{{}}}", from)?;
            } else {
                write!(f, "[{}, {}]", from, to)?;
            }
        }
        Ok(())
    }
}
