//! Lazy, filterable streams of candidate types.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use log::debug;

use super::TypeSystem;

/// Outcome of [`TypeStream::take`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TypesResult<T> {
    /// No type satisfies the constraints.
    Empty,
    /// Every matching type. The stream has nothing more.
    Exhausted(Vec<T>),
    /// As many types as requested. More may follow.
    Partial(Vec<T>),
}

impl<T> TypesResult<T> {
    pub fn types(&self) -> &[T] {
        match self {
            TypesResult::Empty => &[],
            TypesResult::Exhausted(types) | TypesResult::Partial(types) => types,
        }
    }

    pub fn into_types(self) -> Vec<T> {
        match self {
            TypesResult::Empty => Vec::new(),
            TypesResult::Exhausted(types) | TypesResult::Partial(types) => types,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, TypesResult::Empty)
    }
}

#[derive(Debug, Clone)]
struct Filters<T> {
    /// `X <: t`
    supertypes: Vec<T>,
    /// `X </: t`
    not_supertypes: Vec<T>,
    /// `t <: X`
    subtypes: Vec<T>,
    /// `t </: X`
    not_subtypes: Vec<T>,
}

impl<T> Default for Filters<T> {
    fn default() -> Self {
        Self {
            supertypes: Vec::new(),
            not_supertypes: Vec::new(),
            subtypes: Vec::new(),
            not_subtypes: Vec::new(),
        }
    }
}

impl<T> Filters<T> {
    fn accepts<TS: TypeSystem<Type = T>>(&self, ts: &TS, ty: &T) -> bool {
        self.supertypes.iter().all(|t| ts.is_supertype(t, ty))
            && self.not_supertypes.iter().all(|t| !ts.is_supertype(t, ty))
            && self.subtypes.iter().all(|t| ts.is_supertype(ty, t))
            && self.not_subtypes.iter().all(|t| !ts.is_supertype(ty, t))
    }

    /// Whether no subtype of `ty` (including itself) can be accepted.
    fn prunes<TS: TypeSystem<Type = T>>(&self, ts: &TS, ty: &T) -> bool {
        self.not_supertypes.iter().any(|t| ts.is_supertype(t, ty))
            || self.subtypes.iter().any(|t| !ts.is_supertype(ty, t))
    }
}

enum Source<T> {
    Empty,
    /// A fixed list of types, already filtered.
    Fixed(Vec<T>),
    /// Instantiable subtypes of `root` accepted by `filters`, in breadth-first order.
    Subtypes { root: T, filters: Filters<T> },
}

struct Traversal<T> {
    collected: Vec<T>,
    queue: VecDeque<T>,
    visited: HashSet<T>,
    done: bool,
}

/// Immutable stream of types satisfying a set of subtyping constraints.
///
/// The stream enumerates lazily: [`take`][TypeStream::take] walks the type graph only as far as
/// needed and remembers what it found, so clones of a stream share the work. Filters return new
/// streams; once a stream has been fully enumerated, filtering it only filters the cached list.
pub struct TypeStream<TS: TypeSystem> {
    type_system: Rc<TS>,
    source: Rc<Source<TS::Type>>,
    traversal: Rc<RefCell<Traversal<TS::Type>>>,
}

impl<TS: TypeSystem> Clone for TypeStream<TS> {
    fn clone(&self) -> Self {
        Self {
            type_system: Rc::clone(&self.type_system),
            source: Rc::clone(&self.source),
            traversal: Rc::clone(&self.traversal),
        }
    }
}

impl<TS: TypeSystem> Debug for TypeStream<TS> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let traversal = self.traversal.borrow();
        let mut s = f.debug_struct("TypeStream");
        match self.source.as_ref() {
            Source::Empty => s.field("source", &"empty"),
            Source::Fixed(types) => s.field("types", types),
            Source::Subtypes { root, filters } => s.field("root", root).field("filters", filters),
        };
        s.field("collected", &traversal.collected.len())
            .field("done", &traversal.done)
            .finish()
    }
}

impl<TS: TypeSystem> TypeStream<TS> {
    fn from_source(type_system: Rc<TS>, source: Source<TS::Type>) -> Self {
        let traversal = match &source {
            Source::Empty => Traversal {
                collected: Vec::new(),
                queue: VecDeque::new(),
                visited: HashSet::new(),
                done: true,
            },
            Source::Fixed(types) => Traversal {
                collected: types.clone(),
                queue: VecDeque::new(),
                visited: HashSet::new(),
                done: true,
            },
            Source::Subtypes { root, .. } => Traversal {
                collected: Vec::new(),
                queue: VecDeque::from([root.clone()]),
                visited: HashSet::from([root.clone()]),
                done: false,
            },
        };
        Self {
            type_system,
            source: Rc::new(source),
            traversal: Rc::new(RefCell::new(traversal)),
        }
    }

    /// Every instantiable type of the type system.
    pub fn top(type_system: Rc<TS>) -> Self {
        let root = type_system.top_type();
        Self::from_source(
            type_system,
            Source::Subtypes {
                root,
                filters: Filters::default(),
            },
        )
    }

    /// The stream with no types: a contradiction.
    pub fn empty(type_system: Rc<TS>) -> Self {
        Self::from_source(type_system, Source::Empty)
    }

    /// Exactly `ty`.
    pub fn single(type_system: Rc<TS>, ty: TS::Type) -> Self {
        Self::from_source(type_system, Source::Fixed(vec![ty]))
    }

    pub fn type_system(&self) -> &Rc<TS> {
        &self.type_system
    }

    /// Whether the stream is known to be empty without enumerating anything.
    pub fn is_known_empty(&self) -> bool {
        let traversal = self.traversal.borrow();
        traversal.done && traversal.collected.is_empty()
    }

    /// Whether no type satisfies the constraints. May enumerate the type graph.
    pub fn is_empty(&self) -> bool {
        self.take(1).is_empty()
    }

    /// Force up to `n` types.
    pub fn take(&self, n: usize) -> TypesResult<TS::Type> {
        debug!("take(n = {})", n);
        self.advance(n);
        let traversal = self.traversal.borrow();
        let count = n.min(traversal.collected.len());
        let types = traversal.collected[..count].to_vec();
        if traversal.done && traversal.collected.len() <= n {
            if types.is_empty() {
                TypesResult::Empty
            } else {
                TypesResult::Exhausted(types)
            }
        } else {
            TypesResult::Partial(types)
        }
    }

    /// Continue the breadth-first walk until `n` types are collected or the graph is exhausted.
    fn advance(&self, n: usize) {
        let Source::Subtypes { filters, .. } = self.source.as_ref() else {
            return;
        };
        let ts = self.type_system.as_ref();
        let mut traversal = self.traversal.borrow_mut();
        // One extra type tells "exactly n" apart from "at least n".
        while traversal.collected.len() <= n && !traversal.done {
            let Some(ty) = traversal.queue.pop_front() else {
                traversal.done = true;
                break;
            };
            if filters.prunes(ts, &ty) {
                continue;
            }
            if ts.is_instantiable(&ty) && filters.accepts(ts, &ty) {
                traversal.collected.push(ty.clone());
            }
            for sub in ts.find_subtypes(&ty) {
                if traversal.visited.insert(sub.clone()) {
                    traversal.queue.push_back(sub);
                }
            }
        }
    }

    /// Fully enumerated types, if the walk is complete.
    fn cached(&self) -> Option<Vec<TS::Type>> {
        let traversal = self.traversal.borrow();
        traversal.done.then(|| traversal.collected.clone())
    }

    fn filtered(&self, keep: impl Fn(&TS, &TS::Type) -> bool) -> Option<Self> {
        let types = self.cached()?;
        let ts = self.type_system.as_ref();
        let types: Vec<_> = types.into_iter().filter(|t| keep(ts, t)).collect();
        let source = if types.is_empty() {
            Source::Empty
        } else {
            Source::Fixed(types)
        };
        Some(Self::from_source(Rc::clone(&self.type_system), source))
    }

    fn with_filters(&self, root: TS::Type, filters: Filters<TS::Type>) -> Self {
        Self::from_source(Rc::clone(&self.type_system), Source::Subtypes { root, filters })
    }

    /// Keep types `X` with `X <: ty`.
    pub fn filter_by_supertype(&self, ty: &TS::Type) -> Self {
        if let Some(stream) = self.filtered(|ts, x| ts.is_supertype(ty, x)) {
            return stream;
        }
        let Source::Subtypes { root, filters } = self.source.as_ref() else {
            unreachable!("fixed streams are always cached")
        };
        let ts = self.type_system.as_ref();
        if ts.is_supertype(ty, root) {
            return self.clone();
        }
        if ts.is_supertype(root, ty) {
            // Every subtype of `ty` is a subtype of the old root.
            return self.with_filters(ty.clone(), filters.clone());
        }
        let mut filters = filters.clone();
        filters.supertypes.push(ty.clone());
        self.with_filters(root.clone(), filters)
    }

    /// Keep types `X` with `X </: ty`.
    pub fn filter_by_not_supertype(&self, ty: &TS::Type) -> Self {
        if let Some(stream) = self.filtered(|ts, x| !ts.is_supertype(ty, x)) {
            return stream;
        }
        let Source::Subtypes { root, filters } = self.source.as_ref() else {
            unreachable!("fixed streams are always cached")
        };
        if self.type_system.is_supertype(ty, root) {
            return Self::empty(Rc::clone(&self.type_system));
        }
        let mut filters = filters.clone();
        filters.not_supertypes.push(ty.clone());
        self.with_filters(root.clone(), filters)
    }

    /// Keep types `X` with `ty <: X`.
    pub fn filter_by_subtype(&self, ty: &TS::Type) -> Self {
        if let Some(stream) = self.filtered(|ts, x| ts.is_supertype(x, ty)) {
            return stream;
        }
        let Source::Subtypes { root, filters } = self.source.as_ref() else {
            unreachable!("fixed streams are always cached")
        };
        if !self.type_system.is_supertype(root, ty) {
            return Self::empty(Rc::clone(&self.type_system));
        }
        let mut filters = filters.clone();
        filters.subtypes.push(ty.clone());
        self.with_filters(root.clone(), filters)
    }

    /// Keep types `X` with `ty </: X`.
    pub fn filter_by_not_subtype(&self, ty: &TS::Type) -> Self {
        if let Some(stream) = self.filtered(|ts, x| !ts.is_supertype(x, ty)) {
            return stream;
        }
        let Source::Subtypes { root, filters } = self.source.as_ref() else {
            unreachable!("fixed streams are always cached")
        };
        let mut filters = filters.clone();
        filters.not_subtypes.push(ty.clone());
        self.with_filters(root.clone(), filters)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use test_log::test;

    use super::*;
    use crate::types::hierarchy::tests::shapes;

    fn set(result: TypesResult<&'static str>) -> BTreeSet<&'static str> {
        result.into_types().into_iter().collect()
    }

    #[test]
    fn test_top_stream() {
        let ts = Rc::new(shapes());
        let all = TypeStream::top(ts).take(100);
        assert!(matches!(all, TypesResult::Exhausted(_)));
        // Abstract `Shape` and the interface `Named` are not instantiable.
        assert!(!all.types().contains(&"Shape"));
        assert!(!all.types().contains(&"Named"));
        assert!(all.types().contains(&"Square"));
    }

    #[test]
    fn test_partial_take() {
        let ts = Rc::new(shapes());
        let stream = TypeStream::top(ts);
        assert!(matches!(stream.take(1), TypesResult::Partial(ref v) if v.len() == 1));
        assert!(matches!(stream.take(100), TypesResult::Exhausted(_)));
    }

    #[test]
    fn test_filter_by_supertype_is_monotone() {
        let ts = Rc::new(shapes());
        let stream = TypeStream::top(Rc::clone(&ts)).filter_by_supertype(&"Rect");
        for t in stream.take(100).types() {
            assert!(ts.is_supertype(&"Rect", t));
        }
        assert_eq!(set(stream.take(100)), BTreeSet::from(["Rect", "Square"]));
    }

    #[test]
    fn test_filter_order_does_not_matter() {
        let ts = Rc::new(shapes());
        let top = TypeStream::top(ts);
        let ab = top.filter_by_supertype(&"Shape").filter_by_supertype(&"Named");
        let ba = top.filter_by_supertype(&"Named").filter_by_supertype(&"Shape");
        assert_eq!(set(ab.take(100)), set(ba.take(100)));
        assert_eq!(set(ab.take(100)), BTreeSet::from(["Circle"]));
    }

    #[test]
    fn test_contradiction() {
        let ts = Rc::new(shapes());
        let stream = TypeStream::top(ts)
            .filter_by_supertype(&"Circle")
            .filter_by_supertype(&"Rect");
        assert_eq!(stream.take(1), TypesResult::Empty);
        assert!(stream.is_empty());
    }

    #[test]
    fn test_negative_filters() {
        let ts = Rc::new(shapes());
        let shapes = TypeStream::top(ts).filter_by_supertype(&"Shape");
        let no_rects = shapes.filter_by_not_supertype(&"Rect");
        assert_eq!(set(no_rects.take(100)), BTreeSet::from(["Circle"]));

        let above_square = shapes.filter_by_subtype(&"Square");
        assert_eq!(set(above_square.take(100)), BTreeSet::from(["Rect", "Square"]));
        let strictly_above = above_square.filter_by_not_supertype(&"Square");
        assert_eq!(set(strictly_above.take(100)), BTreeSet::from(["Rect"]));
        assert!(above_square.filter_by_not_subtype(&"Square").is_empty());
    }

    #[test]
    fn test_filter_cached_stream() {
        let ts = Rc::new(shapes());
        let shapes = TypeStream::top(ts).filter_by_supertype(&"Shape");
        assert!(matches!(shapes.take(100), TypesResult::Exhausted(_)));
        let circles = shapes.filter_by_supertype(&"Circle");
        assert!(circles.cached().is_some());
        assert_eq!(set(circles.take(10)), BTreeSet::from(["Circle"]));
        assert!(shapes.filter_by_supertype(&"Named").filter_by_not_supertype(&"Circle").is_known_empty());
    }

    #[test]
    fn test_single_and_empty() {
        let ts = Rc::new(shapes());
        let single = TypeStream::single(Rc::clone(&ts), "Square");
        assert_eq!(single.take(5), TypesResult::Exhausted(vec!["Square"]));
        assert!(single.filter_by_not_supertype(&"Rect").is_known_empty());
        assert!(TypeStream::empty(ts).is_known_empty());
    }
}
