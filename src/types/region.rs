use std::collections::BTreeSet;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use log::trace;

use super::{TypeStream, TypeSystem};

/// Possible types of one reference `X`, as a set of subtyping constraints plus the stream of types
/// satisfying them.
///
/// Every constraint is checked against the existing ones first; an obvious contradiction yields
/// the empty region without enumerating any type.
pub struct TypeRegion<TS: TypeSystem> {
    stream: TypeStream<TS>,
    /// `X <: t`
    supertypes: BTreeSet<TS::Type>,
    /// `X </: t`
    not_supertypes: BTreeSet<TS::Type>,
    /// `t <: X`
    subtypes: BTreeSet<TS::Type>,
    /// `t </: X`
    not_subtypes: BTreeSet<TS::Type>,
}

impl<TS: TypeSystem> Clone for TypeRegion<TS> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
            supertypes: self.supertypes.clone(),
            not_supertypes: self.not_supertypes.clone(),
            subtypes: self.subtypes.clone(),
            not_subtypes: self.not_subtypes.clone(),
        }
    }
}

impl<TS: TypeSystem> PartialEq for TypeRegion<TS> {
    /// Regions with the same constraints are equal; streams are derived from them.
    fn eq(&self, other: &Self) -> bool {
        self.supertypes == other.supertypes
            && self.not_supertypes == other.not_supertypes
            && self.subtypes == other.subtypes
            && self.not_subtypes == other.not_subtypes
            && self.stream.is_known_empty() == other.stream.is_known_empty()
    }
}

impl<TS: TypeSystem> Debug for TypeRegion<TS> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegion")
            .field("supertypes", &self.supertypes)
            .field("not_supertypes", &self.not_supertypes)
            .field("subtypes", &self.subtypes)
            .field("not_subtypes", &self.not_subtypes)
            .field("contradiction", &self.stream.is_known_empty())
            .finish()
    }
}

impl<TS: TypeSystem> TypeRegion<TS> {
    /// Region of every type.
    pub fn top(type_system: Rc<TS>) -> Self {
        Self::with_stream(TypeStream::top(type_system))
    }

    /// Region of exactly `ty`.
    pub fn single(type_system: Rc<TS>, ty: TS::Type) -> Self {
        Self {
            stream: TypeStream::single(type_system, ty.clone()),
            supertypes: BTreeSet::from([ty.clone()]),
            not_supertypes: BTreeSet::new(),
            subtypes: BTreeSet::from([ty]),
            not_subtypes: BTreeSet::new(),
        }
    }

    fn with_stream(stream: TypeStream<TS>) -> Self {
        Self {
            stream,
            supertypes: BTreeSet::new(),
            not_supertypes: BTreeSet::new(),
            subtypes: BTreeSet::new(),
            not_subtypes: BTreeSet::new(),
        }
    }

    fn contradiction(&self) -> Self {
        trace!("type contradiction in {:?}", self);
        Self::with_stream(TypeStream::empty(Rc::clone(self.ts_rc())))
    }

    fn ts_rc(&self) -> &Rc<TS> {
        self.stream.type_system()
    }

    fn ts(&self) -> &TS {
        self.stream.type_system().as_ref()
    }

    pub fn stream(&self) -> &TypeStream<TS> {
        &self.stream
    }

    pub fn supertypes(&self) -> &BTreeSet<TS::Type> {
        &self.supertypes
    }

    pub fn subtypes(&self) -> &BTreeSet<TS::Type> {
        &self.subtypes
    }

    /// Whether the constraints are contradictory. May enumerate the type graph.
    pub fn is_empty(&self) -> bool {
        self.stream.is_empty()
    }

    /// Whether a contradiction was detected eagerly.
    pub fn is_contradiction(&self) -> bool {
        self.stream.is_known_empty()
    }

    fn constraint_count(&self) -> usize {
        self.supertypes.len() + self.not_supertypes.len() + self.subtypes.len() + self.not_subtypes.len()
    }

    /// Restrict to `X <: supertype`.
    pub fn add_supertype(&self, supertype: &TS::Type) -> Self {
        let ts = self.ts();
        if self.is_contradiction() || self.supertypes.iter().any(|t| ts.is_supertype(supertype, t)) {
            return self.clone();
        }
        // X </: t && supertype <: t
        if self.not_supertypes.iter().any(|t| ts.is_supertype(t, supertype)) {
            return self.contradiction();
        }
        // t <: X && t </: supertype
        if self.subtypes.iter().any(|t| !ts.is_supertype(supertype, t)) {
            return self.contradiction();
        }
        if !ts.is_multiple_inheritance_allowed_for(supertype)
            && self.supertypes.iter().any(|t| {
                !ts.is_multiple_inheritance_allowed_for(t)
                    && !ts.is_supertype(t, supertype)
                    && !ts.is_supertype(supertype, t)
            })
        {
            return self.contradiction();
        }

        let mut subtypes = self.subtypes.clone();
        if ts.is_final(supertype) {
            if self.not_subtypes.contains(supertype) {
                return self.contradiction();
            }
            // A final supertype is the only possible type.
            subtypes.insert(supertype.clone());
        }
        // t <: X && supertype <: t, so X = supertype
        if subtypes.iter().any(|t| ts.is_supertype(t, supertype)) {
            return self.single_type(supertype);
        }

        let mut supertypes = self.supertypes.clone();
        supertypes.retain(|t| !ts.is_supertype(t, supertype));
        supertypes.insert(supertype.clone());
        Self {
            stream: self.stream.filter_by_supertype(supertype),
            supertypes,
            not_supertypes: self.not_supertypes.clone(),
            subtypes,
            not_subtypes: self.not_subtypes.clone(),
        }
    }

    /// Restrict to `X </: not_supertype`.
    pub fn exclude_supertype(&self, not_supertype: &TS::Type) -> Self {
        let ts = self.ts();
        if self.is_contradiction() || self.not_supertypes.iter().any(|t| ts.is_supertype(t, not_supertype)) {
            return self.clone();
        }
        // X <: t && t <: not_supertype
        if self.supertypes.iter().any(|t| ts.is_supertype(not_supertype, t)) {
            return self.contradiction();
        }
        let mut not_supertypes = self.not_supertypes.clone();
        not_supertypes.retain(|t| !ts.is_supertype(not_supertype, t));
        not_supertypes.insert(not_supertype.clone());
        Self {
            stream: self.stream.filter_by_not_supertype(not_supertype),
            supertypes: self.supertypes.clone(),
            not_supertypes,
            subtypes: self.subtypes.clone(),
            not_subtypes: self.not_subtypes.clone(),
        }
    }

    /// Restrict to `subtype <: X`.
    pub fn add_subtype(&self, subtype: &TS::Type) -> Self {
        let ts = self.ts();
        if self.is_contradiction() || self.subtypes.iter().any(|t| ts.is_supertype(t, subtype)) {
            return self.clone();
        }
        // t </: X && t <: subtype
        if self.not_subtypes.iter().any(|t| ts.is_supertype(subtype, t)) {
            return self.contradiction();
        }
        // X <: t && subtype </: t
        if self.supertypes.iter().any(|t| !ts.is_supertype(t, subtype)) {
            return self.contradiction();
        }
        // X <: t && t <: subtype, so X = subtype
        if self.supertypes.iter().any(|t| ts.is_supertype(subtype, t)) {
            return self.single_type(subtype);
        }
        let mut subtypes = self.subtypes.clone();
        subtypes.retain(|t| !ts.is_supertype(subtype, t));
        subtypes.insert(subtype.clone());
        Self {
            stream: self.stream.filter_by_subtype(subtype),
            supertypes: self.supertypes.clone(),
            not_supertypes: self.not_supertypes.clone(),
            subtypes,
            not_subtypes: self.not_subtypes.clone(),
        }
    }

    /// Restrict to `not_subtype </: X`.
    pub fn exclude_subtype(&self, not_subtype: &TS::Type) -> Self {
        let ts = self.ts();
        if self.is_contradiction() || self.not_subtypes.iter().any(|t| ts.is_supertype(not_subtype, t)) {
            return self.clone();
        }
        // t <: X && not_subtype <: t
        if self.subtypes.iter().any(|t| ts.is_supertype(t, not_subtype)) {
            return self.contradiction();
        }
        if ts.is_final(not_subtype) && self.supertypes.contains(not_subtype) {
            return self.contradiction();
        }
        let mut not_subtypes = self.not_subtypes.clone();
        not_subtypes.retain(|t| !ts.is_supertype(t, not_subtype));
        not_subtypes.insert(not_subtype.clone());
        Self {
            stream: self.stream.filter_by_not_subtype(not_subtype),
            supertypes: self.supertypes.clone(),
            not_supertypes: self.not_supertypes.clone(),
            subtypes: self.subtypes.clone(),
            not_subtypes,
        }
    }

    /// Types satisfying both regions. Folds the constraints of the smaller region into the larger.
    pub fn intersect(&self, other: &Self) -> Self {
        if self == other {
            return self.clone();
        }
        let (small, large) = if other.constraint_count() < self.constraint_count() {
            (other, self)
        } else {
            (self, other)
        };
        if small.is_contradiction() {
            return small.clone();
        }
        let result = small.supertypes.iter().fold(large.clone(), |acc, t| acc.add_supertype(t));
        let result = small.not_supertypes.iter().fold(result, |acc, t| acc.exclude_supertype(t));
        let result = small.subtypes.iter().fold(result, |acc, t| acc.add_subtype(t));
        small.not_subtypes.iter().fold(result, |acc, t| acc.exclude_subtype(t))
    }

    fn single_type(&self, ty: &TS::Type) -> Self {
        let ts = self.ts();
        if !ts.is_instantiable(ty)
            || self.supertypes.iter().any(|t| !ts.is_supertype(t, ty))
            || self.not_supertypes.iter().any(|t| ts.is_supertype(t, ty))
            || self.subtypes.iter().any(|t| !ts.is_supertype(ty, t))
            || self.not_subtypes.iter().any(|t| ts.is_supertype(ty, t))
        {
            return self.contradiction();
        }
        Self::single(Rc::clone(self.ts_rc()), ty.clone())
    }
}
