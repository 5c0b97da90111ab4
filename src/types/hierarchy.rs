//! Nominal class/interface hierarchy.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use log::debug;

use super::TypeSystem;
use crate::cache::Cache;

/// Kind of a registered type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TypeKind {
    /// Classes inherit from at most one class.
    Class { is_abstract: bool, is_final: bool },
    /// Interfaces may be inherited alongside anything, and are never instantiable.
    Interface,
}

impl TypeKind {
    pub const CLASS: TypeKind = TypeKind::Class {
        is_abstract: false,
        is_final: false,
    };
    pub const ABSTRACT_CLASS: TypeKind = TypeKind::Class {
        is_abstract: true,
        is_final: false,
    };
    pub const FINAL_CLASS: TypeKind = TypeKind::Class {
        is_abstract: false,
        is_final: true,
    };
}

#[derive(Debug, Clone)]
struct Entry<T> {
    ty: T,
    kind: TypeKind,
    supertypes: Vec<T>,
}

/// Type system over an explicitly registered hierarchy.
///
/// The top type is a plain class every other type implicitly inherits from.
///
/// ```
/// use symex_rs::types::{HierarchyTypeSystem, TypeKind, TypeSystem};
///
/// let mut ts = HierarchyTypeSystem::new("Object");
/// ts.register("List", [], TypeKind::Interface);
/// ts.register("ArrayList", ["List"], TypeKind::CLASS);
/// assert!(ts.is_supertype(&"List", &"ArrayList"));
/// assert!(ts.is_supertype(&"Object", &"List"));
/// assert_eq!(ts.find_subtypes(&"List"), vec!["ArrayList"]);
/// ```
#[derive(Debug)]
pub struct HierarchyTypeSystem<T> {
    top: T,
    entries: Vec<Entry<T>>,
    index: HashMap<T, usize>,
    subtypes: RefCell<Cache<T, Vec<T>>>,
}

impl<T> HierarchyTypeSystem<T>
where
    T: Clone + Eq + Ord + Hash + Debug,
{
    pub fn new(top: T) -> Self {
        let entry = Entry {
            ty: top.clone(),
            kind: TypeKind::CLASS,
            supertypes: Vec::new(),
        };
        Self {
            index: HashMap::from([(top.clone(), 0)]),
            top,
            entries: vec![entry],
            subtypes: RefCell::new(Cache::new()),
        }
    }

    /// Register `ty` with the given direct supertypes. No supertypes means the top type.
    ///
    /// # Panics
    ///
    /// Panics if `ty` is already registered, if a supertype is unknown or final, or if a class gets
    /// two class supertypes.
    pub fn register(&mut self, ty: T, supertypes: impl IntoIterator<Item = T>, kind: TypeKind) {
        debug!("register(ty = {:?}, kind = {:?})", ty, kind);
        assert!(!self.index.contains_key(&ty), "Type {:?} is already registered", ty);

        let mut supertypes: Vec<T> = supertypes.into_iter().collect();
        if supertypes.is_empty() {
            supertypes.push(self.top.clone());
        }
        for s in &supertypes {
            let entry = self.entry(s);
            if let TypeKind::Class { is_final: true, .. } = entry.kind {
                panic!("Type {:?} cannot extend final type {:?}", ty, s);
            }
        }
        if let TypeKind::Class { .. } = kind {
            let classes = supertypes
                .iter()
                .filter(|s| !self.is_multiple_inheritance_allowed_for(s))
                .count();
            assert!(
                classes <= 1,
                "Type {:?} cannot extend {} classes at once",
                ty,
                classes
            );
        }

        self.index.insert(ty.clone(), self.entries.len());
        self.entries.push(Entry {
            ty,
            kind,
            supertypes,
        });
        self.subtypes.borrow_mut().clear();
    }

    pub fn is_registered(&self, ty: &T) -> bool {
        self.index.contains_key(ty)
    }

    pub fn kind(&self, ty: &T) -> TypeKind {
        self.entry(ty).kind
    }

    /// Number of registered types, the top type included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hits and misses of the direct-subtype cache.
    pub fn subtype_cache_stats(&self) -> (usize, usize) {
        let cache = self.subtypes.borrow();
        (cache.hits(), cache.misses())
    }

    fn entry(&self, ty: &T) -> &Entry<T> {
        match self.index.get(ty) {
            Some(&i) => &self.entries[i],
            None => panic!("Type {:?} is not registered", ty),
        }
    }
}

impl<T> TypeSystem for HierarchyTypeSystem<T>
where
    T: Clone + Eq + Ord + Hash + Debug,
{
    type Type = T;

    fn is_supertype(&self, supertype: &T, ty: &T) -> bool {
        if supertype == ty || *supertype == self.top {
            return true;
        }
        let mut stack = vec![ty];
        while let Some(cur) = stack.pop() {
            for s in &self.entry(cur).supertypes {
                if s == supertype {
                    return true;
                }
                stack.push(s);
            }
        }
        false
    }

    fn is_instantiable(&self, ty: &T) -> bool {
        matches!(
            self.entry(ty).kind,
            TypeKind::Class {
                is_abstract: false,
                ..
            }
        )
    }

    fn is_final(&self, ty: &T) -> bool {
        matches!(self.entry(ty).kind, TypeKind::Class { is_final: true, .. })
    }

    fn is_multiple_inheritance_allowed_for(&self, ty: &T) -> bool {
        self.entry(ty).kind == TypeKind::Interface
    }

    fn find_subtypes(&self, ty: &T) -> Vec<T> {
        self.subtypes
            .borrow_mut()
            .get_or_insert_with(ty.clone(), || {
                self.entries
                    .iter()
                    .filter(|e| e.supertypes.contains(ty))
                    .map(|e| e.ty.clone())
                    .collect()
            })
    }

    fn top_type(&self) -> T {
        self.top.clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use test_log::test;

    use super::*;

    /// ```text
    /// Object
    /// ├── Named (interface)
    /// │   └── Circle
    /// └── Shape (abstract)
    ///     ├── Circle
    ///     └── Rect
    ///         └── Square (final)
    /// ```
    pub(crate) fn shapes() -> HierarchyTypeSystem<&'static str> {
        let mut ts = HierarchyTypeSystem::new("Object");
        ts.register("Named", [], TypeKind::Interface);
        ts.register("Shape", [], TypeKind::ABSTRACT_CLASS);
        ts.register("Circle", ["Shape", "Named"], TypeKind::CLASS);
        ts.register("Rect", ["Shape"], TypeKind::CLASS);
        ts.register("Square", ["Rect"], TypeKind::FINAL_CLASS);
        ts
    }

    #[test]
    fn test_subtyping() {
        let ts = shapes();
        assert!(ts.is_supertype(&"Shape", &"Square"));
        assert!(ts.is_supertype(&"Named", &"Circle"));
        assert!(ts.is_supertype(&"Object", &"Named"));
        assert!(!ts.is_supertype(&"Named", &"Rect"));
        assert!(!ts.is_supertype(&"Square", &"Rect"));
        assert!(ts.is_supertype(&"Rect", &"Rect"));
    }

    #[test]
    fn test_capabilities() {
        let ts = shapes();
        assert!(!ts.is_instantiable(&"Shape"));
        assert!(!ts.is_instantiable(&"Named"));
        assert!(ts.is_instantiable(&"Object"));
        assert!(ts.is_final(&"Square"));
        assert!(ts.is_multiple_inheritance_allowed_for(&"Named"));
        assert!(!ts.is_multiple_inheritance_allowed_for(&"Rect"));
    }

    #[test]
    fn test_subtypes_are_cached() {
        let ts = shapes();
        assert_eq!(ts.find_subtypes(&"Shape"), vec!["Circle", "Rect"]);
        assert_eq!(ts.find_subtypes(&"Shape"), vec!["Circle", "Rect"]);
        assert_eq!(ts.subtype_cache_stats(), (1, 1));
    }

    #[test]
    fn test_register_clears_cache() {
        let mut ts = shapes();
        assert_eq!(ts.find_subtypes(&"Rect"), vec!["Square"]);
        ts.register("Board", ["Rect"], TypeKind::CLASS);
        assert_eq!(ts.find_subtypes(&"Rect"), vec!["Square", "Board"]);
    }

    #[test]
    #[should_panic(expected = "cannot extend 2 classes at once")]
    fn test_two_class_supertypes() {
        let mut ts = shapes();
        ts.register("Weird", ["Rect", "Shape"], TypeKind::CLASS);
    }

    #[test]
    #[should_panic(expected = "cannot extend final type")]
    fn test_final_cannot_be_extended() {
        let mut ts = shapes();
        ts.register("Cube", ["Square"], TypeKind::CLASS);
    }

    #[test]
    #[should_panic(expected = "is already registered")]
    fn test_double_registration() {
        let mut ts = shapes();
        ts.register("Rect", [], TypeKind::CLASS);
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn test_unknown_supertype() {
        let mut ts = shapes();
        ts.register("Oval", ["Ellipse"], TypeKind::CLASS);
    }
}
