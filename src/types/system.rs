use std::fmt::Debug;
use std::hash::Hash;

/// Type-system capability implemented once per front-end.
///
/// Types are opaque to the engine: it only asks the questions below. Subtyping is reflexive.
pub trait TypeSystem {
    type Type: Clone + Eq + Ord + Hash + Debug;

    /// Whether `ty <: supertype`.
    fn is_supertype(&self, supertype: &Self::Type, ty: &Self::Type) -> bool;

    /// Whether objects of exactly this type can exist.
    fn is_instantiable(&self, ty: &Self::Type) -> bool;

    /// Whether the type has no proper subtypes.
    fn is_final(&self, ty: &Self::Type) -> bool;

    /// Whether a type may have this type and another incomparable one as supertypes at once.
    fn is_multiple_inheritance_allowed_for(&self, ty: &Self::Type) -> bool;

    /// Direct subtypes of `ty`, in a stable order.
    fn find_subtypes(&self, ty: &Self::Type) -> Vec<Self::Type>;

    /// The root of the hierarchy: every type is its subtype.
    fn top_type(&self) -> Self::Type;
}
