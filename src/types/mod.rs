//! Type constraints over references.
//!
//! A [`TypeSystem`] answers subtyping questions about opaque front-end types. On top of it,
//! [`TypeStream`] lazily enumerates the instantiable types satisfying a set of constraints, and
//! [`TypeRegion`] keeps those constraints in a normalized form that detects most contradictions
//! without touching the stream.

pub(crate) mod hierarchy;
mod region;
mod stream;
mod system;

pub use hierarchy::{HierarchyTypeSystem, TypeKind};
pub use region::TypeRegion;
pub use stream::{TypeStream, TypesResult};
pub use system::TypeSystem;
