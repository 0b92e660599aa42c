//! Integer polyhedral substrate for the Mosaic compiler: affine
//! expressions, (unions of) basic sets and relations, Fourier–Motzkin
//! projection, and persistent schedule trees with path-copying edits.

mod aff;
mod cursor;
mod fm;
mod map;
mod set;
mod tree;
mod union;

pub use aff::{Aff, Constraint};
pub use cursor::{extension_leaf, universal_extension, Cursor};
pub use map::{BasicMap, Map};
pub use set::{BasicSet, Set, TriState};
pub use tree::{aff_bounds, aff_is_constant_on, MultiUnionAff, Schedule, TreeNode};
pub use union::{UnionMap, UnionSet};
