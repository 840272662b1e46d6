pub mod aabb;
pub mod shape;
pub mod mass;

pub use aabb::Aabb;
pub use shape::{Shape, BoundingGeom, aabb_of};
pub use mass::{MassProps, MassError, compute_mass};
