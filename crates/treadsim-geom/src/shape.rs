use core::f32::consts::PI;
use treadsim_core::types::{Isometry, Vec3, Mat3};
use glam::Mat3A;
use crate::aabb::Aabb;

/// Leaf collision primitive, centred at its local origin.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Shape {
    Sphere { r: f32 },
    Box { hx: f32, hy: f32, hz: f32 },
    Capsule { r: f32, hh: f32 },  // half-height of the straight part along local Z
    Cylinder { r: f32, hh: f32 }, // half-height along local Z
}

impl Shape {
    /// Analytic volume.
    pub fn volume(&self) -> f32 {
        match *self {
            Shape::Sphere { r } => (4.0 / 3.0) * PI * r * r * r,
            Shape::Box { hx, hy, hz } => 8.0 * hx * hy * hz,
            Shape::Capsule { r, hh } => PI * r * r * (2.0 * hh) + (4.0 / 3.0) * PI * r * r * r,
            Shape::Cylinder { r, hh } => PI * r * r * (2.0 * hh),
        }
    }

    pub fn is_valid(&self) -> bool {
        let ok = |v: f32| v.is_finite() && v >= 0.0;
        match *self {
            Shape::Sphere { r } => ok(r) && r > 0.0,
            Shape::Box { hx, hy, hz } => ok(hx) && ok(hy) && ok(hz),
            Shape::Capsule { r, hh } | Shape::Cylinder { r, hh } => ok(r) && ok(hh) && r > 0.0,
        }
    }
}

/// A `boundingObject`: a primitive or a group of transformed sub-geometries.
/// Groups combine by union.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundingGeom {
    Leaf(Shape),
    Group(Vec<(Isometry, BoundingGeom)>),
}

impl BoundingGeom {
    /// Union volume as the sum of parts; sibling overlap is not subtracted.
    pub fn volume(&self) -> f32 {
        match self {
            BoundingGeom::Leaf(s) => s.volume(),
            BoundingGeom::Group(parts) => parts.iter().map(|(_, g)| g.volume()).sum(),
        }
    }

    /// Flatten into leaf primitives with poses relative to `xf`'s parent frame.
    pub fn leaves(&self, xf: &Isometry) -> Vec<(Isometry, Shape)> {
        let mut out = Vec::new();
        self.collect_leaves(xf, &mut out);
        out
    }

    fn collect_leaves(&self, xf: &Isometry, out: &mut Vec<(Isometry, Shape)>) {
        match self {
            BoundingGeom::Leaf(s) => out.push((*xf, *s)),
            BoundingGeom::Group(parts) => {
                for (local, g) in parts {
                    g.collect_leaves(&xf.compose(local), out);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            BoundingGeom::Leaf(_) => false,
            BoundingGeom::Group(parts) => parts.iter().all(|(_, g)| g.is_empty()),
        }
    }
}

#[inline]
fn rotated_half_extents(he: Vec3, xf: &Isometry) -> Vec3 {
    let rot = Mat3A::from_quat(xf.rot);
    let m = Mat3::from_cols(rot.x_axis.abs(), rot.y_axis.abs(), rot.z_axis.abs());
    m * he
}

#[inline]
pub fn aabb_of(shape: &Shape, xf: &Isometry) -> Aabb {
    match *shape {
        Shape::Sphere { r } => Aabb::from_center_half_extents(xf.pos, Vec3::splat(r)),
        Shape::Box { hx, hy, hz } => {
            Aabb::from_center_half_extents(xf.pos, rotated_half_extents(Vec3::new(hx, hy, hz), xf))
        }
        Shape::Capsule { r, hh } => {
            let axis_world = xf.rot * Vec3::Z * hh.abs();
            let he = axis_world.abs() + Vec3::splat(r);
            Aabb::from_center_half_extents(xf.pos, he)
        }
        Shape::Cylinder { r, hh } => {
            // Conservative: box enclosing the cylinder, then rotated.
            Aabb::from_center_half_extents(xf.pos, rotated_half_extents(Vec3::new(r, r, hh), xf))
        }
    }
}
