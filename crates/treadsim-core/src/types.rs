use glam::{Vec3A, Mat3A, Quat};
use crate::Scalar;

pub type Vec3 = Vec3A;
pub type Mat3 = Mat3A;

#[inline] pub fn vec3(x: Scalar, y: Scalar, z: Scalar) -> Vec3 { Vec3::new(x, y, z) }

/// Rigid transform (no scale).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Isometry { pub pos: Vec3, pub rot: Quat }

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Velocity { pub lin: Vec3, pub ang: Vec3 }

impl Default for Isometry {
    fn default() -> Self { Self { pos: Vec3::ZERO, rot: Quat::IDENTITY } }
}

impl Isometry {
    pub const IDENTITY: Isometry = Isometry { pos: Vec3::ZERO, rot: Quat::IDENTITY };

    /// Scene-style pose: translation plus axis-angle rotation `[x, y, z, angle]`.
    /// A zero axis is treated as no rotation.
    pub fn from_translation_axis_angle(t: [Scalar; 3], r: [Scalar; 4]) -> Self {
        let axis = glam::Vec3::new(r[0], r[1], r[2]);
        let rot = if axis.length_squared() > 1.0e-12 && r[3] != 0.0 {
            Quat::from_axis_angle(axis.normalize(), r[3])
        } else {
            Quat::IDENTITY
        };
        Self { pos: vec3(t[0], t[1], t[2]), rot }
    }

    #[inline] pub fn transform_point(&self, p: Vec3) -> Vec3 { self.pos + self.rot * p }
    #[inline] pub fn transform_vector(&self, v: Vec3) -> Vec3 { self.rot * v }

    /// `self * child`: child expressed in self's frame, result in self's parent frame.
    #[inline] pub fn compose(&self, child: &Isometry) -> Isometry {
        Isometry { pos: self.transform_point(child.pos), rot: (self.rot * child.rot).normalize() }
    }

    #[inline] pub fn inverse(&self) -> Isometry {
        let inv = self.rot.conjugate();
        Isometry { pos: inv * (-self.pos), rot: inv }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_then_inverse_is_identity() {
        let a = Isometry::from_translation_axis_angle([1.0, 2.0, 3.0], [0.0, 1.0, 0.0, 0.7]);
        let b = a.compose(&a.inverse());
        assert!(b.pos.length() < 1e-5);
        assert!(b.rot.angle_between(Quat::IDENTITY) < 1e-4);
    }

    #[test]
    fn zero_axis_means_identity_rotation() {
        let a = Isometry::from_translation_axis_angle([0.0; 3], [0.0, 0.0, 0.0, 1.57]);
        assert_eq!(a.rot, Quat::IDENTITY);
    }
}
