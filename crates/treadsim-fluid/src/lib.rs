//! Fluid volumes and the forces they put on immersed bodies.
//!
//! Immersion is approximated with AABBs: the submerged fraction of a body is
//! the overlap of its world AABB with the fluid's AABB over its own volume.

use treadsim_core::{Scalar, Vec3};
use treadsim_dynamics::Bodies;
use treadsim_geom::Aabb;

/// Axis-aligned region of fluid with a uniform stream.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FluidVolume {
    pub bounds: Aabb,
    pub stream: Vec3,
    /// kg/m^3
    pub density: Scalar,
}

impl FluidVolume {
    pub const DEFAULT_DENSITY: Scalar = 1000.0;

    pub fn new(bounds: Aabb, stream: Vec3) -> Self {
        Self { bounds, stream, density: Self::DEFAULT_DENSITY }
    }

    /// Fraction of `body` inside this volume, in [0, 1]; 0 for degenerate input.
    pub fn submerged_fraction(&self, body: &Aabb) -> Scalar {
        let vol = body.volume();
        if !(vol.is_finite() && vol > 0.0) { return 0.0; }
        let f = body.intersection_volume(&self.bounds) / vol;
        if f.is_finite() { f.clamp(0.0, 1.0) } else { 0.0 }
    }
}

/// Per-body input to a fluid model.
#[derive(Copy, Clone, Debug)]
pub struct FluidQuery {
    pub aabb: Aabb,
    pub vel: Vec3,
    pub gravity: Vec3,
}

pub trait FluidModel {
    /// World-space force on the queried body.
    fn force(&self, fluid: &FluidVolume, q: &FluidQuery) -> Vec3;
}

/// Linear stream drag: F = -k (v - v_stream) f.
#[derive(Copy, Clone, Debug)]
pub struct StreamDrag { pub k: Scalar }

impl FluidModel for StreamDrag {
    fn force(&self, fluid: &FluidVolume, q: &FluidQuery) -> Vec3 {
        let f = fluid.submerged_fraction(&q.aabb);
        if f == 0.0 { return Vec3::ZERO; }
        let out = -(q.vel - fluid.stream) * (self.k * f);
        if out.is_finite() { out } else { Vec3::ZERO }
    }
}

/// Archimedes on the submerged part of the body's AABB.
#[derive(Copy, Clone, Debug, Default)]
pub struct Buoyancy;

impl FluidModel for Buoyancy {
    fn force(&self, fluid: &FluidVolume, q: &FluidQuery) -> Vec3 {
        let g = q.gravity.length();
        if !(g.is_finite() && g > 0.0) { return Vec3::ZERO; }
        let v_sub = q.aabb.intersection_volume(&fluid.bounds);
        if !(v_sub.is_finite() && v_sub > 0.0) { return Vec3::ZERO; }
        -q.gravity / g * (fluid.density * v_sub * g)
    }
}

/// Apply the stream drag of `fluid` to body `id` as the impulse F·dt.
/// Returns the force used; zero when the body is outside the fluid.
pub fn apply_drag(bodies: &mut Bodies, id: u32, body_aabb: &Aabb, fluid: &FluidVolume, k: Scalar, dt: Scalar) -> Vec3 {
    let q = FluidQuery { aabb: *body_aabb, vel: bodies.vel(id).lin, gravity: Vec3::ZERO };
    let f = StreamDrag { k }.force(fluid, &q);
    if f != Vec3::ZERO && dt.is_finite() {
        bodies.apply_impulse(id, f * dt);
    }
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use treadsim_core::{vec3, Isometry, Velocity};
    use treadsim_dynamics::BodyDesc;

    fn water() -> FluidVolume {
        FluidVolume::new(Aabb::new(vec3(-5.0, -5.0, -1.0), vec3(5.0, 5.0, 0.0)), vec3(-0.05, 0.0, 0.0))
    }

    fn cube_at(z: f32) -> Aabb { Aabb::from_center_half_extents(vec3(0.0, 0.0, z), vec3(0.5, 0.5, 0.5)) }

    #[test]
    fn fraction_tracks_depth() {
        let w = water();
        assert_eq!(w.submerged_fraction(&cube_at(-0.5)), 1.0);
        assert!((w.submerged_fraction(&cube_at(0.0)) - 0.5).abs() < 1e-6);
        assert_eq!(w.submerged_fraction(&cube_at(3.0)), 0.0);
    }

    #[test]
    fn resting_body_is_pushed_downstream() {
        let mut b = Bodies::default();
        let id = b.add(BodyDesc { pose: Isometry::IDENTITY, vel: Velocity::default(), inv_mass: 1.0, dynamic: true });
        let f = apply_drag(&mut b, id, &cube_at(-0.5), &water(), 10.0, 0.01);
        assert!(f.x < 0.0);
        assert!(b.vel(id).lin.x < 0.0);
        assert_eq!(b.vel(id).lin.y, 0.0);
    }

    #[test]
    fn outside_or_nan_gives_zero() {
        let q = FluidQuery { aabb: cube_at(3.0), vel: Vec3::ZERO, gravity: vec3(0.0, 0.0, -9.81) };
        assert_eq!(StreamDrag { k: 10.0 }.force(&water(), &q), Vec3::ZERO);
        let q = FluidQuery { aabb: cube_at(-0.5), vel: vec3(f32::NAN, 0.0, 0.0), gravity: Vec3::ZERO };
        assert_eq!(StreamDrag { k: 10.0 }.force(&water(), &q), Vec3::ZERO);
    }

    #[test]
    fn buoyancy_opposes_gravity() {
        let q = FluidQuery { aabb: cube_at(-0.5), vel: Vec3::ZERO, gravity: vec3(0.0, 0.0, -9.81) };
        let f = Buoyancy.force(&water(), &q);
        assert!((f.z - 1000.0 * 9.81).abs() < 1e-2);
    }
}
