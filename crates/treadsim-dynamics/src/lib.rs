use treadsim_core::types::{Isometry, Velocity, Vec3};
use treadsim_core::{Scalar, Quat};

/// Input descriptor when creating a body.
#[derive(Copy, Clone, Debug)]
pub struct BodyDesc {
    pub pose: Isometry,
    pub vel: Velocity,
    pub inv_mass: Scalar,
    pub dynamic: bool,
}

/// SoA body storage with deterministic ID = index semantics.
pub struct Bodies {
    pos: Vec<Vec3>,
    rot: Vec<Quat>,
    linvel: Vec<Vec3>,
    angvel: Vec<Vec3>,
    inv_mass: Vec<Scalar>,
    dynamic: Vec<bool>,
    // world-space force accumulated during the current tick, cleared by integrate_all
    force: Vec<Vec3>,
}

impl Bodies {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            pos:      Vec::with_capacity(cap),
            rot:      Vec::with_capacity(cap),
            linvel:   Vec::with_capacity(cap),
            angvel:   Vec::with_capacity(cap),
            inv_mass: Vec::with_capacity(cap),
            dynamic:  Vec::with_capacity(cap),
            force:    Vec::with_capacity(cap),
        }
    }

    pub fn add(&mut self, desc: BodyDesc) -> u32 {
        self.pos.push(desc.pose.pos);
        self.rot.push(desc.pose.rot);
        self.linvel.push(desc.vel.lin);
        self.angvel.push(desc.vel.ang);
        self.inv_mass.push(if desc.dynamic { desc.inv_mass } else { 0.0 });
        self.dynamic.push(desc.dynamic);
        self.force.push(Vec3::ZERO);
        (self.pos.len() as u32) - 1
    }

    #[inline] pub fn len(&self) -> usize { self.pos.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.pos.is_empty() }

    /// Semi-implicit Euler: v += (g + F/m) dt, p += v dt. Clears accumulated forces.
    pub fn integrate_all(&mut self, gravity: Vec3, dt: Scalar) {
        for i in 0..self.len() {
            let f = core::mem::replace(&mut self.force[i], Vec3::ZERO);
            if !self.dynamic[i] || self.inv_mass[i] == 0.0 { continue; }
            self.linvel[i] += (gravity + f * self.inv_mass[i]) * dt;
            self.pos[i]    += self.linvel[i] * dt;
        }
    }

    // -------- Accessors used by world/solver/hash --------
    #[inline] pub fn pose(&self, id: u32) -> Isometry {
        let i = id as usize;
        Isometry { pos: self.pos[i], rot: self.rot[i] }
    }
    #[inline] pub fn set_pose(&mut self, id: u32, iso: Isometry) {
        let i = id as usize;
        self.pos[i] = iso.pos;
        self.rot[i] = iso.rot;
    }

    #[inline] pub fn vel(&self, id: u32) -> Velocity {
        let i = id as usize;
        Velocity { lin: self.linvel[i], ang: self.angvel[i] }
    }
    #[inline] pub fn set_vel(&mut self, id: u32, v: Velocity) {
        let i = id as usize;
        self.linvel[i] = v.lin;
        self.angvel[i] = v.ang;
    }

    #[inline] pub fn inv_mass_of(&self, id: u32) -> Scalar { self.inv_mass[id as usize] }
    #[inline] pub fn mass_of(&self, id: u32) -> Scalar {
        let im = self.inv_mass[id as usize];
        if im > 0.0 { 1.0 / im } else { Scalar::INFINITY }
    }
    #[inline] pub fn is_dynamic(&self, id: u32) -> bool { self.dynamic[id as usize] }
    /// Static bodies keep an inverse mass of zero.
    #[inline] pub fn set_inv_mass(&mut self, id: u32, inv_mass: Scalar) {
        let i = id as usize;
        if self.dynamic[i] && inv_mass.is_finite() { self.inv_mass[i] = inv_mass.max(0.0); }
    }

    /// Accumulate a world-space force for this tick.
    #[inline] pub fn add_force(&mut self, id: u32, f: Vec3) {
        if !f.is_finite() { return; }
        self.force[id as usize] += f;
    }
    #[inline] pub fn force_of(&self, id: u32) -> Vec3 { self.force[id as usize] }

    #[inline] pub fn apply_impulse(&mut self, id: u32, j: Vec3) {
        let i = id as usize;
        let im = self.inv_mass[i];
        if im != 0.0 { self.linvel[i] += j * im; }
    }

    /// Add a position delta (already scaled for this body).
    #[inline] pub fn apply_position_delta(&mut self, id: u32, dp: Vec3) {
        let i = id as usize;
        self.pos[i] += dp;
    }

    // Iterator for hashing in stable order
    pub fn indices(&self) -> impl ExactSizeIterator<Item=u32> + '_ {
        0..(self.len() as u32)
    }
}

impl Default for Bodies {
    fn default() -> Self { Self::with_capacity(0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treadsim_core::vec3;

    fn one_kg(dynamic: bool) -> BodyDesc {
        BodyDesc { pose: Isometry::IDENTITY, vel: Velocity::default(), inv_mass: 1.0, dynamic }
    }

    #[test]
    fn static_bodies_do_not_move() {
        let mut b = Bodies::default();
        let id = b.add(one_kg(false));
        b.add_force(id, vec3(10.0, 0.0, 0.0));
        b.integrate_all(vec3(0.0, -9.81, 0.0), 0.1);
        assert_eq!(b.pose(id).pos, Vec3::ZERO);
        assert_eq!(b.inv_mass_of(id), 0.0);
        assert_eq!(b.force_of(id), Vec3::ZERO);
    }

    #[test]
    fn force_is_consumed_by_one_step() {
        let mut b = Bodies::default();
        let id = b.add(one_kg(true));
        b.add_force(id, vec3(2.0, 0.0, 0.0));
        b.integrate_all(Vec3::ZERO, 0.5);
        assert!((b.vel(id).lin.x - 1.0).abs() < 1e-6);
        b.integrate_all(Vec3::ZERO, 0.5);
        assert!((b.vel(id).lin.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn non_finite_force_is_ignored() {
        let mut b = Bodies::default();
        let id = b.add(one_kg(true));
        b.add_force(id, vec3(f32::NAN, 0.0, 0.0));
        assert_eq!(b.force_of(id), Vec3::ZERO);
    }
}
