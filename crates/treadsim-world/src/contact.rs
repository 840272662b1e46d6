//! Narrow phase and impulse solver.

use treadsim_core::{BodyId, Isometry, Scalar, TrackId, Vec3};
use treadsim_dynamics::Bodies;
use treadsim_geom::{aabb_of, Aabb, Shape};
use treadsim_materials::{restitution_for, ContactTable};

/// One leaf primitive attached to a body.
#[derive(Clone, Debug)]
pub struct Collider {
    pub body: BodyId,
    pub shape: Shape,
    /// Pose relative to the body.
    pub local: Isometry,
    /// World AABB, refreshed each tick.
    pub aabb: Aabb,
    pub material: String,
    /// Set when the collider came from a Track node's boundingObject.
    pub track: Option<TrackId>,
}

impl Collider {
    #[inline] pub fn world_pose(&self, bodies: &Bodies) -> Isometry {
        bodies.pose(self.body.0).compose(&self.local)
    }

    #[inline] pub fn refresh_aabb(&mut self, bodies: &Bodies) {
        self.aabb = aabb_of(&self.shape, &self.world_pose(bodies));
    }
}

/// `normal` points from collider `a` to collider `b`.
#[derive(Copy, Clone, Debug)]
pub struct Contact {
    pub a: usize,
    pub b: usize,
    pub normal: Vec3,
    pub depth: Scalar,
    pub point: Vec3,
}

/// Minimum-axis separation of the two world AABBs.
pub fn contact_aabb(colliders: &[Collider], ci: usize, cj: usize) -> Option<Contact> {
    let aa = colliders[ci].aabb;
    let bb = colliders[cj].aabb;
    if !aa.overlaps(&bb) { return None; }
    let ca = aa.center();
    let cb = bb.center();
    let px = (aa.max.x - bb.min.x).min(bb.max.x - aa.min.x);
    let py = (aa.max.y - bb.min.y).min(bb.max.y - aa.min.y);
    let pz = (aa.max.z - bb.min.z).min(bb.max.z - aa.min.z);
    let side = |d: Scalar| if d >= 0.0 { 1.0 } else { -1.0 };
    let (normal, depth) = if px <= py && px <= pz {
        (Vec3::new(side(cb.x - ca.x), 0.0, 0.0), px)
    } else if py <= pz {
        (Vec3::new(0.0, side(cb.y - ca.y), 0.0), py)
    } else {
        (Vec3::new(0.0, 0.0, side(cb.z - ca.z)), pz)
    };
    if !(depth.is_finite() && depth > 0.0) { return None; }
    let point = (aa.min.max(bb.min) + aa.max.min(bb.max)) * 0.5;
    Some(Contact { a: ci, b: cj, normal, depth, point })
}

pub fn contact_sphere_sphere(bodies: &Bodies, colliders: &[Collider], ci: usize, cj: usize) -> Option<Contact> {
    let (ra, rb) = match (colliders[ci].shape, colliders[cj].shape) {
        (Shape::Sphere { r: r1 }, Shape::Sphere { r: r2 }) => (r1, r2),
        _ => return None,
    };
    let pa = colliders[ci].world_pose(bodies).pos;
    let pb = colliders[cj].world_pose(bodies).pos;
    let d = pb - pa;
    let dist2 = d.length_squared();
    let rsum = ra + rb;
    if dist2 >= rsum * rsum { return None; }
    let dist = dist2.sqrt();
    let normal = if dist > 1.0e-6 { d / dist } else { Vec3::X };
    let depth = rsum - dist;
    Some(Contact { a: ci, b: cj, normal, depth, point: pa + normal * (ra - depth * 0.5) })
}

/// Contacts for broad-phase pairs, in pair order. Pairs between two
/// immovable bodies are skipped.
pub fn find_contacts(bodies: &Bodies, colliders: &[Collider], pairs: &[(usize, usize)]) -> Vec<Contact> {
    let mut out = Vec::with_capacity(pairs.len());
    for &(i, j) in pairs {
        let (ba, bb) = (colliders[i].body.0, colliders[j].body.0);
        if bodies.inv_mass_of(ba) + bodies.inv_mass_of(bb) == 0.0 { continue; }
        let c = match (colliders[i].shape, colliders[j].shape) {
            (Shape::Sphere { .. }, Shape::Sphere { .. }) => contact_sphere_sphere(bodies, colliders, i, j),
            _ => contact_aabb(colliders, i, j),
        };
        if let Some(c) = c { out.push(c); }
    }
    out
}

#[derive(Copy, Clone, Debug)]
pub struct SolverParams {
    pub iterations: u32,
    /// Fraction of penetration beyond `slop` removed once per tick.
    pub position_correction: Scalar,
    pub slop: Scalar,
}

/// Sequential impulses over `contacts`.
///
/// `targets[i]` is the tangential velocity of `b` relative to `a` that friction
/// drives contact `i` towards: zero for plain contacts, the belt surface
/// velocity difference when a running track is involved.
pub fn solve_contacts(
    bodies: &mut Bodies,
    colliders: &[Collider],
    contacts: &[Contact],
    targets: &[Vec3],
    table: &ContactTable,
    params: SolverParams,
) {
    debug_assert_eq!(contacts.len(), targets.len());
    let mut acc_n = vec![0.0 as Scalar; contacts.len()];
    let mut acc_t = vec![Vec3::ZERO; contacts.len()];

    for it in 0..params.iterations.max(1) {
        for (idx, c) in contacts.iter().enumerate() {
            let ai = colliders[c.a].body.0;
            let bi = colliders[c.b].body.0;
            if ai == bi { continue; }
            let inv_a = bodies.inv_mass_of(ai);
            let inv_b = bodies.inv_mass_of(bi);
            let denom = inv_a + inv_b;
            if denom == 0.0 { continue; }
            let n = c.normal;

            if it == 0 {
                let corr = (c.depth - params.slop).max(0.0) * params.position_correction;
                if corr > 0.0 {
                    let corr_vec = n * (corr / denom);
                    bodies.apply_position_delta(ai, -corr_vec * inv_a);
                    bodies.apply_position_delta(bi, corr_vec * inv_b);
                }
            }

            let pair = table.pair(&colliders[c.a].material, &colliders[c.b].material);

            let rel_v_n = (bodies.vel(bi).lin - bodies.vel(ai).lin).dot(n);
            if rel_v_n < 0.0 {
                let e = restitution_for(&pair, rel_v_n);
                let jn = -(1.0 + e) * rel_v_n / denom;
                bodies.apply_impulse(ai, -n * jn);
                bodies.apply_impulse(bi, n * jn);
                acc_n[idx] += jn;
            }

            // Coulomb cone on the accumulated impulses
            let max_t = pair.friction * acc_n[idx];
            if max_t <= 0.0 { continue; }
            let vrel = bodies.vel(bi).lin - bodies.vel(ai).lin;
            let v_t = vrel - n * vrel.dot(n);
            let goal = targets[idx] - n * targets[idx].dot(n);
            let jt_des = -(v_t - goal) / denom;
            let old = acc_t[idx];
            let mut new = old + jt_des;
            let len = new.length();
            if len > max_t { new *= max_t / len; }
            let jt = new - old;
            if !jt.is_finite() { continue; }
            acc_t[idx] = new;
            bodies.apply_impulse(ai, -jt);
            bodies.apply_impulse(bi, jt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treadsim_core::{vec3, Velocity};
    use treadsim_dynamics::BodyDesc;
    use treadsim_materials::PairProps;

    const PARAMS: SolverParams = SolverParams { iterations: 4, position_correction: 0.8, slop: 0.001 };

    fn world_with_floor_and_cube(cube_z: f32, cube_vel: Vec3) -> (Bodies, Vec<Collider>) {
        let mut b = Bodies::default();
        let floor = b.add(BodyDesc { pose: Isometry::IDENTITY, vel: Velocity::default(), inv_mass: 0.0, dynamic: false });
        let cube = b.add(BodyDesc {
            pose: Isometry::from_translation_axis_angle([0.0, 0.0, cube_z], [0.0, 0.0, 1.0, 0.0]),
            vel: Velocity { lin: cube_vel, ang: Vec3::ZERO },
            inv_mass: 1.0,
            dynamic: true,
        });
        let mut cols = vec![
            Collider { body: BodyId(floor), shape: Shape::Box { hx: 5.0, hy: 5.0, hz: 0.5 },
                local: Isometry::IDENTITY, aabb: Aabb::empty(), material: "floor".into(), track: None },
            Collider { body: BodyId(cube), shape: Shape::Box { hx: 0.5, hy: 0.5, hz: 0.5 },
                local: Isometry::IDENTITY, aabb: Aabb::empty(), material: "cube".into(), track: None },
        ];
        for c in &mut cols { c.refresh_aabb(&b); }
        (b, cols)
    }

    #[test]
    fn aabb_contact_picks_shallowest_axis() {
        let (b, cols) = world_with_floor_and_cube(0.95, Vec3::ZERO);
        let c = contact_aabb(&cols, 0, 1).unwrap();
        assert_eq!(c.normal, vec3(0.0, 0.0, 1.0));
        assert!((c.depth - 0.05).abs() < 1e-5);
        assert!((c.point.z - 0.475).abs() < 1e-5);
        assert_eq!(find_contacts(&b, &cols, &[(0, 1)]).len(), 1);
    }

    #[test]
    fn separated_spheres_do_not_touch() {
        let mut b = Bodies::default();
        let p = |x: f32| Isometry::from_translation_axis_angle([x, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]);
        let s0 = b.add(BodyDesc { pose: p(0.0), vel: Velocity::default(), inv_mass: 1.0, dynamic: true });
        let s1 = b.add(BodyDesc { pose: p(0.15), vel: Velocity::default(), inv_mass: 1.0, dynamic: true });
        let col = |body: u32| Collider { body: BodyId(body), shape: Shape::Sphere { r: 0.1 },
            local: Isometry::IDENTITY, aabb: Aabb::empty(), material: "default".into(), track: None };
        let cols = vec![col(s0), col(s1)];
        let c = contact_sphere_sphere(&b, &cols, 0, 1).unwrap();
        assert_eq!(c.normal, Vec3::X);
        assert!((c.depth - 0.05).abs() < 1e-5);
        b.set_pose(s1, p(0.3));
        assert!(contact_sphere_sphere(&b, &cols, 0, 1).is_none());
    }

    #[test]
    fn falling_cube_is_stopped_and_pushed_out() {
        let (mut b, cols) = world_with_floor_and_cube(0.95, vec3(0.0, 0.0, -1.0));
        let contacts = find_contacts(&b, &cols, &[(0, 1)]);
        let mut table = ContactTable::default();
        table.insert("floor", "cube", PairProps::new(1.0, 0.0));
        solve_contacts(&mut b, &cols, &contacts, &[Vec3::ZERO], &table, PARAMS);
        assert!(b.vel(1).lin.z.abs() < 1e-6);
        assert!(b.pose(1).pos.z > 0.95);
        assert_eq!(b.pose(0).pos, Vec3::ZERO);
    }

    #[test]
    fn friction_drags_towards_target_velocity() {
        let (mut b, cols) = world_with_floor_and_cube(0.99, vec3(0.0, 0.0, -1.0));
        let contacts = find_contacts(&b, &cols, &[(0, 1)]);
        let mut table = ContactTable::default();
        table.insert("floor", "cube", PairProps::new(0.1, 0.0));
        solve_contacts(&mut b, &cols, &contacts, &[vec3(-2.0, 0.0, 0.0)], &table, PARAMS);
        let v = b.vel(1).lin;
        // capped by mu * jn = 0.1 * 1.0
        assert!((v.x + 0.1).abs() < 1e-5, "{v:?}");
        assert!(v.y.abs() < 1e-6);
    }
}
