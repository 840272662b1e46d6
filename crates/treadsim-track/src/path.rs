use std::f32::consts::TAU;

use log::debug;
use treadsim_core::Vec2;

use crate::TrackError;

/// Coincidence threshold for wheel centres (metres).
const COINCIDENT_EPS: f32 = 1.0e-6;
/// Allowed deviation of the total belt turning from one full turn.
const TURNING_EPS: f32 = 1.0e-3;

/// One wheel of a belt, in the belt plane.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Wheel {
    pub center: Vec2,
    pub radius: f32,
    /// Wrapped in the loop direction (inside the loop). `false` puts the belt on
    /// the other side of this wheel only.
    pub inner: bool,
}

impl Wheel {
    pub fn new(x: f32, y: f32, radius: f32) -> Self {
        Self { center: Vec2::new(x, y), radius, inner: true }
    }
    pub fn outer(mut self) -> Self { self.inner = false; self }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BeltPiece {
    Line { from: Vec2, to: Vec2, len: f32 },
    /// `sweep` is signed: positive runs counter-clockwise.
    Arc { center: Vec2, radius: f32, start_angle: f32, sweep: f32, len: f32 },
}

impl BeltPiece {
    #[inline] pub fn len(&self) -> f32 {
        match *self { BeltPiece::Line { len, .. } | BeltPiece::Arc { len, .. } => len }
    }

    fn pose_at(&self, t: f32) -> BeltPose {
        match *self {
            BeltPiece::Line { from, to, len } => {
                let dir = if len > 0.0 { (to - from) / len } else { Vec2::X };
                BeltPose::new(from + dir * t, dir)
            }
            BeltPiece::Arc { center, radius, start_angle, sweep, .. } => {
                let sign = if sweep >= 0.0 { 1.0 } else { -1.0 };
                let a = start_angle + sign * t / radius;
                let radial = Vec2::new(a.cos(), a.sin());
                BeltPose::new(center + radial * radius, radial.perp() * sign)
            }
        }
    }

    /// (local arclength, distance) of the nearest point on this piece.
    fn project(&self, p: Vec2) -> (f32, f32) {
        match *self {
            BeltPiece::Line { from, to, len } => {
                if len <= 0.0 { return (0.0, p.distance(from)); }
                let dir = (to - from) / len;
                let t = (p - from).dot(dir).clamp(0.0, len);
                (t, p.distance(from + dir * t))
            }
            BeltPiece::Arc { center, radius, start_angle, sweep, len } => {
                let rel = p - center;
                if rel.length_squared() < 1.0e-12 { return (0.0, radius); }
                let ang = rel.y.atan2(rel.x);
                let mut off = if sweep >= 0.0 { ang - start_angle } else { start_angle - ang };
                off = off.rem_euclid(TAU);
                if off * radius <= len {
                    return (off * radius, (rel.length() - radius).abs());
                }
                let start = self.pose_at(0.0).position;
                let end = self.pose_at(len).position;
                let (ds, de) = (p.distance(start), p.distance(end));
                if ds <= de { (0.0, ds) } else { (len, de) }
            }
        }
    }
}

/// Position and travel direction of the belt at an arclength.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BeltPose {
    pub position: Vec2,
    /// Unit travel direction for positive belt speed.
    pub direction: Vec2,
    /// Heading of `direction` in radians.
    pub angle: f32,
}

impl BeltPose {
    fn new(position: Vec2, direction: Vec2) -> Self {
        Self { position, direction, angle: direction.y.atan2(direction.x) }
    }
}

/// Closed belt: tangent segments and wheel arcs, starting where the belt leaves
/// wheel 0 towards wheel 1.
#[derive(Clone, Debug, PartialEq)]
pub struct BeltPath {
    pieces: Vec<BeltPiece>,
    // arclength at which each piece starts
    starts: Vec<f32>,
    length: f32,
    ccw: bool,
}

impl BeltPath {
    pub fn solve(wheels: &[Wheel]) -> Result<Self, TrackError> {
        let n = wheels.len();
        if n < 2 {
            return Err(TrackError::DegenerateTrack(format!("{n} wheel(s), need at least 2")));
        }
        for (i, w) in wheels.iter().enumerate() {
            if !(w.radius.is_finite() && w.radius > 0.0) {
                return Err(TrackError::InvalidWheel { index: i, reason: format!("radius {}", w.radius) });
            }
            if !w.center.is_finite() {
                return Err(TrackError::InvalidWheel { index: i, reason: "non-finite position".into() });
            }
        }
        for i in 0..n {
            for j in (i + 1)..n {
                if wheels[i].center.distance(wheels[j].center) <= COINCIDENT_EPS {
                    return Err(TrackError::DegenerateTrack(format!("wheels {i} and {j} share a position")));
                }
            }
        }

        // shoelace; collinear centres count as counter-clockwise
        let mut area2 = 0.0f32;
        for i in 0..n {
            let (a, b) = (wheels[i].center, wheels[(i + 1) % n].center);
            area2 += a.perp_dot(b);
        }
        let ccw = area2 >= 0.0;

        // signed radius: +r when wrapped counter-clockwise
        let rho: Vec<f32> = wheels.iter()
            .map(|w| if w.inner == ccw { w.radius } else { -w.radius })
            .collect();

        let mut dirs = Vec::with_capacity(n);
        let mut lines = Vec::with_capacity(n);
        for i in 0..n {
            let j = (i + 1) % n;
            let d = wheels[j].center - wheels[i].center;
            let dist = d.length();
            let u = d / dist;
            let k = (rho[j] - rho[i]) / dist;
            if k.abs() > 1.0 {
                return Err(TrackError::UnclosableTrack(format!("no tangent between wheels {i} and {j}")));
            }
            let s = (1.0 - k * k).sqrt();
            let dir = u * s - u.perp() * k;
            let normal = dir.perp();
            let from = wheels[i].center - normal * rho[i];
            let to = wheels[j].center - normal * rho[j];
            dirs.push(dir);
            lines.push(BeltPiece::Line { from, to, len: dist * s });
        }

        let mut turning = 0.0f32;
        let mut arcs = Vec::with_capacity(n);
        for i in 0..n {
            let d_in = dirs[(i + n - 1) % n];
            let d_out = dirs[i];
            let a = d_in.perp_dot(d_out).atan2(d_in.dot(d_out));
            let w = wheels[i];
            let theta = if rho[i] > 0.0 { a.rem_euclid(TAU) } else { (-a).rem_euclid(TAU) };
            // a wrap of a full turn is a straight pass with rounding noise
            let theta = if theta >= TAU - TURNING_EPS { 0.0 } else { theta };
            let sweep = if rho[i] > 0.0 { theta } else { -theta };
            turning += sweep;
            // arrival point on wheel i is the end of the incoming line
            let arrive = match lines[(i + n - 1) % n] { BeltPiece::Line { to, .. } => to, _ => w.center };
            let rel = arrive - w.center;
            arcs.push(BeltPiece::Arc {
                center: w.center,
                radius: w.radius,
                start_angle: rel.y.atan2(rel.x),
                sweep,
                len: w.radius * theta,
            });
        }
        let want = if ccw { TAU } else { -TAU };
        if (turning - want).abs() > TURNING_EPS {
            return Err(TrackError::UnclosableTrack(format!(
                "belt turns {turning:.4} rad, a simple loop turns {want:.4}"
            )));
        }

        let mut pieces = Vec::with_capacity(2 * n);
        for i in 0..n {
            pieces.push(lines[i]);
            pieces.push(arcs[(i + 1) % n]);
        }
        let mut starts = Vec::with_capacity(pieces.len());
        let mut acc = 0.0f32;
        for p in &pieces {
            starts.push(acc);
            acc += p.len();
        }
        debug!("belt solved: {n} wheels, length {acc:.4} m, {}", if ccw { "ccw" } else { "cw" });
        Ok(Self { pieces, starts, length: acc, ccw })
    }

    #[inline] pub fn length(&self) -> f32 { self.length }
    #[inline] pub fn pieces(&self) -> &[BeltPiece] { &self.pieces }
    #[inline] pub fn is_ccw(&self) -> bool { self.ccw }

    /// Pose at arclength `s`, wrapped into `[0, length)`; negative values allowed.
    pub fn sample(&self, s: f32) -> BeltPose {
        let s = if s.is_finite() { s.rem_euclid(self.length) } else { 0.0 };
        // last piece whose start is <= s
        let idx = match self.starts.binary_search_by(|x| x.total_cmp(&s)) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let piece = &self.pieces[idx];
        piece.pose_at((s - self.starts[idx]).min(piece.len()))
    }

    /// Arclength and distance of the point on the belt nearest `p`.
    pub fn closest(&self, p: Vec2) -> (f32, f32) {
        let mut best = (0.0f32, f32::INFINITY);
        for (piece, start) in self.pieces.iter().zip(&self.starts) {
            let (t, d) = piece.project(p);
            if d < best.1 { best = (start + t, d); }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn close(a: f32, b: f32) -> bool { (a - b).abs() < 1e-4 }

    #[test]
    fn two_wheel_loop_length() {
        let p = BeltPath::solve(&[Wheel::new(0.0, 0.0, 0.05), Wheel::new(1.0, 0.0, 0.05)]).unwrap();
        assert!(close(p.length(), 2.0 + 0.1 * PI), "{}", p.length());
        let sum: f32 = p.pieces().iter().map(BeltPiece::len).sum();
        assert!(close(sum, p.length()));
        // departs wheel 0 along the bottom, heading +x
        let s0 = p.sample(0.0);
        assert!(close(s0.position.y, -0.05) && close(s0.direction.x, 1.0));
    }

    #[test]
    fn square_either_orientation_has_same_length() {
        let ccw = [Wheel::new(0.0, 0.0, 0.1), Wheel::new(1.0, 0.0, 0.1), Wheel::new(1.0, 1.0, 0.1), Wheel::new(0.0, 1.0, 0.1)];
        let mut cw = ccw;
        cw.reverse();
        let a = BeltPath::solve(&ccw).unwrap();
        let b = BeltPath::solve(&cw).unwrap();
        assert!(a.is_ccw() && !b.is_ccw());
        assert!(close(a.length(), 4.0 + 0.2 * PI));
        assert!(close(b.length(), 4.0 + 0.2 * PI));
    }

    #[test]
    fn outer_tensioner_dips_the_belt() {
        let wheels = [
            Wheel::new(0.0, 0.0, 0.1),
            Wheel::new(2.0, 0.0, 0.1),
            Wheel::new(2.0, 1.0, 0.1),
            Wheel::new(1.0, 0.9, 0.1).outer(),
            Wheel::new(0.0, 1.0, 0.1),
        ];
        let p = BeltPath::solve(&wheels).unwrap();
        assert!(close(p.length(), 6.718096), "{}", p.length());
        // belt passes under the tensioner
        let (_, d) = p.closest(Vec2::new(1.0, 0.8));
        assert!(d < 1e-4);
    }

    #[test]
    fn convex_outer_wheel_cannot_close() {
        let wheels = [Wheel::new(0.0, 0.0, 0.1), Wheel::new(2.0, 0.0, 0.1), Wheel::new(1.0, 0.5, 0.1).outer()];
        assert!(matches!(BeltPath::solve(&wheels), Err(TrackError::UnclosableTrack(_))));
    }

    #[test]
    fn overlapping_opposite_wraps_have_no_tangent() {
        let wheels = [Wheel::new(0.0, 0.0, 1.0), Wheel::new(0.5, 0.0, 1.0).outer()];
        assert!(matches!(BeltPath::solve(&wheels), Err(TrackError::UnclosableTrack(_))));
    }

    #[test]
    fn degenerate_and_invalid_inputs() {
        assert!(matches!(BeltPath::solve(&[Wheel::new(0.0, 0.0, 0.1)]), Err(TrackError::DegenerateTrack(_))));
        let same = [Wheel::new(0.0, 0.0, 0.1), Wheel::new(1.0, 0.0, 0.1), Wheel::new(0.0, 0.0, 0.2)];
        assert!(matches!(BeltPath::solve(&same), Err(TrackError::DegenerateTrack(_))));
        let bad = [Wheel::new(0.0, 0.0, 0.1), Wheel::new(1.0, 0.0, 0.0)];
        assert!(matches!(BeltPath::solve(&bad), Err(TrackError::InvalidWheel { index: 1, .. })));
    }

    #[test]
    fn collinear_middle_wheel_has_no_wrap() {
        let wheels = [Wheel::new(0.0, 0.0, 0.1), Wheel::new(1.0, 0.0, 0.1), Wheel::new(2.0, 0.0, 0.1)];
        let p = BeltPath::solve(&wheels).unwrap();
        assert!(close(p.length(), 4.0 + 0.2 * PI));
    }

    #[test]
    fn solve_is_deterministic_and_sample_wraps() {
        let wheels = [Wheel::new(-0.2, 0.0, 0.04), Wheel::new(0.2, 0.0, 0.04), Wheel::new(0.0, 0.15, 0.03)];
        let a = BeltPath::solve(&wheels).unwrap();
        let b = BeltPath::solve(&wheels).unwrap();
        assert_eq!(a, b);
        let l = a.length();
        let (p0, p1) = (a.sample(0.3), a.sample(0.3 + l));
        assert!(p0.position.distance(p1.position) < 1e-5 && close(p0.angle, p1.angle));
        let back = a.sample(-0.1);
        let fwd = a.sample(l - 0.1);
        assert!(back.position.distance(fwd.position) < 1e-4);
    }

    #[test]
    fn closest_recovers_sampled_arclength() {
        let p = BeltPath::solve(&[Wheel::new(0.0, 0.0, 0.05), Wheel::new(1.0, 0.0, 0.05)]).unwrap();
        for s in [0.1, 0.5, 1.02, 1.6, 2.25] {
            let pose = p.sample(s);
            let (s2, d) = p.closest(pose.position);
            assert!(d < 1e-4 && (s2 - s).abs() < 1e-3, "s={s} s2={s2} d={d}");
        }
    }
}
