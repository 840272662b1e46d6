use treadsim_core::{Scalar, Vec2};

use crate::path::{BeltPath, BeltPose};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TrackState { Stopped, Running(Scalar) }

impl TrackState {
    /// Commanded velocities take effect instantly; zero (or NaN) stops the belt.
    pub fn from_command(v: Scalar) -> Self {
        if v == 0.0 || !v.is_finite() { TrackState::Stopped } else { TrackState::Running(v) }
    }

    #[inline] pub fn speed(self) -> Scalar {
        match self { TrackState::Stopped => 0.0, TrackState::Running(v) => v }
    }
}

/// Run state of one belt: current state plus accumulated surface displacement.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BeltDrive {
    pub state: TrackState,
    pub displacement: Scalar,
}

impl Default for BeltDrive {
    fn default() -> Self { Self { state: TrackState::Stopped, displacement: 0.0 } }
}

impl BeltDrive {
    pub fn command(&mut self, v: Scalar) { self.state = TrackState::from_command(v); }

    pub fn advance(&mut self, dt: Scalar) {
        self.displacement += self.state.speed() * dt;
    }
}

/// Tread plates and texture scroll that follow the belt.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrackAnimation {
    pub plate_count: usize,
    /// UV scroll per metre of belt travel.
    pub texture_animation: Vec2,
}

impl TrackAnimation {
    pub fn new(plate_count: usize, texture_animation: Vec2) -> Self {
        Self { plate_count, texture_animation }
    }

    /// Evenly spaced plate poses, plate 0 at `s = displacement`.
    pub fn plate_poses(&self, path: &BeltPath, displacement: Scalar) -> Vec<BeltPose> {
        if self.plate_count == 0 { return Vec::new(); }
        let step = path.length() / self.plate_count as Scalar;
        (0..self.plate_count)
            .map(|i| path.sample(displacement + i as Scalar * step))
            .collect()
    }

    /// Texture offset in `[0, 1)` per component.
    pub fn uv_offset(&self, displacement: Scalar) -> Vec2 {
        let raw = self.texture_animation * displacement;
        Vec2::new(wrap01(raw.x), wrap01(raw.y))
    }
}

fn wrap01(x: Scalar) -> Scalar {
    if !x.is_finite() { return 0.0; }
    let w = x.rem_euclid(1.0);
    if w >= 1.0 { 0.0 } else { w }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Wheel;

    #[test]
    fn command_transitions() {
        let mut d = BeltDrive::default();
        d.command(0.5);
        assert_eq!(d.state, TrackState::Running(0.5));
        d.advance(2.0);
        assert_eq!(d.displacement, 1.0);
        d.command(0.0);
        assert_eq!(d.state, TrackState::Stopped);
        d.advance(2.0);
        assert_eq!(d.displacement, 1.0);
    }

    #[test]
    fn plates_are_evenly_spaced() {
        let path = BeltPath::solve(&[Wheel::new(0.0, 0.0, 0.05), Wheel::new(1.0, 0.0, 0.05)]).unwrap();
        let anim = TrackAnimation::new(4, Vec2::new(1.0, 0.0));
        let plates = anim.plate_poses(&path, 0.25);
        assert_eq!(plates.len(), 4);
        assert_eq!(plates[0], path.sample(0.25));
        assert_eq!(plates[2], path.sample(0.25 + path.length() / 2.0));
    }

    #[test]
    fn uv_wraps_into_unit_interval() {
        let anim = TrackAnimation::new(0, Vec2::new(2.0, -1.0));
        let uv = anim.uv_offset(0.75);
        assert!((uv.x - 0.5).abs() < 1e-6);
        assert!((uv.y - 0.25).abs() < 1e-6);
    }
}
