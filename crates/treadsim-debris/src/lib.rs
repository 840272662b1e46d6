//! Seeded generator of floating plastic debris used as test bodies.
//!
//! Counts and masses follow mean survey concentrations scaled to the requested
//! area; positions are uniform over the area with an optional keep-out box.

pub mod tables;

pub use tables::{default_mean_scale, material_mix, mean_concentration, Material, PlasticType, SizeClass};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use treadsim_core::XorShift64;

/// Rejection sampling gives up after this many draws for one piece.
const MAX_PLACEMENT_TRIES: u32 = 100_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DebrisError {
    #[error("invalid debris parameters: {0}")]
    InvalidParams(String),
    #[error("keep-out box leaves no room to place debris")]
    NoFreeSpace,
}

/// Axis-aligned exclusion rectangle (e.g. around the collecting robot).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeepOut {
    pub center: [f64; 2],
    pub size: [f64; 2],
}

impl KeepOut {
    /// Strictly inside; points on the border are allowed.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (hx, hy) = (self.size[0] / 2.0, self.size[1] / 2.0);
        self.center[0] - hx < x && x < self.center[0] + hx
            && self.center[1] - hy < y && y < self.center[1] + hy
    }

    /// Whether every point of the half-open area `[x0, x1) x [y0, y1)` is inside.
    fn covers(&self, (x0, x1): (f64, f64), (y0, y1): (f64, f64)) -> bool {
        let (hx, hy) = (self.size[0] / 2.0, self.size[1] / 2.0);
        self.center[0] - hx < x0 && x1 <= self.center[0] + hx
            && self.center[1] - hy < y0 && y1 <= self.center[1] + hy
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebrisParams {
    /// Area extent in metres.
    pub width: f64,
    pub height: f64,
    /// Area spans `[-w/2, w/2] x [-h/2, h/2]` instead of `[0, w] x [0, h]`.
    pub centered: bool,
    /// Multiplier on the survey mean concentrations.
    pub mean_scale: f64,
    pub size_classes: Vec<SizeClass>,
    pub keep_out: Option<KeepOut>,
}

impl Default for DebrisParams {
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 100.0,
            centered: false,
            mean_scale: default_mean_scale(),
            size_classes: vec![SizeClass::Meso, SizeClass::Macro, SizeClass::Mega],
            keep_out: None,
        }
    }
}

impl DebrisParams {
    fn validate(&self) -> Result<(), DebrisError> {
        if !(self.width.is_finite() && self.width > 0.0 && self.height.is_finite() && self.height > 0.0) {
            return Err(DebrisError::InvalidParams(format!("area {} x {}", self.width, self.height)));
        }
        if !(self.mean_scale.is_finite() && self.mean_scale >= 0.0) {
            return Err(DebrisError::InvalidParams(format!("mean_scale {}", self.mean_scale)));
        }
        Ok(())
    }

    fn ranges(&self) -> ((f64, f64), (f64, f64)) {
        if self.centered {
            ((-self.width / 2.0, self.width / 2.0), (-self.height / 2.0, self.height / 2.0))
        } else {
            ((0.0, self.width), (0.0, self.height))
        }
    }

    /// Area in km^2.
    fn area_km2(&self) -> f64 { (self.width / 1000.0) * (self.height / 1000.0) }
}

/// One floating piece. `x`, `y` are plane coordinates in metres, `size` is the
/// cube edge in metres.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebrisPiece {
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub mass: f64,
    pub density: f64,
    pub size_class: SizeClass,
    pub plastic_type: PlasticType,
    pub material: Material,
}

fn round_stochastic(x: f64, rng: &mut XorShift64) -> usize {
    let lo = x.floor();
    let frac = x - lo;
    let up = rng.next_f64() < frac;
    lo as usize + usize::from(up)
}

pub fn generate(params: &DebrisParams, rng: &mut XorShift64) -> Result<Vec<DebrisPiece>, DebrisError> {
    params.validate()?;
    let (rx, ry) = params.ranges();
    if let Some(k) = &params.keep_out {
        if k.covers(rx, ry) { return Err(DebrisError::NoFreeSpace); }
    }

    let area = params.area_km2();
    let mut pieces = Vec::new();
    for &class in &params.size_classes {
        let (lo_cm, hi_cm) = class.range_cm();
        for ty in PlasticType::ALL {
            let (mass_c, count_c) = mean_concentration(class, ty);
            let expected_mass = params.mean_scale * mass_c * area;
            let expected_n = params.mean_scale * count_c * area;
            if expected_n <= 0.0 { continue; }
            let mix = material_mix(class, ty);
            let weights: Vec<f64> = mix.iter().map(|(_, w)| *w).collect();

            let avg_mass = expected_mass / expected_n;
            let n = round_stochastic(expected_n, rng);
            let group_mass = avg_mass * n as f64;
            let first = pieces.len();
            let mut proportion = 0.0f64;

            for _ in 0..n {
                let mut tries = 0u32;
                let (mut x, mut y) = (rng.uniform(rx.0, rx.1), rng.uniform(ry.0, ry.1));
                while params.keep_out.map_or(false, |k| k.contains(x, y)) {
                    tries += 1;
                    if tries >= MAX_PLACEMENT_TRIES { return Err(DebrisError::NoFreeSpace); }
                    x = rng.uniform(rx.0, rx.1);
                    y = rng.uniform(ry.0, ry.1);
                }
                // log-uniform within the class, cm -> m
                let size = 10f64.powf(rng.uniform(lo_cm.log10(), hi_cm.log10())) / 100.0;
                let material = match rng.pick_weighted(&weights) {
                    Some(i) => mix[i].0,
                    None => Material::PE,
                };
                let density = material.density();
                proportion += density * size.powi(3);
                pieces.push(DebrisPiece { x, y, size, mass: 0.0, density, size_class: class, plastic_type: ty, material });
            }
            if proportion > 0.0 {
                for p in &mut pieces[first..] {
                    p.mass = group_mass * p.density * p.size.powi(3) / proportion;
                }
            }
            debug!("debris {class:?}/{ty:?}: expected {expected_n:.2}, placed {n}, {group_mass:.3} kg");
        }
    }
    info!("debris: {} pieces over {} x {} m", pieces.len(), params.width, params.height);
    Ok(pieces)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_area() -> DebrisParams {
        DebrisParams { width: 40.0, height: 40.0, centered: true, ..Default::default() }
    }

    #[test]
    fn same_seed_same_pieces() {
        let a = generate(&small_area(), &mut XorShift64::new(11)).unwrap();
        let b = generate(&small_area(), &mut XorShift64::new(11)).unwrap();
        assert!(!a.is_empty());
        assert_eq!(a, b);
        let c = generate(&small_area(), &mut XorShift64::new(12)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn pieces_stay_in_area_and_class() {
        let p = small_area();
        for d in generate(&p, &mut XorShift64::new(3)).unwrap() {
            assert!(d.x >= -20.0 && d.x < 20.0 && d.y >= -20.0 && d.y < 20.0);
            let (lo, hi) = d.size_class.range_cm();
            assert!(d.size >= lo / 100.0 - 1e-12 && d.size <= hi / 100.0 + 1e-12);
            assert!(d.mass > 0.0);
            assert_eq!(d.density, d.material.density());
        }
    }

    #[test]
    fn keep_out_box_is_respected() {
        let mut p = small_area();
        let k = KeepOut { center: [0.0, 0.0], size: [30.0, 30.0] };
        p.keep_out = Some(k);
        let pieces = generate(&p, &mut XorShift64::new(5)).unwrap();
        assert!(!pieces.is_empty());
        assert!(pieces.iter().all(|d| !k.contains(d.x, d.y)));
    }

    #[test]
    fn keep_out_covering_everything_fails() {
        let mut p = small_area();
        p.keep_out = Some(KeepOut { center: [0.0, 0.0], size: [100.0, 100.0] });
        assert_eq!(generate(&p, &mut XorShift64::new(1)), Err(DebrisError::NoFreeSpace));
    }

    #[test]
    fn group_mass_matches_expectation_per_piece() {
        let p = DebrisParams { size_classes: vec![SizeClass::Meso], ..small_area() };
        let pieces = generate(&p, &mut XorShift64::new(8)).unwrap();
        let h: Vec<_> = pieces.iter().filter(|d| d.plastic_type == PlasticType::H).collect();
        let (m, n) = mean_concentration(SizeClass::Meso, PlasticType::H);
        let want = m / n * h.len() as f64;
        let got: f64 = h.iter().map(|d| d.mass).sum();
        assert!((got - want).abs() < 1e-9 * want.max(1.0));
    }

    #[test]
    fn params_round_trip_through_json() {
        let p = small_area();
        let text = serde_json::to_string(&p).unwrap();
        let back: DebrisParams = serde_json::from_str(&text).unwrap();
        assert_eq!(back, p);
        let partial: DebrisParams = serde_json::from_str(r#"{ "width": 10.0 }"#).unwrap();
        assert_eq!(partial.height, 100.0);
    }
}
