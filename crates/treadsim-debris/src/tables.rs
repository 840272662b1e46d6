//! Survey tables for floating ocean plastic (mean concentrations per size
//! class and plastic type, and the polymer mix of each group).

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SizeClass { Micro, Meso, Macro, Mega }

impl SizeClass {
    pub const ALL: [SizeClass; 4] = [SizeClass::Micro, SizeClass::Meso, SizeClass::Macro, SizeClass::Mega];

    /// Edge length range in centimetres.
    pub fn range_cm(self) -> (f64, f64) {
        match self {
            SizeClass::Micro => (0.05, 0.5),
            SizeClass::Meso => (0.5, 5.0),
            SizeClass::Macro => (5.0, 50.0),
            // open-ended in the survey; 2 m caps nets and ropes
            SizeClass::Mega => (50.0, 200.0),
        }
    }
}

/// H: hard plastic, sheet and film. N: lines, ropes, nets. P: pre-production
/// pellets. F: foamed material.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlasticType { H, N, P, F }

impl PlasticType {
    pub const ALL: [PlasticType; 4] = [PlasticType::H, PlasticType::N, PlasticType::P, PlasticType::F];
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Material { PE, PP, PS, PVC }

impl Material {
    /// kg/m^3. PVC is given the PS value so every piece stays near neutral buoyancy.
    pub fn density(self) -> f64 {
        match self {
            Material::PE => 920.0,
            Material::PP => 900.5,
            Material::PS => 1005.0,
            Material::PVC => 1005.0,
        }
    }
}

/// Share of pieces per polymer. Shares need not sum to one (unknown polymers
/// are left out); callers normalise.
pub fn material_mix(class: SizeClass, ty: PlasticType) -> &'static [(Material, f64)] {
    use Material::*;
    use PlasticType as T;
    use SizeClass as S;
    match (class, ty) {
        (S::Micro, T::H) => &[(PE, 0.95), (PP, 0.05)],
        (S::Micro, T::N) => &[(PE, 0.50), (PP, 0.50)],
        (S::Micro, T::P) => &[(PE, 1.00)],
        (S::Micro, T::F) => &[(PE, 0.30), (PS, 0.60)],
        (S::Meso, T::H) => &[(PE, 0.75), (PP, 0.25)],
        (S::Meso, T::N) => &[(PE, 0.70), (PP, 0.30)],
        (S::Meso, T::P) => &[(PE, 1.00)],
        (S::Meso, T::F) => &[(PE, 0.40), (PP, 0.05), (PS, 0.40), (PVC, 0.10)],
        (S::Macro, T::H) => &[(PE, 0.55), (PP, 0.45)],
        (S::Macro, T::N) => &[(PE, 0.65), (PP, 0.35)],
        (S::Macro, T::F) => &[(PE, 0.50), (PP, 0.05), (PS, 0.15), (PVC, 0.10)],
        (S::Mega, T::H) => &[(PE, 0.60), (PP, 0.40)],
        (S::Mega, T::N) => &[(PE, 0.80), (PP, 0.10)],
        _ => &[],
    }
}

/// Mean (mass kg/km^2, count #/km^2).
pub fn mean_concentration(class: SizeClass, ty: PlasticType) -> (f64, f64) {
    use PlasticType as T;
    use SizeClass as S;
    match (class, ty) {
        (S::Micro, T::H) => (2.33, 643_930.0),
        (S::Micro, T::N) => (0.041, 19_873.0),
        (S::Micro, T::P) => (0.13, 14_362.0),
        (S::Micro, T::F) => (0.001, 216.0),
        (S::Meso, T::H) => (3.68, 20_993.0),
        (S::Meso, T::N) => (0.23, 803.0),
        (S::Meso, T::P) => (0.0003, 3.6),
        (S::Meso, T::F) => (0.003, 12.0),
        (S::Macro, T::H) => (15.53, 640.0),
        (S::Macro, T::N) => (1.27, 49.0),
        (S::Macro, T::P) => (0.0, 0.0),
        (S::Macro, T::F) => (0.021, 0.7),
        (S::Mega, T::H) => (3.52, 0.3),
        (S::Mega, T::N) => (42.82, 3.3),
        (S::Mega, T::P) => (0.0, 0.0),
        (S::Mega, T::F) => (0.0, 0.0),
    }
}

/// Survey-wide mean mass concentration, kg/km^2.
pub const TOTAL_MEAN_MASS: f64 = 69.58;

/// Scale that brings the total mean up to 100 kg/km^2.
pub fn default_mean_scale() -> f64 { 100.0 / TOTAL_MEAN_MASS }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_nonzero_group_has_a_mix() {
        for c in SizeClass::ALL {
            for t in PlasticType::ALL {
                let (mass, count) = mean_concentration(c, t);
                if count > 0.0 {
                    assert!(mass > 0.0);
                    assert!(!material_mix(c, t).is_empty(), "{c:?}/{t:?}");
                }
            }
        }
    }

    #[test]
    fn group_masses_sum_to_survey_total() {
        let total: f64 = SizeClass::ALL.iter()
            .flat_map(|c| PlasticType::ALL.iter().map(move |t| mean_concentration(*c, *t).0))
            .sum();
        assert!((total - TOTAL_MEAN_MASS).abs() < 0.01, "{total}");
    }
}
