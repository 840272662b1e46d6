use thiserror::Error;
use crate::shape::BoundingGeom;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MassError {
    #[error("invalid mass: {0}")]
    InvalidMass(String),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MassProps {
    pub mass: f32,
    pub inv_mass: f32,
}

impl MassProps {
    pub fn infinite() -> Self {
        Self { mass: f32::INFINITY, inv_mass: 0.0 }
    }

    pub fn from_mass(m: f32) -> Self {
        if m.is_finite() && m > 0.0 {
            Self { mass: m, inv_mass: 1.0 / m }
        } else {
            Self::infinite()
        }
    }

    /// Sum of two parts of the same rigid body.
    pub fn combine(&self, other: &MassProps) -> MassProps {
        match (self.inv_mass > 0.0, other.inv_mass > 0.0) {
            (true, true) => MassProps::from_mass(self.mass + other.mass),
            (true, false) => *self,
            (false, true) => *other,
            (false, false) => MassProps::infinite(),
        }
    }
}

/// Mass of a physics node.
///
/// * `density >= 0`: density times the analytic volume of `geometry`.
/// * `density < 0`: sentinel, `explicit_mass` is used as-is and must be > 0.
pub fn compute_mass(
    geometry: Option<&BoundingGeom>,
    density: f32,
    explicit_mass: Option<f32>,
) -> Result<f32, MassError> {
    if !density.is_finite() {
        return Err(MassError::InvalidMass(format!("density is not finite ({density})")));
    }
    if density >= 0.0 {
        let geom = geometry.ok_or_else(|| {
            MassError::InvalidMass("density given but the body has no bounding geometry".into())
        })?;
        let vol = geom.volume();
        if !(vol.is_finite() && vol > 0.0) {
            return Err(MassError::InvalidMass(format!("bounding geometry has no volume ({vol})")));
        }
        return Ok(density * vol);
    }
    match explicit_mass {
        Some(m) if m.is_finite() && m > 0.0 => Ok(m),
        Some(m) => Err(MassError::InvalidMass(format!("explicit mass must be positive, got {m}"))),
        None => Err(MassError::InvalidMass("density is -1 and no explicit mass is set".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    fn unit_box() -> BoundingGeom { BoundingGeom::Leaf(Shape::Box { hx: 0.5, hy: 0.5, hz: 0.5 }) }

    #[test]
    fn density_times_volume() {
        let m = compute_mass(Some(&unit_box()), 2.0, None).unwrap();
        assert!((m - 2.0).abs() < 1e-6);
    }

    #[test]
    fn sentinel_density_uses_explicit_mass() {
        assert_eq!(compute_mass(None, -1.0, Some(0.25)).unwrap(), 0.25);
        // explicit mass wins even with geometry present
        assert_eq!(compute_mass(Some(&unit_box()), -1.0, Some(0.25)).unwrap(), 0.25);
    }

    #[test]
    fn sentinel_without_mass_is_invalid() {
        assert!(matches!(compute_mass(Some(&unit_box()), -1.0, None), Err(MassError::InvalidMass(_))));
        assert!(matches!(compute_mass(None, -1.0, Some(0.0)), Err(MassError::InvalidMass(_))));
        assert!(matches!(compute_mass(None, -1.0, Some(-3.0)), Err(MassError::InvalidMass(_))));
    }

    #[test]
    fn density_without_geometry_is_invalid() {
        assert!(compute_mass(None, 1000.0, None).is_err());
    }

    #[test]
    fn combine_ignores_massless_parts() {
        let a = MassProps::from_mass(2.0);
        let c = a.combine(&MassProps::infinite());
        assert_eq!(c.mass, 2.0);
        assert!((a.combine(&MassProps::from_mass(1.0)).inv_mass - 1.0 / 3.0).abs() < 1e-6);
    }
}
