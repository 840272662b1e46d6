use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("malformed config {path}: {source}")]
    Json { path: String, #[source] source: serde_json::Error },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Restitution/friction used when no contact-properties entry matches a material pair.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContactDefaults {
    pub friction: f32,
    pub bounce: f32,
}

impl Default for ContactDefaults {
    fn default() -> Self { Self { friction: 1.0, bounce: 0.5 } }
}

/// Engine-wide knobs. Every field has a default so a partial JSON file is valid.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Overrides the scene's `basicTimeStep` when set (milliseconds).
    pub time_step_ms: Option<f32>,
    /// Used when the scene has no WorldInfo.
    pub default_time_step_ms: f32,
    /// Replaces the gravity derived from WorldInfo (`gravity` magnitude along -up).
    pub gravity: Option<[f32; 3]>,
    /// Bounded wait for a controller's command frame each tick.
    pub controller_timeout_ms: u64,
    /// k in F = -k (v_body - v_stream) * submerged_fraction.
    pub fluid_drag_k: f32,
    pub buoyancy: bool,
    pub solver_iterations: u32,
    /// Fraction of penetration removed per iteration.
    pub position_correction: f32,
    pub contact: ContactDefaults,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            time_step_ms: None,
            default_time_step_ms: 4.0,
            gravity: None,
            controller_timeout_ms: 50,
            fluid_drag_k: 10.0,
            buoyancy: true,
            solver_iterations: 4,
            position_correction: 0.8,
            contact: ContactDefaults::default(),
        }
    }
}

impl SimConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: SimConfig = serde_json::from_str(s)
            .map_err(|source| ConfigError::Json { path: "<inline>".into(), source })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        let cfg: SimConfig = serde_json::from_str(&text)
            .map_err(|source| ConfigError::Json { path: path.display().to_string(), source })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ms) = self.time_step_ms {
            if !(ms.is_finite() && ms > 0.0) {
                return Err(ConfigError::Invalid(format!("time_step_ms must be > 0, got {ms}")));
            }
        }
        if !(self.default_time_step_ms.is_finite() && self.default_time_step_ms > 0.0) {
            return Err(ConfigError::Invalid("default_time_step_ms must be > 0".into()));
        }
        if self.fluid_drag_k < 0.0 || !self.fluid_drag_k.is_finite() {
            return Err(ConfigError::Invalid("fluid_drag_k must be finite and >= 0".into()));
        }
        if self.solver_iterations == 0 {
            return Err(ConfigError::Invalid("solver_iterations must be >= 1".into()));
        }
        Ok(())
    }

    #[inline] pub fn controller_timeout(&self) -> Duration {
        Duration::from_millis(self.controller_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = SimConfig::from_json_str(r#"{ "controller_timeout_ms": 5 }"#).unwrap();
        assert_eq!(cfg.controller_timeout_ms, 5);
        assert_eq!(cfg.default_time_step_ms, 4.0);
        assert_eq!(cfg.contact, ContactDefaults::default());
    }

    #[test]
    fn rejects_zero_iterations() {
        let err = SimConfig::from_json_str(r#"{ "solver_iterations": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
