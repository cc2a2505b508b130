//! Simulation parameters

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::Capabilities;

/// Dye resolution used when the device cannot filter float textures.
pub const FALLBACK_DYE_RESOLUTION: u32 = 512;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.r, self.g, self.b)
    }

    /// Treats the components as 0..=255 bytes.
    pub fn normalized(self) -> Vec3 {
        self.to_vec3() / 255.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub sim_resolution: u32,
    pub dye_resolution: u32,
    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    /// Fraction of last tick's pressure kept as the starting guess.
    pub pressure: f32,
    pub pressure_iterations: u32,
    pub curl: f32,
    pub splat_radius: f32,
    pub splat_force: f32,
    pub smoke_radius: f32,
    pub smoke_force: f32,
    pub smoke_buoyancy: f32,
    pub smoke_color: Rgb,
    pub pointer_color: Rgb,
    /// Byte-valued background tint.
    pub back_color: Rgb,
    pub shading: bool,
    pub bloom: bool,
    pub bloom_iterations: u32,
    pub bloom_resolution: u32,
    pub bloom_intensity: f32,
    pub bloom_threshold: f32,
    pub bloom_soft_knee: f32,
    pub emit_smoke: bool,
    /// Upper bound on a single tick.
    pub max_dt: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sim_resolution: 128,
            dye_resolution: 512,
            density_dissipation: 0.5,
            velocity_dissipation: 0.95,
            pressure: 0.3,
            pressure_iterations: 10,
            curl: 3.5,
            splat_radius: 3.0,
            splat_force: 4000.0,
            smoke_radius: 2.0,
            smoke_force: 26.0,
            smoke_buoyancy: 0.45,
            smoke_color: Rgb::new(0.0016, 0.0024, 0.0042),
            pointer_color: Rgb::new(0.2, 0.35, 0.7),
            back_color: Rgb::new(5.0, 8.0, 15.0),
            shading: false,
            bloom: true,
            bloom_iterations: 8,
            bloom_resolution: 256,
            bloom_intensity: 0.2,
            bloom_threshold: 0.08,
            bloom_soft_knee: 0.8,
            emit_smoke: true,
            max_dt: 1.0 / 60.0,
        }
    }
}

impl SimConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sim_resolution == 0 || self.dye_resolution == 0 {
            return Err(ConfigError::Invalid("resolutions must be nonzero".into()));
        }
        if self.bloom && self.bloom_resolution == 0 {
            return Err(ConfigError::Invalid("bloom resolution must be nonzero".into()));
        }
        if !(self.max_dt > 0.0) {
            return Err(ConfigError::Invalid("max_dt must be positive".into()));
        }
        if self.density_dissipation < 0.0 || self.velocity_dissipation < 0.0 {
            return Err(ConfigError::Invalid("dissipation must not be negative".into()));
        }
        if self.splat_radius <= 0.0 || self.smoke_radius <= 0.0 {
            return Err(ConfigError::Invalid("splat radii must be positive".into()));
        }
        Ok(())
    }

    /// Gentler rise and less swirl for users who asked for reduced motion.
    pub fn apply_reduced_motion(&mut self) {
        self.smoke_buoyancy = 0.25;
        self.curl = 2.8;
    }

    /// Turns off what the device cannot do well.
    pub fn degrade_for(&mut self, caps: &Capabilities) {
        if caps.supports_float_filtering {
            return;
        }
        if self.dye_resolution > FALLBACK_DYE_RESOLUTION {
            log::warn!(
                "no float filtering, dye resolution {} capped at {}",
                self.dye_resolution,
                FALLBACK_DYE_RESOLUTION
            );
            self.dye_resolution = FALLBACK_DYE_RESOLUTION;
        }
        if self.bloom || self.shading {
            log::warn!("no float filtering, bloom and shading disabled");
        }
        self.shading = false;
        self.bloom = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SimConfig =
            serde_json::from_str(r#"{ "sim_resolution": 64, "bloom": false }"#).unwrap();
        assert_eq!(config.sim_resolution, 64);
        assert!(!config.bloom);
        assert_eq!(config.pressure_iterations, 10);
        assert_eq!(config.smoke_force, 26.0);
    }

    #[test]
    fn test_reduced_motion_lowers_buoyancy_and_curl() {
        let mut config = SimConfig::default();
        config.apply_reduced_motion();
        assert_eq!(config.smoke_buoyancy, 0.25);
        assert_eq!(config.curl, 2.8);
    }

    #[test]
    fn test_degrade_without_filtering() {
        let mut config = SimConfig {
            dye_resolution: 1024,
            shading: true,
            ..SimConfig::default()
        };
        config.degrade_for(&Capabilities::minimal());
        assert_eq!(config.dye_resolution, FALLBACK_DYE_RESOLUTION);
        assert!(!config.bloom);
        assert!(!config.shading);

        let mut config = SimConfig::default();
        config.degrade_for(&Capabilities::full());
        assert!(config.bloom);
    }

    #[test]
    fn test_invalid_rejected() {
        let config = SimConfig {
            sim_resolution: 0,
            ..SimConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
