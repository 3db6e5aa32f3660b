//! Scene configuration

use crate::error::{Result, SceneError};
use serde::{Deserialize, Serialize};
use void_physics::PhysicsConfig;

/// Scene configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Physics world settings
    pub physics: PhysicsConfig,

    /// Length of one fixed update, in seconds
    pub fixed_timestep: f32,

    /// Most fixed updates run for a single frame; extra time is dropped
    pub max_fixed_steps_per_frame: u32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            physics: PhysicsConfig::default(),
            fixed_timestep: 1.0 / 60.0,
            max_fixed_steps_per_frame: 4,
        }
    }
}

impl SceneConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the fixed timestep
    pub fn with_fixed_timestep(mut self, timestep: f32) -> Self {
        self.fixed_timestep = timestep;
        self
    }

    /// Set the physics configuration
    pub fn with_physics(mut self, physics: PhysicsConfig) -> Self {
        self.physics = physics;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.fixed_timestep.is_finite() && self.fixed_timestep > 0.0) {
            return Err(SceneError::InvalidConfig(format!(
                "fixed_timestep must be positive, got {}",
                self.fixed_timestep
            )));
        }
        if self.max_fixed_steps_per_frame == 0 {
            return Err(SceneError::InvalidConfig(
                "max_fixed_steps_per_frame must be at least 1".into(),
            ));
        }
        self.physics.validate()?;
        Ok(())
    }
}
