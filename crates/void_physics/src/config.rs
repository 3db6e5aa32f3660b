//! Physics configuration

use crate::error::{PhysicsError, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Physics world configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity vector (default: -9.81 in Y)
    pub gravity: Vec3,

    /// Solver iterations per step
    pub solver_iterations: usize,

    /// Allow continuous collision detection for bodies that ask for it
    pub ccd_enabled: bool,

    /// Default friction coefficient
    pub default_friction: f32,

    /// Default restitution (bounciness)
    pub default_restitution: f32,

    /// Enable sleeping for inactive bodies
    pub sleeping_enabled: bool,

    /// Size of the worker pool. `None` uses every hardware thread but one.
    pub worker_threads: Option<usize>,

    /// Expected number of bodies, used to presize lookup tables
    pub max_bodies: usize,

    /// Skin kept between a character capsule and the world
    pub character_padding: f32,

    /// Default maximum step a character climbs without jumping
    pub character_stair_height: f32,

    /// Minimum free width on top of a step for a character to climb it
    pub character_stair_min_width: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            solver_iterations: 4,
            ccd_enabled: true,
            default_friction: 0.5,
            default_restitution: 0.0,
            sleeping_enabled: true,
            worker_threads: None,
            max_bodies: 1024,
            character_padding: 0.02,
            character_stair_height: 0.3,
            character_stair_min_width: 0.2,
        }
    }
}

impl PhysicsConfig {
    /// Create a configuration for high-precision simulation
    pub fn high_precision() -> Self {
        Self {
            solver_iterations: 8,
            ..Default::default()
        }
    }

    /// Create a configuration for fast simulation (lower quality)
    pub fn fast() -> Self {
        Self {
            solver_iterations: 2,
            ccd_enabled: false,
            ..Default::default()
        }
    }

    /// Set gravity
    pub fn with_gravity(mut self, x: f32, y: f32, z: f32) -> Self {
        self.gravity = Vec3::new(x, y, z);
        self
    }

    /// Set the worker pool size
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Number of worker threads the simulation step runs on.
    ///
    /// Defaults to `available_parallelism() - 1`, never less than one.
    pub fn resolved_worker_threads(&self) -> usize {
        self.worker_threads
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(2)
                    .saturating_sub(1)
            })
            .max(1)
    }

    /// Check the configuration for values the simulation cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.gravity.is_finite() {
            return Err(PhysicsError::InvalidConfig(format!(
                "gravity must be finite, got {:?}",
                self.gravity
            )));
        }
        if self.solver_iterations == 0 {
            return Err(PhysicsError::InvalidConfig(
                "solver_iterations must be at least 1".into(),
            ));
        }
        if self.worker_threads == Some(0) {
            return Err(PhysicsError::InvalidConfig(
                "worker_threads must be at least 1".into(),
            ));
        }
        if self.character_padding < 0.0 || self.character_stair_height < 0.0 {
            return Err(PhysicsError::InvalidConfig(
                "character padding and stair height must not be negative".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PhysicsConfig::default().validate().is_ok());
        assert!(PhysicsConfig::high_precision().validate().is_ok());
        assert!(PhysicsConfig::fast().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let config = PhysicsConfig {
            solver_iterations: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PhysicsError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_nan_gravity() {
        let config = PhysicsConfig::default().with_gravity(0.0, f32::NAN, 0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_threads_never_zero() {
        assert!(PhysicsConfig::default().resolved_worker_threads() >= 1);
        assert_eq!(
            PhysicsConfig::default()
                .with_worker_threads(3)
                .resolved_worker_threads(),
            3
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PhysicsConfig =
            serde_json::from_str(r#"{ "solver_iterations": 6 }"#).unwrap();
        assert_eq!(config.solver_iterations, 6);
        assert_eq!(config.gravity, Vec3::new(0.0, -9.81, 0.0));
    }
}
