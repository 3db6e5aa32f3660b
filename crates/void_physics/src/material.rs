//! Physics materials defining surface properties

use rapier3d::prelude as rapier;
use serde::{Deserialize, Serialize};

/// Surface response of a body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsMaterial {
    /// Friction coefficient (0 = frictionless)
    pub friction: f32,
    /// Restitution/bounciness (0 = no bounce, 1 = perfect bounce)
    pub restitution: f32,
    /// How friction is combined between two bodies
    pub friction_combine: CombineRule,
    /// How restitution is combined between two bodies
    pub restitution_combine: CombineRule,
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self {
            friction: 0.5,
            restitution: 0.0,
            friction_combine: CombineRule::Average,
            restitution_combine: CombineRule::Average,
        }
    }
}

impl PhysicsMaterial {
    /// Create a new physics material
    pub fn new(friction: f32, restitution: f32) -> Self {
        Self {
            friction,
            restitution,
            ..Default::default()
        }
    }

    /// Frictionless ice-like material
    pub fn ice() -> Self {
        Self::new(0.05, 0.0)
    }

    /// Bouncy rubber-like material
    pub fn rubber() -> Self {
        Self {
            friction: 0.8,
            restitution: 0.8,
            restitution_combine: CombineRule::Max,
            ..Default::default()
        }
    }

    /// Set friction
    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction.max(0.0);
        self
    }

    /// Set restitution
    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution.clamp(0.0, 1.0);
        self
    }
}

/// Rule for combining material properties of two touching bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CombineRule {
    /// Use the average of both values
    #[default]
    Average,
    /// Use the minimum value
    Min,
    /// Use the maximum value
    Max,
    /// Multiply the values
    Multiply,
}

impl From<CombineRule> for rapier::CoefficientCombineRule {
    fn from(rule: CombineRule) -> Self {
        match rule {
            CombineRule::Average => rapier::CoefficientCombineRule::Average,
            CombineRule::Min => rapier::CoefficientCombineRule::Min,
            CombineRule::Max => rapier::CoefficientCombineRule::Max,
            CombineRule::Multiply => rapier::CoefficientCombineRule::Multiply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_clamp() {
        let material = PhysicsMaterial::default()
            .with_friction(-1.0)
            .with_restitution(3.0);
        assert_eq!(material.friction, 0.0);
        assert_eq!(material.restitution, 1.0);
    }

    #[test]
    fn test_combine_rule_maps_to_rapier() {
        let rule: rapier::CoefficientCombineRule = CombineRule::Max.into();
        assert_eq!(rule, rapier::CoefficientCombineRule::Max);
    }
}
