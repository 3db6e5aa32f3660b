//! Rigid body descriptions and handles

use crate::geometry::{ShapeDesc, ShapeOffset};
use crate::layers::ObjectLayer;
use crate::material::PhysicsMaterial;
use glam::{Quat, Vec3};
use rapier3d::prelude as rapier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to a body in one [`PhysicsWorld`](crate::PhysicsWorld).
///
/// Only valid while the body exists. Ids are never reused by the world that
/// issued them, but they mean nothing to any other world. Accessors fed a
/// stale id return zeroed values; keeping ids fresh is the caller's job.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(u32);

impl BodyId {
    /// Id that never refers to a body
    pub const INVALID: Self = Self(0);

    /// Raw integer value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Build from a raw integer (round-tripping through tools or logs)
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl Default for BodyId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BodyId({})", self.0)
    }
}

/// How a body moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BodyKind {
    /// Never moves, infinite mass
    Static,
    /// Fully simulated
    #[default]
    Dynamic,
    /// Moved by user code, pushes dynamic bodies
    Kinematic,
}

impl From<BodyKind> for rapier::RigidBodyType {
    fn from(kind: BodyKind) -> Self {
        match kind {
            BodyKind::Static => rapier::RigidBodyType::Fixed,
            BodyKind::Dynamic => rapier::RigidBodyType::Dynamic,
            BodyKind::Kinematic => rapier::RigidBodyType::KinematicPositionBased,
        }
    }
}

/// Collision detection quality for fast movers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotionQuality {
    /// Test at the end of each step only
    #[default]
    Discrete,
    /// Sweep to avoid tunneling
    Continuous,
}

/// Per-axis rotation locks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisLocks {
    /// Lock rotation around X
    pub x: bool,
    /// Lock rotation around Y
    pub y: bool,
    /// Lock rotation around Z
    pub z: bool,
}

impl AxisLocks {
    /// No locks
    pub const NONE: Self = Self {
        x: false,
        y: false,
        z: false,
    };

    /// Lock every rotation axis
    pub const ALL: Self = Self {
        x: true,
        y: true,
        z: true,
    };

    pub(crate) fn to_rapier(self) -> rapier::LockedAxes {
        let mut axes = rapier::LockedAxes::empty();
        if self.x {
            axes |= rapier::LockedAxes::ROTATION_LOCKED_X;
        }
        if self.y {
            axes |= rapier::LockedAxes::ROTATION_LOCKED_Y;
        }
        if self.z {
            axes |= rapier::LockedAxes::ROTATION_LOCKED_Z;
        }
        axes
    }
}

/// Everything needed to create a body. Consumed by
/// [`PhysicsWorld::create_body`](crate::PhysicsWorld::create_body), not kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyDescriptor {
    /// Collision shape
    pub shape: ShapeDesc,
    /// Local offset of the shape from the body origin
    pub offset: ShapeOffset,
    /// World position
    pub position: Vec3,
    /// World rotation
    pub rotation: Quat,
    /// Motion type
    pub kind: BodyKind,
    /// Collision detection quality
    pub motion_quality: MotionQuality,
    /// Object layer
    pub layer: ObjectLayer,
    /// Mass override; `None` computes mass and inertia from the shape
    pub mass: Option<f32>,
    /// Surface material
    pub material: PhysicsMaterial,
    /// Linear damping (air resistance)
    pub linear_damping: f32,
    /// Angular damping
    pub angular_damping: f32,
    /// Gravity scale (0 = no gravity, 1 = normal)
    pub gravity_factor: f32,
    /// Detect overlaps without physical response
    pub is_trigger: bool,
    /// Rotation locks
    pub rotation_locks: AxisLocks,
    /// Opaque bits identifying the owner (an ECS entity)
    pub owner: Option<u64>,
}

impl Default for BodyDescriptor {
    fn default() -> Self {
        Self {
            shape: ShapeDesc::default(),
            offset: ShapeOffset::ZERO,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            kind: BodyKind::Dynamic,
            motion_quality: MotionQuality::Discrete,
            layer: ObjectLayer::Dynamic,
            mass: None,
            material: PhysicsMaterial::default(),
            linear_damping: 0.05,
            angular_damping: 0.05,
            gravity_factor: 1.0,
            is_trigger: false,
            rotation_locks: AxisLocks::NONE,
            owner: None,
        }
    }
}

impl BodyDescriptor {
    /// Static body on the static layer
    pub fn fixed(shape: ShapeDesc) -> Self {
        Self {
            shape,
            kind: BodyKind::Static,
            layer: ObjectLayer::Static,
            ..Default::default()
        }
    }

    /// Dynamic body on the dynamic layer
    pub fn dynamic(shape: ShapeDesc) -> Self {
        Self {
            shape,
            kind: BodyKind::Dynamic,
            layer: ObjectLayer::Dynamic,
            ..Default::default()
        }
    }

    /// Kinematic body on the dynamic layer
    pub fn kinematic(shape: ShapeDesc) -> Self {
        Self {
            shape,
            kind: BodyKind::Kinematic,
            layer: ObjectLayer::Dynamic,
            ..Default::default()
        }
    }

    /// Trigger volume: static, trigger layer, no physical response
    pub fn trigger(shape: ShapeDesc) -> Self {
        Self {
            shape,
            kind: BodyKind::Static,
            layer: ObjectLayer::Trigger,
            is_trigger: true,
            ..Default::default()
        }
    }

    /// Set position
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Set rotation
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set the shape offset
    pub fn with_offset(mut self, offset: ShapeOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Set the object layer
    pub fn with_layer(mut self, layer: ObjectLayer) -> Self {
        self.layer = layer;
        self
    }

    /// Override the computed mass
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = Some(mass);
        self
    }

    /// Set material
    pub fn with_material(mut self, material: PhysicsMaterial) -> Self {
        self.material = material;
        self
    }

    /// Set gravity factor
    pub fn with_gravity_factor(mut self, factor: f32) -> Self {
        self.gravity_factor = factor;
        self
    }

    /// Set motion quality
    pub fn with_motion_quality(mut self, quality: MotionQuality) -> Self {
        self.motion_quality = quality;
        self
    }

    /// Set rotation locks
    pub fn with_rotation_locks(mut self, locks: AxisLocks) -> Self {
        self.rotation_locks = locks;
        self
    }

    /// Mark as trigger
    pub fn with_trigger(mut self, is_trigger: bool) -> Self {
        self.is_trigger = is_trigger;
        self
    }

    /// Set owner bits
    pub fn with_owner(mut self, owner: u64) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// Collider user data layout: low 64 bits owner (0 = none), next 32 bits body id
pub(crate) fn pack_user_data(id: BodyId, owner: Option<u64>) -> u128 {
    ((id.0 as u128) << 64) | owner.unwrap_or(0) as u128
}

pub(crate) fn unpack_user_data(data: u128) -> (BodyId, Option<u64>) {
    let owner = data as u64;
    let id = BodyId((data >> 64) as u32);
    (id, (owner != 0).then_some(owner))
}

/// Bookkeeping for one live body
#[derive(Debug, Clone, Copy)]
pub(crate) struct BodyRecord {
    pub(crate) body: rapier::RigidBodyHandle,
    pub(crate) collider: rapier::ColliderHandle,
    pub(crate) kind: BodyKind,
    pub(crate) layer: ObjectLayer,
    pub(crate) is_trigger: bool,
    pub(crate) owner: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_data_roundtrip() {
        let data = pack_user_data(BodyId(42), Some(0xdead_beef_0000_0001));
        assert_eq!(unpack_user_data(data), (BodyId(42), Some(0xdead_beef_0000_0001)));

        let data = pack_user_data(BodyId(7), None);
        assert_eq!(unpack_user_data(data), (BodyId(7), None));
    }

    #[test]
    fn test_presets() {
        let trigger = BodyDescriptor::trigger(ShapeDesc::sphere(1.0));
        assert!(trigger.is_trigger);
        assert_eq!(trigger.layer, ObjectLayer::Trigger);
        assert_eq!(trigger.kind, BodyKind::Static);

        let fixed = BodyDescriptor::fixed(ShapeDesc::cuboid(1.0, 1.0, 1.0));
        assert_eq!(fixed.layer, ObjectLayer::Static);
    }

    #[test]
    fn test_axis_locks() {
        assert!(AxisLocks::NONE.to_rapier().is_empty());
        assert_eq!(
            AxisLocks::ALL.to_rapier(),
            rapier::LockedAxes::ROTATION_LOCKED
        );
    }
}
