//! Scene components
//!
//! Authoring data (transforms, body settings, collider shapes) is plain and
//! serializable. Runtime simulation handles live in private fields that are
//! never serialized and only the physics bridge sets.

use glam::{Mat4, Quat, Vec3};
use hecs::Entity;
use serde::{Deserialize, Serialize};
use void_physics::{
    AxisLocks, BodyId, BodyKind, CharacterId, MotionQuality, ObjectLayer, PhysicsMaterial,
    ShapeDesc, ShapeOffset,
};

// ============================================================================
// Transforms
// ============================================================================

/// Local transform, relative to the parent or to the world for roots
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformComponent {
    /// Translation
    pub translation: Vec3,
    /// Rotation
    pub rotation: Quat,
    /// Scale
    pub scale: Vec3,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl TransformComponent {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Transform with only a translation
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Set rotation
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set scale
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Local matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Decompose a matrix
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }
}

/// Computed world transform. Written by transform propagation only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldTransformComponent {
    /// World matrix
    pub matrix: Mat4,
}

impl Default for WorldTransformComponent {
    fn default() -> Self {
        Self {
            matrix: Mat4::IDENTITY,
        }
    }
}

impl WorldTransformComponent {
    /// Wrap a world matrix
    pub fn from_matrix(matrix: Mat4) -> Self {
        Self { matrix }
    }

    /// World position
    pub fn translation(&self) -> Vec3 {
        self.matrix.w_axis.truncate()
    }

    /// World rotation
    pub fn rotation(&self) -> Quat {
        self.matrix.to_scale_rotation_translation().1
    }
}

// ============================================================================
// Hierarchy
// ============================================================================

/// Parent and children of an entity.
///
/// Maintained by [`HierarchyCommands`](crate::HierarchyCommands); editing
/// it by hand breaks the two-way links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipComponent {
    /// Parent entity, `None` for roots
    pub parent: Option<Entity>,
    /// Child entities
    pub children: Vec<Entity>,
}

impl RelationshipComponent {
    /// Whether the entity is a root
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

// ============================================================================
// Physics
// ============================================================================

/// Rigid body settings of an entity.
///
/// While the scene plays, the bridge creates a body for every entity with
/// this component and stores its id here. An entity carrying it can never
/// be a hierarchy child. Clones copy the settings only, so a cloned
/// component gets a body of its own.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidBodyComponent {
    /// Motion type
    pub body_type: BodyKind,
    /// Collision detection quality
    pub motion_quality: MotionQuality,
    /// Layer override; by default static bodies go on the static layer and
    /// everything else on the dynamic layer
    pub layer: Option<ObjectLayer>,
    /// Mass override
    pub mass: Option<f32>,
    /// Material override; by default the world's default material
    pub material: Option<PhysicsMaterial>,
    /// Linear damping
    pub linear_damping: f32,
    /// Angular damping
    pub angular_damping: f32,
    /// Gravity scale
    pub gravity_factor: f32,
    /// Detect overlaps without physical response
    pub is_trigger: bool,
    /// Rotation locks
    pub lock_rotation: AxisLocks,

    #[serde(skip)]
    runtime_body: Option<BodyId>,
}

impl Default for RigidBodyComponent {
    fn default() -> Self {
        Self {
            body_type: BodyKind::Dynamic,
            motion_quality: MotionQuality::Discrete,
            layer: None,
            mass: None,
            material: None,
            linear_damping: 0.05,
            angular_damping: 0.05,
            gravity_factor: 1.0,
            is_trigger: false,
            lock_rotation: AxisLocks::NONE,
            runtime_body: None,
        }
    }
}

impl Clone for RigidBodyComponent {
    fn clone(&self) -> Self {
        Self {
            runtime_body: None,
            ..*self
        }
    }
}

impl RigidBodyComponent {
    /// Body of the given type
    pub fn new(body_type: BodyKind) -> Self {
        Self {
            body_type,
            ..Default::default()
        }
    }

    /// Dynamic body
    pub fn dynamic() -> Self {
        Self::new(BodyKind::Dynamic)
    }

    /// Static body
    pub fn fixed() -> Self {
        Self::new(BodyKind::Static)
    }

    /// Kinematic body
    pub fn kinematic() -> Self {
        Self::new(BodyKind::Kinematic)
    }

    /// Static trigger volume
    pub fn trigger() -> Self {
        Self {
            body_type: BodyKind::Static,
            layer: Some(ObjectLayer::Trigger),
            is_trigger: true,
            ..Default::default()
        }
    }

    /// Set the layer
    pub fn with_layer(mut self, layer: ObjectLayer) -> Self {
        self.layer = Some(layer);
        self
    }

    /// Set the mass
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = Some(mass);
        self
    }

    /// Set the gravity factor
    pub fn with_gravity_factor(mut self, factor: f32) -> Self {
        self.gravity_factor = factor;
        self
    }

    /// Layer the body is created on
    pub fn effective_layer(&self) -> ObjectLayer {
        self.layer.unwrap_or(match (self.is_trigger, self.body_type) {
            (true, _) => ObjectLayer::Trigger,
            (false, BodyKind::Static) => ObjectLayer::Static,
            (false, _) => ObjectLayer::Dynamic,
        })
    }

    /// Runtime body, if one has been created
    pub fn body_id(&self) -> Option<BodyId> {
        self.runtime_body
    }

    /// Whether a runtime body exists for this component
    pub fn runtime_body_created(&self) -> bool {
        self.runtime_body.is_some()
    }

    pub(crate) fn set_runtime_body(&mut self, id: BodyId) {
        self.runtime_body = Some(id);
    }

    pub(crate) fn take_runtime_body(&mut self) -> Option<BodyId> {
        self.runtime_body.take()
    }
}

/// Box collision volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxColliderComponent {
    /// Half extents
    pub half_extents: Vec3,
    /// Offset from the entity origin
    pub offset: Vec3,
}

impl Default for BoxColliderComponent {
    fn default() -> Self {
        Self {
            half_extents: Vec3::splat(0.5),
            offset: Vec3::ZERO,
        }
    }
}

impl BoxColliderComponent {
    /// Box with the given half extents
    pub fn new(half_extents: Vec3) -> Self {
        Self {
            half_extents,
            offset: Vec3::ZERO,
        }
    }
}

/// Sphere collision volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphereColliderComponent {
    /// Radius
    pub radius: f32,
    /// Offset from the entity origin
    pub offset: Vec3,
}

impl Default for SphereColliderComponent {
    fn default() -> Self {
        Self {
            radius: 0.5,
            offset: Vec3::ZERO,
        }
    }
}

impl SphereColliderComponent {
    /// Sphere with the given radius
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            offset: Vec3::ZERO,
        }
    }
}

/// Capsule collision volume, aligned with the local Y axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapsuleColliderComponent {
    /// Radius
    pub radius: f32,
    /// Half height of the cylindrical part
    pub half_height: f32,
    /// Offset from the entity origin
    pub offset: Vec3,
}

impl Default for CapsuleColliderComponent {
    fn default() -> Self {
        Self {
            radius: 0.5,
            half_height: 0.5,
            offset: Vec3::ZERO,
        }
    }
}

impl CapsuleColliderComponent {
    /// Capsule with the given radius and half height
    pub fn new(radius: f32, half_height: f32) -> Self {
        Self {
            radius,
            half_height,
            offset: Vec3::ZERO,
        }
    }
}

/// Collider lookup order: box, sphere, capsule
pub(crate) fn collider_shape(world: &hecs::World, entity: Entity) -> Option<(ShapeDesc, ShapeOffset)> {
    if let Ok(collider) = world.get::<&BoxColliderComponent>(entity) {
        return Some((
            ShapeDesc::Box {
                half_extents: collider.half_extents,
            },
            ShapeOffset::translation(collider.offset),
        ));
    }
    if let Ok(collider) = world.get::<&SphereColliderComponent>(entity) {
        return Some((
            ShapeDesc::sphere(collider.radius),
            ShapeOffset::translation(collider.offset),
        ));
    }
    if let Ok(collider) = world.get::<&CapsuleColliderComponent>(entity) {
        return Some((
            ShapeDesc::capsule(collider.radius, collider.half_height),
            ShapeOffset::translation(collider.offset),
        ));
    }
    None
}

/// Virtual character driven by gameplay code through `desired_velocity`.
///
/// Like [`RigidBodyComponent`], a clone never shares the runtime character.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterControllerComponent {
    /// Capsule radius
    pub radius: f32,
    /// Half height of the capsule's cylindrical part
    pub half_height: f32,
    /// Mass used when pushing bodies
    pub mass: f32,
    /// Steepest walkable slope, in radians
    pub max_slope_angle: f32,
    /// Upper bound on the push force
    pub max_push_strength: f32,
    /// Layer
    pub layer: ObjectLayer,
    /// Velocity requested for the next fixed update
    pub desired_velocity: Vec3,

    #[serde(skip)]
    runtime_character: Option<CharacterId>,
}

impl Default for CharacterControllerComponent {
    fn default() -> Self {
        Self {
            radius: 0.3,
            half_height: 0.6,
            mass: 70.0,
            max_slope_angle: 50.0_f32.to_radians(),
            max_push_strength: 100.0,
            layer: ObjectLayer::Character,
            desired_velocity: Vec3::ZERO,
            runtime_character: None,
        }
    }
}

impl Clone for CharacterControllerComponent {
    fn clone(&self) -> Self {
        Self {
            runtime_character: None,
            ..*self
        }
    }
}

impl CharacterControllerComponent {
    /// Capsule character
    pub fn new(radius: f32, half_height: f32) -> Self {
        Self {
            radius,
            half_height,
            ..Default::default()
        }
    }

    /// Runtime character, if one has been created
    pub fn character_id(&self) -> Option<CharacterId> {
        self.runtime_character
    }

    /// Whether a runtime character exists for this component
    pub fn runtime_character_created(&self) -> bool {
        self.runtime_character.is_some()
    }

    pub(crate) fn set_runtime_character(&mut self, id: CharacterId) {
        self.runtime_character = Some(id);
    }

    pub(crate) fn take_runtime_character(&mut self) -> Option<CharacterId> {
        self.runtime_character.take()
    }
}
