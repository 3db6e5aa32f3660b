//! Virtual character controllers
//!
//! A character is a capsule that is moved by sweeping it through the world
//! rather than by the rigid-body solver. It has no body of its own: other
//! bodies do not see it, but it pushes dynamic bodies out of its way and
//! reports every new body it touches.

use crate::convert;
use crate::layers::ObjectLayer;
use glam::{Quat, Vec3};
use rapier3d::control::{CharacterAutostep, CharacterLength, KinematicCharacterController};
use rapier3d::parry::query as parry_query;
use rapier3d::prelude as rapier;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Opaque handle to a character in one [`PhysicsWorld`](crate::PhysicsWorld).
///
/// Same contract as [`BodyId`](crate::BodyId): never reused, meaningless
/// after destruction, accessors return zeroed values for stale ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct CharacterId(u32);

impl CharacterId {
    /// Id that never refers to a character
    pub const INVALID: Self = Self(0);

    /// Raw integer value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Build from a raw integer
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CharacterId({})", self.0)
    }
}

/// Where a character stands after its last update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroundState {
    /// Standing on walkable ground
    OnGround,
    /// Touching ground too steep to stand on
    Sliding,
    /// Not supported
    #[default]
    InAir,
}

/// Everything needed to create a character
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterDescriptor {
    /// World position of the capsule center
    pub position: Vec3,
    /// World rotation
    pub rotation: Quat,
    /// Capsule radius
    pub radius: f32,
    /// Half height of the capsule's cylindrical part
    pub half_height: f32,
    /// Mass used when pushing bodies
    pub mass: f32,
    /// Steepest walkable slope, in radians
    pub max_slope_angle: f32,
    /// Upper bound on the force the character applies to bodies it walks into
    pub max_push_strength: f32,
    /// Distance within which ground is still snapped to
    pub predictive_contact_distance: f32,
    /// Fraction of penetration resolved per update (0..=1)
    pub penetration_recovery_speed: f32,
    /// Collision layer
    pub layer: ObjectLayer,
    /// Opaque bits identifying the owner (an ECS entity)
    pub owner: Option<u64>,
    /// Up axis
    pub up: Vec3,
    /// Highest step climbed without jumping; `None` uses the world default
    pub stair_step_height: Option<f32>,
}

impl Default for CharacterDescriptor {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            radius: 0.3,
            half_height: 0.6,
            mass: 70.0,
            max_slope_angle: 50.0_f32.to_radians(),
            max_push_strength: 100.0,
            predictive_contact_distance: 0.1,
            penetration_recovery_speed: 1.0,
            layer: ObjectLayer::Character,
            owner: None,
            up: Vec3::Y,
            stair_step_height: None,
        }
    }
}

impl CharacterDescriptor {
    /// Capsule character at a position
    pub fn new(position: Vec3, radius: f32, half_height: f32) -> Self {
        Self {
            position,
            radius,
            half_height,
            ..Default::default()
        }
    }

    /// Set the owner bits
    pub fn with_owner(mut self, owner: u64) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Set the steepest walkable slope, in radians
    pub fn with_max_slope_angle(mut self, angle: f32) -> Self {
        self.max_slope_angle = angle;
        self
    }

    /// Set the mass
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    /// Set the maximum push force
    pub fn with_max_push_strength(mut self, strength: f32) -> Self {
        self.max_push_strength = strength;
        self
    }

    /// Set the stair step height
    pub fn with_stair_step_height(mut self, height: f32) -> Self {
        self.stair_step_height = Some(height);
        self
    }
}

/// Tuning shared by every character of a world
#[derive(Debug, Clone, Copy)]
pub(crate) struct CharacterSettings {
    pub(crate) gravity: Vec3,
    pub(crate) padding: f32,
    pub(crate) stair_height: f32,
    pub(crate) stair_min_width: f32,
}

/// Impulse a character applies to a dynamic body
#[derive(Debug, Clone, Copy)]
pub(crate) struct BodyPush {
    pub(crate) body: rapier::RigidBodyHandle,
    pub(crate) impulse: Vec3,
    pub(crate) point: Vec3,
}

/// A collider the character started touching during an update
#[derive(Debug, Clone, Copy)]
pub(crate) struct NewContact {
    pub(crate) collider: rapier::ColliderHandle,
    pub(crate) point: Vec3,
    pub(crate) normal: Vec3,
}

/// Side effects of one character update, applied by the world
#[derive(Debug, Default)]
pub(crate) struct MovementOutcome {
    pub(crate) pushes: Vec<BodyPush>,
    pub(crate) new_contacts: Vec<NewContact>,
}

/// Live character state
pub(crate) struct Character {
    pub(crate) shape: rapier::SharedShape,
    pub(crate) position: Vec3,
    pub(crate) rotation: Quat,
    pub(crate) velocity: Vec3,
    pub(crate) ground: GroundState,
    pub(crate) mass: f32,
    pub(crate) max_slope_angle: f32,
    pub(crate) max_push_strength: f32,
    pub(crate) predictive_contact_distance: f32,
    pub(crate) penetration_recovery_speed: f32,
    pub(crate) layer: ObjectLayer,
    pub(crate) owner: Option<u64>,
    pub(crate) up: Vec3,
    pub(crate) stair_step_height: Option<f32>,
    touching: HashSet<rapier::ColliderHandle>,
}

impl Character {
    pub(crate) fn new(desc: &CharacterDescriptor) -> Self {
        let radius = sanitize(desc.radius, 0.3);
        let half_height = sanitize(desc.half_height, 0.0);
        Self {
            shape: rapier::SharedShape::capsule_y(half_height, radius),
            position: desc.position,
            rotation: desc.rotation.normalize(),
            velocity: Vec3::ZERO,
            ground: GroundState::InAir,
            mass: desc.mass.max(0.0),
            max_slope_angle: desc.max_slope_angle,
            max_push_strength: desc.max_push_strength.max(0.0),
            predictive_contact_distance: desc.predictive_contact_distance.max(0.0),
            penetration_recovery_speed: desc.penetration_recovery_speed.clamp(0.0, 1.0),
            layer: desc.layer,
            owner: desc.owner,
            up: desc.up.try_normalize().unwrap_or(Vec3::Y),
            stair_step_height: desc.stair_step_height,
            touching: HashSet::new(),
        }
    }

    fn pose(&self) -> rapier::Isometry<f32> {
        convert::to_isometry(self.position, self.rotation)
    }

    fn controller(&self, settings: &CharacterSettings) -> KinematicCharacterController {
        let stair = self.stair_step_height.unwrap_or(settings.stair_height);
        KinematicCharacterController {
            up: rapier::UnitVector::new_normalize(convert::to_vector(self.up)),
            offset: CharacterLength::Absolute(settings.padding),
            slide: true,
            autostep: (stair > 0.0).then_some(CharacterAutostep {
                max_height: CharacterLength::Absolute(stair),
                min_width: CharacterLength::Absolute(settings.stair_min_width),
                include_dynamic_bodies: false,
            }),
            max_slope_climb_angle: self.max_slope_angle,
            min_slope_slide_angle: self.max_slope_angle,
            snap_to_ground: (self.predictive_contact_distance > 0.0)
                .then_some(CharacterLength::Absolute(self.predictive_contact_distance)),
            ..Default::default()
        }
    }

    /// Velocity for this update: desired horizontal motion, vertical motion
    /// from jumping or falling, plus gravity.
    fn integrate_velocity(&self, dt: f32, desired: Vec3, gravity: Vec3) -> Vec3 {
        let up = self.up;
        let desired_vertical = desired.dot(up);
        let horizontal = desired - up * desired_vertical;
        let vertical = match self.ground {
            GroundState::OnGround => desired_vertical.max(0.0),
            GroundState::Sliding | GroundState::InAir => {
                self.velocity.dot(up) + desired_vertical.max(0.0)
            }
        };
        horizontal + up * vertical + gravity * dt
    }

    /// Sweep the character through the world.
    ///
    /// Only reads the simulation; pushes and new contacts are returned so
    /// the world can apply them once the query structure is released.
    pub(crate) fn resolve_movement(
        &mut self,
        dt: f32,
        desired_velocity: Vec3,
        settings: &CharacterSettings,
        bodies: &rapier::RigidBodySet,
        colliders: &rapier::ColliderSet,
        queries: &rapier::QueryPipeline,
    ) -> MovementOutcome {
        let mut outcome = MovementOutcome::default();
        if dt <= 0.0 || !dt.is_finite() {
            return outcome;
        }

        let velocity = self.integrate_velocity(dt, desired_velocity, settings.gravity);
        let controller = self.controller(settings);
        let solid = rapier::QueryFilter::new()
            .groups(self.layer.interaction_groups())
            .exclude_sensors();

        let start = self.pose();
        let mut hits = Vec::new();
        let movement = controller.move_shape(
            dt,
            bodies,
            colliders,
            queries,
            &*self.shape,
            &start,
            convert::to_vector(velocity * dt),
            solid,
            |collision| hits.push(collision),
        );

        let translation = convert::from_vector(&movement.translation);
        self.position += translation;

        let mut ground_normal: Option<Vec3> = None;
        let mut touched = HashSet::new();
        for hit in &hits {
            if !touched.insert(hit.handle) {
                continue;
            }
            let Some(collider) = colliders.get(hit.handle) else {
                continue;
            };
            let Some((point, normal)) =
                self.contact_with(&hit.character_pos, collider, settings.padding * 2.0 + 1.0e-3)
            else {
                continue;
            };
            // Walls and ceilings never count as ground
            let facing_up = normal.dot(self.up);
            if facing_up > 1.0e-3 && ground_normal.map_or(true, |best| facing_up > best.dot(self.up)) {
                ground_normal = Some(normal);
            }
            if let Some(push) = self.push_for(dt, velocity, -normal, point, collider, bodies) {
                outcome.pushes.push(push);
            }
            if !self.touching.contains(&hit.handle) {
                outcome.new_contacts.push(NewContact {
                    collider: hit.handle,
                    point,
                    normal,
                });
            }
        }

        self.ground = self.classify_ground(movement.grounded, ground_normal);
        self.velocity = translation / dt;
        if self.ground == GroundState::OnGround && self.velocity.dot(self.up) < 0.0 {
            self.velocity -= self.up * self.velocity.dot(self.up);
        }

        self.recover_from_penetration(colliders, bodies, queries, solid);

        // Overlaps at the resting pose, triggers included
        let pose = self.pose();
        let overlapping = rapier::QueryFilter::new().groups(self.layer.interaction_groups());
        let mut overlaps = Vec::new();
        queries.intersections_with_shape(
            bodies,
            colliders,
            &pose,
            &*self.shape,
            overlapping,
            |handle| {
                overlaps.push(handle);
                true
            },
        );
        for handle in overlaps {
            if !touched.insert(handle) || self.touching.contains(&handle) {
                continue;
            }
            let Some(collider) = colliders.get(handle) else {
                continue;
            };
            let (point, normal) = self
                .contact_with(&pose, collider, 0.0)
                .unwrap_or((convert::from_vector(&collider.position().translation.vector), self.up));
            outcome.new_contacts.push(NewContact {
                collider: handle,
                point,
                normal,
            });
        }

        self.touching = touched;
        outcome
    }

    /// Ground state after a move. Standing on a surface steeper than the
    /// slope limit counts as sliding.
    fn classify_ground(&self, grounded: bool, ground_normal: Option<Vec3>) -> GroundState {
        if !grounded {
            return GroundState::InAir;
        }
        match ground_normal {
            Some(normal) if normal.dot(self.up) < self.max_slope_angle.cos() - 1.0e-3 => {
                GroundState::Sliding
            }
            _ => GroundState::OnGround,
        }
    }

    /// Closest contact between the capsule at `pose` and a collider: the
    /// point on the collider and the normal pointing back at the character
    fn contact_with(
        &self,
        pose: &rapier::Isometry<f32>,
        collider: &rapier::Collider,
        prediction: f32,
    ) -> Option<(Vec3, Vec3)> {
        let contact = parry_query::contact(
            pose,
            &*self.shape,
            collider.position(),
            collider.shape(),
            prediction,
        )
        .ok()
        .flatten()?;
        Some((
            convert::from_point(&contact.point2),
            -convert::from_vector(&contact.normal1),
        ))
    }

    /// Impulse on a dynamic body the character walks into, capped by the
    /// maximum push strength over this update
    fn push_for(
        &self,
        dt: f32,
        velocity: Vec3,
        direction: Vec3,
        point: Vec3,
        collider: &rapier::Collider,
        bodies: &rapier::RigidBodySet,
    ) -> Option<BodyPush> {
        let handle = collider.parent()?;
        let body = bodies.get(handle)?;
        if !body.is_dynamic() || self.mass <= 0.0 {
            return None;
        }

        // Push sideways only so standing on a body does not press it down
        let direction = (direction - self.up * direction.dot(self.up)).try_normalize()?;
        let relative = velocity.dot(direction) - convert::from_vector(body.linvel()).dot(direction);
        if relative <= 0.0 {
            return None;
        }

        let magnitude = (self.mass * relative).min(self.max_push_strength * dt);
        Some(BodyPush {
            body: handle,
            impulse: direction * magnitude,
            point,
        })
    }

    /// Move out of anything the capsule still overlaps, scaled by the
    /// recovery speed
    fn recover_from_penetration(
        &mut self,
        colliders: &rapier::ColliderSet,
        bodies: &rapier::RigidBodySet,
        queries: &rapier::QueryPipeline,
        filter: rapier::QueryFilter,
    ) {
        if self.penetration_recovery_speed <= 0.0 {
            return;
        }

        let pose = self.pose();
        let mut overlapping = Vec::new();
        queries.intersections_with_shape(bodies, colliders, &pose, &*self.shape, filter, |handle| {
            overlapping.push(handle);
            true
        });

        let mut correction = Vec3::ZERO;
        for handle in overlapping {
            let Some(collider) = colliders.get(handle) else {
                continue;
            };
            let contact = parry_query::contact(
                &pose,
                &*self.shape,
                collider.position(),
                collider.shape(),
                0.0,
            );
            if let Ok(Some(contact)) = contact {
                if contact.dist < 0.0 {
                    correction += convert::from_vector(&contact.normal1) * contact.dist;
                }
            }
        }

        if correction != Vec3::ZERO {
            log::trace!("Character penetration recovery {:?}", correction);
            self.position += correction * self.penetration_recovery_speed;
        }
    }

    /// Forget contacts so the next touch reports again
    pub(crate) fn reset_contacts(&mut self) {
        self.touching.clear();
    }
}

fn sanitize(value: f32, fallback: f32) -> f32 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn settings() -> CharacterSettings {
        CharacterSettings {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            padding: 0.02,
            stair_height: 0.3,
            stair_min_width: 0.2,
        }
    }

    #[test]
    fn test_descriptor_sanitized() {
        let desc = CharacterDescriptor {
            radius: -1.0,
            half_height: f32::NAN,
            penetration_recovery_speed: 3.0,
            up: Vec3::ZERO,
            ..Default::default()
        };
        let character = Character::new(&desc);
        let capsule = character.shape.as_capsule().expect("character shape is a capsule");
        assert_relative_eq!(capsule.radius, 0.3);
        assert_relative_eq!(capsule.half_height(), 0.0);
        assert_relative_eq!(character.penetration_recovery_speed, 1.0);
        assert_eq!(character.up, Vec3::Y);
    }

    #[test]
    fn test_grounded_velocity_ignores_downward_input() {
        let mut character = Character::new(&CharacterDescriptor::default());
        character.ground = GroundState::OnGround;
        let v = character.integrate_velocity(0.1, Vec3::new(2.0, -5.0, 0.0), Vec3::ZERO);
        assert_relative_eq!(v.x, 2.0);
        assert_relative_eq!(v.y, 0.0);
    }

    #[test]
    fn test_airborne_velocity_accumulates_gravity() {
        let mut character = Character::new(&CharacterDescriptor::default());
        character.velocity = Vec3::new(0.0, -1.0, 0.0);
        let v = character.integrate_velocity(0.5, Vec3::ZERO, settings().gravity);
        assert_relative_eq!(v.y, -1.0 - 9.81 * 0.5, epsilon = 1.0e-5);
    }

    #[test]
    fn test_ground_state_from_contact_normal() {
        let character =
            Character::new(&CharacterDescriptor::default().with_max_slope_angle(45f32.to_radians()));

        assert_eq!(character.classify_ground(false, Some(Vec3::Y)), GroundState::InAir);
        assert_eq!(character.classify_ground(true, Some(Vec3::Y)), GroundState::OnGround);
        assert_eq!(character.classify_ground(true, None), GroundState::OnGround);

        let gentle = Vec3::new(30f32.to_radians().sin(), 30f32.to_radians().cos(), 0.0);
        assert_eq!(character.classify_ground(true, Some(gentle)), GroundState::OnGround);

        let steep = Vec3::new(60f32.to_radians().sin(), 60f32.to_radians().cos(), 0.0);
        assert_eq!(character.classify_ground(true, Some(steep)), GroundState::Sliding);
    }

    #[test]
    fn test_controller_uses_world_stair_default() {
        let character = Character::new(&CharacterDescriptor::default());
        let controller = character.controller(&settings());
        assert!(controller.autostep.is_some());

        let flat = Character::new(&CharacterDescriptor::default().with_stair_step_height(0.0));
        assert!(flat.controller(&settings()).autostep.is_none());
    }
}
