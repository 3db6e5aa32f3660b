//! Entity-physics bridge
//!
//! Creates runtime bodies and characters for physics components, copies
//! poses between the physics world and entity transforms, and tears the
//! runtime state down again when a scene stops playing.
//!
//! Bodies are owned by [`PhysicsWorld`]; components only keep the ids. A
//! component's id is set and cleared together with the matching physics
//! call, so a component that reports a runtime body always refers to a
//! live one.

use crate::components::{
    collider_shape, CharacterControllerComponent, RelationshipComponent, RigidBodyComponent,
    TransformComponent,
};
use crate::hierarchy::HierarchyCommands;
use hecs::Entity;
use void_physics::{
    BodyDescriptor, BodyKind, CharacterDescriptor, PhysicsWorld, ShapeDesc, ShapeOffset,
};

/// Owner value stored on bodies and characters created for an entity
pub fn entity_owner(entity: Entity) -> u64 {
    entity.to_bits().get()
}

/// Entity an owner value refers to. The entity may have been despawned
/// since.
pub fn owner_entity(owner: u64) -> Option<Entity> {
    Entity::from_bits(owner)
}

/// Stateless passes between a `hecs::World` and a [`PhysicsWorld`]
pub struct PhysicsBridge;

impl PhysicsBridge {
    /// Build the descriptor for an entity's body from its current transform
    /// and collider. Entities without a collider get a small default box.
    pub fn body_descriptor(
        world: &hecs::World,
        physics: &PhysicsWorld,
        entity: Entity,
        transform: &TransformComponent,
        rigid_body: &RigidBodyComponent,
    ) -> BodyDescriptor {
        let (shape, offset) = collider_shape(world, entity).unwrap_or_else(|| {
            log::warn!(
                "{:?} has a RigidBodyComponent but no collider, using a default box",
                entity
            );
            (ShapeDesc::fallback_box(), ShapeOffset::ZERO)
        });

        let mut desc = BodyDescriptor::dynamic(shape)
            .with_offset(offset)
            .with_position(transform.translation)
            .with_rotation(transform.rotation)
            .with_layer(rigid_body.effective_layer())
            .with_motion_quality(rigid_body.motion_quality)
            .with_material(rigid_body.material.unwrap_or_else(|| physics.default_material()))
            .with_gravity_factor(rigid_body.gravity_factor)
            .with_rotation_locks(rigid_body.lock_rotation)
            .with_trigger(rigid_body.is_trigger)
            .with_owner(entity_owner(entity));
        desc.kind = rigid_body.body_type;
        desc.mass = rigid_body.mass;
        desc.linear_damping = rigid_body.linear_damping;
        desc.angular_damping = rigid_body.angular_damping;
        desc
    }

    /// Build the descriptor for an entity's character
    pub fn character_descriptor(
        entity: Entity,
        transform: &TransformComponent,
        controller: &CharacterControllerComponent,
    ) -> CharacterDescriptor {
        let mut desc =
            CharacterDescriptor::new(transform.translation, controller.radius, controller.half_height)
                .with_owner(entity_owner(entity))
                .with_mass(controller.mass)
                .with_max_slope_angle(controller.max_slope_angle)
                .with_max_push_strength(controller.max_push_strength);
        desc.rotation = transform.rotation;
        desc.layer = controller.layer;
        desc
    }

    /// Detach every entity carrying a physics component from its parent,
    /// keeping its world transform. Returns the number detached.
    pub fn force_detach_physics_children(world: &mut hecs::World) -> usize {
        let children: Vec<Entity> = world
            .query::<&RelationshipComponent>()
            .iter()
            .filter(|(_, relationship)| relationship.parent.is_some())
            .map(|(entity, _)| entity)
            .filter(|&entity| {
                world.get::<&RigidBodyComponent>(entity).is_ok()
                    || world.get::<&CharacterControllerComponent>(entity).is_ok()
            })
            .collect();

        let mut commands = HierarchyCommands::new(world);
        for &entity in &children {
            log::warn!(
                "{:?} has a physics component but is parented to {:?}, detaching it",
                entity,
                commands.parent(entity)
            );
            commands.detach_entity_keep_world(entity);
        }
        children.len()
    }

    /// Create a body for every rigid body component that has none yet.
    /// Returns the number created.
    pub fn create_missing_bodies(world: &mut hecs::World, physics: &mut PhysicsWorld) -> usize {
        let pending: Vec<(Entity, BodyDescriptor)> = world
            .query::<(&TransformComponent, &RigidBodyComponent)>()
            .iter()
            .filter(|(_, (_, rigid_body))| !rigid_body.runtime_body_created())
            .map(|(entity, (transform, rigid_body))| {
                let desc = Self::body_descriptor(world, physics, entity, transform, rigid_body);
                (entity, desc)
            })
            .collect();

        let created = pending.len();
        for (entity, desc) in pending {
            let kind = desc.kind;
            let id = physics.create_body(desc);
            if let Ok(mut rigid_body) = world.get::<&mut RigidBodyComponent>(entity) {
                rigid_body.set_runtime_body(id);
            }
            log::debug!("Created {:?} {:?} for {:?}", kind, id, entity);
        }
        created
    }

    /// Create a character for every controller component that has none yet.
    /// Returns the number created.
    pub fn create_missing_characters(world: &mut hecs::World, physics: &mut PhysicsWorld) -> usize {
        let mut created = 0;
        for (entity, (transform, controller)) in
            world.query_mut::<(&TransformComponent, &mut CharacterControllerComponent)>()
        {
            if controller.runtime_character_created() {
                continue;
            }
            let id = physics.create_character(Self::character_descriptor(entity, transform, controller));
            controller.set_runtime_character(id);
            created += 1;
        }
        created
    }

    /// Move every character by its desired velocity and write the resolved
    /// position back to its transform
    pub fn update_characters(world: &mut hecs::World, physics: &mut PhysicsWorld, dt: f32) {
        for (_, (transform, controller)) in
            world.query_mut::<(&mut TransformComponent, &CharacterControllerComponent)>()
        {
            let Some(id) = controller.character_id() else {
                continue;
            };
            physics.update_character(id, dt, controller.desired_velocity);
            transform.translation = physics.character_position(id);
        }
    }

    /// Copy poses of awake dynamic bodies into their transforms.
    ///
    /// Static and kinematic bodies are driven by their transforms and are
    /// never written here. Sleeping bodies are skipped so resting objects
    /// keep their transform untouched.
    pub fn pull_dynamic_transforms(world: &mut hecs::World, physics: &PhysicsWorld) -> usize {
        let mut pulled = 0;
        for (_, (transform, rigid_body)) in
            world.query_mut::<(&mut TransformComponent, &RigidBodyComponent)>()
        {
            if rigid_body.body_type != BodyKind::Dynamic {
                continue;
            }
            let Some(id) = rigid_body.body_id() else {
                continue;
            };
            if !physics.is_active(id) {
                continue;
            }
            transform.translation = physics.position(id);
            transform.rotation = physics.rotation(id);
            pulled += 1;
        }
        pulled
    }

    /// Move every kinematic body to its entity's transform over the next
    /// step
    pub fn push_kinematic_transforms(world: &mut hecs::World, physics: &mut PhysicsWorld) -> usize {
        let mut pushed = 0;
        for (_, (transform, rigid_body)) in
            world.query_mut::<(&TransformComponent, &RigidBodyComponent)>()
        {
            if rigid_body.body_type != BodyKind::Kinematic {
                continue;
            }
            if let Some(id) = rigid_body.body_id() {
                physics.move_kinematic(id, transform.translation, transform.rotation);
                pushed += 1;
            }
        }
        pushed
    }

    /// Destroy every runtime body and character and clear the ids on their
    /// components. Returns the number of bodies destroyed.
    pub fn destroy_all(world: &mut hecs::World, physics: &mut PhysicsWorld) -> usize {
        let mut destroyed = 0;
        for (_, rigid_body) in world.query_mut::<&mut RigidBodyComponent>() {
            if let Some(id) = rigid_body.take_runtime_body() {
                physics.destroy_body(id);
                destroyed += 1;
            }
        }
        for (_, controller) in world.query_mut::<&mut CharacterControllerComponent>() {
            if let Some(id) = controller.take_runtime_character() {
                physics.destroy_character(id);
            }
        }
        destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{BoxColliderComponent, SphereColliderComponent};
    use glam::Vec3;
    use void_physics::{ObjectLayer, PhysicsConfig};

    fn physics() -> PhysicsWorld {
        PhysicsWorld::new(PhysicsConfig::default().with_worker_threads(1)).unwrap()
    }

    #[test]
    fn test_owner_roundtrip() {
        let mut world = hecs::World::new();
        let entity = world.spawn(());
        assert_eq!(owner_entity(entity_owner(entity)), Some(entity));
    }

    #[test]
    fn test_descriptor_from_components() {
        let mut world = hecs::World::new();
        let physics = physics();
        let transform = TransformComponent::from_translation(Vec3::new(0.0, 3.0, 0.0));
        let rigid_body = RigidBodyComponent::fixed();
        let entity = world.spawn((transform, rigid_body.clone(), SphereColliderComponent::new(2.0)));

        let desc = PhysicsBridge::body_descriptor(&world, &physics, entity, &transform, &rigid_body);
        assert_eq!(desc.kind, BodyKind::Static);
        assert_eq!(desc.layer, ObjectLayer::Static);
        assert_eq!(desc.position, Vec3::new(0.0, 3.0, 0.0));
        assert_eq!(desc.shape, ShapeDesc::sphere(2.0));
        assert_eq!(desc.owner, Some(entity_owner(entity)));
    }

    #[test]
    fn test_missing_collider_uses_default_box() {
        let mut world = hecs::World::new();
        let physics = physics();
        let transform = TransformComponent::IDENTITY;
        let rigid_body = RigidBodyComponent::dynamic();
        let entity = world.spawn((transform, rigid_body.clone()));

        let desc = PhysicsBridge::body_descriptor(&world, &physics, entity, &transform, &rigid_body);
        assert_eq!(desc.shape, ShapeDesc::fallback_box());
    }

    #[test]
    fn test_create_missing_bodies_once() {
        let mut world = hecs::World::new();
        let mut physics = physics();
        let entity = world.spawn((
            TransformComponent::IDENTITY,
            RigidBodyComponent::dynamic(),
            BoxColliderComponent::default(),
        ));

        assert_eq!(PhysicsBridge::create_missing_bodies(&mut world, &mut physics), 1);
        assert_eq!(PhysicsBridge::create_missing_bodies(&mut world, &mut physics), 0);

        let id = world.get::<&RigidBodyComponent>(entity).unwrap().body_id().unwrap();
        assert!(physics.is_valid_body(id));
        assert_eq!(physics.body_count(), 1);
    }

    #[test]
    fn test_destroy_all_clears_ids() {
        let mut world = hecs::World::new();
        let mut physics = physics();
        let body = world.spawn((TransformComponent::IDENTITY, RigidBodyComponent::fixed()));
        let character = world.spawn((
            TransformComponent::from_translation(Vec3::Y * 5.0),
            CharacterControllerComponent::default(),
        ));
        PhysicsBridge::create_missing_bodies(&mut world, &mut physics);
        PhysicsBridge::create_missing_characters(&mut world, &mut physics);
        let id = world.get::<&RigidBodyComponent>(body).unwrap().body_id().unwrap();

        assert_eq!(PhysicsBridge::destroy_all(&mut world, &mut physics), 1);
        assert!(!physics.is_valid_body(id));
        assert_eq!(physics.character_count(), 0);
        assert!(!world.get::<&RigidBodyComponent>(body).unwrap().runtime_body_created());
        assert!(!world
            .get::<&CharacterControllerComponent>(character)
            .unwrap()
            .runtime_character_created());
    }
}
