//! Scene: an entity world paired with its own physics world
//!
//! A scene starts in [`SceneState::Edit`], where nothing is simulated and only
//! world transforms are kept up to date. [`Scene::on_runtime_start`] switches
//! to [`SceneState::Play`] and builds the runtime bodies;
//! [`Scene::on_runtime_stop`] destroys them again.
//!
//! Each fixed update in Play runs, in order:
//!
//! 1. character movement
//! 2. [`PhysicsWorld::step`]
//! 3. body creation for rigid bodies added since the last update
//! 4. dynamic body poses copied into their transforms
//! 5. world transform propagation
//!
//! Collision events of the last step are available until the next one.

use crate::bridge::{owner_entity, PhysicsBridge};
use crate::components::{CharacterControllerComponent, RigidBodyComponent};
use crate::config::SceneConfig;
use crate::error::{HierarchyError, Result, SceneError};
use crate::hierarchy::HierarchyCommands;
use crate::hooks::DestroyHooks;
use crate::propagation::TransformPropagationSystem;
use crate::time::FixedTimestep;
use glam::Vec3;
use hecs::Entity;
use serde::{Deserialize, Serialize};
use void_physics::{BodyId, CharacterId, CollisionEvent, CollisionEventKind, PhysicsWorld};

/// Whether a scene is being edited or simulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SceneState {
    /// Authoring; no runtime bodies exist
    #[default]
    Edit,
    /// Simulating
    Play,
}

/// Collision event with owners resolved to entities
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityCollision {
    /// Event phase
    pub kind: CollisionEventKind,
    /// First body
    pub body_a: BodyId,
    /// Second body
    pub body_b: BodyId,
    /// Entity owning the first body. Always `None` for exit events.
    pub entity_a: Option<Entity>,
    /// Entity owning the second body. Always `None` for exit events.
    pub entity_b: Option<Entity>,
    /// Contact point in world space
    pub point: Vec3,
    /// Contact normal pointing from `body_a` to `body_b`
    pub normal: Vec3,
    /// Penetration depth
    pub penetration_depth: f32,
    /// Whether either side is a trigger
    pub is_trigger: bool,
}

impl EntityCollision {
    /// Whether `entity` is one of the two sides
    pub fn involves(&self, entity: Entity) -> bool {
        self.entity_a == Some(entity) || self.entity_b == Some(entity)
    }
}

/// Character contact with owners resolved to entities
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityCharacterCollision {
    /// The character
    pub character: CharacterId,
    /// Entity owning the character
    pub character_entity: Option<Entity>,
    /// Body that was hit
    pub body: BodyId,
    /// Entity owning the body
    pub other_entity: Option<Entity>,
    /// Contact point in world space
    pub point: Vec3,
    /// Contact normal pointing towards the character
    pub normal: Vec3,
}

/// Entity world plus the physics world simulating it
pub struct Scene {
    world: hecs::World,
    physics: PhysicsWorld,
    hooks: DestroyHooks<PhysicsWorld>,
    clock: FixedTimestep,
    state: SceneState,
    config: SceneConfig,
}

impl Scene {
    /// Create an empty scene in edit state.
    ///
    /// Fails if the configuration is invalid or the physics world cannot
    /// start; nothing in the scene can run without it.
    pub fn new(config: SceneConfig) -> Result<Self> {
        config.validate()?;
        let physics = PhysicsWorld::new(config.physics.clone()).map_err(|e| {
            log::error!("Scene creation failed: {}", e);
            SceneError::from(e)
        })?;

        let mut hooks = DestroyHooks::new();
        hooks.on_destroy::<RigidBodyComponent, _>(|physics: &mut PhysicsWorld, entity, rigid_body| {
            if let Some(id) = rigid_body.body_id() {
                log::debug!("Destroying {:?} with its RigidBodyComponent on {:?}", id, entity);
                physics.destroy_body(id);
            }
        });
        hooks.on_destroy::<CharacterControllerComponent, _>(
            |physics: &mut PhysicsWorld, entity, controller| {
                if let Some(id) = controller.character_id() {
                    log::debug!("Destroying {:?} with its controller on {:?}", id, entity);
                    physics.destroy_character(id);
                }
            },
        );

        let clock = FixedTimestep::new(config.fixed_timestep, config.max_fixed_steps_per_frame);
        Ok(Self {
            world: hecs::World::new(),
            physics,
            hooks,
            clock,
            state: SceneState::Edit,
            config,
        })
    }

    // ==================== Accessors ====================

    /// Entity world
    pub fn world(&self) -> &hecs::World {
        &self.world
    }

    /// Mutable entity world.
    ///
    /// Despawning entities or removing physics components through it skips
    /// the destroy hooks; use [`destroy_entity`](Self::destroy_entity) and
    /// [`remove_rigid_body`](Self::remove_rigid_body) instead.
    pub fn world_mut(&mut self) -> &mut hecs::World {
        &mut self.world
    }

    /// Physics world
    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    /// Mutable physics world, for forces, impulses and velocities
    pub fn physics_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.physics
    }

    /// Scene configuration
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> SceneState {
        self.state
    }

    /// Whether the scene is simulating
    pub fn is_playing(&self) -> bool {
        self.state == SceneState::Play
    }

    /// Interpolation factor between the last two fixed updates
    pub fn interpolation_alpha(&self) -> f32 {
        self.clock.alpha()
    }

    /// Spawn an entity
    pub fn spawn(&mut self, components: impl hecs::DynamicBundle) -> Entity {
        self.world.spawn(components)
    }

    // ==================== Hierarchy ====================

    /// Hierarchy commands on the scene's world
    pub fn hierarchy(&mut self) -> HierarchyCommands<'_> {
        HierarchyCommands::new(&mut self.world)
    }

    /// Parent `child` to `parent`, keeping its local transform. Rejected
    /// for entities with a rigid body.
    pub fn attach_entity(
        &mut self,
        child: Entity,
        parent: Entity,
    ) -> std::result::Result<(), HierarchyError> {
        self.hierarchy().attach_entity(child, parent)
    }

    /// Parent `child` to `parent`, keeping its world transform. Rejected for
    /// entities with a rigid body.
    pub fn attach_entity_keep_world(
        &mut self,
        child: Entity,
        parent: Entity,
    ) -> std::result::Result<(), HierarchyError> {
        self.hierarchy().attach_entity_keep_world(child, parent)
    }

    /// Make an entity a root, keeping its local transform
    pub fn detach_entity(&mut self, entity: Entity) {
        self.hierarchy().detach_entity(entity);
    }

    /// Make an entity a root, keeping its world transform
    pub fn detach_entity_keep_world(&mut self, entity: Entity) {
        self.hierarchy().detach_entity_keep_world(entity);
    }

    // ==================== Lifecycle ====================

    /// Enter play mode.
    ///
    /// Physics entities that are hierarchy children are detached first,
    /// keeping their world pose, then every rigid body and character
    /// controller gets its runtime counterpart.
    pub fn on_runtime_start(&mut self) {
        if self.is_playing() {
            log::info!("Scene is already playing");
            return;
        }

        let detached = PhysicsBridge::force_detach_physics_children(&mut self.world);
        let bodies = PhysicsBridge::create_missing_bodies(&mut self.world, &mut self.physics);
        let characters = PhysicsBridge::create_missing_characters(&mut self.world, &mut self.physics);
        TransformPropagationSystem::run(&mut self.world);

        self.clock.reset();
        self.state = SceneState::Play;
        log::info!(
            "Scene playing: {} bodies, {} characters, {} entities detached",
            bodies,
            characters,
            detached
        );
    }

    /// Leave play mode, destroying every runtime body and character
    pub fn on_runtime_stop(&mut self) {
        if !self.is_playing() {
            log::info!("Scene is not playing");
            return;
        }

        let destroyed = PhysicsBridge::destroy_all(&mut self.world, &mut self.physics);
        self.physics.discard_pending_events();
        self.clock.reset();
        self.state = SceneState::Edit;
        log::info!("Scene stopped: {} bodies destroyed", destroyed);
    }

    // ==================== Updates ====================

    /// Run one fixed update of `dt` seconds.
    ///
    /// In edit state this only propagates world transforms.
    pub fn advance(&mut self, dt: f32) {
        if self.is_playing() {
            PhysicsBridge::update_characters(&mut self.world, &mut self.physics, dt);
            self.physics.step(dt);
            PhysicsBridge::create_missing_bodies(&mut self.world, &mut self.physics);
            PhysicsBridge::create_missing_characters(&mut self.world, &mut self.physics);
            PhysicsBridge::pull_dynamic_transforms(&mut self.world, &self.physics);
        }
        TransformPropagationSystem::run(&mut self.world);
    }

    /// Advance by a variable frame time, running as many fixed updates as
    /// fit. Returns the number run.
    pub fn update(&mut self, frame_time: f32) -> u32 {
        if !self.is_playing() {
            TransformPropagationSystem::run(&mut self.world);
            return 0;
        }

        let steps = self.clock.accumulate(frame_time);
        let dt = self.clock.step();
        for _ in 0..steps {
            self.advance(dt);
        }
        if steps == 0 {
            TransformPropagationSystem::run(&mut self.world);
        }
        steps
    }

    /// Move kinematic bodies to their entity transforms over the next step.
    ///
    /// Call after gameplay code has moved kinematic entities and before
    /// [`advance`](Self::advance).
    pub fn push_kinematic_transforms(&mut self) -> usize {
        PhysicsBridge::push_kinematic_transforms(&mut self.world, &mut self.physics)
    }

    // ==================== Events ====================

    /// Body collisions of the last step, with entities resolved
    pub fn collision_events(&self) -> Vec<EntityCollision> {
        let events = self.physics.collision_events();
        events
            .enter
            .iter()
            .chain(&events.stay)
            .chain(&events.exit)
            .map(|event| self.resolve_collision(event))
            .collect()
    }

    /// Character contacts of the last step, with entities resolved
    pub fn character_collisions(&self) -> Vec<EntityCharacterCollision> {
        self.physics
            .collision_events()
            .character
            .iter()
            .map(|contact| EntityCharacterCollision {
                character: contact.character,
                character_entity: self.resolve_owner(contact.character_owner),
                body: contact.body,
                other_entity: self.resolve_owner(contact.other_owner),
                point: contact.point,
                normal: contact.normal,
            })
            .collect()
    }

    fn resolve_collision(&self, event: &CollisionEvent) -> EntityCollision {
        let exit = event.is_exit();
        EntityCollision {
            kind: event.kind,
            body_a: event.body_a,
            body_b: event.body_b,
            entity_a: if exit { None } else { self.resolve_owner(event.owner_a) },
            entity_b: if exit { None } else { self.resolve_owner(event.owner_b) },
            point: event.point,
            normal: event.normal,
            penetration_depth: event.penetration_depth,
            is_trigger: event.is_trigger,
        }
    }

    fn resolve_owner(&self, owner: Option<u64>) -> Option<Entity> {
        owner
            .and_then(owner_entity)
            .filter(|&entity| self.world.contains(entity))
    }

    // ==================== Destruction ====================

    /// Despawn an entity, destroying its runtime body and character.
    ///
    /// Children become roots and keep their world transform.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<()> {
        if !self.world.contains(entity) {
            return Err(SceneError::NoSuchEntity(entity));
        }

        let mut hierarchy = HierarchyCommands::new(&mut self.world);
        for child in hierarchy.children(entity) {
            hierarchy.detach_entity_keep_world(child);
        }
        hierarchy.detach_entity(entity);

        self.hooks.run_for_entity(&mut self.physics, &self.world, entity);
        self.world
            .despawn(entity)
            .map_err(|_| SceneError::NoSuchEntity(entity))
    }

    /// Remove an entity's rigid body component, destroying its runtime
    /// body. Returns the removed component, without a runtime body.
    pub fn remove_rigid_body(&mut self, entity: Entity) -> Result<Option<RigidBodyComponent>> {
        self.remove_physics_component::<RigidBodyComponent>(entity)
            .map(|removed| {
                removed.map(|mut rigid_body| {
                    rigid_body.take_runtime_body();
                    rigid_body
                })
            })
    }

    /// Remove an entity's character controller, destroying its runtime
    /// character. Returns the removed component, without a runtime character.
    pub fn remove_character_controller(
        &mut self,
        entity: Entity,
    ) -> Result<Option<CharacterControllerComponent>> {
        self.remove_physics_component::<CharacterControllerComponent>(entity)
            .map(|removed| {
                removed.map(|mut controller| {
                    controller.take_runtime_character();
                    controller
                })
            })
    }

    fn remove_physics_component<T: hecs::Component>(&mut self, entity: Entity) -> Result<Option<T>> {
        if !self.world.contains(entity) {
            return Err(SceneError::NoSuchEntity(entity));
        }
        self.hooks
            .run_for_component::<T>(&mut self.physics, &self.world, entity);
        Ok(self.world.remove_one::<T>(entity).ok())
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("state", &self.state)
            .field("entities", &self.world.len())
            .field("bodies", &self.physics.body_count())
            .field("characters", &self.physics.character_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{BoxColliderComponent, TransformComponent};
    use void_physics::PhysicsConfig;

    fn scene() -> Scene {
        let config = SceneConfig::default()
            .with_physics(PhysicsConfig::default().with_worker_threads(1));
        Scene::new(config).unwrap()
    }

    #[test]
    fn test_starts_in_edit() {
        let scene = scene();
        assert_eq!(scene.state(), SceneState::Edit);
        assert!(!scene.is_playing());
    }

    #[test]
    fn test_invalid_config_fails() {
        let config = SceneConfig::default().with_fixed_timestep(0.0);
        assert!(matches!(Scene::new(config), Err(SceneError::InvalidConfig(_))));
    }

    #[test]
    fn test_edit_state_does_not_simulate() {
        let mut scene = scene();
        let entity = scene.spawn((
            TransformComponent::from_translation(Vec3::Y * 5.0),
            RigidBodyComponent::dynamic(),
            BoxColliderComponent::default(),
        ));

        scene.advance(1.0 / 60.0);
        assert_eq!(scene.physics().body_count(), 0);
        let transform = *scene.world().get::<&TransformComponent>(entity).unwrap();
        assert_eq!(transform.translation, Vec3::Y * 5.0);
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let mut scene = scene();
        scene.spawn((TransformComponent::IDENTITY, RigidBodyComponent::fixed()));

        scene.on_runtime_stop();
        assert_eq!(scene.state(), SceneState::Edit);

        scene.on_runtime_start();
        scene.on_runtime_start();
        assert_eq!(scene.physics().body_count(), 1);

        scene.on_runtime_stop();
        scene.on_runtime_stop();
        assert_eq!(scene.physics().body_count(), 0);
    }

    #[test]
    fn test_destroy_missing_entity() {
        let mut scene = scene();
        let entity = scene.spawn(());
        scene.destroy_entity(entity).unwrap();
        assert!(matches!(
            scene.destroy_entity(entity),
            Err(SceneError::NoSuchEntity(_))
        ));
    }
}
