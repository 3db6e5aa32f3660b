//! Physics world - sole owner of the simulation
//!
//! Bodies and characters are addressed through [`BodyId`] / [`CharacterId`]
//! keys into side tables; nothing outside this module ever holds a rapier
//! handle. Accessors fed a stale id return zeroed values and setters do
//! nothing.

use crate::body::{pack_user_data, unpack_user_data, BodyDescriptor, BodyId, BodyKind, BodyRecord, MotionQuality};
use crate::character::{Character, CharacterDescriptor, CharacterId, CharacterSettings, GroundState};
use crate::config::PhysicsConfig;
use crate::convert;
use crate::error::{PhysicsError, Result};
use crate::events::{
    deepest_contact, midpoint, pair_key, CharacterCollision, CollisionEvent, CollisionEventKind,
    CollisionEvents, ContactListener, EventPipeline,
};
use crate::geometry::{build_offset_shape, FALLBACK_SPHERE_RADIUS};
use crate::layers::{LayerMask, ObjectLayer};
use crate::material::PhysicsMaterial;
use crate::query::{PhysicsQuery, QueryOptions, RaycastHit, ShapeCastHit};
use glam::{Quat, Vec3};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use rapier3d::prelude as rapier;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};

/// One simulation instance with its worker pool, body and character tables
/// and collision event pipeline
pub struct PhysicsWorld {
    /// Configuration
    config: PhysicsConfig,

    /// Rapier physics pipeline
    pipeline: rapier::PhysicsPipeline,

    /// Gravity vector
    gravity: rapier::Vector<f32>,

    /// Integration parameters, `dt` is set on every step
    integration_params: rapier::IntegrationParameters,

    islands: rapier::IslandManager,
    broad_phase: rapier::DefaultBroadPhase,
    narrow_phase: rapier::NarrowPhase,
    impulse_joints: rapier::ImpulseJointSet,
    multibody_joints: rapier::MultibodyJointSet,
    ccd_solver: rapier::CCDSolver,
    rigid_bodies: rapier::RigidBodySet,
    colliders: rapier::ColliderSet,

    /// Query acceleration structure, rebuilt lazily when dirty
    query_pipeline: RwLock<rapier::QueryPipeline>,
    query_dirty: AtomicBool,

    /// Worker pool the step runs on
    pool: rayon::ThreadPool,

    bodies: HashMap<BodyId, BodyRecord>,
    next_body_id: u32,

    characters: HashMap<CharacterId, Character>,
    next_character_id: u32,

    /// Colliders removed since the last step, for exit events
    retired: HashMap<rapier::ColliderHandle, BodyId>,

    events: EventPipeline,
    snapshot: CollisionEvents,
}

impl PhysicsWorld {
    /// Create a new physics world.
    ///
    /// Fails only when the configuration is invalid or the worker pool
    /// cannot be started; nothing else in the world can work without them.
    pub fn new(config: PhysicsConfig) -> Result<Self> {
        if let Err(err) = config.validate() {
            log::error!("Physics world initialization failed: {}", err);
            return Err(err);
        }

        let threads = config.resolved_worker_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("void-physics-{}", i))
            .build()
            .map_err(|err| {
                log::error!("Physics world initialization failed: {}", err);
                PhysicsError::ThreadPool(err.to_string())
            })?;

        let mut integration_params = rapier::IntegrationParameters::default();
        integration_params.num_solver_iterations =
            NonZeroUsize::new(config.solver_iterations).unwrap_or(NonZeroUsize::MIN);

        log::info!(
            "Physics world created with {} worker thread(s), gravity {:?}",
            threads,
            config.gravity
        );

        Ok(Self {
            gravity: convert::to_vector(config.gravity),
            pipeline: rapier::PhysicsPipeline::new(),
            integration_params,
            islands: rapier::IslandManager::new(),
            broad_phase: rapier::DefaultBroadPhase::new(),
            narrow_phase: rapier::NarrowPhase::new(),
            impulse_joints: rapier::ImpulseJointSet::new(),
            multibody_joints: rapier::MultibodyJointSet::new(),
            ccd_solver: rapier::CCDSolver::new(),
            rigid_bodies: rapier::RigidBodySet::new(),
            colliders: rapier::ColliderSet::new(),
            query_pipeline: RwLock::new(rapier::QueryPipeline::new()),
            query_dirty: AtomicBool::new(false),
            pool,
            bodies: HashMap::with_capacity(config.max_bodies),
            next_body_id: 1,
            characters: HashMap::new(),
            next_character_id: 1,
            retired: HashMap::new(),
            events: EventPipeline::default(),
            snapshot: CollisionEvents::default(),
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Set gravity
    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = convert::to_vector(gravity);
    }

    /// Get gravity
    pub fn gravity(&self) -> Vec3 {
        convert::from_vector(&self.gravity)
    }

    /// Material built from the configured default friction and restitution
    pub fn default_material(&self) -> PhysicsMaterial {
        PhysicsMaterial::new(self.config.default_friction, self.config.default_restitution)
    }

    // ==================== Bodies ====================

    /// Create a body and its collider.
    ///
    /// Never fails: a shape that cannot be built is replaced by a small
    /// sphere and an offset that cannot be composed is dropped, both with a
    /// warning. Dynamic bodies get mass and inertia from the shape unless
    /// the descriptor overrides the mass.
    pub fn create_body(&mut self, desc: BodyDescriptor) -> BodyId {
        let shape = match build_offset_shape(&desc.shape, &desc.offset) {
            Ok((shape, None)) => shape,
            Ok((shape, Some(err))) => {
                log::warn!("{}; ignoring the offset", err);
                shape
            }
            Err(err) => {
                log::warn!(
                    "{}; substituting a sphere of radius {}",
                    err,
                    FALLBACK_SPHERE_RADIUS
                );
                rapier::SharedShape::ball(FALLBACK_SPHERE_RADIUS)
            }
        };

        let id = BodyId::from_raw(self.next_body_id);
        self.next_body_id += 1;
        let user_data = pack_user_data(id, desc.owner);

        let body = rapier::RigidBodyBuilder::new(desc.kind.into())
            .position(convert::to_isometry(desc.position, desc.rotation))
            .linear_damping(desc.linear_damping)
            .angular_damping(desc.angular_damping)
            .gravity_scale(desc.gravity_factor)
            .ccd_enabled(self.config.ccd_enabled && desc.motion_quality == MotionQuality::Continuous)
            .can_sleep(self.config.sleeping_enabled)
            .locked_axes(desc.rotation_locks.to_rapier())
            .user_data(user_data)
            .build();
        let body_handle = self.rigid_bodies.insert(body);

        let mut collider = rapier::ColliderBuilder::new(shape)
            .sensor(desc.is_trigger)
            .friction(desc.material.friction)
            .restitution(desc.material.restitution)
            .friction_combine_rule(desc.material.friction_combine.into())
            .restitution_combine_rule(desc.material.restitution_combine.into())
            .collision_groups(desc.layer.interaction_groups())
            .active_collision_types(desc.layer.broad_phase_layer().active_collision_types())
            .active_events(rapier::ActiveEvents::COLLISION_EVENTS)
            .user_data(user_data);
        match desc.mass {
            Some(mass) if mass.is_finite() && mass > 0.0 => collider = collider.mass(mass),
            Some(mass) => log::warn!("Ignoring invalid mass {} for {:?}", mass, id),
            None => {}
        }
        let collider_handle =
            self.colliders
                .insert_with_parent(collider, body_handle, &mut self.rigid_bodies);

        self.bodies.insert(
            id,
            BodyRecord {
                body: body_handle,
                collider: collider_handle,
                kind: desc.kind,
                layer: desc.layer,
                is_trigger: desc.is_trigger,
                owner: desc.owner,
            },
        );
        self.mark_queries_dirty();

        log::debug!(
            "Created {:?} {:?} ({}) on layer {:?}",
            desc.kind,
            id,
            desc.shape.kind(),
            desc.layer
        );
        id
    }

    /// Destroy a body. The id must not be used afterwards.
    pub fn destroy_body(&mut self, id: BodyId) {
        let Some(record) = self.bodies.remove(&id) else {
            log::debug!("destroy_body: {:?} is not a live body", id);
            return;
        };

        self.retired.insert(record.collider, id);
        self.rigid_bodies.remove(
            record.body,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        self.mark_queries_dirty();
        log::debug!("Destroyed {:?}", id);
    }

    /// Whether the id refers to a live body
    pub fn is_valid_body(&self, id: BodyId) -> bool {
        self.bodies.contains_key(&id)
    }

    fn body(&self, id: BodyId) -> Option<&rapier::RigidBody> {
        self.bodies
            .get(&id)
            .and_then(|record| self.rigid_bodies.get(record.body))
    }

    fn body_mut(&mut self, id: BodyId) -> Option<&mut rapier::RigidBody> {
        let record = self.bodies.get(&id)?;
        self.rigid_bodies.get_mut(record.body)
    }

    /// Motion type of a body
    pub fn body_kind(&self, id: BodyId) -> Option<BodyKind> {
        self.bodies.get(&id).map(|record| record.kind)
    }

    /// Layer of a body
    pub fn body_layer(&self, id: BodyId) -> Option<ObjectLayer> {
        self.bodies.get(&id).map(|record| record.layer)
    }

    /// Owner bits of a body
    pub fn body_owner(&self, id: BodyId) -> Option<u64> {
        self.bodies.get(&id).and_then(|record| record.owner)
    }

    /// Whether a body is a trigger
    pub fn is_trigger(&self, id: BodyId) -> bool {
        self.bodies.get(&id).is_some_and(|record| record.is_trigger)
    }

    /// World position of a body
    pub fn position(&self, id: BodyId) -> Vec3 {
        self.body(id)
            .map(|b| convert::from_vector(b.translation()))
            .unwrap_or(Vec3::ZERO)
    }

    /// World rotation of a body
    pub fn rotation(&self, id: BodyId) -> Quat {
        self.body(id)
            .map(|b| convert::from_rotation(b.rotation()))
            .unwrap_or(Quat::IDENTITY)
    }

    /// Teleport a body
    pub fn set_position(&mut self, id: BodyId, position: Vec3) {
        if let Some(body) = self.body_mut(id) {
            body.set_translation(convert::to_vector(position), true);
            self.sync_collider_pose(id);
        }
    }

    /// Set the rotation of a body directly
    pub fn set_rotation(&mut self, id: BodyId, rotation: Quat) {
        if let Some(body) = self.body_mut(id) {
            body.set_rotation(convert::to_rotation(rotation), true);
            self.sync_collider_pose(id);
        }
    }

    /// Move a kinematic body to a pose over the next step.
    ///
    /// The body is swept there, so it pushes dynamic bodies in its way.
    /// Ignored for static and dynamic bodies.
    pub fn move_kinematic(&mut self, id: BodyId, position: Vec3, rotation: Quat) {
        if self.body_kind(id) != Some(BodyKind::Kinematic) {
            log::debug!("move_kinematic: {:?} is not a live kinematic body", id);
            return;
        }
        if let Some(body) = self.body_mut(id) {
            body.set_next_kinematic_position(convert::to_isometry(position, rotation));
        }
    }

    /// Linear velocity of a body
    pub fn linear_velocity(&self, id: BodyId) -> Vec3 {
        self.body(id)
            .map(|b| convert::from_vector(b.linvel()))
            .unwrap_or(Vec3::ZERO)
    }

    /// Set the linear velocity of a body
    pub fn set_linear_velocity(&mut self, id: BodyId, velocity: Vec3) {
        if let Some(body) = self.body_mut(id) {
            body.set_linvel(convert::to_vector(velocity), true);
        }
    }

    /// Angular velocity of a body
    pub fn angular_velocity(&self, id: BodyId) -> Vec3 {
        self.body(id)
            .map(|b| convert::from_vector(b.angvel()))
            .unwrap_or(Vec3::ZERO)
    }

    /// Set the angular velocity of a body
    pub fn set_angular_velocity(&mut self, id: BodyId, velocity: Vec3) {
        if let Some(body) = self.body_mut(id) {
            body.set_angvel(convert::to_vector(velocity), true);
        }
    }

    /// Gravity factor of a body
    pub fn gravity_factor(&self, id: BodyId) -> f32 {
        self.body(id).map(|b| b.gravity_scale()).unwrap_or(0.0)
    }

    /// Set the gravity factor of a body
    pub fn set_gravity_factor(&mut self, id: BodyId, factor: f32) {
        if let Some(body) = self.body_mut(id) {
            body.set_gravity_scale(factor, true);
        }
    }

    /// Add a force for the next step
    pub fn add_force(&mut self, id: BodyId, force: Vec3) {
        if let Some(body) = self.body_mut(id) {
            body.add_force(convert::to_vector(force), true);
        }
    }

    /// Add a torque for the next step
    pub fn add_torque(&mut self, id: BodyId, torque: Vec3) {
        if let Some(body) = self.body_mut(id) {
            body.add_torque(convert::to_vector(torque), true);
        }
    }

    /// Apply an impulse at the center of mass
    pub fn add_impulse(&mut self, id: BodyId, impulse: Vec3) {
        if let Some(body) = self.body_mut(id) {
            body.apply_impulse(convert::to_vector(impulse), true);
        }
    }

    /// Apply an impulse at a world point
    pub fn add_impulse_at_point(&mut self, id: BodyId, impulse: Vec3, point: Vec3) {
        if let Some(body) = self.body_mut(id) {
            body.apply_impulse_at_point(convert::to_vector(impulse), convert::to_point(point), true);
        }
    }

    /// Apply an angular impulse
    pub fn add_angular_impulse(&mut self, id: BodyId, impulse: Vec3) {
        if let Some(body) = self.body_mut(id) {
            body.apply_torque_impulse(convert::to_vector(impulse), true);
        }
    }

    /// Wake a body up
    pub fn activate(&mut self, id: BodyId) {
        if let Some(body) = self.body_mut(id) {
            body.wake_up(true);
        }
    }

    /// Put a body to sleep
    pub fn deactivate(&mut self, id: BodyId) {
        if let Some(body) = self.body_mut(id) {
            body.sleep();
        }
    }

    /// Whether a body is awake and simulated. Static bodies never are.
    pub fn is_active(&self, id: BodyId) -> bool {
        self.body(id)
            .is_some_and(|b| !b.is_fixed() && !b.is_sleeping())
    }

    /// Put the collider where its body now is, so queries see a teleport
    /// before the next step
    fn sync_collider_pose(&mut self, id: BodyId) {
        let Some(record) = self.bodies.get(&id) else {
            return;
        };
        let Some(body_pose) = self.rigid_bodies.get(record.body).map(|b| *b.position()) else {
            return;
        };
        if let Some(collider) = self.colliders.get_mut(record.collider) {
            let local = collider
                .position_wrt_parent()
                .copied()
                .unwrap_or_else(rapier::Isometry::identity);
            collider.set_position(body_pose * local);
        }
        self.mark_queries_dirty();
    }

    // ==================== Characters ====================

    /// Create a virtual character
    pub fn create_character(&mut self, desc: CharacterDescriptor) -> CharacterId {
        let id = CharacterId::from_raw(self.next_character_id);
        self.next_character_id += 1;
        self.characters.insert(id, Character::new(&desc));
        log::debug!("Created {:?} at {:?}", id, desc.position);
        id
    }

    /// Destroy a character. The id must not be used afterwards.
    pub fn destroy_character(&mut self, id: CharacterId) {
        if self.characters.remove(&id).is_some() {
            log::debug!("Destroyed {:?}", id);
        } else {
            log::debug!("destroy_character: {:?} is not a live character", id);
        }
    }

    /// Whether the id refers to a live character
    pub fn is_valid_character(&self, id: CharacterId) -> bool {
        self.characters.contains_key(&id)
    }

    /// Move a character for one tick.
    ///
    /// Resolves slopes, stairs and penetration against the current world
    /// state and pushes dynamic bodies it walks into. Call once per tick per
    /// character; new contacts show up in the events published by the next
    /// [`step`](Self::step).
    pub fn update_character(&mut self, id: CharacterId, dt: f32, desired_velocity: Vec3) {
        self.refresh_queries();
        let settings = CharacterSettings {
            gravity: convert::from_vector(&self.gravity),
            padding: self.config.character_padding,
            stair_height: self.config.character_stair_height,
            stair_min_width: self.config.character_stair_min_width,
        };

        let Some(character) = self.characters.get_mut(&id) else {
            return;
        };
        let outcome = {
            let queries = self.query_pipeline.read();
            character.resolve_movement(
                dt,
                desired_velocity,
                &settings,
                &self.rigid_bodies,
                &self.colliders,
                &queries,
            )
        };

        for push in &outcome.pushes {
            if let Some(body) = self.rigid_bodies.get_mut(push.body) {
                body.apply_impulse_at_point(
                    convert::to_vector(push.impulse),
                    convert::to_point(push.point),
                    true,
                );
            }
        }

        for contact in &outcome.new_contacts {
            let (body, other_owner) = self
                .colliders
                .get(contact.collider)
                .map(|c| unpack_user_data(c.user_data))
                .unwrap_or((BodyId::INVALID, None));
            self.events.push_character(CharacterCollision {
                character: id,
                character_owner: character.owner,
                body,
                other_owner,
                point: contact.point,
                normal: contact.normal,
            });
        }
    }

    /// Position of a character
    pub fn character_position(&self, id: CharacterId) -> Vec3 {
        self.characters
            .get(&id)
            .map(|c| c.position)
            .unwrap_or(Vec3::ZERO)
    }

    /// Teleport a character
    pub fn set_character_position(&mut self, id: CharacterId, position: Vec3) {
        if let Some(character) = self.characters.get_mut(&id) {
            character.position = position;
            character.ground = GroundState::InAir;
            character.reset_contacts();
        }
    }

    /// Rotation of a character
    pub fn character_rotation(&self, id: CharacterId) -> Quat {
        self.characters
            .get(&id)
            .map(|c| c.rotation)
            .unwrap_or(Quat::IDENTITY)
    }

    /// Set the rotation of a character
    pub fn set_character_rotation(&mut self, id: CharacterId, rotation: Quat) {
        if let Some(character) = self.characters.get_mut(&id) {
            character.rotation = rotation.normalize();
        }
    }

    /// Velocity of a character over its last update
    pub fn character_linear_velocity(&self, id: CharacterId) -> Vec3 {
        self.characters
            .get(&id)
            .map(|c| c.velocity)
            .unwrap_or(Vec3::ZERO)
    }

    /// Override the velocity carried into the next update
    pub fn set_character_linear_velocity(&mut self, id: CharacterId, velocity: Vec3) {
        if let Some(character) = self.characters.get_mut(&id) {
            character.velocity = velocity;
        }
    }

    /// Ground state after the last update
    pub fn character_ground_state(&self, id: CharacterId) -> GroundState {
        self.characters
            .get(&id)
            .map(|c| c.ground)
            .unwrap_or_default()
    }

    /// Whether a character stands on walkable ground
    pub fn is_character_grounded(&self, id: CharacterId) -> bool {
        self.character_ground_state(id) == GroundState::OnGround
    }

    /// Owner bits of a character
    pub fn character_owner(&self, id: CharacterId) -> Option<u64> {
        self.characters.get(&id).and_then(|c| c.owner)
    }

    // ==================== Simulation ====================

    /// Advance the simulation by one collision and integration pass.
    ///
    /// Fixed-timestep accumulation is the caller's job. Blocks until every
    /// worker is done, then publishes this step's events; events from the
    /// previous step are discarded whether they were read or not.
    pub fn step(&mut self, delta_time: f32) {
        self.snapshot = CollisionEvents::default();
        self.events.clear_body_events();

        if !(delta_time.is_finite() && delta_time > 0.0) {
            log::warn!("Skipping physics step with invalid delta time {}", delta_time);
            self.snapshot = self.events.take();
            return;
        }
        self.integration_params.dt = delta_time;

        let listener = ContactListener {
            pipeline: &self.events,
            retired: &self.retired,
        };
        let query_pipeline = self.query_pipeline.get_mut();
        let pipeline = &mut self.pipeline;
        let gravity = &self.gravity;
        let params = &self.integration_params;
        let islands = &mut self.islands;
        let broad_phase = &mut self.broad_phase;
        let narrow_phase = &mut self.narrow_phase;
        let rigid_bodies = &mut self.rigid_bodies;
        let colliders = &mut self.colliders;
        let impulse_joints = &mut self.impulse_joints;
        let multibody_joints = &mut self.multibody_joints;
        let ccd_solver = &mut self.ccd_solver;

        self.pool.install(|| {
            pipeline.step(
                gravity,
                params,
                islands,
                broad_phase,
                narrow_phase,
                rigid_bodies,
                colliders,
                impulse_joints,
                multibody_joints,
                ccd_solver,
                Some(query_pipeline),
                &(),
                &listener,
            );
        });
        self.query_dirty.store(false, Ordering::Release);

        self.collect_persisting_contacts();
        self.retired.clear();
        self.snapshot = self.events.take();

        log::trace!(
            "Physics step dt={:.4}: {} enter, {} stay, {} exit, {} character",
            delta_time,
            self.snapshot.enter.len(),
            self.snapshot.stay.len(),
            self.snapshot.exit.len(),
            self.snapshot.character.len()
        );
    }

    /// Stay events: pairs still touching after the step that did not start
    /// touching during it
    fn collect_persisting_contacts(&self) {
        let entered = self.events.entered_pairs();
        let resolve = |handle: rapier::ColliderHandle| {
            self.colliders
                .get(handle)
                .map(|c| unpack_user_data(c.user_data))
        };

        for pair in self.narrow_phase.contact_pairs() {
            if !pair.has_any_active_contact {
                continue;
            }
            let (Some((body_a, owner_a)), Some((body_b, owner_b))) =
                (resolve(pair.collider1), resolve(pair.collider2))
            else {
                continue;
            };
            if entered.contains(&pair_key(body_a, body_b)) {
                continue;
            }

            let (point, normal, penetration_depth) =
                deepest_contact(&self.colliders, pair, pair.collider1);
            self.events.push(CollisionEvent {
                kind: CollisionEventKind::Stay,
                body_a,
                body_b,
                owner_a,
                owner_b,
                point,
                normal,
                penetration_depth,
                is_trigger: false,
            });
        }

        for (h1, h2, intersecting) in self.narrow_phase.intersection_pairs() {
            if !intersecting {
                continue;
            }
            let (Some((body_a, owner_a)), Some((body_b, owner_b))) = (resolve(h1), resolve(h2))
            else {
                continue;
            };
            if entered.contains(&pair_key(body_a, body_b)) {
                continue;
            }

            self.events.push(CollisionEvent {
                kind: CollisionEventKind::Stay,
                body_a,
                body_b,
                owner_a,
                owner_b,
                point: midpoint(&self.colliders, h1, h2),
                normal: Vec3::ZERO,
                penetration_depth: 0.0,
                is_trigger: true,
            });
        }
    }

    // ==================== Events ====================

    /// Events published by the last step
    pub fn collision_events(&self) -> &CollisionEvents {
        &self.snapshot
    }

    /// Take the events published by the last step. A second call before
    /// the next step returns nothing.
    pub fn drain_collision_events(&mut self) -> CollisionEvents {
        std::mem::take(&mut self.snapshot)
    }

    /// Drop every event, published or pending. Bodies destroyed since the
    /// last step will not report exits when the next step runs.
    ///
    /// Call this after tearing down a whole session so that the next
    /// session starts without stale events.
    pub fn discard_pending_events(&mut self) {
        let discarded = self.retired.len();
        self.retired.clear();
        self.events.take();
        self.snapshot = CollisionEvents::default();
        log::debug!("Discarded pending events for {} destroyed bodies", discarded);
    }

    // ==================== Queries ====================

    fn mark_queries_dirty(&self) {
        self.query_dirty.store(true, Ordering::Release);
    }

    /// Rebuild the query structure if bodies were added, removed or
    /// teleported since it was last built
    fn refresh_queries(&self) {
        if !self.query_dirty.load(Ordering::Acquire) {
            return;
        }
        let pipeline = self.query_pipeline.upgradable_read();
        if !self.query_dirty.load(Ordering::Acquire) {
            return;
        }
        let mut pipeline = RwLockUpgradableReadGuard::upgrade(pipeline);
        pipeline.update(&self.colliders);
        self.query_dirty.store(false, Ordering::Release);
    }

    /// Get a query interface for raycasts, overlaps and sweeps
    pub fn query(&self) -> PhysicsQuery<'_> {
        self.refresh_queries();
        PhysicsQuery {
            query_pipeline: self.query_pipeline.read(),
            colliders: &self.colliders,
            bodies: &self.rigid_bodies,
        }
    }

    /// First solid body hit by a ray
    pub fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        layers: LayerMask,
    ) -> Option<RaycastHit> {
        let options = QueryOptions::default()
            .with_max_distance(max_distance)
            .with_layers(layers);
        self.query().raycast(origin, direction, &options)
    }

    /// Every solid body hit by a ray, nearest first
    pub fn raycast_all(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        layers: LayerMask,
    ) -> Vec<RaycastHit> {
        let options = QueryOptions::default()
            .with_max_distance(max_distance)
            .with_layers(layers);
        self.query().raycast_all(origin, direction, &options)
    }

    /// Bodies overlapping a sphere, triggers included
    pub fn overlap_sphere(&self, center: Vec3, radius: f32, layers: LayerMask) -> Vec<BodyId> {
        let options = QueryOptions::default()
            .with_layers(layers)
            .with_triggers(true);
        self.query().overlap_sphere(center, radius, &options)
    }

    /// Bodies overlapping an oriented box, triggers included
    pub fn overlap_box(
        &self,
        center: Vec3,
        half_extents: Vec3,
        rotation: Quat,
        layers: LayerMask,
    ) -> Vec<BodyId> {
        let options = QueryOptions::default()
            .with_layers(layers)
            .with_triggers(true);
        self.query()
            .overlap_box(center, half_extents, rotation, &options)
    }

    /// First solid body hit by a sphere swept along a direction
    pub fn cast_sphere(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
        layers: LayerMask,
    ) -> Option<ShapeCastHit> {
        let options = QueryOptions::default()
            .with_max_distance(max_distance)
            .with_layers(layers);
        self.query().cast_sphere(origin, radius, direction, &options)
    }

    // ==================== Debug ====================

    /// Number of live bodies
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of awake dynamic bodies
    pub fn active_body_count(&self) -> usize {
        self.islands.active_dynamic_bodies().len()
    }

    /// Number of live characters
    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    /// Ids of every live body
    pub fn body_ids(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.bodies.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ShapeDesc;
    use approx::assert_relative_eq;
    use std::collections::HashSet;

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(PhysicsConfig::default().with_worker_threads(2)).unwrap()
    }

    fn ground(world: &mut PhysicsWorld) -> BodyId {
        world.create_body(BodyDescriptor::fixed(ShapeDesc::cuboid(10.0, 0.5, 10.0)))
    }

    #[test]
    fn test_create_world() {
        let world = world();
        assert_eq!(world.body_count(), 0);
        assert_eq!(world.character_count(), 0);
        assert!(world.collision_events().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PhysicsConfig {
            solver_iterations: 0,
            ..Default::default()
        };
        assert!(matches!(
            PhysicsWorld::new(config),
            Err(PhysicsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_ids_never_reused() {
        let mut world = world();
        let a = world.create_body(BodyDescriptor::dynamic(ShapeDesc::sphere(0.5)));
        world.destroy_body(a);
        let b = world.create_body(BodyDescriptor::dynamic(ShapeDesc::sphere(0.5)));
        assert_ne!(a, b);
        assert!(!world.is_valid_body(a));
        assert!(world.is_valid_body(b));
    }

    #[test]
    fn test_stale_handle_returns_defaults() {
        let mut world = world();
        let id = world.create_body(
            BodyDescriptor::dynamic(ShapeDesc::sphere(0.5)).with_position(Vec3::new(1.0, 2.0, 3.0)),
        );
        world.destroy_body(id);

        assert_eq!(world.position(id), Vec3::ZERO);
        assert_eq!(world.rotation(id), Quat::IDENTITY);
        assert_eq!(world.linear_velocity(id), Vec3::ZERO);
        assert!(!world.is_active(id));
        world.add_impulse(id, Vec3::Y);
        world.set_position(id, Vec3::ONE);
        world.destroy_body(id);
    }

    #[test]
    fn test_degenerate_shape_falls_back() {
        let mut world = world();
        let id = world.create_body(BodyDescriptor::dynamic(ShapeDesc::sphere(-1.0)));
        assert!(world.is_valid_body(id));
    }

    #[test]
    fn test_gravity_fall() {
        let mut world = world();
        let id = world.create_body(
            BodyDescriptor::dynamic(ShapeDesc::sphere(1.0)).with_position(Vec3::new(0.0, 10.0, 0.0)),
        );

        for _ in 0..60 {
            world.step(1.0 / 60.0);
        }

        assert!(world.position(id).y < 10.0, "Body should fall due to gravity");
    }

    #[test]
    fn test_gravity_factor_zero_floats() {
        let mut world = world();
        let id = world.create_body(
            BodyDescriptor::dynamic(ShapeDesc::sphere(1.0))
                .with_position(Vec3::new(0.0, 10.0, 0.0))
                .with_gravity_factor(0.0),
        );

        for _ in 0..30 {
            world.step(1.0 / 60.0);
        }

        assert_relative_eq!(world.position(id).y, 10.0, epsilon = 1.0e-4);
    }

    #[test]
    fn test_move_kinematic_ignores_dynamic() {
        let mut world = world();
        let id = world.create_body(
            BodyDescriptor::dynamic(ShapeDesc::sphere(0.5)).with_gravity_factor(0.0),
        );
        world.move_kinematic(id, Vec3::new(5.0, 0.0, 0.0), Quat::IDENTITY);
        world.step(1.0 / 60.0);
        assert_relative_eq!(world.position(id).x, 0.0);
    }

    #[test]
    fn test_static_body_is_never_active() {
        let mut world = world();
        let id = ground(&mut world);
        world.activate(id);
        assert!(!world.is_active(id));
    }

    #[test]
    fn test_deactivate_puts_body_to_sleep() {
        let mut world = world();
        let id = world.create_body(BodyDescriptor::dynamic(ShapeDesc::sphere(0.5)));
        assert!(world.is_active(id));
        world.deactivate(id);
        assert!(!world.is_active(id));
        world.activate(id);
        assert!(world.is_active(id));
    }

    #[test]
    fn test_raycast_sees_new_body_before_step() {
        let mut world = world();
        let floor = ground(&mut world);

        let hit = world
            .raycast(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, 100.0, LayerMask::ALL)
            .expect("ray should hit the ground");
        assert_eq!(hit.body, floor);
        assert_relative_eq!(hit.distance, 4.5, epsilon = 1.0e-4);
        assert_relative_eq!(hit.normal.y, 1.0, epsilon = 1.0e-4);
    }

    #[test]
    fn test_raycast_respects_layers() {
        let mut world = world();
        ground(&mut world);

        let hit = world.raycast(
            Vec3::new(0.0, 5.0, 0.0),
            Vec3::NEG_Y,
            100.0,
            LayerMask::ALL.without(ObjectLayer::Static),
        );
        assert!(hit.is_none());
    }

    #[test]
    fn test_raycast_after_teleport() {
        let mut world = world();
        let id = world.create_body(
            BodyDescriptor::dynamic(ShapeDesc::sphere(0.5)).with_gravity_factor(0.0),
        );
        world.set_position(id, Vec3::new(0.0, 0.0, 10.0));

        let hit = world.raycast(Vec3::ZERO, Vec3::Z, 100.0, LayerMask::ALL);
        assert_eq!(hit.map(|h| h.body), Some(id));
    }

    #[test]
    fn test_overlap_sphere_deduplicates() {
        let mut world = world();
        let a = world.create_body(
            BodyDescriptor::dynamic(ShapeDesc::cuboid(0.5, 0.5, 0.5)).with_gravity_factor(0.0),
        );
        let far = world.create_body(
            BodyDescriptor::dynamic(ShapeDesc::sphere(0.5))
                .with_position(Vec3::new(50.0, 0.0, 0.0))
                .with_gravity_factor(0.0),
        );

        let found = world.overlap_sphere(Vec3::ZERO, 2.0, LayerMask::ALL);
        assert_eq!(found, vec![a]);
        assert!(!found.contains(&far));
    }

    #[test]
    fn test_drain_is_exactly_once() {
        let mut world = world();
        ground(&mut world);
        world.create_body(
            BodyDescriptor::dynamic(ShapeDesc::sphere(0.5)).with_position(Vec3::new(0.0, 1.2, 0.0)),
        );

        let mut enters = 0;
        for _ in 0..120 {
            world.step(1.0 / 60.0);
            enters += world.drain_collision_events().enter.len();
            assert!(world.drain_collision_events().is_empty());
        }
        assert_eq!(enters, 1);
    }

    #[test]
    fn test_destroyed_body_reports_exit() {
        let mut world = world();
        ground(&mut world);
        let ball = world.create_body(
            BodyDescriptor::dynamic(ShapeDesc::sphere(0.5)).with_position(Vec3::new(0.0, 1.0, 0.0)),
        );

        for _ in 0..10 {
            world.step(1.0 / 60.0);
        }
        world.destroy_body(ball);
        world.step(1.0 / 60.0);

        let exit = world
            .collision_events()
            .exit
            .iter()
            .find(|e| e.involves(ball))
            .copied()
            .expect("exit event for the destroyed body");
        assert!(exit.owner_a.is_none() && exit.owner_b.is_none());
    }

    #[test]
    fn test_discarded_teardown_reports_nothing() {
        let mut world = world();
        let floor = ground(&mut world);
        let ball = world.create_body(
            BodyDescriptor::dynamic(ShapeDesc::sphere(0.5)).with_position(Vec3::new(0.0, 1.0, 0.0)),
        );
        for _ in 0..20 {
            world.step(1.0 / 60.0);
        }

        world.destroy_body(ball);
        world.destroy_body(floor);
        world.discard_pending_events();
        assert!(world.collision_events().is_empty());

        let a = ground(&mut world);
        let b = world.create_body(
            BodyDescriptor::dynamic(ShapeDesc::sphere(0.5)).with_position(Vec3::new(0.0, 3.0, 0.0)),
        );
        world.step(1.0 / 60.0);

        let events = world.collision_events();
        assert!(events.exit.is_empty(), "stale exits: {:?}", events.exit);
        assert!(events.enter.iter().all(|e| e.involves(a) || e.involves(b)));
    }

    #[test]
    fn test_parallel_step_reports_every_landing() {
        let mut world =
            PhysicsWorld::new(PhysicsConfig::default().with_worker_threads(4)).unwrap();
        let floor = ground(&mut world);
        let balls: Vec<BodyId> = (0..16)
            .map(|i| {
                let x = (i % 4) as f32 * 2.0 - 3.0;
                let z = (i / 4) as f32 * 2.0 - 3.0;
                world.create_body(
                    BodyDescriptor::dynamic(ShapeDesc::sphere(0.5))
                        .with_position(Vec3::new(x, 1.5, z)),
                )
            })
            .collect();

        let mut landed = HashSet::new();
        for _ in 0..120 {
            world.step(1.0 / 60.0);
            landed.extend(
                world
                    .drain_collision_events()
                    .enter
                    .iter()
                    .filter_map(|e| e.other(floor)),
            );
        }

        for ball in balls {
            assert!(landed.contains(&ball), "{:?} never reported landing", ball);
        }
    }

    #[test]
    fn test_character_lands_on_ground() {
        let mut world = world();
        ground(&mut world);
        let character = world.create_character(CharacterDescriptor::new(
            Vec3::new(0.0, 2.0, 0.0),
            0.3,
            0.5,
        ));

        for _ in 0..120 {
            world.update_character(character, 1.0 / 60.0, Vec3::ZERO);
            world.step(1.0 / 60.0);
        }

        assert!(world.is_character_grounded(character));
        assert_eq!(world.character_ground_state(character), GroundState::OnGround);
        assert!(world.character_linear_velocity(character).y.abs() < 0.1);
        let feet = world.character_position(character).y - 0.8;
        assert!((feet - 0.5).abs() < 0.1, "feet at {}", feet);
    }

    #[test]
    fn test_stale_character_returns_defaults() {
        let mut world = world();
        let id = world.create_character(CharacterDescriptor::default());
        world.destroy_character(id);
        assert!(!world.is_valid_character(id));
        assert_eq!(world.character_position(id), Vec3::ZERO);
        assert_eq!(world.character_ground_state(id), GroundState::InAir);
        world.update_character(id, 1.0 / 60.0, Vec3::X);
    }
}
